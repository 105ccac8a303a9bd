//! 端末ごとの巡回ループ
//!
//! 各端末の最後のチケット番号の次から順に照会し、結果を保存してカーソルを進める。
//! 「存在しない」または未分類の結果に当たった番号でその端末の今回の巡回を終える。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::sleep;

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::portal::{Classification, ScrapedCitation};
use crate::store::{persist_citation, CursorMap, DeviceCursor, ErrorTicketRecord};
use crate::telemetry::Telemetry;
use crate::traits::{CitationPortal, CursorStore, Datastore};

const UNPAID_MISS_MARKERS: [&str; 2] = ["did not match any unpaid citations", "No results found"];
const NOT_FOUND_MARKER: &str = "does not match any citations in the system";
const ALREADY_PAID_MARKER: &str = "already been paid";

/// テーブルもバナーも得られなかった場合の error_message
const UNKNOWN_ERROR_MESSAGE: &str = "Some unknown error occurred";

/// 1件処理後の遷移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// カーソルを進めて次の番号へ
    Advance,
    /// この端末の今回の巡回を終える
    Boundary,
}

/// バナー本文の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    /// 未払いチケットとして見つからない (異議申立て中など)
    UnpaidMiss,
    /// 番号自体が存在しない
    DoesNotExist,
    AlreadyPaid,
    Unhandled,
}

impl BannerKind {
    pub fn of(text: &str) -> Self {
        if UNPAID_MISS_MARKERS.iter().any(|m| text.contains(m)) {
            BannerKind::UnpaidMiss
        } else if text.contains(NOT_FOUND_MARKER) {
            BannerKind::DoesNotExist
        } else if text.contains(ALREADY_PAID_MARKER) {
            BannerKind::AlreadyPaid
        } else {
            BannerKind::Unhandled
        }
    }
}

/// 1回の巡回の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub devices: usize,
    pub advanced: u64,
}

pub struct DeviceScanner {
    datastore: Arc<dyn Datastore>,
    cursors: Arc<dyn CursorStore>,
    telemetry: Telemetry,
    device_delay: Duration,
}

impl DeviceScanner {
    pub fn new(
        config: &ScraperConfig,
        datastore: Arc<dyn Datastore>,
        cursors: Arc<dyn CursorStore>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            datastore,
            cursors,
            telemetry,
            device_delay: config.device_delay,
        }
    }

    /// 全端末を1巡する
    ///
    /// カーソルは毎回ストアから読み直す。ポータルのエラーはそのまま返す。
    pub async fn scan_all(
        &self,
        portal: &mut dyn CitationPortal,
    ) -> Result<PassSummary, ScraperError> {
        let mut cursors = self.cursors.load().await?;
        let devices: Vec<DeviceCursor> = cursors
            .iter()
            .map(|(device_id, last)| DeviceCursor {
                device_id: device_id.clone(),
                last_known_citation: *last,
            })
            .collect();

        let mut summary = PassSummary {
            devices: devices.len(),
            advanced: 0,
        };

        for device in &devices {
            summary.advanced += self.scan_device(portal, device, &mut cursors).await?;

            // サーバーに負荷をかけすぎないよう端末ごとに待機
            sleep(self.device_delay).await;
        }

        Ok(summary)
    }

    /// 1端末を境界まで進める。進んだ件数を返す
    pub async fn scan_device(
        &self,
        portal: &mut dyn CitationPortal,
        device: &DeviceCursor,
        cursors: &mut CursorMap,
    ) -> Result<u64, ScraperError> {
        let mut next_citation = device.next_citation();
        let mut advanced = 0;
        self.telemetry.debug(format!(
            "Checking {} from citation {}",
            device.device_id, next_citation
        ));

        loop {
            match self.handle_citation(portal, next_citation).await? {
                Step::Advance => {
                    cursors.insert(device.device_id.clone(), next_citation);
                    self.cursors.save(cursors).await?;
                    self.telemetry.info(format!(
                        "Processed new citation for {}: {}",
                        device.device_id, next_citation
                    ));

                    advanced += 1;
                    next_citation += 1;
                }
                Step::Boundary => {
                    self.telemetry.info(format!(
                        "No more new citations for {}. Last known: {}",
                        device.device_id,
                        next_citation - 1
                    ));
                    return Ok(advanced);
                }
            }
        }
    }

    /// 1件照会して結果を保存する
    pub async fn handle_citation(
        &self,
        portal: &mut dyn CitationPortal,
        citation_id: u64,
    ) -> Result<Step, ScraperError> {
        let start = Instant::now();
        let classification = portal.lookup(citation_id).await?;

        self.telemetry.info(format!(
            "Citation ID: {} | Time Taken: {:.2} seconds | Result: {}",
            citation_id,
            start.elapsed().as_secs_f64(),
            classification
        ));

        Ok(self.apply(citation_id, classification).await)
    }

    /// 分類結果を保存し、遷移を決める
    pub async fn apply(&self, citation_id: u64, classification: Classification) -> Step {
        let message = classification.to_string();

        match classification {
            Classification::Records(rows) => self.store_records(&rows).await,
            Classification::ErrorText(text) => match BannerKind::of(&text) {
                BannerKind::UnpaidMiss => {
                    if !self.store_error_ticket(citation_id, &message, true).await {
                        return Step::Boundary;
                    }
                    self.telemetry.warn(format!(
                        "Error: Citation ID {} either appealed or something else.",
                        citation_id
                    ));
                    Step::Advance
                }
                BannerKind::DoesNotExist => {
                    self.telemetry
                        .info(format!("Citation ID {} does not exist.", citation_id));
                    Step::Boundary
                }
                BannerKind::AlreadyPaid => {
                    if !self.store_error_ticket(citation_id, &message, false).await {
                        return Step::Boundary;
                    }
                    self.telemetry
                        .warn(format!("Citation ID {} has already been paid.", citation_id));
                    Step::Advance
                }
                BannerKind::Unhandled => {
                    self.store_error_ticket(citation_id, &message, true).await;
                    self.telemetry.warn(format!(
                        "Error: Citation ID {} gave an unhandled citation status: {}.",
                        citation_id, message
                    ));
                    Step::Boundary
                }
            },
            Classification::NoResult | Classification::Timeout => {
                self.store_error_ticket(citation_id, UNKNOWN_ERROR_MESSAGE, true)
                    .await;
                self.telemetry.warn(format!(
                    "Error: Citation ID {} gave an unhandled citation status.",
                    citation_id
                ));
                Step::Boundary
            }
        }
    }

    /// 全行を保存。1行でも失敗したら残りは保存せず境界とする
    async fn store_records(&self, rows: &[ScrapedCitation]) -> Step {
        for row in rows {
            match persist_citation(self.datastore.as_ref(), row, Utc::now()).await {
                Ok(record) => self.telemetry.info(format!(
                    "Citation ID {} data inserted/updated in tickets successfully.",
                    record.citation_id
                )),
                Err(e) => {
                    self.telemetry.error(format!(
                        "Error inserting/updating tickets for citation ID {}: {}",
                        row.citation_number, e
                    ));
                    return Step::Boundary;
                }
            }
        }

        Step::Advance
    }

    /// error_tickets に保存。成功したら true
    async fn store_error_ticket(
        &self,
        citation_id: u64,
        message: &str,
        should_try_again: bool,
    ) -> bool {
        let result = match ErrorTicketRecord::new(citation_id, message, should_try_again) {
            Ok(ticket) => self.datastore.upsert_error_ticket(&ticket).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.telemetry.error(format!(
                    "Error inserting into error_tickets for citation ID {}: {}",
                    citation_id, e
                ));
                false
            }
        }
    }
}
