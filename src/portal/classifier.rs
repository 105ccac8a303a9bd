//! 照会結果の判定
//!
//! 送信後のページに対して3つのチェックを並行に走らせ、最初に反応したものを採用する:
//! - 結果ページへのURL遷移
//! - メッセージバナー (`.message`)
//! - 入力エラーバナー (`.validation-summary-errors`)

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::telemetry::{LogLevel, Telemetry};
use crate::traits::PortalPage;

use super::types::{Classification, ScrapedCitation};

const POLL_INTERVAL_MS: u64 = 250;

const RESULTS_TABLE_SELECTOR: &str = "table#citations-list-table";
const MESSAGE_SELECTOR: &str = ".message";
const VALIDATION_SELECTOR: &str = ".validation-summary-errors";

/// 結果テーブルの列数 (番号, 状態, 残高, 発行日, ナンバー, 場所)
const TABLE_COLUMNS: usize = 6;

/// 各チェックが検出したシグナル
#[derive(Debug, Clone, PartialEq, Eq)]
enum Signal {
    Redirected,
    Message(String),
    Validation(String),
}

#[derive(Clone)]
pub struct OutcomeClassifier {
    results_path: String,
    check_timeout: Duration,
    table_timeout: Duration,
    telemetry: Telemetry,
}

impl OutcomeClassifier {
    pub fn new(config: &ScraperConfig, telemetry: Telemetry) -> Self {
        Self {
            results_path: config.results_path.clone(),
            check_timeout: config.check_timeout,
            table_timeout: config.table_timeout,
            telemetry,
        }
    }

    /// 送信後のページを分類
    pub async fn classify(&self, page: Arc<dyn PortalPage>, citation_id: u64) -> Classification {
        match self.race(page.clone()).await {
            Some(Signal::Redirected) => self.extract(page.as_ref(), citation_id).await,
            Some(Signal::Message(text)) | Some(Signal::Validation(text)) => {
                Classification::ErrorText(text)
            }
            None => Classification::Timeout,
        }
    }

    /// 3つのチェックを別タスクで起動し、最初のシグナルを返す
    ///
    /// 負けたタスクは待たずに切り離す。各タスクは自身のタイムアウトで終わる。
    async fn race(&self, page: Arc<dyn PortalPage>) -> Option<Signal> {
        let mut checks = FuturesUnordered::new();
        checks.push(tokio::spawn(watch_redirect(
            page.clone(),
            self.results_path.clone(),
            self.check_timeout,
        )));
        checks.push(tokio::spawn(watch_banner(
            page.clone(),
            MESSAGE_SELECTOR,
            self.check_timeout,
            Signal::Message,
        )));
        checks.push(tokio::spawn(watch_banner(
            page,
            VALIDATION_SELECTOR,
            self.check_timeout,
            Signal::Validation,
        )));

        while let Some(joined) = checks.next().await {
            match joined {
                Ok(Some(signal)) => {
                    debug!("Outcome signal: {:?}", signal);
                    return Some(signal);
                }
                Ok(None) => {}
                Err(e) => warn!("Outcome check task failed: {}", e),
            }
        }

        None
    }

    /// 結果テーブルを読み取る
    async fn extract(&self, page: &dyn PortalPage, citation_id: u64) -> Classification {
        let extracted = poll_until(self.table_timeout, move || async move {
            match page.content().await {
                Ok(html) => parse_citation_table(&html, citation_id).transpose(),
                Err(e) => {
                    debug!("Page content unavailable: {}", e);
                    None
                }
            }
        })
        .await;

        match extracted {
            Some(Ok(rows)) => {
                let payload = json!({ "citations_data": rows });
                self.telemetry.log(
                    LogLevel::Info,
                    &format!("Citation details extracted for citation ID {}", citation_id),
                    Some(&payload),
                );
                Classification::Records(rows)
            }
            Some(Err(e)) => {
                self.telemetry.error(format!(
                    "No such element found while extracting citation details for citation ID {}: {}",
                    citation_id, e
                ));
                Classification::NoResult
            }
            None => {
                self.telemetry.error(format!(
                    "Timeout occurred while extracting citation details for citation ID {}",
                    citation_id
                ));
                Classification::NoResult
            }
        }
    }
}

/// `probe` が値を返すまでポーリングする。時間切れなら None
async fn poll_until<T, F, Fut>(timeout: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    tokio::time::timeout(timeout, async {
        loop {
            if let Some(value) = probe().await {
                return value;
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    })
    .await
    .ok()
}

async fn watch_redirect(
    page: Arc<dyn PortalPage>,
    results_path: String,
    timeout: Duration,
) -> Option<Signal> {
    poll_until(timeout, || {
        let page = page.clone();
        let results_path = results_path.clone();
        async move {
            match page.current_url().await {
                Ok(url) if url.contains(&results_path) => Some(Signal::Redirected),
                Ok(_) => None,
                Err(e) => {
                    debug!("URL check error: {}", e);
                    None
                }
            }
        }
    })
    .await
}

async fn watch_banner(
    page: Arc<dyn PortalPage>,
    selector: &'static str,
    timeout: Duration,
    wrap: fn(String) -> Signal,
) -> Option<Signal> {
    poll_until(timeout, || {
        let page = page.clone();
        async move {
            match page.content().await {
                Ok(html) => banner_text(&html, selector).map(wrap),
                Err(e) => {
                    debug!("Banner check error ({}): {}", selector, e);
                    None
                }
            }
        }
    })
    .await
}

fn parse_selector(selector: &str) -> Result<Selector, ScraperError> {
    Selector::parse(selector)
        .map_err(|e| ScraperError::Extraction(format!("invalid selector {}: {:?}", selector, e)))
}

/// 表示テキスト (空白を1つに詰める)
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 空でない最初のバナー本文
pub fn banner_text(html: &str, selector: &str) -> Option<String> {
    let selector = parse_selector(selector).ok()?;
    let document = Html::parse_document(html);
    let text = document
        .select(&selector)
        .map(element_text)
        .find(|text| !text.is_empty());
    text
}

/// 結果テーブルを読み取る
///
/// テーブルがまだ無ければ `Ok(None)`、列が欠けた行があればエラー。
pub fn parse_citation_table(
    html: &str,
    citation_id: u64,
) -> Result<Option<Vec<ScrapedCitation>>, ScraperError> {
    let table_selector = parse_selector(RESULTS_TABLE_SELECTOR)?;
    let row_selector = parse_selector("tbody tr")?;
    let cell_selector = parse_selector("td")?;

    let document = Html::parse_document(html);
    let Some(table) = document.select(&table_selector).next() else {
        return Ok(None);
    };

    let queried = citation_id.to_string();
    let rows = table
        .select(&row_selector)
        .enumerate()
        .map(|(index, row)| {
            let cells: Vec<String> = row.select(&cell_selector).map(element_text).collect();
            if cells.len() < TABLE_COLUMNS {
                return Err(ScraperError::ElementNotFound(format!(
                    "row {} has {} of {} columns",
                    index + 1,
                    cells.len(),
                    TABLE_COLUMNS
                )));
            }

            Ok(ScrapedCitation {
                just_scraped: cells[0] == queried,
                citation_number: cells[0].clone(),
                status: cells[1].clone(),
                balance: cells[2].clone(),
                issue_date: cells[3].clone(),
                license_plate: cells[4].clone(),
                location: cells[5].clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(rows))
}
