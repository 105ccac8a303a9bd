//! ブラウザセッションの監督
//!
//! 巡回が失敗したらセッションを作り直して再試行し、
//! 巡回ごとにセッションを作り直してブラウザのメモリ増加を抑える。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::scan::{DeviceScanner, PassSummary};
use crate::telemetry::Telemetry;
use crate::traits::{CitationPortal, PortalLauncher};

/// 1回の巡回 (再試行込み) の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// 試行回数
    pub attempts: u32,
    /// 成功した試行の集計。全試行が失敗したら None
    pub summary: Option<PassSummary>,
}

impl PassReport {
    pub fn completed(&self) -> bool {
        self.summary.is_some()
    }
}

pub struct Supervisor {
    launcher: Arc<dyn PortalLauncher>,
    scanner: DeviceScanner,
    telemetry: Telemetry,
    max_retries: u32,
    restart_interval: Duration,
    session: Option<Box<dyn CitationPortal>>,
}

impl Supervisor {
    pub fn new(
        config: &ScraperConfig,
        launcher: Arc<dyn PortalLauncher>,
        scanner: DeviceScanner,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            launcher,
            scanner,
            telemetry,
            max_retries: config.max_retries.max(1),
            restart_interval: config.restart_interval,
            session: None,
        }
    }

    /// 停止されるまで巡回を繰り返す
    pub async fn run_forever(&mut self) {
        self.telemetry.info("Starting to get new citations");

        loop {
            let report = self.run_pass().await;
            if !report.completed() {
                self.telemetry.warn(format!(
                    "Scan pass abandoned after {} attempts",
                    report.attempts
                ));
            }

            sleep(self.restart_interval).await;
        }
    }

    /// 巡回を最大 max_retries 回まで試行し、最後にセッションを作り直す
    pub async fn run_pass(&mut self) -> PassReport {
        let mut retry_count = 0;
        let mut summary = None;

        while retry_count < self.max_retries {
            match self.attempt_pass().await {
                Ok(pass) => {
                    summary = Some(pass);
                    break;
                }
                Err(e) => {
                    if e.is_retryable() {
                        self.telemetry
                            .error(format!("Error during scan pass: {}", e));
                    } else {
                        self.telemetry.error(format!(
                            "Non-transient error during scan pass: {}",
                            e
                        ));
                    }
                    retry_count += 1;

                    if retry_count < self.max_retries {
                        self.telemetry.info(format!(
                            "Retrying ({}/{})...",
                            retry_count, self.max_retries
                        ));
                        self.recycle_session().await;
                    } else {
                        self.telemetry
                            .error("Max retries exceeded. Moving on to the next pass.");
                    }
                }
            }
        }

        self.telemetry
            .info("Restarting browser session to prevent memory leaks...");
        self.recycle_session().await;

        PassReport {
            attempts: retry_count + u32::from(summary.is_some()),
            summary,
        }
    }

    async fn attempt_pass(&mut self) -> Result<PassSummary, ScraperError> {
        if self.session.is_none() {
            self.session = Some(self.launcher.launch().await?);
        }

        match self.session.as_mut() {
            Some(session) => self.scanner.scan_all(session.as_mut()).await,
            None => Err(ScraperError::BrowserInit(
                "Browser session not available".to_string(),
            )),
        }
    }

    /// 現在のセッションを閉じて新しく起動する
    ///
    /// 起動に失敗したらセッションなしのまま。次の試行で再度起動する。
    async fn recycle_session(&mut self) {
        self.close_session().await;

        match self.launcher.launch().await {
            Ok(session) => self.session = Some(session),
            Err(e) => {
                self.telemetry
                    .error(format!("Failed to restart browser session: {}", e));
            }
        }
    }

    async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                self.telemetry
                    .warn(format!("Failed to close browser session: {}", e));
            }
        }
    }

    /// 終了処理
    pub async fn shutdown(&mut self) {
        self.telemetry.info("Shutting down citation scraper");
        self.close_session().await;
    }
}
