//! ポータルのブラウザセッション

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::telemetry::Telemetry;
use crate::traits::{CitationPortal, PortalLauncher, PortalPage};

use super::classifier::OutcomeClassifier;
use super::types::Classification;

const SEARCH_BOX_SELECTOR: &str = "#citationSearchBox";
const ELEMENT_POLL_INTERVAL_MS: u64 = 250;

const CLEAR_SEARCH_BOX_SCRIPT: &str = r#"
    (function() {
        var input = document.querySelector('#citationSearchBox');
        if (input) {
            input.value = '';
            return true;
        }
        return false;
    })()
"#;

const CLICK_SEARCH_BUTTON_SCRIPT: &str = r#"
    (function() {
        var buttons = document.querySelectorAll("button[type='submit']");
        for (var i = 0; i < buttons.length; i++) {
            if (buttons[i].textContent.indexOf('Search Citations') >= 0 && !buttons[i].disabled) {
                buttons[i].click();
                return true;
            }
        }
        return false;
    })()
"#;

#[async_trait]
impl PortalPage for Page {
    async fn current_url(&self) -> Result<String, ScraperError> {
        self.url()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| ScraperError::Navigation(e.to_string()))
    }

    async fn content(&self) -> Result<String, ScraperError> {
        Page::content(self)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }
}

/// chromiumoxide で駆動するポータルセッション
pub struct PortalSession {
    config: ScraperConfig,
    browser: Option<Browser>,
    page: Option<Arc<Page>>,
    handler: Option<JoinHandle<()>>,
    user_data_dir: PathBuf,
    classifier: OutcomeClassifier,
    telemetry: Telemetry,
}

impl PortalSession {
    pub fn new(config: ScraperConfig, telemetry: Telemetry) -> Self {
        // ユニークなユーザーデータディレクトリを生成
        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("citation-scraper-{}", unique_id));
        let classifier = OutcomeClassifier::new(&config, telemetry.clone());

        Self {
            config,
            browser: None,
            page: None,
            handler: None,
            user_data_dir,
            classifier,
            telemetry,
        }
    }

    /// ブラウザを初期化
    pub async fn initialize(&mut self) -> Result<(), ScraperError> {
        info!("Initializing browser for citation portal...");

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&self.user_data_dir)
            .window_size(1280, 800);

        if let Some(chrome_path) = &self.config.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }

        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(Duration::from_secs(60))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--ignore-certificate-errors");

        if self.config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder.build().map_err(ScraperError::BrowserInit)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // ハンドラータスクを起動
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        self.browser = Some(browser);
        self.page = Some(Arc::new(page));
        self.handler = Some(handler_task);

        info!("Browser initialized successfully");
        Ok(())
    }

    fn get_page(&self) -> Result<Arc<Page>, ScraperError> {
        self.page
            .clone()
            .ok_or_else(|| ScraperError::BrowserInit("Browser not initialized".to_string()))
    }

    /// 要素が現れるまで待機
    async fn wait_for_element(&self, page: &Page, selector: &str) -> Result<Element, ScraperError> {
        let start = std::time::Instant::now();
        loop {
            match page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(e) if start.elapsed() >= self.config.page_timeout => {
                    return Err(ScraperError::Timeout(format!(
                        "{} not found within {:?}: {}",
                        selector, self.config.page_timeout, e
                    )));
                }
                Err(_) => sleep(Duration::from_millis(ELEMENT_POLL_INTERVAL_MS)).await,
            }
        }
    }

    /// 検索フォームにチケット番号を入力して送信
    async fn submit(&self, page: &Page, citation_id: u64) -> Result<(), ScraperError> {
        page.goto(self.config.portal_url.as_str())
            .await
            .map_err(|e| match e {
                CdpError::Timeout => {
                    ScraperError::Timeout(format!("loading {}", self.config.portal_url))
                }
                other => ScraperError::Navigation(other.to_string()),
            })?;

        let input = self.wait_for_element(page, SEARCH_BOX_SELECTOR).await?;

        page.evaluate(CLEAR_SEARCH_BOX_SCRIPT)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;

        input
            .click()
            .await
            .map_err(|e| ScraperError::Navigation(format!("search box click: {}", e)))?
            .type_str(citation_id.to_string())
            .await
            .map_err(|e| ScraperError::Navigation(format!("search box input: {}", e)))?;
        debug!("Entered citation {}", citation_id);

        // 検索ボタンがクリック可能になるまで待機
        let start = std::time::Instant::now();
        loop {
            let clicked: bool = page
                .evaluate(CLICK_SEARCH_BUTTON_SCRIPT)
                .await
                .map(|v| v.into_value().unwrap_or(false))
                .unwrap_or(false);

            if clicked {
                debug!("Search button clicked");
                return Ok(());
            }

            if start.elapsed() >= self.config.page_timeout {
                return Err(ScraperError::Timeout(
                    "Search Citations button was not clickable".to_string(),
                ));
            }
            sleep(Duration::from_millis(ELEMENT_POLL_INTERVAL_MS)).await;
        }
    }

    /// デバッグスクリーンショット
    async fn debug_screenshot(&self, page: &Page, citation_id: u64) {
        match page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            Ok(screenshot) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
                debug!(
                    "Screenshot for citation {}: data:image/png;base64,{}",
                    citation_id, encoded
                );
            }
            Err(e) => debug!("Failed to take screenshot: {}", e),
        }
    }
}

#[async_trait]
impl CitationPortal for PortalSession {
    async fn lookup(&mut self, citation_id: u64) -> Result<Classification, ScraperError> {
        let page = self.get_page()?;
        self.telemetry
            .info(format!("Getting citation details for {}", citation_id));

        match self.submit(&page, citation_id).await {
            Ok(()) => {}
            Err(ScraperError::Timeout(detail)) => {
                self.telemetry.error(format!(
                    "Timeout occurred while fetching citation data for citation ID {}: {}",
                    citation_id, detail
                ));
                return Ok(Classification::Timeout);
            }
            Err(e) => return Err(e),
        }

        let view: Arc<dyn PortalPage> = page.clone();
        let classification = self.classifier.classify(view, citation_id).await;

        if self.config.debug
            && matches!(
                classification,
                Classification::NoResult | Classification::Timeout
            )
        {
            self.debug_screenshot(&page, citation_id).await;
        }

        Ok(classification)
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        info!("Closing browser...");
        self.page = None;

        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Failed to close browser: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Failed to wait for browser exit: {}", e);
            }
        }

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        if let Err(e) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
            debug!("Failed to remove user data dir {:?}: {}", self.user_data_dir, e);
        }

        info!("Browser closed");
        Ok(())
    }
}

/// 本番用: Chrome を起動してセッションを作る
pub struct ChromeLauncher {
    config: ScraperConfig,
    telemetry: Telemetry,
}

impl ChromeLauncher {
    pub fn new(config: ScraperConfig, telemetry: Telemetry) -> Self {
        Self { config, telemetry }
    }
}

#[async_trait]
impl PortalLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn CitationPortal>, ScraperError> {
        let mut session = PortalSession::new(self.config.clone(), self.telemetry.clone());
        if let Err(e) = session.initialize().await {
            // 起動途中のプロセスを残さない
            let _ = session.close().await;
            return Err(e);
        }
        Ok(Box::new(session))
    }
}
