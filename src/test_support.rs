//! テスト用のインメモリ実装とHTMLフィクスチャ

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ScraperError;
use crate::portal::{Classification, ScrapedCitation};
use crate::store::{CitationRecord, CursorMap, ErrorTicketRecord, ExistingTicket};
use crate::telemetry::LogLevel;
use crate::traits::{CitationPortal, CursorStore, Datastore, LogSink, PortalLauncher, PortalPage};

pub const RESULTS_URL: &str = "https://ucsd-transportation.t2hosted.com/Account/Citations/Results";

pub const EMPTY_HTML: &str = "<html><body><form><input id=\"citationSearchBox\"></form></body></html>";

pub const PAID_HTML: &str = r#"<html><body>
    <div class="message">
        The citation you entered
        has already been paid.
    </div>
</body></html>"#;

pub const NOT_FOUND_HTML: &str = r#"<html><body>
    <div class="validation-summary-errors"><ul>
        <li>The citation you entered does not match any citations in the system.</li>
    </ul></div>
</body></html>"#;

pub const UNPAID_MISS_TEXT: &str = "Your search did not match any unpaid citations.";
pub const NOT_FOUND_TEXT: &str =
    "The citation you entered does not match any citations in the system.";
pub const PAID_TEXT: &str = "The citation you entered has already been paid.";

/// 結果ページのHTML
pub fn results_html(rows: &[[&str; 6]]) -> String {
    let body: String = rows
        .iter()
        .map(|cells| {
            let tds: String = cells.iter().map(|c| format!("<td> {} </td>", c)).collect();
            format!("<tr>{}</tr>", tds)
        })
        .collect();

    format!(
        r#"<html><body><table id="citations-list-table">
            <thead><tr><th>Citation</th><th>Status</th><th>Balance</th><th>Issued</th><th>Plate</th><th>Location</th></tr></thead>
            <tbody>{}</tbody>
        </table></body></html>"#,
        body
    )
}

pub fn scraped_row(citation_number: &str, issue_date: &str) -> ScrapedCitation {
    ScrapedCitation {
        citation_number: citation_number.to_string(),
        status: "Unpaid".to_string(),
        balance: "$65.00".to_string(),
        issue_date: issue_date.to_string(),
        license_plate: "8ABC123".to_string(),
        location: "Lot P357".to_string(),
        just_scraped: true,
    }
}

pub fn records(ids: &[&str]) -> Classification {
    Classification::Records(
        ids.iter()
            .enumerate()
            .map(|(i, id)| ScrapedCitation {
                just_scraped: i == 0,
                ..scraped_row(id, "10/01/2024")
            })
            .collect(),
    )
}

pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let unique_id = format!(
        "{}-{}-{}",
        prefix,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    );
    let dir = std::env::temp_dir().join(unique_id);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// 固定のURLとHTMLを返すページ
pub struct StaticPage {
    url: Option<String>,
    html: Option<String>,
}

impl StaticPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            html: Some(html.into()),
        }
    }

    /// 常に読み取りに失敗するページ
    pub fn unreadable() -> Self {
        Self {
            url: None,
            html: None,
        }
    }
}

#[async_trait]
impl PortalPage for StaticPage {
    async fn current_url(&self) -> Result<String, ScraperError> {
        self.url
            .clone()
            .ok_or_else(|| ScraperError::Navigation("target closed".into()))
    }

    async fn content(&self) -> Result<String, ScraperError> {
        self.html
            .clone()
            .ok_or_else(|| ScraperError::JavaScript("target closed".into()))
    }
}

/// ポータルが落ちるタイミング
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crash {
    Never,
    Always,
    At(u64),
}

/// 台本どおりに結果を返すポータル
///
/// 台本にない番号は「存在しない」バナーを返す。
pub struct ScriptedPortal {
    responses: Arc<HashMap<u64, Classification>>,
    crash: Crash,
    lookups: Arc<Mutex<Vec<u64>>>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedPortal {
    pub fn new(responses: impl IntoIterator<Item = (u64, Classification)>) -> Self {
        Self {
            responses: Arc::new(responses.into_iter().collect()),
            crash: Crash::Never,
            lookups: Arc::default(),
            closes: Arc::default(),
        }
    }

    pub fn crashing(mut self, crash: Crash) -> Self {
        self.crash = crash;
        self
    }

    pub fn lookups(&self) -> Vec<u64> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl CitationPortal for ScriptedPortal {
    async fn lookup(&mut self, citation_id: u64) -> Result<Classification, ScraperError> {
        self.lookups.lock().unwrap().push(citation_id);

        let crashed = match self.crash {
            Crash::Never => false,
            Crash::Always => true,
            Crash::At(id) => id == citation_id,
        };
        if crashed {
            return Err(ScraperError::Navigation("browser crashed".into()));
        }

        Ok(self
            .responses
            .get(&citation_id)
            .cloned()
            .unwrap_or_else(|| Classification::ErrorText(NOT_FOUND_TEXT.to_string())))
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// ScriptedPortal を配るランチャー
pub struct ScriptedLauncher {
    responses: Arc<HashMap<u64, Classification>>,
    lookups: Arc<Mutex<Vec<u64>>>,
    closes: Arc<AtomicUsize>,
    launches: AtomicUsize,
    failed_launches: usize,
    broken_sessions: usize,
    crash: Crash,
}

impl ScriptedLauncher {
    pub fn new(responses: impl IntoIterator<Item = (u64, Classification)>) -> Self {
        Self {
            responses: Arc::new(responses.into_iter().collect()),
            lookups: Arc::default(),
            closes: Arc::default(),
            launches: AtomicUsize::new(0),
            failed_launches: 0,
            broken_sessions: 0,
            crash: Crash::Always,
        }
    }

    /// 最初の n 回の起動を失敗させる
    pub fn with_failed_launches(mut self, n: usize) -> Self {
        self.failed_launches = n;
        self
    }

    /// 起動に成功した最初の n セッションを `crash` のとおり落とす
    pub fn with_broken_sessions(mut self, n: usize, crash: Crash) -> Self {
        self.broken_sessions = n;
        self.crash = crash;
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> Vec<u64> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortalLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn CitationPortal>, ScraperError> {
        let n = self.launches.fetch_add(1, Ordering::SeqCst);
        if n < self.failed_launches {
            return Err(ScraperError::BrowserInit("chrome failed to start".into()));
        }

        let crash = if n - self.failed_launches < self.broken_sessions {
            self.crash
        } else {
            Crash::Never
        };

        Ok(Box::new(ScriptedPortal {
            responses: self.responses.clone(),
            crash,
            lookups: self.lookups.clone(),
            closes: self.closes.clone(),
        }))
    }
}

/// インメモリのデータストア
#[derive(Default)]
pub struct MemoryDatastore {
    tickets: Mutex<BTreeMap<u64, CitationRecord>>,
    error_tickets: Mutex<BTreeMap<u64, ErrorTicketRecord>>,
    calls: AtomicUsize,
    fail: bool,
}

impl MemoryDatastore {
    /// 全ての呼び出しが失敗する
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn ticket(&self, citation_id: u64) -> Option<CitationRecord> {
        self.tickets.lock().unwrap().get(&citation_id).cloned()
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.lock().unwrap().len()
    }

    pub fn error_ticket(&self, citation_id: u64) -> Option<ErrorTicketRecord> {
        self.error_tickets.lock().unwrap().get(&citation_id).cloned()
    }

    pub fn error_ticket_count(&self) -> usize {
        self.error_tickets.lock().unwrap().len()
    }

    fn record_call(&self) -> Result<(), ScraperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ScraperError::Datastore("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn find_ticket(&self, citation_id: u64) -> Result<Option<ExistingTicket>, ScraperError> {
        self.record_call()?;
        Ok(self.ticket(citation_id).as_ref().map(ExistingTicket::from))
    }

    async fn upsert_ticket(&self, record: &CitationRecord) -> Result<(), ScraperError> {
        self.record_call()?;
        self.tickets
            .lock()
            .unwrap()
            .insert(record.citation_id, record.clone());
        Ok(())
    }

    async fn upsert_error_ticket(&self, record: &ErrorTicketRecord) -> Result<(), ScraperError> {
        self.record_call()?;
        self.error_tickets
            .lock()
            .unwrap()
            .insert(record.citation_id, record.clone());
        Ok(())
    }
}

/// インメモリのカーソルストア
#[derive(Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<CursorMap>,
    saves: AtomicUsize,
    unreadable: bool,
}

impl MemoryCursorStore {
    pub fn new<'a>(cursors: impl IntoIterator<Item = (&'a str, u64)>) -> Self {
        Self {
            cursors: Mutex::new(
                cursors
                    .into_iter()
                    .map(|(device, id)| (device.to_string(), id))
                    .collect(),
            ),
            saves: AtomicUsize::new(0),
            unreadable: false,
        }
    }

    /// load が常に失敗する
    pub fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Default::default()
        }
    }

    pub fn get(&self, device: &str) -> Option<u64> {
        self.cursors.lock().unwrap().get(device).copied()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self) -> Result<CursorMap, ScraperError> {
        if self.unreadable {
            return Err(ScraperError::FileIO(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "latest_citations.json",
            )));
        }
        Ok(self.cursors.lock().unwrap().clone())
    }

    async fn save(&self, cursors: &CursorMap) -> Result<(), ScraperError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.cursors.lock().unwrap() = cursors.clone();
        Ok(())
    }
}

/// 受け取ったログを記録するシンク
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|(l, msg)| *l == level && msg.contains(needle))
    }
}

impl LogSink for RecordingSink {
    fn emit(&self, level: LogLevel, message: &str, _payload: Option<&Value>) {
        self.entries
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}
