use async_trait::async_trait;
use serde_json::Value;

use crate::error::ScraperError;
use crate::portal::Classification;
use crate::store::{CitationRecord, CursorMap, ErrorTicketRecord, ExistingTicket};
use crate::telemetry::LogLevel;

/// 描画済みページの読み取り専用ビュー
#[async_trait]
pub trait PortalPage: Send + Sync {
    /// 現在のURL
    async fn current_url(&self) -> Result<String, ScraperError>;

    /// 現在のHTML
    async fn content(&self) -> Result<String, ScraperError>;
}

/// チケット番号を照会できるポータルセッション
#[async_trait]
pub trait CitationPortal: Send {
    /// チケット番号を照会して結果を分類
    async fn lookup(&mut self, citation_id: u64) -> Result<Classification, ScraperError>;

    /// リソース解放
    async fn close(&mut self) -> Result<(), ScraperError>;
}

/// ポータルセッションの生成
#[async_trait]
pub trait PortalLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn CitationPortal>, ScraperError>;
}

/// チケットの永続化先
#[async_trait]
pub trait Datastore: Send + Sync {
    /// 既存行の引き継ぎ列。行が無ければ None
    async fn find_ticket(&self, citation_id: u64) -> Result<Option<ExistingTicket>, ScraperError>;

    async fn upsert_ticket(&self, record: &CitationRecord) -> Result<(), ScraperError>;

    async fn upsert_error_ticket(&self, record: &ErrorTicketRecord) -> Result<(), ScraperError>;
}

/// 端末ごとのカーソル保存先
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self) -> Result<CursorMap, ScraperError>;

    async fn save(&self, cursors: &CursorMap) -> Result<(), ScraperError>;
}

/// リモートログ送信先
///
/// 呼び出し側をブロックせず、失敗しても呼び出し側には返さない。
pub trait LogSink: Send + Sync {
    fn emit(&self, level: LogLevel, message: &str, payload: Option<&Value>);
}
