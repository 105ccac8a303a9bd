//! 駐車違反チケット巡回スクレイパー
//!
//! - 端末ごとに最後に見つかったチケット番号の次から順にポータルへ照会
//! - 結果テーブルを Supabase の tickets / error_tickets に保存
//! - 端末ごとのカーソルをJSONファイルに書き出し、再起動後も続きから巡回
//!
//! # 使用例
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use citation_scraper::{
//!     ChromeLauncher, DeviceScanner, JsonCursorStore, ScraperConfig, SupabaseStore, Supervisor,
//!     Telemetry,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ScraperConfig::from_env().unwrap();
//!     let telemetry = Telemetry::local();
//!
//!     let store = SupabaseStore::new(config.supabase.as_ref().unwrap()).unwrap();
//!     let scanner = DeviceScanner::new(
//!         &config,
//!         Arc::new(store),
//!         Arc::new(JsonCursorStore::new(&config.cursor_path)),
//!         telemetry.clone(),
//!     );
//!     let launcher = Arc::new(ChromeLauncher::new(config.clone(), telemetry.clone()));
//!
//!     let mut supervisor = Supervisor::new(&config, launcher, scanner, telemetry);
//!     let report = supervisor.run_pass().await;
//!     println!("attempts: {}", report.attempts);
//! }
//! ```

pub mod citation;
pub mod config;
pub mod error;
pub mod portal;
pub mod scan;
pub mod store;
pub mod supervisor;
pub mod telemetry;
pub mod timestamp;
pub mod traits;

#[cfg(test)]
mod test_support;

// 主要な型をリエクスポート
pub use citation::CitationNumber;
pub use config::{LokiConfig, ScraperConfig, SupabaseConfig};
pub use error::ScraperError;
pub use portal::{ChromeLauncher, Classification, PortalSession, ScrapedCitation};
pub use scan::{DeviceScanner, PassSummary};
pub use store::{JsonCursorStore, SupabaseStore};
pub use supervisor::{PassReport, Supervisor};
pub use telemetry::{LokiSink, Telemetry};
