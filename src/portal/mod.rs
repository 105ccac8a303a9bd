//! 駐車違反チケットポータル
//!
//! チケット番号を検索フォームに送信し、結果ページを分類する

mod classifier;
mod session;
mod types;

pub use classifier::{banner_text, parse_citation_table, OutcomeClassifier};
pub use session::{ChromeLauncher, PortalSession};
pub use types::{Classification, ScrapedCitation};
