//! 永続化レコードの型定義

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::citation::CitationNumber;
use crate::error::ScraperError;

/// 端末ID → 最後に取得できたチケット番号
pub type CursorMap = BTreeMap<String, u64>;

/// 端末ごとのカーソル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCursor {
    pub device_id: String,
    pub last_known_citation: u64,
}

impl DeviceCursor {
    /// 次に照会するチケット番号
    pub fn next_citation(&self) -> u64 {
        self.last_known_citation + 1
    }
}

/// tickets テーブルの行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationRecord {
    pub citation_id: u64,
    #[serde(default)]
    pub status: String,
    /// ポータル表記のまま (MM/DD/YYYY)
    #[serde(default)]
    pub issue_date: String,
    #[serde(default)]
    pub license_plate: String,
    #[serde(default)]
    pub balance: String,
    #[serde(default)]
    pub location: String,
    pub region_num: u32,
    pub device_num: u32,
    pub created_at: DateTime<Utc>,
    /// 照会した番号そのものの行か (テーブルの列ではない)
    #[serde(default, skip_serializing)]
    pub just_scraped: bool,
}

/// 既存の tickets 行のうち upsert 時に引き継ぐ列
///
/// 他の列は null の場合があるので読まない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ExistingTicket {
    pub created_at: DateTime<Utc>,
}

impl From<&CitationRecord> for ExistingTicket {
    fn from(record: &CitationRecord) -> Self {
        Self {
            created_at: record.created_at,
        }
    }
}

/// error_tickets テーブルの行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorTicketRecord {
    pub citation_id: u64,
    pub error_message: String,
    pub should_try_again: bool,
    pub region_num: u32,
    pub device_num: u32,
}

impl ErrorTicketRecord {
    pub fn new(
        citation_id: u64,
        error_message: impl Into<String>,
        should_try_again: bool,
    ) -> Result<Self, ScraperError> {
        let parsed = CitationNumber::parse(citation_id)?;
        Ok(Self {
            citation_id,
            error_message: error_message.into(),
            should_try_again,
            region_num: parsed.region,
            device_num: parsed.device,
        })
    }
}
