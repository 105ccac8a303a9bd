//! チケット番号の分解
//!
//! 11桁のチケット番号は「地域(3桁) + 端末(3桁) + 連番(5桁)」で構成される

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScraperError;

/// チケット番号の桁数
pub const CITATION_DIGITS: usize = 11;

const REGION_FACTOR: u64 = 100_000_000;
const DEVICE_FACTOR: u64 = 100_000;

/// 分解済みチケット番号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CitationNumber {
    pub region: u32,
    pub device: u32,
    pub report: u32,
}

impl CitationNumber {
    /// 整数のチケット番号を分解
    pub fn parse(citation_id: u64) -> Result<Self, ScraperError> {
        citation_id.to_string().parse()
    }

    /// 元のチケット番号に戻す
    pub fn value(&self) -> u64 {
        self.region as u64 * REGION_FACTOR + self.device as u64 * DEVICE_FACTOR + self.report as u64
    }
}

impl FromStr for CitationNumber {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim();
        if digits.len() != CITATION_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScraperError::InvalidCitation(format!(
                "citation number must be exactly {} digits: {:?}",
                CITATION_DIGITS, s
            )));
        }

        // 全て ASCII 数字なので部分文字列の parse は失敗しない
        let field = |range: std::ops::Range<usize>| {
            digits[range]
                .parse::<u32>()
                .map_err(|e| ScraperError::InvalidCitation(format!("{}: {}", s, e)))
        };

        Ok(Self {
            region: field(0..3)?,
            device: field(3..6)?,
            report: field(6..CITATION_DIGITS)?,
        })
    }
}

impl fmt::Display for CitationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}{:03}{:05}", self.region, self.device, self.report)
    }
}
