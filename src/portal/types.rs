//! ポータル照会結果の型定義

use std::fmt;

use serde::{Deserialize, Serialize};

/// 結果テーブルの1行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedCitation {
    pub citation_number: String,
    pub status: String,
    pub balance: String,
    pub issue_date: String,
    pub license_plate: String,
    pub location: String,
    /// 照会した番号の行か
    pub just_scraped: bool,
}

/// 照会結果の分類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// 結果ページに遷移し、テーブルを読めた
    Records(Vec<ScrapedCitation>),
    /// メッセージバナーの本文
    ErrorText(String),
    /// 結果ページに遷移したがテーブルを読めなかった
    NoResult,
    /// どのシグナルも時間内に現れなかった
    Timeout,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Records(rows) => write!(f, "{} citation row(s)", rows.len()),
            Classification::ErrorText(text) => write!(f, "Error message found: {}", text),
            Classification::NoResult => f.write_str("No result found."),
            Classification::Timeout => {
                f.write_str("Timeout occurred while fetching citation data")
            }
        }
    }
}
