//! 発行日の変換と created_at の決定

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::America::Los_Angeles;

use crate::error::ScraperError;

/// ポータルの発行日フォーマット
const ISSUE_DATE_FORMAT: &str = "%m/%d/%Y";

/// これより古い発行日は created_at を発行日に遡らせる
pub const BACKDATE_THRESHOLD_HOURS: i64 = 36;

/// 発行日 (太平洋時間の0時) をUTCに変換
pub fn issue_date_to_utc(issue_date: &str) -> Result<DateTime<Utc>, ScraperError> {
    let date = NaiveDate::parse_from_str(issue_date.trim(), ISSUE_DATE_FORMAT).map_err(|e| {
        ScraperError::Extraction(format!("invalid issue date {:?}: {}", issue_date, e))
    })?;

    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ScraperError::Extraction(format!("invalid issue date {:?}", issue_date)))?;

    // 夏時間の切り替えは2時なので0時は常に一意
    Los_Angeles
        .from_local_datetime(&midnight)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            ScraperError::Extraction(format!("issue date {:?} has no local midnight", issue_date))
        })
}

/// created_at を決定する
///
/// 既存レコードがあればその値を維持し、なければ発行日が36時間以上前なら発行日、
/// それ以外は現在時刻を使う。
pub fn resolve_created_at(
    existing: Option<DateTime<Utc>>,
    issued_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if let Some(created_at) = existing {
        return created_at;
    }

    if now - issued_at > Duration::hours(BACKDATE_THRESHOLD_HOURS) {
        issued_at
    } else {
        now
    }
}
