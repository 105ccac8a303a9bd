//! チケット・カーソルの永続化

mod cursor;
mod supabase;
mod types;

pub use cursor::JsonCursorStore;
pub use supabase::SupabaseStore;
pub use types::{CitationRecord, CursorMap, DeviceCursor, ErrorTicketRecord, ExistingTicket};

use chrono::{DateTime, Utc};

use crate::citation::CitationNumber;
use crate::error::ScraperError;
use crate::portal::ScrapedCitation;
use crate::timestamp::{issue_date_to_utc, resolve_created_at};
use crate::traits::Datastore;

/// スクレイプした行を tickets に upsert する
///
/// 既存レコードがあれば created_at を引き継ぐ。
pub async fn persist_citation(
    store: &dyn Datastore,
    scraped: &ScrapedCitation,
    now: DateTime<Utc>,
) -> Result<CitationRecord, ScraperError> {
    let number: CitationNumber = scraped.citation_number.parse()?;
    let citation_id = number.value();
    let issued_at = issue_date_to_utc(&scraped.issue_date)?;

    let existing = store.find_ticket(citation_id).await?;
    let created_at = resolve_created_at(existing.map(|r| r.created_at), issued_at, now);

    let record = CitationRecord {
        citation_id,
        status: scraped.status.clone(),
        issue_date: scraped.issue_date.clone(),
        license_plate: scraped.license_plate.clone(),
        balance: scraped.balance.clone(),
        location: scraped.location.clone(),
        region_num: number.region,
        device_num: number.device,
        created_at,
        just_scraped: scraped.just_scraped,
    };

    store.upsert_ticket(&record).await?;
    Ok(record)
}
