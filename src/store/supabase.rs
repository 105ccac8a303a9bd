//! Supabase (PostgREST) クライアント

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use tracing::debug;

use crate::config::SupabaseConfig;
use crate::error::ScraperError;
use crate::traits::Datastore;

use super::types::{CitationRecord, ErrorTicketRecord, ExistingTicket};

const TICKETS_TABLE: &str = "tickets";
const ERROR_TICKETS_TABLE: &str = "error_tickets";

pub struct SupabaseStore {
    client: reqwest::Client,
    rest_url: String,
}

impl SupabaseStore {
    pub fn new(config: &SupabaseConfig) -> Result<Self, ScraperError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.service_role_key)
            .map_err(|e| ScraperError::Config(format!("invalid service role key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_role_key))
            .map_err(|e| ScraperError::Config(format!("invalid service role key: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    /// citation_id をキーに upsert
    async fn upsert<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<(), ScraperError> {
        let resp = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", "citation_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScraperError::Datastore(format!(
                "upsert into {} failed ({}): {}",
                table, status, body
            )));
        }

        debug!("Upserted row into {}", table);
        Ok(())
    }
}

#[async_trait]
impl Datastore for SupabaseStore {
    async fn find_ticket(&self, citation_id: u64) -> Result<Option<ExistingTicket>, ScraperError> {
        let resp = self
            .client
            .get(self.table_url(TICKETS_TABLE))
            .query(&[
                ("citation_id", format!("eq.{}", citation_id)),
                ("select", "created_at".to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScraperError::Datastore(format!(
                "select from {} failed ({}): {}",
                TICKETS_TABLE, status, body
            )));
        }

        let rows: Vec<ExistingTicket> = resp.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_ticket(&self, record: &CitationRecord) -> Result<(), ScraperError> {
        self.upsert(TICKETS_TABLE, record).await
    }

    async fn upsert_error_ticket(&self, record: &ErrorTicketRecord) -> Result<(), ScraperError> {
        self.upsert(ERROR_TICKETS_TABLE, record).await
    }
}
