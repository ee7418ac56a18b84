//! PostgREST persistence gateway
//!
//! Every operation is a single remote round trip against the hosted
//! `contributions` table. No local transaction batching; the change feed in
//! `watch` keeps the display cache consistent.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::debug;

use super::records::{
    ContributionRecord, ContributionRow, InsertRow, NewRecord, RecordPatch, ValidationError,
};

const TABLE: &str = "contributions";

/// Persistence gateway errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("datastore request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("datastore returned {status}: {body}")]
    Service { status: u16, body: String },
    #[error("record {id} not found")]
    NotFound { id: String },
    #[error("malformed datastore response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// CRUD + search over persisted contribution records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a record; the datastore assigns id and timestamps
    async fn add_record(&self, record: NewRecord) -> Result<ContributionRecord, StoreError>;

    /// Apply a partial patch; unspecified fields stay unchanged and
    /// `updated_at` is refreshed
    async fn update_record(
        &self,
        id: &str,
        patch: RecordPatch,
    ) -> Result<ContributionRecord, StoreError>;

    /// Delete a record by id
    async fn delete_record(&self, id: &str) -> Result<(), StoreError>;

    /// Fetch all records, newest first
    async fn fetch_records(&self) -> Result<Vec<ContributionRecord>, StoreError>;

    /// Case-insensitive substring search over name or memo
    async fn search_records(&self, query: &str) -> Result<Vec<ContributionRecord>, StoreError>;

    /// Fetch records whose event date falls in the inclusive range
    async fn fetch_records_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ContributionRecord>, StoreError>;
}

/// Supabase (PostgREST) record store
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseStore {
    /// Create a store for the given project URL and anon key
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            anon_key: anon_key.into(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, TABLE)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Service {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn read_rows(response: reqwest::Response) -> Result<Vec<ContributionRecord>, StoreError> {
        let rows: Vec<ContributionRow> = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(rows.into_iter().map(ContributionRecord::from).collect())
    }

    async fn read_single_row(
        response: reqwest::Response,
        id: &str,
    ) -> Result<ContributionRecord, StoreError> {
        Self::read_rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }
}

/// Strip characters that carry meaning inside a PostgREST `or=` filter or an
/// `ilike` pattern, so user input stays a plain substring.
fn sanitize_pattern(query: &str) -> String {
    query
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '%' | '_' | '\\' | '"'))
        .collect()
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn add_record(&self, record: NewRecord) -> Result<ContributionRecord, StoreError> {
        record.validate()?;
        debug!("adding record for {} ({}원)", record.name, record.amount);

        let response = self
            .request(reqwest::Method::POST, &self.table_url())
            .header("Prefer", "return=representation")
            .json(&InsertRow::from(record))
            .send()
            .await?;

        Self::read_rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Malformed("insert returned no row".to_string()))
    }

    async fn update_record(
        &self,
        id: &str,
        patch: RecordPatch,
    ) -> Result<ContributionRecord, StoreError> {
        patch.validate()?;
        debug!("patching record {}", id);

        let response = self
            .request(reqwest::Method::PATCH, &self.table_url())
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&patch.into_row(Utc::now()))
            .send()
            .await?;

        Self::read_single_row(response, id).await
    }

    async fn delete_record(&self, id: &str) -> Result<(), StoreError> {
        debug!("deleting record {}", id);
        let response = self
            .request(reqwest::Method::DELETE, &self.table_url())
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn fetch_records(&self) -> Result<Vec<ContributionRecord>, StoreError> {
        let response = self
            .request(reqwest::Method::GET, &self.table_url())
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await?;
        Self::read_rows(response).await
    }

    async fn search_records(&self, query: &str) -> Result<Vec<ContributionRecord>, StoreError> {
        let pattern = sanitize_pattern(query);
        let filter = format!("(name.ilike.*{pattern}*,memo.ilike.*{pattern}*)");
        let response = self
            .request(reqwest::Method::GET, &self.table_url())
            .query(&[
                ("select", "*"),
                ("or", filter.as_str()),
                ("order", "created_at.desc"),
            ])
            .send()
            .await?;
        Self::read_rows(response).await
    }

    async fn fetch_records_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ContributionRecord>, StoreError> {
        let gte = format!("gte.{start}");
        let lte = format!("lte.{end}");
        let response = self
            .request(reqwest::Method::GET, &self.table_url())
            .query(&[
                ("select", "*"),
                ("date", gte.as_str()),
                ("date", lte.as_str()),
                ("order", "created_at.desc"),
            ])
            .send()
            .await?;
        Self::read_rows(response).await
    }
}
