//! Supabase (PostgREST) backed registry and queue.
//!
//! Two tables are involved:
//!
//! - `sources (id, url)`: read newest first as the list of entry pages
//! - `to_process (url, bot, time[, title])`: receives each run's batch
//!
//! Every request carries the project key both as `apikey` and as a bearer
//! token, which is what the PostgREST gateway in front of Supabase expects.

use super::{RecordQueue, SourceRegistry};
use crate::error::QueueError;
use crate::models::{ScheduledRecord, SourceRow};
use crate::utils::truncate_for_log;
use reqwest::{Client, RequestBuilder, Response};
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument};

const SOURCES_TABLE: &str = "sources";
const QUEUE_TABLE: &str = "to_process";
/// No row ever carries this tag; PostgREST refuses a DELETE without a filter.
const PURGE_SENTINEL: &str = "a-value-that-will-never-be-used";

#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    rest_url: String,
    key: String,
}

impl fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("rest_url", &self.rest_url)
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    pub fn new(base_url: &str, key: &str) -> Result<Self, QueueError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            key: key.to_string(),
        })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    /// Delete every row of the downstream queue table.
    #[instrument(level = "info", skip(self))]
    pub async fn purge_queue(&self) -> Result<(), QueueError> {
        let url = format!(
            "{}?bot=neq.{}",
            self.table_url(QUEUE_TABLE),
            urlencoding::encode(PURGE_SENTINEL)
        );
        let response = self
            .authed(self.client.delete(url))
            .header("Prefer", "return=minimal")
            .send()
            .await?;
        check(response).await?;
        info!(table = QUEUE_TABLE, "Wiped queue table");
        Ok(())
    }
}

/// Turn a non-2xx response into [`QueueError::Api`] with a trimmed body.
async fn check(response: Response) -> Result<Response, QueueError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(QueueError::Api {
        status: status.as_u16(),
        message: truncate_for_log(&message, 300),
    })
}

impl SourceRegistry for SupabaseClient {
    #[instrument(level = "info", skip(self))]
    async fn list_sources(&self) -> Result<Vec<String>, QueueError> {
        let response = self
            .authed(self.client.get(self.table_url(SOURCES_TABLE)))
            .query(&[("select", "url"), ("order", "id.desc")])
            .send()
            .await?;
        let rows: Vec<SourceRow> = check(response).await?.json().await?;
        info!(count = rows.len(), "Fetched sources");
        Ok(rows.into_iter().map(|row| row.url).collect())
    }
}

impl RecordQueue for SupabaseClient {
    #[instrument(level = "info", skip_all, fields(count = records.len()))]
    async fn insert_batch(&self, records: &[ScheduledRecord]) -> Result<usize, QueueError> {
        let response = self
            .authed(self.client.post(self.table_url(QUEUE_TABLE)))
            .header("Prefer", "return=representation")
            .json(records)
            .send()
            .await?;
        let inserted: Vec<serde_json::Value> = check(response).await?.json().await?;
        info!(accepted = inserted.len(), "Inserted batch");
        Ok(inserted.len())
    }
}
