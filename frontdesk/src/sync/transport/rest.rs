//! PostgREST-style HTTP transport

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::RemoteTransport;
use crate::core::SyncConfig;
use crate::sync::error::{SyncError, SyncResult};

/// HTTP client for a PostgREST-compatible backend
///
/// - upsert: `POST {base}/rest/v1/{table}?on_conflict={key}`
/// - select: `GET {base}/rest/v1/{table}?select={cols}&limit={n}`
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestTransport {
    pub fn new(base_url: impl Into<String>, config: &SyncConfig) -> SyncResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header("apikey", key)
                .header(reqwest::header::AUTHORIZATION, format!("Bearer {key}")),
            None => request,
        }
    }

    async fn check_status(response: reqwest::Response) -> SyncResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Status { status, body })
    }
}

#[async_trait]
impl RemoteTransport for RestTransport {
    async fn upsert(&self, table: &str, conflict_key: &str, rows: &[Value]) -> SyncResult<()> {
        let request = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", conflict_key)])
            .header("Prefer", "resolution=merge-duplicates")
            .json(rows);

        let response = self.authorize(request).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn select(&self, table: &str, columns: &str, limit: usize) -> SyncResult<Vec<Value>> {
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[("select", columns.to_string()), ("limit", limit.to_string())]);

        let response = self.authorize(request).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }
}
