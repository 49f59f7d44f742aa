//! Access-control API client
//!
//! - **auth**: bearer credential lifecycle and cache
//! - **pagination**: collection retrieval over `page`/`paginate` parameters
//! - **models**: record shapes for badges, accesses and events
//!
//! `ApiClient` owns its HTTP client and token manager; there is no shared
//! global instance. The engine talks to it through [`AccessControlSource`] so
//! tests can substitute a scripted source.

pub mod auth;
pub mod models;
pub mod pagination;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub use auth::{Credential, LoginCredentials, TokenManager};
pub use models::{AccessRecord, BadgeRecord, EventRecord, PageMeta};
pub use pagination::{paginate, Page, PageRequest};

use crate::error::{Result, SyncError};
use models::ListEnvelope;

/// Query parameters as `(name, value)` pairs
pub type QueryParams = Vec<(String, String)>;

/// Connection settings for the access-control API
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL without trailing slash
    pub base_url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Token cache location (None disables the cache)
    pub token_cache_path: Option<PathBuf>,
    pub page_size: u32,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            user: None,
            password: None,
            token_cache_path: None,
            page_size: pagination::DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// How much of the event history to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventWindow {
    /// Entire history, no date filter
    Full,
    /// Only events after the given instant
    After(DateTime<Utc>),
}

impl EventWindow {
    /// Value of the `date` query parameter, if any
    pub fn date_filter(&self) -> Option<String> {
        match self {
            EventWindow::Full => None,
            EventWindow::After(at) => Some(format!(
                "after:{}",
                at.to_rfc3339_opts(SecondsFormat::Millis, true)
            )),
        }
    }
}

/// Everything the sync engine needs from the remote system
#[async_trait]
pub trait AccessControlSource: Send + Sync {
    async fn fetch_badges(&self) -> Result<Vec<BadgeRecord>>;

    async fn fetch_accesses(&self) -> Result<Vec<AccessRecord>>;

    async fn fetch_events(&self, window: EventWindow) -> Result<Vec<EventRecord>>;
}

pub struct ApiClient {
    http: Client,
    config: ClientConfig,
    tokens: TokenManager,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {}", e)))?;

        let login = match (&config.user, &config.password) {
            (Some(user), Some(password)) => Some(LoginCredentials {
                user: user.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        let tokens = TokenManager::new(
            http.clone(),
            config.base_url.clone(),
            login,
            config.token_cache_path.clone(),
        );

        Ok(Self { http, config, tokens })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.config.base_url, resource.trim_start_matches('/'))
    }

    /// Fetch one page of `resource`, decoding records individually.
    ///
    /// Records that do not match `T` are dropped with a warning.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(String, String)],
        page: u32,
        per_page: u32,
    ) -> Result<Page<T>> {
        let url = self.url(resource);
        let mut request = self
            .http
            .get(&url)
            .query(params)
            .query(&[("page", page), ("paginate", per_page)])
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        self.tokens.authorize(&mut request).await?;

        let response = self.http.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate().await;
            }
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Status {
                status: status.as_u16(),
                url,
                body,
            });
        }

        let envelope: ListEnvelope = response
            .json()
            .await
            .map_err(|e| SyncError::Decode(format!("{}: {}", resource, e)))?;

        let mut data = Vec::with_capacity(envelope.data.len());
        let mut dropped = 0usize;
        for raw in envelope.data {
            match serde_json::from_value::<T>(raw) {
                Ok(record) => data.push(record),
                Err(e) => {
                    dropped += 1;
                    warn!(resource, page, error = %e, "Quarantined malformed record");
                }
            }
        }

        Ok(Page {
            data,
            meta: envelope.meta,
            received: 0,
        }
        .with_dropped(dropped))
    }

    /// Fetch every page of `resource`
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: QueryParams,
    ) -> Result<Vec<T>> {
        let request = PageRequest::with_page_size(self.config.page_size);
        let records = paginate(request, |page, per_page| {
            let params = &params;
            async move { self.get_page::<T>(resource, params, page, per_page).await }
        })
        .await?;

        debug!(resource, count = records.len(), "Fetched collection");
        Ok(records)
    }

    /// All users; not used by the sync loop but part of the API surface
    pub async fn fetch_users(&self) -> Result<Vec<serde_json::Value>> {
        self.fetch_all("users", Vec::new()).await
    }
}

#[async_trait]
impl AccessControlSource for ApiClient {
    async fn fetch_badges(&self) -> Result<Vec<BadgeRecord>> {
        self.fetch_all("badges", vec![("include".into(), "identifier,user".into())])
            .await
    }

    async fn fetch_accesses(&self) -> Result<Vec<AccessRecord>> {
        self.fetch_all("accesses", vec![("include".into(), "controlUnit".into())])
            .await
    }

    async fn fetch_events(&self, window: EventWindow) -> Result<Vec<EventRecord>> {
        let params = match window.date_filter() {
            Some(filter) => vec![("date".to_string(), filter)],
            None => Vec::new(),
        };
        self.fetch_all("events", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_filter_format() {
        assert_eq!(EventWindow::Full.date_filter(), None);

        let at = Utc.timestamp_millis_opt(1_709_287_200_123).unwrap();
        assert_eq!(
            EventWindow::After(at).date_filter().as_deref(),
            Some("after:2024-03-01T10:00:00.123Z")
        );
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.page_size, 100);
        assert!(config.token_cache_path.is_none());
    }
}
