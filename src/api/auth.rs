//! Bearer credential lifecycle
//!
//! Logs in with the configured account, keeps the resulting token, and
//! attaches it to every outbound API request. A credential is reused until
//! it comes within `refresh_skew` of its expiry. Concurrent callers that find
//! no valid credential share a single login and its outcome.
//!
//! The token is mirrored to a small JSON cache file so restarts do not force
//! a login. The cache is best effort: read and write failures are ignored.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::models::{parse_timestamp, LoginRequest, LoginResponse};
use crate::error::{Result, SyncError};

/// Refresh this long before the server-side expiry
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

/// A bearer token and when it stops being accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Valid if it never expires, or if `now + skew` is still before expiry
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => {
                let skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());
                now + skew < expires_at
            }
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// On-disk shape of the token cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenCacheFile {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiration_date: Option<String>,
}

/// Account used for password login
#[derive(Clone)]
pub struct LoginCredentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Outcome of one login round-trip, awaited by every caller that joined it
type LoginAttempt = Shared<BoxFuture<'static, std::result::Result<Credential, String>>>;

/// What a login needs, owned so an attempt can outlive the caller that started it
#[derive(Clone)]
struct Authenticator {
    http: Client,
    base_url: String,
    account: Option<LoginCredentials>,
    cache_path: Option<PathBuf>,
    logins: Arc<AtomicU64>,
}

impl Authenticator {
    /// Log in and mirror the token to the cache. Errors are messages for
    /// `SyncError::Auth` so the outcome can be cloned to every waiter.
    async fn login(self) -> std::result::Result<Credential, String> {
        let account = self
            .account
            .as_ref()
            .filter(|a| !a.user.is_empty() && !a.password.is_empty())
            .ok_or_else(|| "missing CLIENT_USER or CLIENT_PASSWORD".to_string())?;

        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .query(&[("type", "password")])
            .json(&LoginRequest {
                username: &account.user,
                password: &account.password,
            })
            .send()
            .await
            .map_err(|e| format!("login request failed: {}", e))?;

        self.logins.fetch_add(1, Ordering::SeqCst);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("login rejected with HTTP {}: {}", status, body));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| format!("unreadable login response: {}", e))?;

        let token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "missing bearer token in auth response".to_string())?;

        let expires_at = body.expiration_date.as_deref().and_then(parse_expiry);

        info!(
            expires_at = %body.expiration_date.as_deref().unwrap_or("unknown"),
            "Authenticated with access-control API"
        );

        let credential = Credential { token, expires_at };
        if let Some(path) = &self.cache_path {
            save_cached(path, &credential, body.expiration_date);
        }
        Ok(credential)
    }
}

pub struct TokenManager {
    auth: Authenticator,
    refresh_skew: Duration,
    current: RwLock<Option<Credential>>,
    /// Login in progress; callers with no valid credential join it
    in_flight: Mutex<Option<LoginAttempt>>,
}

impl TokenManager {
    /// Create a manager and pick up a still-valid cached token if there is one
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        login: Option<LoginCredentials>,
        cache_path: Option<PathBuf>,
    ) -> Self {
        let cached = cache_path
            .as_deref()
            .and_then(load_cached)
            .filter(|c| c.is_valid_at(Utc::now(), DEFAULT_REFRESH_SKEW));

        if cached.is_some() {
            info!("Loaded bearer token from cache");
        }

        Self {
            auth: Authenticator {
                http,
                base_url: base_url.into(),
                account: login,
                cache_path,
                logins: Arc::new(AtomicU64::new(0)),
            },
            refresh_skew: DEFAULT_REFRESH_SKEW,
            current: RwLock::new(cached),
            in_flight: Mutex::new(None),
        }
    }

    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    /// Number of login round-trips performed by this manager
    pub fn login_count(&self) -> u64 {
        self.auth.logins.load(Ordering::SeqCst)
    }

    async fn held_valid(&self) -> Option<Credential> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|c| c.is_valid_at(Utc::now(), self.refresh_skew))
            .cloned()
    }

    /// Return the held credential, logging in first if it is missing or stale.
    ///
    /// Callers arriving while a login is running await that same login and
    /// receive its outcome, success or failure.
    pub async fn valid_credential(&self) -> Result<Credential> {
        // Fast path
        if let Some(credential) = self.held_valid().await {
            return Ok(credential);
        }

        let attempt = {
            let mut in_flight = self.in_flight.lock().await;

            // A login may have completed while we waited for the lock
            if let Some(credential) = self.held_valid().await {
                return Ok(credential);
            }

            in_flight
                .get_or_insert_with(|| self.auth.clone().login().boxed().shared())
                .clone()
        };

        let outcome = attempt.clone().await;

        // First waiter back retires the attempt and publishes its credential
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.as_ref().is_some_and(|pending| pending.ptr_eq(&attempt)) {
            *in_flight = None;
            if let Ok(credential) = &outcome {
                *self.current.write().await = Some(credential.clone());
            }
        }
        drop(in_flight);

        outcome.map_err(SyncError::Auth)
    }

    /// Drop the held credential so the next request logs in again
    pub async fn invalidate(&self) {
        let mut current = self.current.write().await;
        if current.take().is_some() {
            debug!("Bearer token invalidated");
        }
    }

    /// Attach `Authorization: Bearer ...` unless the request already has one
    pub async fn authorize(&self, request: &mut reqwest::Request) -> Result<()> {
        if request.headers().contains_key(AUTHORIZATION) {
            return Ok(());
        }

        let credential = self.valid_credential().await?;
        let value = HeaderValue::from_str(&credential.bearer())
            .map_err(|e| SyncError::Auth(format!("token is not a valid header value: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = parse_timestamp(raw);
    if parsed.is_none() {
        warn!(expiration_date = raw, "Unparseable token expiry, treating as non-expiring");
    }
    parsed
}

fn load_cached(path: &Path) -> Option<Credential> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "No token cache");
            return None;
        }
    };

    let cached: TokenCacheFile = match serde_json::from_str(&raw) {
        Ok(cached) => cached,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Ignoring unreadable token cache");
            return None;
        }
    };

    if cached.access_token.is_empty() {
        return None;
    }

    Some(Credential {
        token: cached.access_token,
        expires_at: cached.expiration_date.as_deref().and_then(parse_expiry),
    })
}

fn save_cached(path: &Path, credential: &Credential, expiration_date: Option<String>) {
    let file = TokenCacheFile {
        access_token: credential.token.clone(),
        expiration_date,
    };

    let write = || -> std::io::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string(&file)?;
        std::fs::write(path, json)
    };

    if let Err(e) = write() {
        debug!(path = %path.display(), error = %e, "Token cache write failed, continuing without cache");
    }
}
