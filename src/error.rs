//! Error types for access-sync

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or invalid configuration. Fatal, startup only.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Login or credential failure. Retried at the next credential acquisition.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    /// Required graph roots are missing. These are provisioning errors, not transient.
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the poll loop should treat this as a skipped cycle and keep going.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SyncError::Config(_) | SyncError::Provisioning(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => SyncError::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
                body: e.to_string(),
            },
            None => SyncError::Transport(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(!SyncError::Config("missing".into()).is_recoverable());
        assert!(!SyncError::Provisioning("no context".into()).is_recoverable());
        assert!(SyncError::Transport("reset".into()).is_recoverable());
        assert!(SyncError::Auth("bad password".into()).is_recoverable());
        assert!(SyncError::Graph("busy".into()).is_recoverable());
    }

    #[test]
    fn test_status_display() {
        let err = SyncError::Status {
            status: 503,
            url: "http://api/events".into(),
            body: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "HTTP 503 from http://api/events: unavailable");
    }
}
