//! Configuration for access-sync
//!
//! CLI arguments and environment variable handling using clap. A `.env` file
//! next to the binary is loaded by `main` before parsing.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::ClientConfig;
use crate::error::{Result, SyncError};
use crate::sync::{EngineConfig, Topology};

/// access-sync - pulls badges, access points and events from an
/// access-control provider into the device graph
#[derive(Parser, Debug, Clone)]
#[command(name = "access-sync")]
#[command(about = "Access-control connector for the device graph")]
pub struct Args {
    /// Base URL of the access-control REST API
    #[arg(long, env = "CLIENT_BASE_URL")]
    pub base_url: Option<String>,

    /// Account used for password login
    #[arg(long, env = "CLIENT_USER")]
    pub user: Option<String>,

    /// Password for the account
    #[arg(long, env = "CLIENT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Target period between poll cycle starts, in milliseconds
    #[arg(long, env = "PULL_INTERVAL")]
    pub pull_interval_ms: Option<u64>,

    /// Where the bearer token is cached between restarts
    #[arg(long, env = "CLIENT_TOKEN_CACHE_PATH", default_value = "client-token.json")]
    pub token_cache_path: PathBuf,

    /// Where the last successful sync instant is persisted
    #[arg(long, env = "SYNC_STATE_PATH", default_value = "sync-state.json")]
    pub sync_state_path: PathBuf,

    /// Name of the network context holding the devices
    #[arg(long, env = "NETWORK_NAME")]
    pub network_name: Option<String>,

    /// Name of the virtual network node devices are created under
    #[arg(long, env = "VIRTUAL_NETWORK_NAME")]
    pub virtual_network_name: Option<String>,

    /// Name of the occupant (carrier) context
    #[arg(long, env = "CARRIER_CONTEXT_NAME")]
    pub carrier_context_name: Option<String>,

    /// Records requested per page
    #[arg(long, env = "PAGE_SIZE", default_value = "100")]
    pub page_size: u32,

    /// Extra wait after a failed cycle, in milliseconds
    #[arg(long, env = "ERROR_COOLDOWN_MS", default_value = "60000")]
    pub error_cooldown_ms: u64,

    /// HTTP request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate configuration, reporting every missing value at once
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        let required: [(&str, bool); 7] = [
            ("CLIENT_BASE_URL", is_blank(&self.base_url)),
            ("CLIENT_USER", is_blank(&self.user)),
            ("CLIENT_PASSWORD", is_blank(&self.password)),
            ("NETWORK_NAME", is_blank(&self.network_name)),
            ("VIRTUAL_NETWORK_NAME", is_blank(&self.virtual_network_name)),
            ("CARRIER_CONTEXT_NAME", is_blank(&self.carrier_context_name)),
            ("PULL_INTERVAL", self.pull_interval_ms.is_none()),
        ];
        for (name, absent) in required {
            if absent {
                missing.push(name);
            }
        }

        if !missing.is_empty() {
            return Err(SyncError::Config(format!(
                "missing required configuration: {}",
                missing.join(", ")
            )));
        }

        if self.page_size == 0 {
            return Err(SyncError::Config("PAGE_SIZE must be greater than 0".to_string()));
        }
        if self.pull_interval_ms == Some(0) {
            return Err(SyncError::Config("PULL_INTERVAL must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Settings for the API client and token manager
    pub fn client_config(&self) -> Result<ClientConfig> {
        let base_url = required(&self.base_url, "CLIENT_BASE_URL")?;
        Ok(ClientConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            user: self.user.clone(),
            password: self.password.clone(),
            token_cache_path: Some(self.token_cache_path.clone()),
            page_size: self.page_size,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        })
    }

    /// Graph names that anchor where devices and occupants live
    pub fn topology(&self) -> Result<Topology> {
        Ok(Topology {
            network_context: required(&self.network_name, "NETWORK_NAME")?,
            virtual_network: required(&self.virtual_network_name, "VIRTUAL_NETWORK_NAME")?,
            occupant_context: required(&self.carrier_context_name, "CARRIER_CONTEXT_NAME")?,
        })
    }

    /// Poll loop timing
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let period = self
            .pull_interval_ms
            .filter(|ms| *ms > 0)
            .ok_or_else(|| SyncError::Config("PULL_INTERVAL must be a positive number of milliseconds".to_string()))?;
        Ok(EngineConfig {
            period: Duration::from_millis(period),
            error_cooldown: Duration::from_millis(self.error_cooldown_ms),
        })
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).map_or(true, str::is_empty)
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(SyncError::Config(format!("{} is required", name))),
    }
}
