//! Poll loop and its state
//!
//! The engine resolves the graph anchors, seeds occupants and devices, then
//! polls events on a fixed period. Each successful cycle advances the
//! checkpoint to the instant the cycle started.

pub mod checkpoint;
pub mod engine;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::api::EventWindow;
use crate::mapper::ProjectionReport;

pub use checkpoint::{CheckpointStore, FileCheckpoint, MemoryCheckpoint};
pub use engine::SyncEngine;

/// Names of the graph nodes the connector is anchored to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Top-level context holding the networks
    pub network_context: String,
    /// Network node devices are created under
    pub virtual_network: String,
    /// Context occupants live in, created on demand
    pub occupant_context: String,
}

/// Poll loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Target time between cycle starts
    pub period: Duration,
    /// Extra wait after a failed cycle or initialization
    pub error_cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            error_cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    /// Waiting for the next cycle
    Idle,
    /// A cycle is running
    Active,
    /// Cooling down after a failure
    Backoff,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initializing => "initializing",
            EngineState::Idle => "idle",
            EngineState::Active => "active",
            EngineState::Backoff => "backoff",
            EngineState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Outcome of one successful poll cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub window: EventWindow,
    /// Events returned by the API
    pub fetched: usize,
    /// Events dropped because they carry no unit
    pub without_unit: usize,
    pub projection: ProjectionReport,
}
