//! access-sync - access-control connector for the device graph
//!
//! Periodically pulls badges, access points and real-time events from an
//! access-control provider's REST API and projects them into a graph of
//! devices, live-value endpoints and occupants.
//!
//! ## Components
//!
//! - **api**: HTTP client, bearer token lifecycle and pagination
//! - **graph**: the capability surface the connector needs from the graph,
//!   plus an in-memory implementation
//! - **mapper**: badges to occupants, accesses to devices, events to values
//! - **sync**: initialization, checkpointed poll loop, engine state

pub mod api;
pub mod config;
pub mod error;
pub mod graph;
pub mod mapper;
pub mod sync;

pub use api::{AccessControlSource, ApiClient, EventWindow};
pub use config::Args;
pub use error::{Result, SyncError};
pub use graph::{GraphPlatform, InMemoryGraph};
pub use mapper::{EntityMapper, MappingGap};
pub use sync::{EngineConfig, EngineState, SyncEngine, Topology};
