//! Graph capability surface
//!
//! The device graph is an external system. The connector only needs a small
//! slice of it: name-based lookup of contexts and children, creation of
//! devices, endpoints and occupants, endpoint value writes and attribute
//! categories. [`GraphPlatform`] captures exactly that slice so hosts can
//! plug in their own storage; [`InMemoryGraph`] is the bundled implementation.

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::InMemoryGraph;

/// Opaque node identifier issued by the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// A node as seen through name-based lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: NodeId,
    pub name: String,
}

/// Value type declared on an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointDataType {
    Real,
    Integer,
    Boolean,
    String,
}

impl fmt::Display for EndpointDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndpointDataType::Real => "Real",
            EndpointDataType::Integer => "Integer",
            EndpointDataType::Boolean => "Boolean",
            EndpointDataType::String => "String",
        };
        f.write_str(s)
    }
}

/// Parameters for a new endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct NewEndpoint {
    pub name: String,
    pub initial_value: f64,
    pub unit: String,
    pub data_type: EndpointDataType,
}

impl NewEndpoint {
    /// Unitless real-valued endpoint starting at zero
    pub fn real(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_value: 0.0,
            unit: String::new(),
            data_type: EndpointDataType::Real,
        }
    }
}

/// Attribute map for one category; ordered so writes are deterministic
pub type Attributes = BTreeMap<String, String>;

/// Category holding an endpoint's time-series settings
pub const TIME_SERIES_CATEGORY: &str = "default";

/// Days of samples an endpoint's time series keeps
pub const TIME_SERIES_MAX_DAYS_KEY: &str = "timeSeries maxDay";

/// Operations the connector performs against the device graph.
///
/// Lookups are by name only. Implementations must make `ensure_occupant_context`
/// and `get_or_create_occupant` idempotent; `create_device` and
/// `create_endpoint` always create, so callers check for existing names first.
#[async_trait]
pub trait GraphPlatform: Send + Sync {
    /// Top-level context with the given name
    async fn find_context(&self, name: &str) -> Result<Option<GraphNode>>;

    /// Direct children of a node
    async fn children(&self, parent: &NodeId) -> Result<Vec<GraphNode>>;

    /// Occupant context with the given name, created if absent
    async fn ensure_occupant_context(&self, name: &str) -> Result<GraphNode>;

    async fn create_device(&self, parent: &NodeId, name: &str, kind: &str) -> Result<GraphNode>;

    async fn create_endpoint(&self, device: &NodeId, endpoint: NewEndpoint) -> Result<GraphNode>;

    /// Record a value observed at `at`, appending to the endpoint's time series
    async fn set_endpoint_value(&self, endpoint: &NodeId, value: f64, at: DateTime<Utc>) -> Result<()>;

    /// Occupant keyed by `key` inside `context`, created if absent
    async fn get_or_create_occupant(&self, context: &NodeId, key: &str) -> Result<GraphNode>;

    /// Create or overwrite the attributes of `category` on `node`
    async fn set_attributes(&self, node: &NodeId, category: &str, attributes: Attributes) -> Result<()>;
}

/// Find a node by exact name
pub fn find_by_name<'a>(nodes: &'a [GraphNode], name: &str) -> Option<&'a GraphNode> {
    nodes.iter().find(|n| n.name == name)
}
