//! In-memory device graph
//!
//! Used by the standalone binary and by tests. Every endpoint keeps a value
//! history standing in for the time series a persistent graph would attach to
//! it. The history honours the endpoint's `timeSeries maxDay` attribute,
//! measured back from its newest sample, and is capped in length.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    Attributes, EndpointDataType, GraphNode, GraphPlatform, NewEndpoint, NodeId, TIME_SERIES_CATEGORY,
    TIME_SERIES_MAX_DAYS_KEY,
};
use crate::error::{Result, SyncError};

/// What a node represents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Context,
    Network,
    /// Device with its declared type, e.g. `AccessPoint`
    Device(String),
    Endpoint,
    Occupant,
}

#[derive(Debug, Clone)]
pub struct EndpointState {
    pub value: f64,
    pub unit: String,
    pub data_type: EndpointDataType,
    pub history: Vec<(DateTime<Utc>, f64)>,
}

/// Samples kept per endpoint regardless of retention
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

/// Drop samples older than `max_days` before the newest one, then the oldest
/// entries beyond `limit`
fn prune_history(history: &mut Vec<(DateTime<Utc>, f64)>, max_days: Option<i64>, limit: usize) {
    let newest = history.iter().map(|(at, _)| *at).max();
    let cutoff = max_days
        .and_then(chrono::Duration::try_days)
        .zip(newest)
        .and_then(|(window, newest)| newest.checked_sub_signed(window));
    if let Some(cutoff) = cutoff {
        history.retain(|(at, _)| *at >= cutoff);
    }

    if history.len() > limit {
        let excess = history.len() - limit;
        history.drain(..excess);
    }
}

fn retention_days(attributes: &HashMap<String, Attributes>) -> Option<i64> {
    attributes
        .get(TIME_SERIES_CATEGORY)?
        .get(TIME_SERIES_MAX_DAYS_KEY)?
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|days| *days > 0)
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    kind: NodeKind,
    children: Vec<NodeId>,
    attributes: HashMap<String, Attributes>,
    endpoint: Option<EndpointState>,
}

impl Node {
    fn new(name: &str, kind: NodeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            children: Vec::new(),
            attributes: HashMap::new(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<NodeId, Node>,
    /// Top-level contexts in creation order
    contexts: Vec<NodeId>,
}

impl GraphState {
    fn node(&self, id: &NodeId) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| SyncError::Graph(format!("node not found: {}", id)))
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| SyncError::Graph(format!("node not found: {}", id)))
    }

    fn graph_node(&self, id: &NodeId) -> Option<GraphNode> {
        self.nodes.get(id).map(|n| GraphNode {
            id: id.clone(),
            name: n.name.clone(),
        })
    }

    fn context_named(&self, name: &str) -> Option<GraphNode> {
        self.contexts
            .iter()
            .find(|id| self.nodes.get(*id).is_some_and(|n| n.name == name))
            .and_then(|id| self.graph_node(id))
    }

    fn child_named(&self, parent: &NodeId, name: &str) -> Option<GraphNode> {
        let parent = self.nodes.get(parent)?;
        parent
            .children
            .iter()
            .find(|id| self.nodes.get(*id).is_some_and(|n| n.name == name))
            .and_then(|id| self.graph_node(id))
    }
}

/// Device graph held entirely in memory
pub struct InMemoryGraph {
    state: RwLock<GraphState>,
    next_id: AtomicU64,
    fail_value_writes: AtomicBool,
    history_limit: usize,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            next_id: AtomicU64::new(1),
            fail_value_writes: AtomicBool::new(false),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Cap each endpoint's history at `limit` samples
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Graph pre-provisioned with a network context and its virtual network
    pub async fn with_topology(network_context: &str, virtual_network: &str) -> Self {
        let graph = Self::new();
        let context = graph.add_context(network_context).await;
        graph.add_network(&context, virtual_network).await;
        graph
    }

    fn issue_id(&self) -> NodeId {
        NodeId(format!("node-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn insert(&self, parent: Option<&NodeId>, node: Node) -> Result<GraphNode> {
        let id = self.issue_id();
        let created = GraphNode {
            id: id.clone(),
            name: node.name.clone(),
        };

        let mut state = self.state.write().await;
        match parent {
            Some(parent) => state.node_mut(parent)?.children.push(id.clone()),
            None => state.contexts.push(id.clone()),
        }
        state.nodes.insert(id, node);
        Ok(created)
    }

    /// Add a top-level context
    pub async fn add_context(&self, name: &str) -> NodeId {
        let id = self.issue_id();
        let mut state = self.state.write().await;
        state.contexts.push(id.clone());
        state.nodes.insert(id.clone(), Node::new(name, NodeKind::Context));
        id
    }

    /// Add a network node under `parent`.
    ///
    /// Returns `None` if the parent does not exist.
    pub async fn add_network(&self, parent: &NodeId, name: &str) -> Option<NodeId> {
        self.insert(Some(parent), Node::new(name, NodeKind::Network))
            .await
            .ok()
            .map(|n| n.id)
    }

    /// Make subsequent `set_endpoint_value` calls fail with a graph error
    pub fn fail_value_writes(&self, fail: bool) {
        self.fail_value_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn context_id(&self, name: &str) -> Option<NodeId> {
        self.state.read().await.context_named(name).map(|n| n.id)
    }

    pub async fn child_id(&self, parent: &NodeId, name: &str) -> Option<NodeId> {
        self.state.read().await.child_named(parent, name).map(|n| n.id)
    }

    /// Resolve a path of names starting at a top-level context
    pub async fn resolve(&self, path: &[&str]) -> Option<NodeId> {
        let state = self.state.read().await;
        let (first, rest) = path.split_first()?;
        let mut current = state.context_named(first)?.id;
        for name in rest {
            current = state.child_named(&current, name)?.id;
        }
        Some(current)
    }

    pub async fn kind(&self, id: &NodeId) -> Option<NodeKind> {
        self.state.read().await.nodes.get(id).map(|n| n.kind.clone())
    }

    pub async fn endpoint(&self, id: &NodeId) -> Option<EndpointState> {
        self.state.read().await.nodes.get(id).and_then(|n| n.endpoint.clone())
    }

    pub async fn attributes(&self, id: &NodeId, category: &str) -> Option<Attributes> {
        self.state
            .read()
            .await
            .nodes
            .get(id)
            .and_then(|n| n.attributes.get(category).cloned())
    }

    /// Number of nodes of a given kind
    pub async fn count(&self, kind: &NodeKind) -> usize {
        self.state
            .read()
            .await
            .nodes
            .values()
            .filter(|n| &n.kind == kind)
            .count()
    }
}

impl Default for InMemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphPlatform for InMemoryGraph {
    async fn find_context(&self, name: &str) -> Result<Option<GraphNode>> {
        Ok(self.state.read().await.context_named(name))
    }

    async fn children(&self, parent: &NodeId) -> Result<Vec<GraphNode>> {
        let state = self.state.read().await;
        let node = state.node(parent)?;
        Ok(node
            .children
            .iter()
            .filter_map(|id| state.graph_node(id))
            .collect())
    }

    async fn ensure_occupant_context(&self, name: &str) -> Result<GraphNode> {
        // Check and insert under one write lock so concurrent callers agree
        let mut state = self.state.write().await;
        if let Some(existing) = state.context_named(name) {
            return Ok(existing);
        }

        let id = self.issue_id();
        state.contexts.push(id.clone());
        state.nodes.insert(id.clone(), Node::new(name, NodeKind::Context));
        debug!(context = name, "Created occupant context");
        Ok(GraphNode {
            id,
            name: name.to_string(),
        })
    }

    async fn create_device(&self, parent: &NodeId, name: &str, kind: &str) -> Result<GraphNode> {
        let device = self
            .insert(Some(parent), Node::new(name, NodeKind::Device(kind.to_string())))
            .await?;
        debug!(device = name, kind, "Created device");
        Ok(device)
    }

    async fn create_endpoint(&self, device: &NodeId, endpoint: NewEndpoint) -> Result<GraphNode> {
        let mut node = Node::new(&endpoint.name, NodeKind::Endpoint);
        node.endpoint = Some(EndpointState {
            value: endpoint.initial_value,
            unit: endpoint.unit,
            data_type: endpoint.data_type,
            history: Vec::new(),
        });
        self.insert(Some(device), node).await
    }

    async fn set_endpoint_value(&self, endpoint: &NodeId, value: f64, at: DateTime<Utc>) -> Result<()> {
        if self.fail_value_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Graph(format!("value write rejected for {}", endpoint)));
        }

        let mut state = self.state.write().await;
        let node = state.node_mut(endpoint)?;
        let max_days = retention_days(&node.attributes);
        let ep = node
            .endpoint
            .as_mut()
            .ok_or_else(|| SyncError::Graph(format!("{} is not an endpoint", endpoint)))?;
        ep.value = value;
        ep.history.push((at, value));
        prune_history(&mut ep.history, max_days, self.history_limit);
        Ok(())
    }

    async fn get_or_create_occupant(&self, context: &NodeId, key: &str) -> Result<GraphNode> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.child_named(context, key) {
            return Ok(existing);
        }

        let id = self.issue_id();
        state.node_mut(context)?.children.push(id.clone());
        state.nodes.insert(id.clone(), Node::new(key, NodeKind::Occupant));
        Ok(GraphNode {
            id,
            name: key.to_string(),
        })
    }

    async fn set_attributes(&self, node: &NodeId, category: &str, attributes: Attributes) -> Result<()> {
        let mut state = self.state.write().await;
        let node = state.node_mut(node)?;
        node.attributes
            .entry(category.to_string())
            .or_default()
            .extend(attributes);
        Ok(())
    }
}
