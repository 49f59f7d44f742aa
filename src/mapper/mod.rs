//! Projection of access-control records onto the device graph
//!
//! - **occupants**: badge holders become occupants, indexed by the badge's
//!   computed identifier
//! - **devices**: each access point becomes a device with three endpoints
//! - **events**: SIA-coded events become endpoint value writes
//!
//! Records that cannot be placed produce a [`MappingGap`]. Gaps are logged
//! and reported but never abort a batch.

mod devices;
mod events;
mod occupants;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::graph::{GraphPlatform, NodeId};

pub use events::{parse_source_date, EndpointKind};

/// Device type recorded for access points
pub const ACCESS_POINT_KIND: &str = "AccessPoint";

/// Where mapped entities live in the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperAnchors {
    /// Node devices are created under
    pub virtual_network: NodeId,
    /// Context occupants are created in
    pub occupant_context: NodeId,
}

/// Occupant an identifier resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupantRef {
    pub node: NodeId,
    /// Remote user id; the occupant is named by its decimal form
    pub key: i64,
}

impl OccupantRef {
    /// The key as an endpoint value
    pub fn value(&self) -> f64 {
        self.key as f64
    }
}

/// Computed identifier to occupant
#[derive(Debug, Clone, Default)]
pub struct OccupantIndex {
    entries: HashMap<String, OccupantRef>,
}

impl OccupantIndex {
    pub fn insert(&mut self, computed_identifier: impl Into<String>, occupant: OccupantRef) {
        self.entries.insert(computed_identifier.into(), occupant);
    }

    pub fn get(&self, computed_identifier: &str) -> Option<&OccupantRef> {
        self.entries.get(computed_identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccupantReport {
    /// Badges whose holder received the `Badge` attributes
    pub attributed: usize,
    /// Badges registered in the occupant index
    pub indexed: usize,
    /// Badges with no user
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceReport {
    pub created: usize,
    pub existing: usize,
}

/// Why an event could not be projected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingGap {
    UnknownDevice { event_id: i64, unit: String },
    UnknownSiaCode { event_id: i64, code: String },
    MissingEndpoint { event_id: i64, device: String, endpoint: EndpointKind },
    UnknownOccupant { event_id: i64, identifier: String },
    GrantedWithoutOccupant { event_id: i64 },
    InvalidTimestamp { event_id: i64, raw: String },
}

impl MappingGap {
    pub fn event_id(&self) -> i64 {
        match self {
            MappingGap::UnknownDevice { event_id, .. }
            | MappingGap::UnknownSiaCode { event_id, .. }
            | MappingGap::MissingEndpoint { event_id, .. }
            | MappingGap::UnknownOccupant { event_id, .. }
            | MappingGap::GrantedWithoutOccupant { event_id }
            | MappingGap::InvalidTimestamp { event_id, .. } => *event_id,
        }
    }

    /// Gaps that mean a reference could not be resolved where it must be
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            MappingGap::MissingEndpoint { .. }
                | MappingGap::UnknownOccupant { .. }
                | MappingGap::GrantedWithoutOccupant { .. }
        )
    }
}

impl fmt::Display for MappingGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingGap::UnknownDevice { event_id, unit } => {
                write!(f, "no device named {:?} for event {}", unit, event_id)
            }
            MappingGap::UnknownSiaCode { event_id, code } => {
                write!(f, "unknown SIA code {:?} on event {}", code, event_id)
            }
            MappingGap::MissingEndpoint { event_id, device, endpoint } => write!(
                f,
                "endpoint {} missing on device {:?} for event {}",
                endpoint, device, event_id
            ),
            MappingGap::UnknownOccupant { event_id, identifier } => {
                write!(f, "no occupant for identifier {:?} on event {}", identifier, event_id)
            }
            MappingGap::GrantedWithoutOccupant { event_id } => {
                write!(f, "access granted without an occupant on event {}", event_id)
            }
            MappingGap::InvalidTimestamp { event_id, raw } => {
                write!(f, "unparseable source_date {:?} on event {}", raw, event_id)
            }
        }
    }
}

/// Outcome of projecting one batch of events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionReport {
    /// Endpoint value writes performed
    pub applied: usize,
    pub gaps: Vec<MappingGap>,
}

/// Maps remote records onto graph entities.
///
/// Owns the occupant index, which is filled by [`reconcile_occupants`] and
/// read by [`apply_events`].
///
/// [`reconcile_occupants`]: EntityMapper::reconcile_occupants
/// [`apply_events`]: EntityMapper::apply_events
pub struct EntityMapper<G: GraphPlatform> {
    graph: Arc<G>,
    anchors: MapperAnchors,
    occupants: OccupantIndex,
}

impl<G: GraphPlatform> EntityMapper<G> {
    pub fn new(graph: Arc<G>, anchors: MapperAnchors) -> Self {
        Self {
            graph,
            anchors,
            occupants: OccupantIndex::default(),
        }
    }

    pub fn anchors(&self) -> &MapperAnchors {
        &self.anchors
    }

    pub fn occupants(&self) -> &OccupantIndex {
        &self.occupants
    }
}
