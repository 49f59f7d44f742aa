//! Event projection onto endpoints

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, warn};

use super::{EntityMapper, MappingGap, OccupantRef, ProjectionReport};
use crate::api::models::{parse_timestamp, EventRecord};
use crate::error::Result;
use crate::graph::{find_by_name, GraphNode, GraphPlatform, NodeId};

/// Value written to `Access_Denied` when no badge was presented
pub const ANONYMOUS_DENIAL: f64 = -1.0;

/// The three endpoints every access point carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    AccessGranted,
    AccessDenied,
    DoorStatus,
}

impl EndpointKind {
    pub const ALL: [EndpointKind; 3] = [
        EndpointKind::AccessGranted,
        EndpointKind::AccessDenied,
        EndpointKind::DoorStatus,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EndpointKind::AccessGranted => "Access_Granted",
            EndpointKind::AccessDenied => "Access_Denied",
            EndpointKind::DoorStatus => "Door_Status",
        }
    }

    /// Endpoint fed by a SIA event code
    pub fn from_sia(code: &str) -> Option<Self> {
        match code {
            "DG" => Some(EndpointKind::AccessGranted),
            "DD" => Some(EndpointKind::AccessDenied),
            "DO" | "DR" => Some(EndpointKind::DoorStatus),
            _ => None,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse an event's `source_date`; dates without an offset are UTC
pub fn parse_source_date(raw: &str) -> Option<DateTime<Utc>> {
    parse_timestamp(raw)
}

struct PendingWrite {
    endpoint: NodeId,
    value: f64,
    at: DateTime<Utc>,
}

impl<G: GraphPlatform> EntityMapper<G> {
    /// Turn events into endpoint value writes.
    ///
    /// Writes are issued together and awaited as a batch. If any fail, the
    /// first failure is returned once every write has settled.
    pub async fn apply_events(&self, events: &[EventRecord]) -> Result<ProjectionReport> {
        let devices: HashMap<String, NodeId> = self
            .graph
            .children(&self.anchors.virtual_network)
            .await?
            .into_iter()
            .map(|n| (n.name, n.id))
            .collect();

        let mut endpoints: HashMap<NodeId, Vec<GraphNode>> = HashMap::new();
        let mut report = ProjectionReport::default();
        let mut writes = Vec::new();

        for event in events {
            match self.resolve_event(event, &devices, &mut endpoints).await? {
                Ok(write) => writes.push(write),
                Err(gap) => {
                    if gap.is_critical() {
                        warn!(event_id = event.id, "!! Critical: {}, skipping event", gap);
                    } else {
                        warn!(event_id = event.id, "{}, skipping event", gap);
                    }
                    report.gaps.push(gap);
                }
            }
        }

        let results = join_all(
            writes
                .iter()
                .map(|w| self.graph.set_endpoint_value(&w.endpoint, w.value, w.at)),
        )
        .await;

        let mut first_error = None;
        for result in results {
            match result {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        debug!(applied = report.applied, gaps = report.gaps.len(), "Events projected");
        Ok(report)
    }

    /// Work out which endpoint an event writes and what value.
    ///
    /// The outer `Result` carries graph failures, the inner one mapping gaps.
    async fn resolve_event(
        &self,
        event: &EventRecord,
        devices: &HashMap<String, NodeId>,
        endpoints: &mut HashMap<NodeId, Vec<GraphNode>>,
    ) -> Result<std::result::Result<PendingWrite, MappingGap>> {
        let unit = event.unit.as_deref().unwrap_or_default();
        let Some(device) = devices.get(unit) else {
            return Ok(Err(MappingGap::UnknownDevice {
                event_id: event.id,
                unit: unit.to_string(),
            }));
        };

        let Some(kind) = EndpointKind::from_sia(&event.sia_code) else {
            return Ok(Err(MappingGap::UnknownSiaCode {
                event_id: event.id,
                code: event.sia_code.clone(),
            }));
        };

        if !endpoints.contains_key(device) {
            let children = self.graph.children(device).await?;
            endpoints.insert(device.clone(), children);
        }
        let endpoint = endpoints
            .get(device)
            .and_then(|children| find_by_name(children, kind.name()));
        let Some(endpoint) = endpoint else {
            return Ok(Err(MappingGap::MissingEndpoint {
                event_id: event.id,
                device: unit.to_string(),
                endpoint: kind,
            }));
        };

        let occupant = match event.identifier.as_deref() {
            Some(identifier) => match self.occupants.get(identifier) {
                Some(occupant) => Some(occupant),
                None => {
                    return Ok(Err(MappingGap::UnknownOccupant {
                        event_id: event.id,
                        identifier: identifier.to_string(),
                    }))
                }
            },
            None => None,
        };
        let occupant_value = occupant.map(OccupantRef::value);

        let value = match kind {
            EndpointKind::AccessDenied => occupant_value.unwrap_or(ANONYMOUS_DENIAL),
            EndpointKind::AccessGranted => match occupant_value {
                Some(value) => value,
                None => {
                    return Ok(Err(MappingGap::GrantedWithoutOccupant { event_id: event.id }))
                }
            },
            EndpointKind::DoorStatus => {
                if event.sia_code == "DO" {
                    1.0
                } else {
                    0.0
                }
            }
        };

        let Some(at) = parse_source_date(&event.source_date) else {
            return Ok(Err(MappingGap::InvalidTimestamp {
                event_id: event.id,
                raw: event.source_date.clone(),
            }));
        };

        Ok(Ok(PendingWrite {
            endpoint: endpoint.id.clone(),
            value,
            at,
        }))
    }
}
