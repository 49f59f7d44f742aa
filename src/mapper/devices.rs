//! Access points as devices

use std::collections::HashSet;

use tracing::{debug, info};

use super::{DeviceReport, EndpointKind, EntityMapper, ACCESS_POINT_KIND};
use crate::api::models::AccessRecord;
use crate::error::Result;
use crate::graph::{
    Attributes, GraphPlatform, NewEndpoint, NodeId, TIME_SERIES_CATEGORY, TIME_SERIES_MAX_DAYS_KEY,
};

/// Days of history kept for each endpoint's time series
pub const TIME_SERIES_MAX_DAYS: &str = "400";

impl<G: GraphPlatform> EntityMapper<G> {
    /// Create a device with its three endpoints for every access point not
    /// already present under the virtual network. Existing devices are left
    /// as they are.
    pub async fn reconcile_devices(&self, accesses: &[AccessRecord]) -> Result<DeviceReport> {
        let mut known: HashSet<String> = self
            .graph
            .children(&self.anchors.virtual_network)
            .await?
            .into_iter()
            .map(|n| n.name)
            .collect();

        let mut report = DeviceReport::default();
        for access in accesses {
            if known.contains(&access.name) {
                report.existing += 1;
                continue;
            }

            self.create_access_point(access).await?;
            known.insert(access.name.clone());
            report.created += 1;
        }

        info!(created = report.created, existing = report.existing, "Devices reconciled");
        Ok(report)
    }

    async fn create_access_point(&self, access: &AccessRecord) -> Result<NodeId> {
        let device = self
            .graph
            .create_device(&self.anchors.virtual_network, &access.name, ACCESS_POINT_KIND)
            .await?;

        self.graph
            .set_attributes(&device.id, "AccessPoint", access_point_attributes(access))
            .await?;
        self.graph
            .set_attributes(&device.id, "ControlUnit", control_unit_attributes(access))
            .await?;

        for kind in EndpointKind::ALL {
            let endpoint = self
                .graph
                .create_endpoint(&device.id, NewEndpoint::real(kind.name()))
                .await?;
            let retention: Attributes =
                [(TIME_SERIES_MAX_DAYS_KEY.to_string(), TIME_SERIES_MAX_DAYS.to_string())]
                    .into_iter()
                    .collect();
            self.graph
                .set_attributes(&endpoint.id, TIME_SERIES_CATEGORY, retention)
                .await?;
        }

        debug!(device = %access.name, access_id = access.id, "Created access point");
        Ok(device.id)
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn access_point_attributes(access: &AccessRecord) -> Attributes {
    [
        ("id", access.id.to_string()),
        ("type", opt(access.kind)),
        ("disabled", opt(access.disabled)),
        ("subarea_id", opt(access.subarea_id)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn control_unit_attributes(access: &AccessRecord) -> Attributes {
    let unit = access.control_unit.as_ref();
    [
        ("id", opt(unit.and_then(|u| u.id))),
        ("name", opt(unit.and_then(|u| u.name.as_deref()))),
        ("ip", opt(unit.and_then(|u| u.ip.as_deref()))),
        ("protocol", opt(unit.and_then(|u| u.protocol))),
        ("created_by", opt(unit.and_then(|u| u.created_by.as_deref()))),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::graph::memory::NodeKind;
    use crate::graph::{EndpointDataType, InMemoryGraph};
    use crate::mapper::MapperAnchors;

    fn access(json: serde_json::Value) -> AccessRecord {
        serde_json::from_value(json).unwrap()
    }

    async fn mapper() -> (Arc<InMemoryGraph>, EntityMapper<InMemoryGraph>) {
        let graph = Arc::new(InMemoryGraph::with_topology("Network", "AccessControl").await);
        let virtual_network = graph.resolve(&["Network", "AccessControl"]).await.unwrap();
        let occupant_context = graph.ensure_occupant_context("Occupants").await.unwrap().id;
        let mapper = EntityMapper::new(
            Arc::clone(&graph),
            MapperAnchors {
                virtual_network,
                occupant_context,
            },
        );
        (graph, mapper)
    }

    #[tokio::test]
    async fn test_device_gets_attributes_and_endpoints() {
        let (graph, mapper) = mapper().await;
        let accesses = vec![access(serde_json::json!({
            "id": 3,
            "name": "Main entrance",
            "type": 1,
            "disabled": 0,
            "subarea_id": 9,
            "controlUnit": {"id": 5, "name": "UTL-1", "ip": "10.0.0.5", "protocol": 2, "created_by": "admin"}
        }))];

        let report = mapper.reconcile_devices(&accesses).await.unwrap();
        assert_eq!(report, DeviceReport { created: 1, existing: 0 });

        let device = graph
            .resolve(&["Network", "AccessControl", "Main entrance"])
            .await
            .unwrap();
        assert_eq!(graph.kind(&device).await, Some(NodeKind::Device("AccessPoint".into())));

        let ap = graph.attributes(&device, "AccessPoint").await.unwrap();
        assert_eq!(ap["id"], "3");
        assert_eq!(ap["subarea_id"], "9");
        let cu = graph.attributes(&device, "ControlUnit").await.unwrap();
        assert_eq!(cu["ip"], "10.0.0.5");
        assert_eq!(cu["protocol"], "2");

        for name in ["Access_Granted", "Access_Denied", "Door_Status"] {
            let endpoint = graph.child_id(&device, name).await.unwrap();
            let state = graph.endpoint(&endpoint).await.unwrap();
            assert_eq!(state.value, 0.0);
            assert_eq!(state.unit, "");
            assert_eq!(state.data_type, EndpointDataType::Real);
            let default = graph.attributes(&endpoint, "default").await.unwrap();
            assert_eq!(default["timeSeries maxDay"], "400");
        }
    }

    #[tokio::test]
    async fn test_duplicate_names_created_once() {
        let (graph, mapper) = mapper().await;
        let accesses = vec![
            access(serde_json::json!({"id": 1, "name": "Door"})),
            access(serde_json::json!({"id": 2, "name": "Door"})),
        ];

        let report = mapper.reconcile_devices(&accesses).await.unwrap();
        assert_eq!(report, DeviceReport { created: 1, existing: 1 });
        assert_eq!(graph.count(&NodeKind::Device("AccessPoint".into())).await, 1);
        assert_eq!(graph.count(&NodeKind::Endpoint).await, 3);
    }

    #[tokio::test]
    async fn test_missing_control_unit_gives_blank_attributes() {
        let (graph, mapper) = mapper().await;
        mapper
            .reconcile_devices(&[access(serde_json::json!({"id": 1, "name": "Gate"}))])
            .await
            .unwrap();

        let device = graph.resolve(&["Network", "AccessControl", "Gate"]).await.unwrap();
        let cu = graph.attributes(&device, "ControlUnit").await.unwrap();
        assert!(cu.values().all(String::is_empty));
    }
}
