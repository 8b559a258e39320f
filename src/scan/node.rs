//! Node grouping and per-node classification.
//!
//! Nodes are grouped by instance shape; nodes of one shape are assumed to
//! have identical capacity, so a group carries the first node's capacity as
//! its representative value. Taints and labels are read into warning flags,
//! a workload-pool tag, capacity type and availability zone.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node;
use serde::Serialize;

use super::quantity;

/// Taint key that assigns a node to a workload pool.
pub const POOL_TAINT: &str = "workload_type";
/// Pool reported for nodes without a pool taint.
pub const DEFAULT_POOL: &str = "default";
/// Shape reported for nodes without an instance-type label.
pub const UNKNOWN_SHAPE: &str = "unknown";

const SCALE_DOWN_CANDIDATE_TAINT: &str = "DeletionCandidateOfClusterAutoscaler";
const TO_BE_DELETED_TAINT: &str = "ToBeDeletedByClusterAutoscaler";
const NOT_READY_TAINT: &str = "node.kubernetes.io/not-ready";
const DISK_PRESSURE_TAINT: &str = "node.kubernetes.io/disk-pressure";
const COMPUTE_TYPE_TAINT: &str = "eks.amazonaws.com/compute-type";

const INSTANCE_TYPE_LABELS: &[&str] = &[
    "node.kubernetes.io/instance-type",
    "beta.kubernetes.io/instance-type",
];
const ZONE_LABELS: &[&str] = &[
    "topology.kubernetes.io/zone",
    "failure-domain.beta.kubernetes.io/zone",
];
const CAPACITY_TYPE_LABELS: &[&str] = &["eks.amazonaws.com/capacityType", "karpenter.sh/capacity-type"];

/// Taint keys that are already reflected in the classification.
const CLASSIFIED_TAINTS: &[&str] = &[
    POOL_TAINT,
    SCALE_DOWN_CANDIDATE_TAINT,
    TO_BE_DELETED_TAINT,
    NOT_READY_TAINT,
    DISK_PRESSURE_TAINT,
    COMPUTE_TYPE_TAINT,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeWarning {
    Unschedulable,
    ScaleDownCandidate,
    PendingDeletion,
    NotReady,
    DiskPressure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityType {
    OnDemand,
    Spot,
}

impl CapacityType {
    fn from_label(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().replace('_', "-").as_str() {
            "on-demand" => Some(Self::OnDemand),
            "spot" => Some(Self::Spot),
            _ => None,
        }
    }
}

/// A taint not covered by the classification, kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtherTaint {
    pub key: String,
    pub value: Option<String>,
    pub effect: String,
}

/// Derived per-node annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAnnotation {
    pub name: String,
    pub host_name: Option<String>,
    pub internal_ip: Option<String>,
    pub age_seconds: i64,
    pub shape: String,
    pub pool: String,
    /// Position of `pool` in [`NodeClassification::pools`].
    pub pool_index: Option<usize>,
    pub capacity_type: Option<CapacityType>,
    pub zone: Option<String>,
    pub warnings: Vec<NodeWarning>,
    pub taint_count: usize,
    pub label_count: usize,
    pub volume_count: usize,
    pub cpu_milli: u64,
    pub memory_bytes: u64,
    pub storage_bytes: u64,
    pub other_taints: Vec<OtherTaint>,
}

impl NodeAnnotation {
    /// Palette slot for the zone, taken from its last letter (`us-east-1b` → 1).
    pub fn zone_slot(&self) -> Option<usize> {
        let last = self.zone.as_deref()?.chars().last()?;
        last.is_ascii_lowercase()
            .then(|| (last as u8 - b'a') as usize)
    }
}

/// Nodes sharing one instance shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeGroupAggregate {
    pub shape: String,
    pub count: usize,
    pub cpu_milli: u64,
    pub memory_bytes: u64,
    pub storage_bytes: u64,
    pub pools: Vec<String>,
}

/// Node totals used by the capacity line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeTotals {
    pub nodes: usize,
    pub volumes: usize,
    pub cpu_milli: u64,
    pub memory_bytes: u64,
}

/// Result of classifying a node list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeClassification {
    pub groups: Vec<NodeGroupAggregate>,
    pub nodes: Vec<NodeAnnotation>,
    /// Pool tags in first-seen order.
    pub pools: Vec<String>,
    pub totals: NodeTotals,
}

/// Classify all nodes in a single pass.
pub fn classify_nodes(nodes: &[Node], now: DateTime<Utc>) -> NodeClassification {
    let mut result = NodeClassification::default();
    let mut groups: BTreeMap<String, NodeGroupAggregate> = BTreeMap::new();

    for node in nodes {
        let mut annotation = annotate(node, now);

        if annotation.pool != DEFAULT_POOL {
            let index = match result.pools.iter().position(|p| *p == annotation.pool) {
                Some(i) => i,
                None => {
                    result.pools.push(annotation.pool.clone());
                    result.pools.len() - 1
                }
            };
            annotation.pool_index = Some(index);
        }

        let group = groups
            .entry(annotation.shape.clone())
            .or_insert_with(|| NodeGroupAggregate {
                shape: annotation.shape.clone(),
                count: 0,
                cpu_milli: annotation.cpu_milli,
                memory_bytes: annotation.memory_bytes,
                storage_bytes: annotation.storage_bytes,
                pools: Vec::new(),
            });
        group.count += 1;
        if !group.pools.contains(&annotation.pool) {
            group.pools.push(annotation.pool.clone());
        }

        result.totals.nodes += 1;
        result.totals.volumes += annotation.volume_count;
        result.totals.cpu_milli += annotation.cpu_milli;
        result.totals.memory_bytes += annotation.memory_bytes;
        result.nodes.push(annotation);
    }

    result.groups = groups.into_values().collect();
    result
}

fn annotate(node: &Node, now: DateTime<Utc>) -> NodeAnnotation {
    let labels = node.metadata.labels.as_ref();
    let label = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| labels.and_then(|l| l.get(*k)))
            .cloned()
    };
    let spec = node.spec.as_ref();
    let status = node.status.as_ref();
    let taints = spec.and_then(|s| s.taints.as_deref()).unwrap_or_default();

    let mut warnings = Vec::new();
    let mut push_warning = |w: NodeWarning| {
        if !warnings.contains(&w) {
            warnings.push(w);
        }
    };
    if spec.and_then(|s| s.unschedulable).unwrap_or(false) {
        push_warning(NodeWarning::Unschedulable);
    }
    if node.metadata.deletion_timestamp.is_some() {
        push_warning(NodeWarning::PendingDeletion);
    }

    let mut pool = None;
    let mut fargate = false;
    let mut other_taints = Vec::new();
    for taint in taints {
        match taint.key.as_str() {
            POOL_TAINT => {
                if pool.is_none() {
                    pool = taint.value.clone();
                }
            }
            SCALE_DOWN_CANDIDATE_TAINT => push_warning(NodeWarning::ScaleDownCandidate),
            TO_BE_DELETED_TAINT => push_warning(NodeWarning::PendingDeletion),
            NOT_READY_TAINT => push_warning(NodeWarning::NotReady),
            DISK_PRESSURE_TAINT => push_warning(NodeWarning::DiskPressure),
            COMPUTE_TYPE_TAINT => fargate = true,
            _ => {}
        }
        if !CLASSIFIED_TAINTS.contains(&taint.key.as_str()) {
            other_taints.push(OtherTaint {
                key: taint.key.clone(),
                value: taint.value.clone(),
                effect: taint.effect.clone(),
            });
        }
    }

    let address = |kind: &str| -> Option<String> {
        status
            .and_then(|s| s.addresses.as_ref())
            .and_then(|addrs| addrs.iter().find(|a| a.type_ == kind))
            .map(|a| a.address.clone())
    };

    let capacity = status.and_then(|s| s.capacity.as_ref());
    let storage_bytes = match quantity::bytes_from(capacity, "ephemeral-storage") {
        0 => quantity::bytes_from(capacity, "storage"),
        bytes => bytes,
    };

    let shape = if fargate {
        "Fargate".to_string()
    } else {
        label(INSTANCE_TYPE_LABELS).unwrap_or_else(|| UNKNOWN_SHAPE.to_string())
    };

    NodeAnnotation {
        name: node.metadata.name.clone().unwrap_or_default(),
        host_name: address("Hostname"),
        internal_ip: address("InternalIP"),
        age_seconds: node
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|t| (now - t.0).num_seconds().max(0))
            .unwrap_or(0),
        shape,
        pool: pool.unwrap_or_else(|| DEFAULT_POOL.to_string()),
        pool_index: None,
        capacity_type: label(CAPACITY_TYPE_LABELS).and_then(|v| CapacityType::from_label(&v)),
        zone: label(ZONE_LABELS),
        warnings,
        taint_count: taints.len(),
        label_count: labels.map(|l| l.len()).unwrap_or(0),
        volume_count: status
            .and_then(|s| s.volumes_attached.as_ref())
            .map(|v| v.len())
            .unwrap_or(0),
        cpu_milli: quantity::cpu_from(capacity),
        memory_bytes: quantity::bytes_from(capacity, "memory"),
        storage_bytes,
        other_taints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn node(name: &str, shape: &str, taints: serde_json::Value, extra_labels: serde_json::Value) -> Node {
        let mut labels = json!({
            "beta.kubernetes.io/instance-type": shape,
            "topology.kubernetes.io/zone": "us-west-2b",
            "eks.amazonaws.com/capacityType": "ON_DEMAND"
        });
        if let (Some(base), Some(extra)) = (labels.as_object_mut(), extra_labels.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(json!({
            "metadata": {
                "name": name,
                "labels": labels,
                "creationTimestamp": "2024-05-31T12:00:00Z"
            },
            "spec": {"taints": taints},
            "status": {
                "addresses": [
                    {"type": "InternalIP", "address": "10.0.0.1"},
                    {"type": "Hostname", "address": format!("{}.internal", name)}
                ],
                "capacity": {"cpu": "4", "memory": "16Gi", "ephemeral-storage": "100Gi"},
                "volumesAttached": [{"name": "vol-1", "devicePath": "/dev/xvdba"}]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_group_by_shape() {
        let nodes = vec![
            node("a", "m5.xlarge", json!([]), json!({})),
            node("b", "m5.xlarge", json!([]), json!({})),
            node("c", "c5.2xlarge", json!([]), json!({})),
        ];
        let result = classify_nodes(&nodes, now());
        assert_eq!(result.groups.len(), 2);
        let m5 = result.groups.iter().find(|g| g.shape == "m5.xlarge").unwrap();
        assert_eq!(m5.count, 2);
        assert_eq!(m5.cpu_milli, 4000);
        assert_eq!(m5.memory_bytes, 16 * 1024 * 1024 * 1024);
        assert_eq!(m5.storage_bytes, 100 * 1024 * 1024 * 1024);
        assert_eq!(result.totals.nodes, 3);
        assert_eq!(result.totals.cpu_milli, 12000);
        assert_eq!(result.totals.volumes, 3);
    }

    #[test]
    fn test_pool_tags_first_seen_order() {
        let nodes = vec![
            node("a", "m5.xlarge", json!([{"key": "workload_type", "value": "batch", "effect": "NoSchedule"}]), json!({})),
            node("b", "m5.xlarge", json!([]), json!({})),
            node("c", "m5.xlarge", json!([{"key": "workload_type", "value": "api", "effect": "NoSchedule"}]), json!({})),
            node("d", "m5.xlarge", json!([{"key": "workload_type", "value": "batch", "effect": "NoSchedule"}]), json!({})),
        ];
        let result = classify_nodes(&nodes, now());
        assert_eq!(result.pools, vec!["batch", "api"]);
        assert_eq!(result.nodes[0].pool_index, Some(0));
        assert_eq!(result.nodes[1].pool, DEFAULT_POOL);
        assert_eq!(result.nodes[1].pool_index, None);
        assert_eq!(result.nodes[2].pool_index, Some(1));
        assert_eq!(result.nodes[3].pool_index, Some(0));
        assert_eq!(result.groups[0].pools, vec!["batch", "default", "api"]);
    }

    #[test]
    fn test_warnings_accumulate() {
        let mut n = node(
            "a",
            "m5.xlarge",
            json!([
                {"key": "DeletionCandidateOfClusterAutoscaler", "value": "1663865519", "effect": "PreferNoSchedule"},
                {"key": "node.kubernetes.io/not-ready", "effect": "NoSchedule"},
                {"key": "node.kubernetes.io/disk-pressure", "effect": "NoSchedule"}
            ]),
            json!({}),
        );
        if let Some(spec) = n.spec.as_mut() {
            spec.unschedulable = Some(true);
        }
        let result = classify_nodes(&[n], now());
        assert_eq!(
            result.nodes[0].warnings,
            vec![
                NodeWarning::Unschedulable,
                NodeWarning::ScaleDownCandidate,
                NodeWarning::NotReady,
                NodeWarning::DiskPressure,
            ]
        );
        assert_eq!(result.nodes[0].taint_count, 3);
        assert!(result.nodes[0].other_taints.is_empty());
    }

    #[test]
    fn test_pending_deletion_reported_once() {
        let mut n = node(
            "a",
            "m5.xlarge",
            json!([
                {"key": "ToBeDeletedByClusterAutoscaler", "value": "1663865519", "effect": "NoSchedule"}
            ]),
            json!({}),
        );
        n.metadata.deletion_timestamp = Some(Time(now()));
        let result = classify_nodes(&[n], now());
        assert_eq!(result.nodes[0].warnings, vec![NodeWarning::PendingDeletion]);
        assert!(result.nodes[0].other_taints.is_empty());
    }

    #[test]
    fn test_other_taints_kept() {
        let n = node(
            "a",
            "m5.xlarge",
            json!([{"key": "dedicated", "value": "gpu", "effect": "NoSchedule"}]),
            json!({}),
        );
        let result = classify_nodes(&[n], now());
        assert_eq!(result.nodes[0].other_taints.len(), 1);
        assert_eq!(result.nodes[0].other_taints[0].key, "dedicated");
    }

    #[test]
    fn test_labels_read() {
        let result = classify_nodes(&[node("a", "m5.xlarge", json!([]), json!({}))], now());
        let a = &result.nodes[0];
        assert_eq!(a.capacity_type, Some(CapacityType::OnDemand));
        assert_eq!(a.zone.as_deref(), Some("us-west-2b"));
        assert_eq!(a.zone_slot(), Some(1));
        assert_eq!(a.internal_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(a.host_name.as_deref(), Some("a.internal"));
        assert_eq!(a.age_seconds, 86400);
        assert_eq!(a.volume_count, 1);
    }

    #[test]
    fn test_karpenter_spot_label() {
        let mut n = node(
            "a",
            "m5.xlarge",
            json!([]),
            json!({"karpenter.sh/capacity-type": "spot"}),
        );
        if let Some(labels) = n.metadata.labels.as_mut() {
            labels.remove("eks.amazonaws.com/capacityType");
        }
        let result = classify_nodes(&[n], now());
        assert_eq!(result.nodes[0].capacity_type, Some(CapacityType::Spot));
    }

    #[test]
    fn test_fargate_shape() {
        let n = node(
            "fargate-ip-10-0-0-9",
            "",
            json!([{"key": "eks.amazonaws.com/compute-type", "value": "fargate", "effect": "NoSchedule"}]),
            json!({}),
        );
        let result = classify_nodes(&[n], now());
        assert_eq!(result.nodes[0].shape, "Fargate");
    }

    #[test]
    fn test_missing_zone_has_no_slot() {
        let mut n = node("a", "m5.xlarge", json!([]), json!({}));
        if let Some(labels) = n.metadata.labels.as_mut() {
            labels.remove("topology.kubernetes.io/zone");
        }
        let result = classify_nodes(&[n], now());
        assert_eq!(result.nodes[0].zone, None);
        assert_eq!(result.nodes[0].zone_slot(), None);
    }
}
