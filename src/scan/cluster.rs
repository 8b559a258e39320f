//! Cluster-wide fold over namespace summaries.

use std::collections::BTreeMap;

use serde::Serialize;

use super::aggregate::{
    ImageAggregate, StatusHistogram, WorkloadAggregate, merge_images, merge_workloads,
};
use super::deprecation::Deprecation;
use super::namespace::NamespaceSummary;
use super::node::NodeClassification;

/// Pods scheduled on one host IP and what they reserve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostUsage {
    pub pods: usize,
    pub cpu_milli: u64,
    pub memory_bytes: u64,
}

impl HostUsage {
    fn merge(&mut self, other: &HostUsage) {
        self.pods += other.pods;
        self.cpu_milli += other.cpu_milli;
        self.memory_bytes += other.memory_bytes;
    }
}

/// A resource kind whose listing failed and was treated as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedListing {
    pub kind: String,
    pub reason: String,
}

/// Accumulates cluster totals. Owns its maps exclusively during the fold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterAggregator {
    pub images: BTreeMap<String, ImageAggregate>,
    pub workloads: BTreeMap<String, WorkloadAggregate>,
    pub status: StatusHistogram,
    pub cpu_milli: u64,
    pub memory_bytes: u64,
    pub hosts: BTreeMap<String, HostUsage>,
}

impl ClusterAggregator {
    /// Fold one namespace summary into the running totals.
    pub fn fold(&mut self, namespace: &NamespaceSummary) {
        merge_images(&mut self.images, &namespace.images);
        merge_workloads(&mut self.workloads, &namespace.workloads);
        self.status.merge(&namespace.status);
        self.cpu_milli += namespace.cpu_milli;
        self.memory_bytes += namespace.memory_bytes;

        for pod in &namespace.pods {
            let Some(host_ip) = pod.host_ip.as_deref() else {
                continue;
            };
            self.hosts.entry(host_ip.to_string()).or_default().merge(&HostUsage {
                pods: 1,
                cpu_milli: pod.cpu_milli,
                memory_bytes: pod.memory_bytes,
            });
        }
    }

    /// Combine two partial folds.
    pub fn merge(&mut self, other: &ClusterAggregator) {
        merge_images(&mut self.images, &other.images);
        merge_workloads(&mut self.workloads, &other.workloads);
        self.status.merge(&other.status);
        self.cpu_milli += other.cpu_milli;
        self.memory_bytes += other.memory_bytes;
        for (host, usage) in &other.hosts {
            self.hosts.entry(host.clone()).or_default().merge(usage);
        }
    }
}

/// Resource kinds counted by `NamespaceSummary::is_empty`.
const EMPTINESS_KINDS: &[&str] = &[
    "pods",
    "virtualservices",
    "ingresses",
    "configmaps",
    "secrets",
    "cronjobs",
];

/// Whole-cluster rollup returned by a scan.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub context: String,
    pub server_version: String,
    pub namespaces: BTreeMap<String, NamespaceSummary>,
    pub images: BTreeMap<String, ImageAggregate>,
    pub workloads: BTreeMap<String, WorkloadAggregate>,
    pub status: StatusHistogram,
    pub cpu_milli: u64,
    pub memory_bytes: u64,
    pub hosts: BTreeMap<String, HostUsage>,
    pub empty_namespaces: Vec<String>,
    pub nodes: NodeClassification,
    pub degraded: Vec<DegradedListing>,
}

impl ClusterSummary {
    /// Fold all namespace summaries. Must only run once every worker has published.
    pub fn build(
        context: String,
        server_version: String,
        namespaces: BTreeMap<String, NamespaceSummary>,
        nodes: NodeClassification,
        degraded: Vec<DegradedListing>,
    ) -> Self {
        let mut totals = ClusterAggregator::default();
        let mut empty_namespaces = Vec::new();

        for (name, summary) in &namespaces {
            totals.fold(summary);
            if summary.is_empty() {
                empty_namespaces.push(name.clone());
            }
        }

        Self {
            context,
            server_version,
            namespaces,
            images: totals.images,
            workloads: totals.workloads,
            status: totals.status,
            cpu_milli: totals.cpu_milli,
            memory_bytes: totals.memory_bytes,
            hosts: totals.hosts,
            empty_namespaces,
            nodes,
            degraded,
        }
    }

    pub fn pod_count(&self) -> usize {
        self.namespaces.values().map(|ns| ns.pods.len()).sum()
    }

    /// Deprecated resources across all namespaces, in namespace order.
    pub fn deprecations(&self) -> impl Iterator<Item = &Deprecation> {
        self.namespaces.values().flat_map(|ns| ns.deprecations.iter())
    }

    pub fn is_degraded(&self, kind: &str) -> bool {
        self.degraded.iter().any(|d| d.kind == kind)
    }

    /// Degraded kinds that namespace emptiness depends on. When any are
    /// present, `empty_namespaces` may list namespaces that hold such objects.
    pub fn unverified_emptiness_kinds(&self) -> Vec<&str> {
        EMPTINESS_KINDS
            .iter()
            .copied()
            .filter(|kind| self.is_degraded(kind))
            .collect()
    }
}
