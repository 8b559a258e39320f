//! Cluster scan: inventory listing, per-namespace aggregation, cluster fold.

pub mod aggregate;
pub mod cluster;
pub mod deprecation;
pub mod image;
pub mod namespace;
pub mod node;
pub mod owner;
pub mod pool;
pub mod quantity;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::error::KhError;
use crate::k8s::inventory;
use crate::k8s::source::ClusterSource;
use cluster::ClusterSummary;
use deprecation::DeprecationRules;
use namespace::NamespaceAggregator;
use owner::{OwnerLookup, ReplicaSetIndex};

/// Knobs for one cluster scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub threads: usize,
    pub resolve_owners: bool,
    pub show_progress: bool,
}

/// Scan one cluster end to end.
///
/// Fails only if the source reports a fatal error; any other listing
/// failure is carried in `ClusterSummary::degraded`.
pub async fn scan_cluster(
    source: &dyn ClusterSource,
    context: &str,
    server_version: String,
    options: &ScanOptions,
    now: DateTime<Utc>,
) -> Result<ClusterSummary, KhError> {
    let spinner = spinner(options.show_progress, context);

    let inventory = match inventory::collect(source, options.resolve_owners).await {
        Ok(inventory) => inventory,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    spinner.set_message(format!(
        "[{}] Aggregating {} namespaces",
        context,
        inventory.namespaces.len()
    ));

    let owner_lookup = inventory.replica_sets.as_deref().map(|replica_sets| {
        let index = ReplicaSetIndex::from_replica_sets(replica_sets);
        info!("Indexed {} ReplicaSets for owner lookup", index.len());
        Arc::new(index) as Arc<dyn OwnerLookup>
    });
    let aggregator = Arc::new(NamespaceAggregator::new(
        now,
        owner_lookup,
        DeprecationRules::default(),
    ));

    let namespaces =
        pool::aggregate_namespaces(aggregator, inventory.namespaces, options.threads).await;
    spinner.finish_and_clear();
    let namespaces = namespaces?;

    let nodes = node::classify_nodes(&inventory.nodes, now);

    Ok(ClusterSummary::build(
        context.to_string(),
        server_version,
        namespaces,
        nodes,
        inventory.degraded,
    ))
}

fn spinner(visible: bool, context: &str) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("[{}] Listing cluster resources", context));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::inventory::tests::{FakeSource, shop_source};
    use crate::scan::namespace::tests::now;
    use crate::scan::owner::WorkloadKind;
    use k8s_openapi::api::apps::v1::ReplicaSet;
    use serde_json::json;

    fn options(resolve_owners: bool) -> ScanOptions {
        ScanOptions {
            threads: 2,
            resolve_owners,
            show_progress: false,
        }
    }

    async fn scan(source: &FakeSource, resolve_owners: bool) -> Result<ClusterSummary, KhError> {
        scan_cluster(source, "test", "v1.31.2".to_string(), &options(resolve_owners), now()).await
    }

    #[tokio::test]
    async fn test_scan_aggregates() {
        let summary = scan(&shop_source(), false).await.unwrap();
        assert_eq!(summary.context, "test");
        assert_eq!(summary.server_version, "v1.31.2");
        assert_eq!(summary.pod_count(), 2);
        assert_eq!(summary.workloads["web"].pods, 2);
        assert_eq!(summary.workloads["web"].kind, WorkloadKind::Deployment);
        assert_eq!(summary.images["repo.io/shop/web:2.0"].count, 2);
        assert_eq!(summary.empty_namespaces, vec!["idle".to_string()]);
        assert!(summary.degraded.is_empty());
    }

    #[tokio::test]
    async fn test_failed_virtual_service_listing_degrades_only_that_kind() {
        let healthy = scan(&shop_source(), false).await.unwrap();

        let mut source = shop_source();
        source.failing = vec!["virtualservices"];
        let degraded = scan(&source, false).await.unwrap();

        assert!(degraded.is_degraded("virtualservices"));
        assert!(!degraded.is_degraded("pods"));
        assert_eq!(degraded.images, healthy.images);
        assert_eq!(degraded.workloads, healthy.workloads);
        assert_eq!(degraded.status, healthy.status);
        assert_eq!(degraded.cpu_milli, healthy.cpu_milli);
    }

    #[tokio::test]
    async fn test_failed_secret_listing_marks_emptiness_unverified() {
        let mut source = shop_source();
        source.namespaces.push("vault".to_string());
        source.secrets.push(
            serde_json::from_value(json!({
                "metadata": {"name": "root-token", "namespace": "vault"}
            }))
            .unwrap(),
        );
        source.failing = vec!["secrets"];

        let summary = scan(&source, false).await.unwrap();
        assert_eq!(
            summary.empty_namespaces,
            vec!["idle".to_string(), "vault".to_string()]
        );
        assert_eq!(summary.unverified_emptiness_kinds(), vec!["secrets"]);
    }

    #[tokio::test]
    async fn test_fatal_listing_fails_scan() {
        let mut source = shop_source();
        source.failing = vec!["nodes"];
        source.fatal = true;
        assert!(scan(&source, false).await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_authoritative_owner_lookup() {
        let mut source = shop_source();
        let replica_set: ReplicaSet = serde_json::from_value(json!({
            "metadata": {
                "name": "web-6b7c8d9f4",
                "namespace": "shop",
                "ownerReferences": [{
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "name": "storefront",
                    "uid": "d",
                    "controller": true
                }]
            }
        }))
        .unwrap();
        source.replica_sets = vec![replica_set];

        let summary = scan(&source, true).await.unwrap();
        assert_eq!(summary.workloads["storefront"].pods, 2);
        assert!(!summary.workloads.contains_key("web"));
    }
}
