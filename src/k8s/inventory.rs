//! Raw resource inventory of one cluster.
//!
//! Every resource kind is listed concurrently and independently. A fatal
//! failure (connection, credentials) aborts the collection; any other
//! failure degrades that one kind to empty and is recorded.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tracing::{debug, warn};

use super::source::ClusterSource;
use crate::error::KhError;
use crate::scan::cluster::DegradedListing;
use crate::scan::namespace::NamespaceObjects;

/// Everything one scan reads, partitioned by namespace.
#[derive(Debug, Default)]
pub struct Inventory {
    pub namespaces: BTreeMap<String, NamespaceObjects>,
    /// Listed only when owner resolution is requested and the listing succeeded.
    pub replica_sets: Option<Vec<ReplicaSet>>,
    pub nodes: Vec<Node>,
    pub degraded: Vec<DegradedListing>,
}

/// List every resource kind from `source`.
pub async fn collect(
    source: &dyn ClusterSource,
    resolve_owners: bool,
) -> Result<Inventory, KhError> {
    let replica_sets = async {
        if resolve_owners {
            Some(source.replica_sets().await)
        } else {
            None
        }
    };
    let (
        namespaces,
        pods,
        secrets,
        config_maps,
        virtual_services,
        ingresses,
        cron_jobs,
        nodes,
        replica_sets,
    ) = tokio::join!(
        source.namespaces(),
        source.pods(),
        source.secrets(),
        source.config_maps(),
        source.virtual_services(),
        source.ingresses(),
        source.cron_jobs(),
        source.nodes(),
        replica_sets,
    );

    let mut inventory = Inventory::default();
    let degraded = &mut inventory.degraded;

    let namespaces = degrade("namespaces", namespaces, degraded)?;
    let pods = degrade("pods", pods, degraded)?;
    let secrets = degrade("secrets", secrets, degraded)?;
    let config_maps = degrade("configmaps", config_maps, degraded)?;
    let virtual_services = degrade("virtualservices", virtual_services, degraded)?;
    let ingresses = degrade("ingresses", ingresses, degraded)?;
    let cron_jobs = degrade("cronjobs", cron_jobs, degraded)?;
    inventory.nodes = degrade("nodes", nodes, degraded)?;
    inventory.replica_sets = match replica_sets {
        Some(Ok(items)) => Some(items),
        Some(Err(e)) if e.is_fatal() => return Err(e),
        Some(Err(e)) => {
            warn!("Owner lookup unavailable, falling back to name heuristic: {}", e);
            degraded.push(DegradedListing {
                kind: "replicasets".to_string(),
                reason: e.to_string(),
            });
            None
        }
        None => None,
    };

    let partition = &mut inventory.namespaces;
    for name in namespaces {
        partition.entry(name).or_default();
    }
    for pod in pods {
        slot(partition, pod.namespace()).pods.push(pod);
    }
    for secret in secrets {
        slot(partition, secret.namespace()).secrets.push(secret);
    }
    for cm in config_maps {
        slot(partition, cm.namespace()).config_maps.push(cm);
    }
    for vs in virtual_services {
        slot(partition, vs.namespace()).virtual_services.push(vs);
    }
    for ing in ingresses {
        slot(partition, ing.namespace()).ingresses.push(ing);
    }
    for cj in cron_jobs {
        slot(partition, cj.namespace()).cron_jobs.push(cj);
    }

    debug!(
        "Inventory: {} namespaces, {} nodes, {} degraded kinds",
        inventory.namespaces.len(),
        inventory.nodes.len(),
        inventory.degraded.len()
    );
    Ok(inventory)
}

/// Pass a fatal error through; turn any other failure into an empty listing.
fn degrade<T>(
    kind: &str,
    result: Result<Vec<T>, KhError>,
    degraded: &mut Vec<DegradedListing>,
) -> Result<Vec<T>, KhError> {
    match result {
        Ok(items) => Ok(items),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("Skipping {}: {}", kind, e);
            degraded.push(DegradedListing {
                kind: kind.to_string(),
                reason: e.to_string(),
            });
            Ok(Vec::new())
        }
    }
}

/// Objects seen in a namespace that was not listed still get a slot.
fn slot(
    partition: &mut BTreeMap<String, NamespaceObjects>,
    namespace: Option<String>,
) -> &mut NamespaceObjects {
    partition.entry(namespace.unwrap_or_default()).or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
    use kube::api::DynamicObject;
    use serde_json::json;

    use crate::scan::namespace::tests::pod;

    /// In-memory source. Kinds named in `failing` return an error.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub namespaces: Vec<String>,
        pub pods: Vec<Pod>,
        pub secrets: Vec<Secret>,
        pub virtual_services: Vec<DynamicObject>,
        pub ingresses: Vec<DynamicObject>,
        pub replica_sets: Vec<ReplicaSet>,
        pub nodes: Vec<Node>,
        pub failing: Vec<&'static str>,
        pub fatal: bool,
    }

    impl FakeSource {
        fn answer<T: Clone>(&self, kind: &str, items: &[T]) -> Result<Vec<T>, KhError> {
            if !self.failing.iter().any(|f| *f == kind) {
                return Ok(items.to_vec());
            }
            if self.fatal {
                Err(KhError::Unauthorized {
                    kind: kind.to_string(),
                    message: "Unauthorized".to_string(),
                })
            } else {
                Err(KhError::Listing {
                    kind: kind.to_string(),
                    message: "the server could not find the requested resource".to_string(),
                })
            }
        }
    }

    #[async_trait]
    impl ClusterSource for FakeSource {
        async fn namespaces(&self) -> Result<Vec<String>, KhError> {
            self.answer("namespaces", &self.namespaces)
        }
        async fn pods(&self) -> Result<Vec<Pod>, KhError> {
            self.answer("pods", &self.pods)
        }
        async fn secrets(&self) -> Result<Vec<Secret>, KhError> {
            self.answer("secrets", &self.secrets)
        }
        async fn config_maps(&self) -> Result<Vec<ConfigMap>, KhError> {
            self.answer::<ConfigMap>("configmaps", &[])
        }
        async fn virtual_services(&self) -> Result<Vec<DynamicObject>, KhError> {
            self.answer("virtualservices", &self.virtual_services)
        }
        async fn ingresses(&self) -> Result<Vec<DynamicObject>, KhError> {
            self.answer("ingresses", &self.ingresses)
        }
        async fn cron_jobs(&self) -> Result<Vec<DynamicObject>, KhError> {
            self.answer::<DynamicObject>("cronjobs", &[])
        }
        async fn replica_sets(&self) -> Result<Vec<ReplicaSet>, KhError> {
            self.answer("replicasets", &self.replica_sets)
        }
        async fn nodes(&self) -> Result<Vec<Node>, KhError> {
            self.answer("nodes", &self.nodes)
        }
    }

    pub(crate) fn in_namespace(mut pod: Pod, namespace: &str) -> Pod {
        pod.metadata.namespace = Some(namespace.to_string());
        pod
    }

    pub(crate) fn shop_source() -> FakeSource {
        let secret: Secret = serde_json::from_value(json!({
            "metadata": {"name": "sh.helm.release.v1.web.v3", "namespace": "shop"}
        }))
        .unwrap();
        FakeSource {
            namespaces: vec!["shop".to_string(), "idle".to_string()],
            pods: vec![
                in_namespace(
                    pod("web-6b7c8d9f4-k2j3h", "Running", Some(("web-6b7c8d9f4", "ReplicaSet")), &["repo.io/shop/web:2.0"]),
                    "shop",
                ),
                in_namespace(
                    pod("web-6b7c8d9f4-p9q8r", "Running", Some(("web-6b7c8d9f4", "ReplicaSet")), &["repo.io/shop/web:2.0"]),
                    "shop",
                ),
            ],
            secrets: vec![secret],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_partition_by_namespace() {
        let inventory = collect(&shop_source(), false).await.unwrap();
        assert_eq!(inventory.namespaces.len(), 2);
        assert_eq!(inventory.namespaces["shop"].pods.len(), 2);
        assert_eq!(inventory.namespaces["shop"].secrets.len(), 1);
        assert!(inventory.namespaces["idle"].pods.is_empty());
        assert!(inventory.degraded.is_empty());
        assert!(inventory.replica_sets.is_none());
    }

    #[tokio::test]
    async fn test_unlisted_namespace_gets_slot() {
        let mut source = shop_source();
        source.failing = vec!["namespaces"];
        let inventory = collect(&source, false).await.unwrap();
        assert!(inventory.namespaces.contains_key("shop"));
        assert!(!inventory.namespaces.contains_key("idle"));
        assert_eq!(inventory.degraded[0].kind, "namespaces");
    }

    #[tokio::test]
    async fn test_degraded_kind_is_empty() {
        let mut source = shop_source();
        source.failing = vec!["virtualservices"];
        let inventory = collect(&source, false).await.unwrap();
        assert_eq!(inventory.degraded.len(), 1);
        assert_eq!(inventory.degraded[0].kind, "virtualservices");
        assert_eq!(inventory.namespaces["shop"].pods.len(), 2);
    }

    #[tokio::test]
    async fn test_fatal_failure_aborts() {
        let mut source = shop_source();
        source.failing = vec!["pods"];
        source.fatal = true;
        let err = collect(&source, false).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_replica_set_failure_falls_back() {
        let mut source = shop_source();
        source.failing = vec!["replicasets"];
        let inventory = collect(&source, true).await.unwrap();
        assert!(inventory.replica_sets.is_none());
        assert_eq!(inventory.degraded[0].kind, "replicasets");
    }
}
