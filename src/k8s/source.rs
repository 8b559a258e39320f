//! Resource listing capability.
//!
//! `ClusterSource` is the only seam between the scan and the API server, so
//! the scan can be driven by an in-memory fake in tests. Legacy resource
//! kinds are listed through every API version the server may still serve.

use std::collections::HashSet;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod, Secret};
use kube::api::{ApiResource, DynamicObject, ListParams};
use kube::core::TypeMeta;
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::KhError;

/// One API version a kind may be served under.
#[derive(Debug, Clone, Copy)]
pub struct ServedVersion {
    pub group: &'static str,
    pub version: &'static str,
}

impl ServedVersion {
    fn api_resource(&self, kind: &str, plural: &str) -> ApiResource {
        let api_version = if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        };
        ApiResource {
            group: self.group.to_string(),
            version: self.version.to_string(),
            api_version,
            kind: kind.to_string(),
            plural: plural.to_string(),
        }
    }
}

/// Ingress versions, legacy first.
pub const INGRESS_VERSIONS: &[ServedVersion] = &[
    ServedVersion {
        group: "extensions",
        version: "v1beta1",
    },
    ServedVersion {
        group: "networking.k8s.io",
        version: "v1beta1",
    },
    ServedVersion {
        group: "networking.k8s.io",
        version: "v1",
    },
];

/// CronJob versions, legacy first.
pub const CRON_JOB_VERSIONS: &[ServedVersion] = &[
    ServedVersion {
        group: "batch",
        version: "v1beta1",
    },
    ServedVersion {
        group: "batch",
        version: "v1",
    },
];

/// Istio VirtualService.
pub const VIRTUAL_SERVICE_VERSIONS: &[ServedVersion] = &[ServedVersion {
    group: "networking.istio.io",
    version: "v1alpha3",
}];

/// Cluster-wide listing of every resource kind the scan reads.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn namespaces(&self) -> Result<Vec<String>, KhError>;
    async fn pods(&self) -> Result<Vec<Pod>, KhError>;
    async fn secrets(&self) -> Result<Vec<Secret>, KhError>;
    async fn config_maps(&self) -> Result<Vec<ConfigMap>, KhError>;
    async fn virtual_services(&self) -> Result<Vec<DynamicObject>, KhError>;
    async fn ingresses(&self) -> Result<Vec<DynamicObject>, KhError>;
    async fn cron_jobs(&self) -> Result<Vec<DynamicObject>, KhError>;
    async fn replica_sets(&self) -> Result<Vec<ReplicaSet>, KhError>;
    async fn nodes(&self) -> Result<Vec<Node>, KhError>;
}

/// `ClusterSource` backed by a live API server.
pub struct KubeSource {
    client: kube::Client,
}

impl KubeSource {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    async fn list_typed<K>(&self, kind: &str) -> Result<Vec<K>, KhError>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        let api: Api<K> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| KhError::from_listing(kind, e))?;
        debug!("Found {} {}", list.items.len(), kind);
        Ok(list.items)
    }

    async fn list_dynamic(&self, ar: &ApiResource) -> Result<Vec<DynamicObject>, KhError> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), ar);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| KhError::from_listing(&ar.plural, e))?;
        debug!(
            "Found {} {} (api version: {})",
            list.items.len(),
            ar.plural,
            ar.api_version
        );
        Ok(stamp_types(list.items, ar))
    }

    /// List `kind` through each served version, keeping the first sighting of
    /// every object. Versions the server does not serve are skipped.
    async fn list_versions(
        &self,
        kind: &str,
        plural: &str,
        versions: &[ServedVersion],
    ) -> Result<Vec<DynamicObject>, KhError> {
        let mut seen = HashSet::new();
        let mut objects = Vec::new();
        let mut last_error = None;
        let mut served = 0;

        for version in versions {
            let ar = version.api_resource(kind, plural);
            match self.list_dynamic(&ar).await {
                Ok(items) => {
                    served += 1;
                    for obj in items {
                        let key = (obj.metadata.namespace.clone(), obj.metadata.name.clone());
                        if seen.insert(key) {
                            objects.push(obj);
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!("{} {} query failed, trying next: {}", kind, ar.api_version, e);
                    last_error = Some(e);
                }
            }
        }

        match (served, last_error) {
            (0, Some(e)) => Err(e),
            _ => Ok(objects),
        }
    }
}

/// List responses may omit per-item type metadata; record the version each
/// object was actually served through.
fn stamp_types(items: Vec<DynamicObject>, ar: &ApiResource) -> Vec<DynamicObject> {
    items
        .into_iter()
        .map(|mut obj| {
            obj.types = Some(TypeMeta {
                api_version: ar.api_version.clone(),
                kind: ar.kind.clone(),
            });
            obj
        })
        .collect()
}

#[async_trait]
impl ClusterSource for KubeSource {
    async fn namespaces(&self) -> Result<Vec<String>, KhError> {
        let namespaces: Vec<Namespace> = self.list_typed("namespaces").await?;
        Ok(namespaces
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    async fn pods(&self) -> Result<Vec<Pod>, KhError> {
        self.list_typed("pods").await
    }

    async fn secrets(&self) -> Result<Vec<Secret>, KhError> {
        self.list_typed("secrets").await
    }

    async fn config_maps(&self) -> Result<Vec<ConfigMap>, KhError> {
        self.list_typed("configmaps").await
    }

    async fn virtual_services(&self) -> Result<Vec<DynamicObject>, KhError> {
        self.list_versions("VirtualService", "virtualservices", VIRTUAL_SERVICE_VERSIONS)
            .await
    }

    async fn ingresses(&self) -> Result<Vec<DynamicObject>, KhError> {
        self.list_versions("Ingress", "ingresses", INGRESS_VERSIONS)
            .await
    }

    async fn cron_jobs(&self) -> Result<Vec<DynamicObject>, KhError> {
        self.list_versions("CronJob", "cronjobs", CRON_JOB_VERSIONS)
            .await
    }

    async fn replica_sets(&self) -> Result<Vec<ReplicaSet>, KhError> {
        self.list_typed("replicasets").await
    }

    async fn nodes(&self) -> Result<Vec<Node>, KhError> {
        self.list_typed("nodes").await
    }
}
