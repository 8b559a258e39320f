//! Per-namespace aggregation.
//!
//! Folds one namespace's raw object lists into a [`NamespaceSummary`].
//! Nothing here performs I/O or fails: malformed records are still counted
//! and only left out of the dimension they could not be parsed into.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::api::DynamicObject;
use serde::Serialize;
use tracing::debug;

use super::aggregate::{
    ImageAggregate, StatusHistogram, WorkloadAggregate, record_image, record_workload,
};
use super::deprecation::{Deprecation, DeprecationRules};
use super::owner::{OwnerLookup, ResolvedOwner, resolve_owner};
use super::quantity;

/// Helm release states that block further upgrades until resolved.
const STUCK_HELM_STATES: &[&str] = &[
    "pending-install",
    "pending-upgrade",
    "pending-update",
    "pending-rollback",
];

/// Raw objects belonging to one namespace.
#[derive(Debug, Clone, Default)]
pub struct NamespaceObjects {
    pub pods: Vec<Pod>,
    pub secrets: Vec<Secret>,
    pub config_maps: Vec<ConfigMap>,
    pub virtual_services: Vec<DynamicObject>,
    pub cron_jobs: Vec<DynamicObject>,
    pub ingresses: Vec<DynamicObject>,
}

/// Resource footprint of one pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodRecord {
    pub name: String,
    pub host_ip: Option<String>,
    pub phase: String,
    pub crash_looping: bool,
    pub restart_count: i32,
    pub running_seconds: i64,
    pub cpu_milli: u64,
    pub memory_bytes: u64,
    pub owner: ResolvedOwner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretSummary {
    pub name: String,
    /// `status` label of a Helm release secret.
    pub helm_status: Option<String>,
}

impl SecretSummary {
    pub fn is_stuck_helm_release(&self) -> bool {
        self.helm_status
            .as_deref()
            .is_some_and(|s| STUCK_HELM_STATES.contains(&s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigMapSummary {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualServiceSummary {
    pub name: String,
    pub hosts: Vec<String>,
}

/// Ingress or CronJob, recorded with the API version it was served through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionedSummary {
    pub name: String,
    pub api_version: String,
    pub deprecated: bool,
}

/// One namespace's state at scan time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceSummary {
    pub name: String,
    pub pods: Vec<PodRecord>,
    pub images: BTreeMap<String, ImageAggregate>,
    pub workloads: BTreeMap<String, WorkloadAggregate>,
    pub secrets: Vec<SecretSummary>,
    pub config_maps: Vec<ConfigMapSummary>,
    pub virtual_services: Vec<VirtualServiceSummary>,
    pub ingresses: Vec<VersionedSummary>,
    pub cron_jobs: Vec<VersionedSummary>,
    pub cpu_milli: u64,
    pub memory_bytes: u64,
    pub status: StatusHistogram,
    pub deprecations: Vec<Deprecation>,
}

impl NamespaceSummary {
    /// No pods, virtual services, ingresses, config maps, secrets or cron jobs.
    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
            && self.virtual_services.is_empty()
            && self.ingresses.is_empty()
            && self.config_maps.is_empty()
            && self.secrets.is_empty()
            && self.cron_jobs.is_empty()
    }

    pub fn has_deprecations(&self) -> bool {
        !self.deprecations.is_empty()
    }

    pub fn stuck_helm_releases(&self) -> impl Iterator<Item = &SecretSummary> {
        self.secrets.iter().filter(|s| s.is_stuck_helm_release())
    }
}

/// Builds namespace summaries. Shared read-only across workers.
#[derive(Clone)]
pub struct NamespaceAggregator {
    now: DateTime<Utc>,
    owner_lookup: Option<Arc<dyn OwnerLookup>>,
    deprecations: DeprecationRules,
}

impl NamespaceAggregator {
    pub fn new(
        now: DateTime<Utc>,
        owner_lookup: Option<Arc<dyn OwnerLookup>>,
        deprecations: DeprecationRules,
    ) -> Self {
        Self {
            now,
            owner_lookup,
            deprecations,
        }
    }

    pub fn aggregate(&self, namespace: &str, objects: &NamespaceObjects) -> NamespaceSummary {
        let mut summary = NamespaceSummary {
            name: namespace.to_string(),
            ..Default::default()
        };

        for pod in &objects.pods {
            let record = self.pod_record(namespace, pod);

            for image in pod_images(pod) {
                record_image(&mut summary.images, image);
            }
            record_workload(
                &mut summary.workloads,
                &record.owner,
                record.cpu_milli,
                record.memory_bytes,
            );
            summary.status.record(&record.phase, record.crash_looping);
            summary.cpu_milli += record.cpu_milli;
            summary.memory_bytes += record.memory_bytes;
            summary.pods.push(record);
        }

        summary.secrets = objects.secrets.iter().map(secret_summary).collect();
        summary.config_maps = objects
            .config_maps
            .iter()
            .map(|cm| ConfigMapSummary {
                name: cm.metadata.name.clone().unwrap_or_default(),
            })
            .collect();
        summary.virtual_services = objects
            .virtual_services
            .iter()
            .map(virtual_service_summary)
            .collect();

        for (kind, objs, out) in [
            ("Ingress", &objects.ingresses, &mut summary.ingresses),
            ("CronJob", &objects.cron_jobs, &mut summary.cron_jobs),
        ] {
            for obj in objs {
                let name = obj.metadata.name.clone().unwrap_or_default();
                let api_version = obj
                    .types
                    .as_ref()
                    .map(|t| t.api_version.clone())
                    .unwrap_or_default();
                let deprecation = self
                    .deprecations
                    .check(kind, &api_version, namespace, &name);
                out.push(VersionedSummary {
                    name,
                    api_version,
                    deprecated: deprecation.is_some(),
                });
                summary.deprecations.extend(deprecation);
            }
        }

        summary
    }

    fn pod_record(&self, namespace: &str, pod: &Pod) -> PodRecord {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let status = pod.status.as_ref();
        let container_statuses = status
            .and_then(|s| s.container_statuses.as_deref())
            .unwrap_or_default();

        let (cpu_milli, memory_bytes) = pod
            .spec
            .iter()
            .flat_map(|spec| spec.containers.iter())
            .map(|c| {
                let requests = c.resources.as_ref().and_then(|r| r.requests.as_ref());
                (
                    quantity::cpu_from(requests),
                    quantity::bytes_from(requests, "memory"),
                )
            })
            .fold((0, 0), |(cpu, mem), (c, m)| (cpu + c, mem + m));

        let restart_count = container_statuses
            .iter()
            .map(|cs| cs.restart_count)
            .max()
            .unwrap_or(0);

        let pod_start = status.and_then(|s| s.start_time.as_ref()).map(|t| t.0);
        let running_seconds = container_statuses
            .iter()
            .filter_map(|cs| {
                cs.state
                    .as_ref()
                    .and_then(|st| st.running.as_ref())
                    .and_then(|r| r.started_at.as_ref())
                    .map(|t| t.0)
                    .or(pod_start)
            })
            .map(|started| (self.now - started).num_seconds().max(0))
            .max()
            .unwrap_or(0);

        let crash_looping = container_statuses.iter().any(|cs| {
            cs.state
                .as_ref()
                .and_then(|st| st.waiting.as_ref())
                .and_then(|w| w.reason.as_deref())
                == Some("CrashLoopBackOff")
        });

        let owner = pod_owner(pod)
            .map(|(owner_name, owner_kind)| {
                resolve_owner(
                    self.owner_lookup.as_deref(),
                    namespace,
                    owner_name,
                    owner_kind,
                )
            })
            .unwrap_or_else(|| {
                debug!("Pod {}/{} has no owner reference", namespace, name);
                ResolvedOwner::unresolved()
            });

        PodRecord {
            name,
            host_ip: status.and_then(|s| s.host_ip.clone()),
            phase: status
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            crash_looping,
            restart_count,
            running_seconds,
            cpu_milli,
            memory_bytes,
            owner,
        }
    }
}

/// The controlling owner reference, or the first one if none is marked controller.
fn pod_owner(pod: &Pod) -> Option<(&str, &str)> {
    let refs = pod.metadata.owner_references.as_deref()?;
    refs.iter()
        .find(|r| r.controller == Some(true))
        .or_else(|| refs.first())
        .map(|r| (r.name.as_str(), r.kind.as_str()))
}

fn pod_images(pod: &Pod) -> impl Iterator<Item = &str> {
    pod.spec
        .iter()
        .flat_map(|spec| spec.containers.iter())
        .filter_map(|c| c.image.as_deref())
}

fn secret_summary(secret: &Secret) -> SecretSummary {
    let labels = secret.metadata.labels.as_ref();
    let is_helm = secret.type_.as_deref() == Some("helm.sh/release.v1")
        || labels.and_then(|l| l.get("owner")).map(String::as_str) == Some("helm");

    SecretSummary {
        name: secret.metadata.name.clone().unwrap_or_default(),
        helm_status: if is_helm {
            labels.and_then(|l| l.get("status")).cloned()
        } else {
            None
        },
    }
}

fn virtual_service_summary(obj: &DynamicObject) -> VirtualServiceSummary {
    let hosts = obj
        .data
        .get("spec")
        .and_then(|s| s.get("hosts"))
        .and_then(|h| h.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|h| h.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    VirtualServiceSummary {
        name: obj.metadata.name.clone().unwrap_or_default(),
        hosts,
    }
}
