//! Workload owner resolution.
//!
//! A pod's owner reference points at its direct controller. For Deployment
//! pods that is a ReplicaSet named `<deployment>-<hash>`, so the logical
//! workload has to be derived: either authoritatively from the ReplicaSet's
//! own owner reference, or by stripping the generated suffix.
//!
//! The suffix heuristic cannot tell a generated hash from a workload name
//! that legitimately ends in `-<token>` (e.g. `api-v2` owning ReplicaSet
//! `api-v2-5d4f` resolves correctly, but a ReplicaSet created by hand as
//! `api-v2` resolves to `api`). Only the authoritative lookup avoids that.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use k8s_openapi::api::apps::v1::ReplicaSet;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::KhError;

/// `<body>-<token>` where the token is the generated pod-template hash.
static GENERATED_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-zA-Z-]+)-([0-9a-z]+)$").expect("suffix pattern is valid")
});

/// Name used for the bucket collecting pods whose workload could not be resolved.
pub const UNRESOLVED_WORKLOAD: &str = "<unresolved>";

/// Logical workload kinds that pods are grouped under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum WorkloadKind {
    Deployment,
    ReplicaSet,
    StatefulSet,
    DaemonSet,
    Job,
    Unresolved,
}

impl WorkloadKind {
    /// Owner kinds that already name the logical workload.
    fn from_direct_owner(kind: &str) -> Option<Self> {
        match kind {
            "DaemonSet" => Some(Self::DaemonSet),
            "StatefulSet" => Some(Self::StatefulSet),
            "Job" => Some(Self::Job),
            _ => None,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Deployment => "Deployment",
            Self::ReplicaSet => "ReplicaSet",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::Job => "Job",
            Self::Unresolved => "Unresolved",
        };
        f.write_str(name)
    }
}

/// Resolved logical workload of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOwner {
    pub name: String,
    pub kind: WorkloadKind,
}

impl ResolvedOwner {
    pub fn unresolved() -> Self {
        Self {
            name: UNRESOLVED_WORKLOAD.to_string(),
            kind: WorkloadKind::Unresolved,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.kind != WorkloadKind::Unresolved
    }
}

/// Authoritative lookup of a ReplicaSet's controlling Deployment.
pub trait OwnerLookup: Send + Sync {
    /// Returns the Deployment owning `replica_set`, `Ok(None)` when it has no
    /// Deployment owner, or an error when the lookup itself failed.
    fn deployment_for(&self, namespace: &str, replica_set: &str) -> Result<Option<String>, KhError>;
}

/// Owner lookup backed by a full ReplicaSet listing.
#[derive(Debug, Default)]
pub struct ReplicaSetIndex {
    owners: HashMap<(String, String), Option<String>>,
}

impl ReplicaSetIndex {
    pub fn from_replica_sets(replica_sets: &[ReplicaSet]) -> Self {
        let owners = replica_sets
            .iter()
            .filter_map(|rs| {
                let namespace = rs.metadata.namespace.clone()?;
                let name = rs.metadata.name.clone()?;
                let deployment = rs
                    .metadata
                    .owner_references
                    .as_ref()
                    .and_then(|refs| refs.iter().find(|r| r.kind == "Deployment"))
                    .map(|r| r.name.clone());
                Some(((namespace, name), deployment))
            })
            .collect();
        Self { owners }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }
}

impl OwnerLookup for ReplicaSetIndex {
    fn deployment_for(&self, namespace: &str, replica_set: &str) -> Result<Option<String>, KhError> {
        self.owners
            .get(&(namespace.to_string(), replica_set.to_string()))
            .cloned()
            .ok_or_else(|| {
                KhError::OwnerLookup(format!("ReplicaSet {}/{} not found", namespace, replica_set))
            })
    }
}

/// Resolve a workload from the owner name and kind using naming conventions only.
pub fn resolve_by_convention(owner_name: &str, owner_kind: &str) -> ResolvedOwner {
    if owner_kind == "ReplicaSet" {
        return match GENERATED_SUFFIX.captures(owner_name) {
            Some(caps) => ResolvedOwner {
                name: caps[1].to_string(),
                kind: WorkloadKind::Deployment,
            },
            None => ResolvedOwner::unresolved(),
        };
    }

    match WorkloadKind::from_direct_owner(owner_kind) {
        Some(kind) => ResolvedOwner {
            name: owner_name.to_string(),
            kind,
        },
        None => ResolvedOwner::unresolved(),
    }
}

/// Resolve a workload, preferring the authoritative lookup when one is available.
///
/// Lookup failures fall back to [`resolve_by_convention`].
pub fn resolve_owner(
    lookup: Option<&dyn OwnerLookup>,
    namespace: &str,
    owner_name: &str,
    owner_kind: &str,
) -> ResolvedOwner {
    if owner_kind == "ReplicaSet" {
        if let Some(lookup) = lookup {
            match lookup.deployment_for(namespace, owner_name) {
                Ok(Some(deployment)) => {
                    return ResolvedOwner {
                        name: deployment,
                        kind: WorkloadKind::Deployment,
                    };
                }
                Ok(None) => {
                    return ResolvedOwner {
                        name: owner_name.to_string(),
                        kind: WorkloadKind::ReplicaSet,
                    };
                }
                Err(e) => {
                    debug!("{}, falling back to name heuristic", e);
                }
            }
        }
    }

    resolve_by_convention(owner_name, owner_kind)
}
