//! Detection of resources served through removed API versions.

use serde::Serialize;

/// A known API version removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedApi {
    pub kind: &'static str,
    pub api_version: &'static str,
    pub removed_in: &'static str,
}

/// API versions this tool checks for.
pub const REMOVED_APIS: &[RemovedApi] = &[
    RemovedApi {
        kind: "Ingress",
        api_version: "extensions/v1beta1",
        removed_in: "1.22",
    },
    RemovedApi {
        kind: "Ingress",
        api_version: "networking.k8s.io/v1beta1",
        removed_in: "1.22",
    },
    RemovedApi {
        kind: "CronJob",
        api_version: "batch/v1beta1",
        removed_in: "1.25",
    },
];

/// One resource instance found on a removed API version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deprecation {
    pub kind: String,
    pub api_version: String,
    pub namespace: String,
    pub name: String,
    pub removed_in: String,
}

impl Deprecation {
    /// Digest line, e.g. `Ingress networking.k8s.io/v1beta1 gone post 1.22: shop/web`.
    pub fn describe(&self) -> String {
        format!(
            "{} {} gone post {}: {}/{}",
            self.kind, self.api_version, self.removed_in, self.namespace, self.name
        )
    }
}

/// Deprecation detection capability handed to the namespace aggregator.
#[derive(Debug, Clone)]
pub struct DeprecationRules {
    rules: Vec<RemovedApi>,
}

impl Default for DeprecationRules {
    fn default() -> Self {
        Self {
            rules: REMOVED_APIS.to_vec(),
        }
    }
}

impl DeprecationRules {
    /// Check one resource instance against the known removals.
    pub fn check(
        &self,
        kind: &str,
        api_version: &str,
        namespace: &str,
        name: &str,
    ) -> Option<Deprecation> {
        self.rules
            .iter()
            .find(|r| r.kind == kind && r.api_version == api_version)
            .map(|r| Deprecation {
                kind: kind.to_string(),
                api_version: api_version.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
                removed_in: r.removed_in.to_string(),
            })
    }
}
