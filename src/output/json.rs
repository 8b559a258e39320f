//! Machine-readable output.

use crate::scan::cluster::ClusterSummary;

/// Pretty JSON array with one entry per scanned context.
pub fn render(summaries: &[ClusterSummary]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(summaries)
}
