//! Mergeable aggregates shared by the namespace and cluster folds.
//!
//! Every merge here is commutative and associative, so namespace summaries
//! can be folded into cluster totals in any order.

use std::collections::BTreeMap;

use serde::Serialize;

use super::image::{ImageRef, parse_image};
use super::owner::{ResolvedOwner, WorkloadKind};

/// Pod lifecycle distribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusHistogram {
    pub running: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub crash_looping: usize,
    pub other: usize,
}

impl StatusHistogram {
    /// Count one pod. A crash-looping pod is counted only in that bucket.
    pub fn record(&mut self, phase: &str, crash_looping: bool) {
        if crash_looping {
            self.crash_looping += 1;
            return;
        }
        match phase {
            "Running" => self.running += 1,
            "Pending" => self.pending += 1,
            "Succeeded" | "Completed" => self.completed += 1,
            "Failed" => self.failed += 1,
            _ => self.other += 1,
        }
    }

    pub fn merge(&mut self, other: &StatusHistogram) {
        self.running += other.running;
        self.pending += other.pending;
        self.completed += other.completed;
        self.failed += other.failed;
        self.crash_looping += other.crash_looping;
        self.other += other.other;
    }

    pub fn total(&self) -> usize {
        self.running + self.pending + self.completed + self.failed + self.crash_looping + self.other
    }
}

/// One distinct image reference and how many containers use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageAggregate {
    pub reference: String,
    #[serde(flatten)]
    pub image: ImageRef,
    pub count: usize,
}

/// Record one sighting of `reference` in an image map.
pub fn record_image(images: &mut BTreeMap<String, ImageAggregate>, reference: &str) {
    images
        .entry(reference.to_string())
        .and_modify(|agg| agg.count += 1)
        .or_insert_with(|| ImageAggregate {
            reference: reference.to_string(),
            image: parse_image(reference),
            count: 1,
        });
}

/// Fold `other` into `into`, summing counts per reference.
pub fn merge_images(
    into: &mut BTreeMap<String, ImageAggregate>,
    other: &BTreeMap<String, ImageAggregate>,
) {
    for (reference, agg) in other {
        into.entry(reference.clone())
            .and_modify(|existing| existing.count += agg.count)
            .or_insert_with(|| agg.clone());
    }
}

/// One logical workload and the requests of its pods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadAggregate {
    pub name: String,
    pub kind: WorkloadKind,
    pub pods: usize,
    pub cpu_milli: u64,
    pub memory_bytes: u64,
}

impl WorkloadAggregate {
    fn merge(&mut self, other: &WorkloadAggregate) {
        self.pods += other.pods;
        self.cpu_milli += other.cpu_milli;
        self.memory_bytes += other.memory_bytes;
        // Same name under different kinds: keep the lowest so fold order is irrelevant.
        self.kind = self.kind.min(other.kind);
    }
}

/// Record one pod against its resolved workload.
pub fn record_workload(
    workloads: &mut BTreeMap<String, WorkloadAggregate>,
    owner: &ResolvedOwner,
    cpu_milli: u64,
    memory_bytes: u64,
) {
    let pod = WorkloadAggregate {
        name: owner.name.clone(),
        kind: owner.kind,
        pods: 1,
        cpu_milli,
        memory_bytes,
    };
    workloads
        .entry(owner.name.clone())
        .and_modify(|agg| agg.merge(&pod))
        .or_insert(pod);
}

/// Fold `other` into `into`, keyed by workload name.
pub fn merge_workloads(
    into: &mut BTreeMap<String, WorkloadAggregate>,
    other: &BTreeMap<String, WorkloadAggregate>,
) {
    for (name, agg) in other {
        into.entry(name.clone())
            .and_modify(|existing| existing.merge(agg))
            .or_insert_with(|| agg.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(name: &str, kind: WorkloadKind) -> ResolvedOwner {
        ResolvedOwner {
            name: name.to_string(),
            kind,
        }
    }

    #[test]
    fn test_histogram_buckets() {
        let mut hist = StatusHistogram::default();
        for phase in ["Running", "Running", "Pending", "Succeeded", "Failed", "Unknown"] {
            hist.record(phase, false);
        }
        hist.record("Running", true);
        assert_eq!(hist.running, 2);
        assert_eq!(hist.pending, 1);
        assert_eq!(hist.completed, 1);
        assert_eq!(hist.failed, 1);
        assert_eq!(hist.crash_looping, 1);
        assert_eq!(hist.other, 1);
        assert_eq!(hist.total(), 7);
    }

    #[test]
    fn test_histogram_zero_is_identity() {
        let mut hist = StatusHistogram::default();
        hist.record("Running", false);
        let before = hist;
        hist.merge(&StatusHistogram::default());
        assert_eq!(hist, before);
    }

    #[test]
    fn test_record_image_counts_sightings() {
        let mut images = BTreeMap::new();
        record_image(&mut images, "repo.io/team/app:1.0");
        record_image(&mut images, "repo.io/team/app:1.0");
        record_image(&mut images, "broken");
        assert_eq!(images["repo.io/team/app:1.0"].count, 2);
        assert_eq!(images["repo.io/team/app:1.0"].image.name, "app");
        assert_eq!(images["broken"].count, 1);
        assert!(!images["broken"].image.is_parsed());
    }

    #[test]
    fn test_merge_images_sums_counts() {
        let mut a = BTreeMap::new();
        record_image(&mut a, "repo.io/x:1");
        let mut b = BTreeMap::new();
        record_image(&mut b, "repo.io/x:1");
        record_image(&mut b, "repo.io/x:1");
        record_image(&mut b, "repo.io/y:2");
        merge_images(&mut a, &b);
        assert_eq!(a["repo.io/x:1"].count, 3);
        assert_eq!(a["repo.io/y:2"].count, 1);
    }

    #[test]
    fn test_record_workload_sums_requests() {
        let mut workloads = BTreeMap::new();
        let checkout = owner("checkout", WorkloadKind::Deployment);
        record_workload(&mut workloads, &checkout, 250, 1024);
        record_workload(&mut workloads, &checkout, 250, 1024);
        let agg = &workloads["checkout"];
        assert_eq!(agg.pods, 2);
        assert_eq!(agg.cpu_milli, 500);
        assert_eq!(agg.memory_bytes, 2048);
    }

    #[test]
    fn test_merge_workloads_kind_conflict_is_order_independent() {
        let mut a = BTreeMap::new();
        record_workload(&mut a, &owner("db", WorkloadKind::StatefulSet), 100, 0);
        let mut b = BTreeMap::new();
        record_workload(&mut b, &owner("db", WorkloadKind::Deployment), 100, 0);

        let mut ab = a.clone();
        merge_workloads(&mut ab, &b);
        let mut ba = b.clone();
        merge_workloads(&mut ba, &a);
        assert_eq!(ab, ba);
        assert_eq!(ab["db"].pods, 2);
    }
}
