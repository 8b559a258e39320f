//! Visual severity tiers.
//!
//! Thresholds map report values to a semantic tier; only the renderer turns
//! a tier into a colour.

use colored::{ColoredString, Colorize};

use crate::scan::aggregate::StatusHistogram;
use crate::scan::node::{NodeAnnotation, NodeWarning};

/// Pod requests above this much memory are highlighted.
pub const POD_MEMORY_WARN_BYTES: u64 = 1024 * 1024 * 1024;
/// Pod requests above this much CPU are highlighted.
pub const POD_CPU_WARN_MILLI: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Good,
    Warning,
    Error,
}

impl Severity {
    pub fn paint(self, text: &str) -> ColoredString {
        match self {
            Severity::Good => text.green(),
            Severity::Warning => text.yellow(),
            Severity::Error => text.red(),
        }
    }

    /// `tier` when `count` is non-zero, otherwise good.
    pub fn when_nonzero(count: usize, tier: Severity) -> Severity {
        if count == 0 { Severity::Good } else { tier }
    }
}

pub fn pod_phase(phase: &str, crash_looping: bool) -> Severity {
    if crash_looping {
        return Severity::Error;
    }
    match phase {
        "Running" | "Succeeded" => Severity::Good,
        "Pending" | "Failed" => Severity::Error,
        _ => Severity::Warning,
    }
}

pub fn pod_requests(cpu_milli: u64, memory_bytes: u64) -> Severity {
    if memory_bytes > POD_MEMORY_WARN_BYTES || cpu_milli > POD_CPU_WARN_MILLI {
        Severity::Warning
    } else {
        Severity::Good
    }
}

pub fn restarts(count: i32, limit: i32) -> Severity {
    if count >= limit {
        Severity::Warning
    } else {
        Severity::Good
    }
}

/// Whole-histogram tier: anything pending, failed or crash-looping is an error.
pub fn histogram(status: &StatusHistogram) -> Severity {
    if status.pending > 0 || status.failed > 0 || status.crash_looping > 0 {
        Severity::Error
    } else {
        Severity::Good
    }
}

pub fn node(annotation: &NodeAnnotation) -> Severity {
    annotation
        .warnings
        .iter()
        .map(|w| match w {
            NodeWarning::NotReady | NodeWarning::DiskPressure => Severity::Error,
            _ => Severity::Warning,
        })
        .max()
        .unwrap_or(Severity::Good)
}
