//! Output formatting module.

pub mod format;
pub mod json;
pub mod report;
pub mod severity;

pub use report::{ReportOptions, print_report};
