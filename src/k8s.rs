//! Kubernetes API access: client construction and resource listing.

pub mod client;
pub mod inventory;
pub mod source;
