//! Custom error types for kh.

use thiserror::Error;

/// Errors that can occur while scanning a cluster.
#[derive(Error, Debug)]
pub enum KhError {
    #[error("Kubeconfig error: {0}")]
    Kubeconfig(String),

    #[error("[{context}] cannot connect to cluster: {message}")]
    Connection { context: String, message: String },

    #[error("Failed to list {kind}: {message}")]
    Listing { kind: String, message: String },

    #[error("Credentials rejected while listing {kind}: {message}")]
    Unauthorized { kind: String, message: String },

    #[error("Owner lookup failed: {0}")]
    OwnerLookup(String),

    #[error("Namespace worker failed: {0}")]
    Worker(String),
}

impl KhError {
    /// Classify a kube client error raised while listing one resource kind.
    ///
    /// The session was already established by `probe`, so only rejected
    /// credentials (401) are fatal here. Everything else (403 from RBAC,
    /// 404 for a missing CRD, timeouts, decode errors) degrades that kind.
    pub fn from_listing(kind: &str, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 401 => KhError::Unauthorized {
                kind: kind.to_string(),
                message: resp.message.clone(),
            },
            _ => KhError::Listing {
                kind: kind.to_string(),
                message: err.to_string(),
            },
        }
    }

    /// Whether this error must abort the scan of the current cluster.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KhError::Kubeconfig(_) | KhError::Connection { .. } | KhError::Unauthorized { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {}", code),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn test_error_display_listing() {
        let err = KhError::Listing {
            kind: "virtualservices".to_string(),
            message: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to list virtualservices: not found");
    }

    #[test]
    fn test_error_display_connection() {
        let err = KhError::Connection {
            context: "prod".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "[prod] cannot connect to cluster: connection refused"
        );
    }

    #[test]
    fn test_from_listing_not_found_is_degraded() {
        let err = KhError::from_listing("virtualservices", api_error(404));
        assert!(matches!(err, KhError::Listing { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_from_listing_forbidden_is_degraded() {
        let err = KhError::from_listing("secrets", api_error(403));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_from_listing_unauthorized_is_fatal() {
        let err = KhError::from_listing("pods", api_error(401));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_from_listing_unauthorized_names_kind() {
        let err = KhError::from_listing("pods", api_error(401));
        assert!(matches!(err, KhError::Unauthorized { .. }));
        assert_eq!(
            err.to_string(),
            "Credentials rejected while listing pods: status 401"
        );
    }

    #[test]
    fn test_from_listing_timeout_is_degraded() {
        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out");
        let err = KhError::from_listing("virtualservices", kube::Error::ReadEvents(timeout));
        assert!(matches!(err, KhError::Listing { ref kind, .. } if kind == "virtualservices"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_worker_error_not_fatal() {
        assert!(!KhError::Worker("panicked".to_string()).is_fatal());
        assert!(KhError::Kubeconfig("missing".to_string()).is_fatal());
    }
}
