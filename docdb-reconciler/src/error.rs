//! Error types for remote calls, configuration and reconciliation.

use std::time::Duration;

use thiserror::Error;

use crate::model::Observed;

/// Classified failure of a single control-plane call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The named resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Retryable network or throttling failure.
    #[error("transient: {0}")]
    Transient(String),

    /// Bad request, authorization failure or conflict.
    #[error("{code}: {message}")]
    Permanent { code: String, message: String },
}

impl RemoteError {
    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError::Permanent {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// Result type for control-plane calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Configuration errors raised while building desired-state records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("unsupported engine '{0}', expected 'docdb'")]
    UnsupportedEngine(String),

    #[error("port {0} is out of range")]
    InvalidPort(u32),

    #[error("unsupported state '{state}' for {kind}")]
    UnsupportedState { kind: &'static str, state: String },

    #[error("unknown tag policy '{0}', expected ignore, reconcile-if-changed or reconcile-always")]
    UnknownTagPolicy(String),

    #[error("invalid manifest: {0}")]
    Manifest(String),
}

/// Fatal failure of a reconciliation invocation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A mutating or describing call failed and was not retried.
    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: RemoteError,
        /// Attempted request, credentials redacted.
        request: Option<serde_json::Value>,
        /// Description held when the call failed.
        last: Option<Observed>,
    },

    /// The resource did not reach the awaited state before the deadline.
    #[error("timed out after {}s waiting for {waited_for}", .timeout.as_secs())]
    TimedOut {
        waited_for: String,
        timeout: Duration,
        last: Option<Observed>,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ReconcileError {
    pub fn remote(operation: &'static str, source: RemoteError) -> Self {
        ReconcileError::Remote {
            operation,
            source,
            request: None,
            last: None,
        }
    }

    /// Remote failure carrying the request that was attempted.
    pub fn remote_with_request<R: serde::Serialize>(
        operation: &'static str,
        source: RemoteError,
        request: &R,
    ) -> Self {
        ReconcileError::Remote {
            operation,
            source,
            request: serde_json::to_value(request).ok(),
            last: None,
        }
    }

    /// Attach the last observed description to a remote failure.
    pub fn with_last(mut self, observed: impl Into<Observed>) -> Self {
        if let ReconcileError::Remote { last, .. } = &mut self {
            *last = Some(observed.into());
        }
        self
    }
}

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_helpers() {
        assert!(RemoteError::Transient("throttled".into()).is_transient());
        assert!(RemoteError::NotFound("c1".into()).is_not_found());
        let perm = RemoteError::permanent("AccessDenied", "no");
        assert!(!perm.is_transient());
        assert!(!perm.is_not_found());
        assert_eq!(perm.to_string(), "AccessDenied: no");
    }

    #[test]
    fn test_timed_out_message() {
        let err = ReconcileError::TimedOut {
            waited_for: "cluster c1 to become available".into(),
            timeout: Duration::from_secs(600),
            last: None,
        };
        assert_eq!(
            err.to_string(),
            "timed out after 600s waiting for cluster c1 to become available"
        );
    }
}
