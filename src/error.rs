//! Error types for the firewall engine.

use thiserror::Error;

/// Failures the engine can surface to callers.
///
/// Each variant maps to a distinct process exit code so scripts can tell
/// "no firewall tool" apart from "needs sudo" apart from "a rule operation
/// failed halfway".
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no usable firewall backend found (install iptables or nftables)")]
    NoBackendAvailable,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{operation}: {detail}")]
    BackendOperationFailed { operation: String, detail: String },

    #[error("server data unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("state store unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl EngineError {
    /// Exit code contract: 0 success, 2 backend failure, 3 no backend,
    /// 4 permission denied, 1 everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::BackendOperationFailed { .. } => 2,
            EngineError::NoBackendAvailable => 3,
            EngineError::PermissionDenied(_) => 4,
            EngineError::ProviderUnavailable(_) | EngineError::PersistenceUnavailable(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let backend = EngineError::BackendOperationFailed {
            operation: "add rule".to_string(),
            detail: "iptables: bad rule".to_string(),
        };
        let codes = [
            backend.exit_code(),
            EngineError::NoBackendAvailable.exit_code(),
            EngineError::PermissionDenied("sudo declined".to_string()).exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4]);
    }

    #[test]
    fn test_backend_failure_carries_operation_and_diagnostic() {
        let err = EngineError::BackendOperationFailed {
            operation: "remove rule".to_string(),
            detail: "No chain/target/match by that name".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("remove rule"));
        assert!(msg.contains("No chain/target/match"));
    }
}
