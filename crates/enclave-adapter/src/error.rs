//! Adapter error types.
//!
//! Every fallible adapter operation returns [`AdapterError`]. The set
//! is closed: bridges and hosts can match exhaustively, and each
//! variant carries a stable machine-readable code via [`ErrorCode`].
//!
//! # Recoverability
//!
//! | Variant | Recoverable | Reason |
//! |---------|-------------|--------|
//! | `Timeout` | yes | retry with a larger budget may succeed |
//! | `InvokeFailed` | yes | guest-side failure, host may retry |
//! | `MemoryAllocation` | yes | pressure may subside after frees |
//! | everything else | no | requires a config, state, or code change |

use enclave_types::ErrorCode;
use thiserror::Error;

/// Result alias used across the adapter crate.
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors produced by adapter operations.
///
/// Variants mirror the security and lifecycle failure surface:
///
/// | Variant | Produced when |
/// |---------|---------------|
/// | [`InvalidParameter`](Self::InvalidParameter) | malformed input to any operation |
/// | [`InvalidState`](Self::InvalidState) | operation illegal in the current state |
/// | [`MemoryAllocation`](Self::MemoryAllocation) | allocation request cannot be satisfied |
/// | [`SecurityViolation`](Self::SecurityViolation) | security engine rejected an operation |
/// | [`PermissionDenied`](Self::PermissionDenied) | caller lacks a required permission |
/// | [`ComponentNotFound`](Self::ComponentNotFound) | unknown component id |
/// | [`BridgeUnavailable`](Self::BridgeUnavailable) | no bridge registered for a language |
/// | [`IsolationBreach`](Self::IsolationBreach) | memory boundary or ceiling crossed |
/// | [`InvokeFailed`](Self::InvokeFailed) | guest method raised an error |
/// | [`LifecycleViolation`](Self::LifecycleViolation) | illegal state transition requested |
/// | [`ConfigurationInvalid`](Self::ConfigurationInvalid) | component or adapter config rejected |
/// | [`Timeout`](Self::Timeout) | invocation exceeded its time budget |
/// | [`NotImplemented`](Self::NotImplemented) | reserved feature reached |
/// | [`Unknown`](Self::Unknown) | bridge reported an unclassifiable failure |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Malformed input to an operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation is illegal in the current adapter or component state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Allocation request cannot be satisfied.
    #[error("memory allocation failed: {0}")]
    MemoryAllocation(String),

    /// The security engine rejected an operation.
    #[error("security violation: {0}")]
    SecurityViolation(String),

    /// The caller lacks a required permission.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No component registered under the given id.
    #[error("component not found: {0}")]
    ComponentNotFound(String),

    /// No bridge registered for the component's language.
    #[error("bridge unavailable: {0}")]
    BridgeUnavailable(String),

    /// A memory boundary or isolation ceiling was crossed.
    #[error("isolation breach: {0}")]
    IsolationBreach(String),

    /// The guest method raised an error.
    #[error("invocation failed: {0}")]
    InvokeFailed(String),

    /// An illegal lifecycle transition was requested.
    #[error("lifecycle violation: {0}")]
    LifecycleViolation(String),

    /// Component or adapter configuration was rejected.
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    /// The invocation exceeded its time budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A reserved feature was reached.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// A bridge reported a failure the adapter cannot classify.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ErrorCode for AdapterError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "ADAPTER_INVALID_PARAMETER",
            Self::InvalidState(_) => "ADAPTER_INVALID_STATE",
            Self::MemoryAllocation(_) => "ADAPTER_MEMORY_ALLOCATION",
            Self::SecurityViolation(_) => "ADAPTER_SECURITY_VIOLATION",
            Self::PermissionDenied(_) => "ADAPTER_PERMISSION_DENIED",
            Self::ComponentNotFound(_) => "ADAPTER_COMPONENT_NOT_FOUND",
            Self::BridgeUnavailable(_) => "ADAPTER_BRIDGE_UNAVAILABLE",
            Self::IsolationBreach(_) => "ADAPTER_ISOLATION_BREACH",
            Self::InvokeFailed(_) => "ADAPTER_INVOKE_FAILED",
            Self::LifecycleViolation(_) => "ADAPTER_LIFECYCLE_VIOLATION",
            Self::ConfigurationInvalid(_) => "ADAPTER_CONFIGURATION_INVALID",
            Self::Timeout(_) => "ADAPTER_TIMEOUT",
            Self::NotImplemented(_) => "ADAPTER_NOT_IMPLEMENTED",
            Self::Unknown(_) => "ADAPTER_UNKNOWN",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::InvokeFailed(_) | Self::MemoryAllocation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enclave_types::assert_error_codes;

    fn all_variants() -> Vec<AdapterError> {
        vec![
            AdapterError::InvalidParameter("x".into()),
            AdapterError::InvalidState("x".into()),
            AdapterError::MemoryAllocation("x".into()),
            AdapterError::SecurityViolation("x".into()),
            AdapterError::PermissionDenied("x".into()),
            AdapterError::ComponentNotFound("x".into()),
            AdapterError::BridgeUnavailable("x".into()),
            AdapterError::IsolationBreach("x".into()),
            AdapterError::InvokeFailed("x".into()),
            AdapterError::LifecycleViolation("x".into()),
            AdapterError::ConfigurationInvalid("x".into()),
            AdapterError::Timeout("x".into()),
            AdapterError::NotImplemented("x".into()),
            AdapterError::Unknown("x".into()),
        ]
    }

    #[test]
    fn error_codes_follow_convention() {
        assert_error_codes(&all_variants(), "ADAPTER_");
    }

    #[test]
    fn codes_are_distinct() {
        let variants = all_variants();
        let mut codes: Vec<_> = variants.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), variants.len());
    }

    #[test]
    fn recoverable_variants() {
        assert!(AdapterError::Timeout("t".into()).is_recoverable());
        assert!(AdapterError::InvokeFailed("i".into()).is_recoverable());
        assert!(AdapterError::MemoryAllocation("m".into()).is_recoverable());

        assert!(!AdapterError::SecurityViolation("s".into()).is_recoverable());
        assert!(!AdapterError::PermissionDenied("p".into()).is_recoverable());
        assert!(!AdapterError::LifecycleViolation("l".into()).is_recoverable());
    }

    #[test]
    fn display_includes_detail() {
        let err = AdapterError::ComponentNotFound("ads-module".into());
        assert_eq!(err.to_string(), "component not found: ads-module");
    }
}
