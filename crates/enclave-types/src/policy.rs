//! Per-component security policy.
//!
//! A [`SecurityPolicy`] is fixed at registration and never loosened
//! afterwards. The adapter owns its copy, so a component cannot widen
//! its own permissions at runtime.
//!
//! # Defaults
//!
//! [`SecurityPolicy::for_isolation`] derives a policy from an
//! isolation level:
//!
//! | Level | Allowed | Memory ceiling |
//! |-------|---------|----------------|
//! | `None` | all | unbounded |
//! | `Basic` | `MEMORY_READ \| MEMORY_WRITE \| INVOKE_LOCAL` | 1 MiB |
//! | `Standard` | `MEMORY_READ \| INVOKE_LOCAL` | 512 KiB |
//! | `Strict` | `MEMORY_READ` | 256 KiB |
//! | `Paranoid` | none | 128 KiB |
//!
//! The denied set is always the complement of the allowed set, so the
//! two partition the permission space.
//!
//! ```
//! use enclave_types::{IsolationLevel, Permission, SecurityPolicy};
//!
//! let policy = SecurityPolicy::for_isolation(IsolationLevel::Standard);
//! assert!(policy.allowed.contains(Permission::MEMORY_READ));
//! assert!(policy.denied.contains(Permission::NETWORK));
//! assert!(policy.validate().is_ok());
//! ```

use crate::{IsolationLevel, Permission};
use serde::{Deserialize, Serialize};

/// Upper bound on a policy's execution-time ceiling, one hour.
pub const MAX_EXECUTION_TIME_MS: u64 = 3_600_000;

/// Security policy attached to a component at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Isolation level applied to the component.
    pub isolation: IsolationLevel,
    /// Permissions the component may exercise.
    pub allowed: Permission,
    /// Permissions explicitly denied. Must be disjoint from `allowed`.
    pub denied: Permission,
    /// Ceiling on a single invocation's wall time in milliseconds.
    pub max_execution_time_ms: u64,
    /// Ceiling on the component's cumulative allocated memory in bytes.
    pub max_memory_bytes: u64,
    /// Whether operations by this component are audited when they pass.
    pub audit_enabled: bool,
    /// Whether the bridge should apply stack protection.
    pub stack_protection: bool,
    /// Whether the bridge should apply heap protection.
    pub heap_protection: bool,
}

impl SecurityPolicy {
    /// Derives the default policy for an isolation level.
    #[must_use]
    pub fn for_isolation(isolation: IsolationLevel) -> Self {
        let (allowed, max_memory_bytes) = match isolation {
            IsolationLevel::None => (Permission::all(), u64::MAX),
            IsolationLevel::Basic => (
                Permission::MEMORY_READ | Permission::MEMORY_WRITE | Permission::INVOKE_LOCAL,
                1024 * 1024,
            ),
            IsolationLevel::Standard => (
                Permission::MEMORY_READ | Permission::INVOKE_LOCAL,
                512 * 1024,
            ),
            IsolationLevel::Strict => (Permission::MEMORY_READ, 256 * 1024),
            IsolationLevel::Paranoid => (Permission::empty(), 128 * 1024),
        };

        Self {
            isolation,
            allowed,
            denied: allowed.complement(),
            max_execution_time_ms: 30_000,
            max_memory_bytes,
            audit_enabled: true,
            stack_protection: isolation >= IsolationLevel::Standard,
            heap_protection: isolation >= IsolationLevel::Strict,
        }
    }

    /// Validates internal consistency.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] when the allowed and denied sets
    /// overlap, the memory ceiling is zero, or the execution-time
    /// ceiling falls outside `[1, 3_600_000]` milliseconds.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let overlap = self.allowed & self.denied;
        if !overlap.is_empty() {
            return Err(PolicyError::OverlappingSets { overlap });
        }

        if self.max_memory_bytes == 0 {
            return Err(PolicyError::ZeroMemoryCeiling);
        }

        if self.max_execution_time_ms == 0 || self.max_execution_time_ms > MAX_EXECUTION_TIME_MS {
            return Err(PolicyError::ExecutionTimeOutOfRange {
                ms: self.max_execution_time_ms,
            });
        }

        Ok(())
    }
}

impl Default for SecurityPolicy {
    /// The `Standard` isolation defaults.
    fn default() -> Self {
        Self::for_isolation(IsolationLevel::Standard)
    }
}

/// Error produced by [`SecurityPolicy::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Allowed and denied sets share at least one flag.
    #[error("allowed and denied sets overlap on {overlap}")]
    OverlappingSets {
        /// The shared flags.
        overlap: Permission,
    },

    /// Memory ceiling is zero, which would forbid all allocation
    /// while still claiming MEMORY_WRITE capability.
    #[error("max_memory_bytes must be greater than zero")]
    ZeroMemoryCeiling,

    /// Execution-time ceiling outside the accepted range.
    #[error("max_execution_time_ms {ms} outside [1, {}]", MAX_EXECUTION_TIME_MS)]
    ExecutionTimeOutOfRange {
        /// The rejected value.
        ms: u64,
    },
}
