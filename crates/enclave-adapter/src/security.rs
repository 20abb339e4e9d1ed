//! Zero-Trust security engine.
//!
//! Every privileged operation passes through
//! [`SecurityContext::validate`] before it runs. Validation applies
//! five checks in a fixed order and stops at the first failure,
//! recording a [`Violation`] and returning the failure's specific
//! error:
//!
//! 1. **Trust**: under zero-trust, an untrusted component must have
//!    no recorded violations and at least `Standard` isolation.
//! 2. **Threshold**: a component over its violation budget is
//!    refused outright.
//! 3. **Rule**: the operation's [`PermissionRule`] must be satisfied,
//!    meaning required permissions granted and minimum isolation met.
//! 4. **Boundary**: the isolation level inferred from the operation
//!    name must be met, and memory operations must stay under the
//!    component's allocation ceiling.
//! 5. **Zero-trust extras**: the per-context nonce advances, and a
//!    component carrying violations below `Strict` isolation is
//!    rejected.
//!
//! Passing all five means the operation may proceed. The engine never
//! mutates component state; it only records violations and hands the
//! decision back.

use crate::error::{AdapterError, Result};
use enclave_types::{ComponentId, IsolationLevel, Permission};
use std::collections::{HashSet, VecDeque};
use tracing::warn;

/// A permission rule binding an operation name to its requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionRule {
    /// Operation name checked against [`SecurityContext::validate`].
    pub operation: &'static str,
    /// Permissions the component must hold.
    pub required: Permission,
    /// Minimum isolation level the component must run at.
    pub min_isolation: IsolationLevel,
}

/// The closed rule table. Operations not listed here are refused.
pub const RULES: [PermissionRule; 8] = [
    PermissionRule {
        operation: "memory_allocate",
        required: Permission::MEMORY_WRITE,
        min_isolation: IsolationLevel::Basic,
    },
    PermissionRule {
        operation: "memory_free",
        required: Permission::MEMORY_WRITE,
        min_isolation: IsolationLevel::Basic,
    },
    PermissionRule {
        operation: "memory_share",
        required: Permission::MEMORY_READ.union(Permission::MEMORY_WRITE),
        min_isolation: IsolationLevel::Standard,
    },
    PermissionRule {
        operation: "component_invoke_local",
        required: Permission::INVOKE_LOCAL,
        min_isolation: IsolationLevel::Basic,
    },
    PermissionRule {
        operation: "component_invoke_remote",
        required: Permission::INVOKE_REMOTE.union(Permission::NETWORK),
        min_isolation: IsolationLevel::Strict,
    },
    PermissionRule {
        operation: "file_access",
        required: Permission::FILE_ACCESS,
        min_isolation: IsolationLevel::Standard,
    },
    PermissionRule {
        operation: "network_access",
        required: Permission::NETWORK,
        min_isolation: IsolationLevel::Strict,
    },
    PermissionRule {
        operation: "privileged_operation",
        required: Permission::PRIVILEGED,
        min_isolation: IsolationLevel::Paranoid,
    },
];

/// Looks up the rule for an operation name.
#[must_use]
pub fn rule_for(operation: &str) -> Option<&'static PermissionRule> {
    RULES.iter().find(|r| r.operation == operation)
}

/// Kind of a recorded security violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Untrusted component failed the zero-trust entry check.
    TrustFailure,
    /// Violation budget exhausted.
    ThresholdExceeded,
    /// Operation not in the rule table.
    UnknownOperation,
    /// Required permission missing.
    PermissionDenied,
    /// Isolation level below the required minimum.
    IsolationInsufficient,
    /// Memory boundary or ceiling crossed.
    BoundaryViolation,
    /// Rejected by the zero-trust post-checks.
    ZeroTrustRejection,
}

/// A recorded security violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Component that triggered the violation.
    pub component: ComponentId,
    /// What kind of check failed.
    pub kind: ViolationKind,
    /// Monotonic timestamp in nanoseconds since adapter start.
    pub timestamp_ns: u64,
    /// Free-form detail.
    pub detail: String,
}

/// The security engine's view of the component under validation.
///
/// A borrowed projection so the engine stays decoupled from the
/// component registry.
#[derive(Debug, Clone, Copy)]
pub struct SubjectView<'a> {
    /// Component id.
    pub id: &'a ComponentId,
    /// Isolation level from the component's policy.
    pub isolation: IsolationLevel,
    /// Permissions granted by the component's policy.
    pub allowed: Permission,
    /// Bytes the component currently has allocated.
    pub allocated_bytes: u64,
    /// The component's allocation ceiling.
    pub max_memory_bytes: u64,
}

/// Zero-Trust security engine state.
pub struct SecurityContext {
    zero_trust: bool,
    isolation_enforcement: bool,
    audit_all: bool,
    max_violations_per_component: u32,
    trusted: HashSet<ComponentId>,
    violations: VecDeque<Violation>,
    violation_capacity: usize,
    violations_dropped: u64,
    nonce: u64,
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("zero_trust", &self.zero_trust)
            .field("trusted", &self.trusted.len())
            .field("violations", &self.violations.len())
            .field("nonce", &self.nonce)
            .finish()
    }
}

impl SecurityContext {
    /// Creates a new engine.
    #[must_use]
    pub fn new(
        zero_trust: bool,
        isolation_enforcement: bool,
        audit_all: bool,
        max_violations_per_component: u32,
        violation_capacity: usize,
    ) -> Self {
        Self {
            zero_trust,
            isolation_enforcement,
            audit_all,
            max_violations_per_component,
            trusted: HashSet::new(),
            violations: VecDeque::with_capacity(violation_capacity),
            violation_capacity,
            violations_dropped: 0,
            nonce: 0,
        }
    }

    /// Whether passing operations should also be audited.
    #[must_use]
    pub fn audit_all(&self) -> bool {
        self.audit_all
    }

    /// Marks a component as trusted, exempting it from the zero-trust
    /// entry check.
    pub fn trust(&mut self, id: ComponentId) {
        self.trusted.insert(id);
    }

    /// Revokes trust.
    pub fn untrust(&mut self, id: &ComponentId) {
        self.trusted.remove(id);
    }

    /// Whether the component is on the trust list.
    #[must_use]
    pub fn is_trusted(&self, id: &ComponentId) -> bool {
        self.trusted.contains(id)
    }

    /// Violations recorded for a component.
    ///
    /// Counts only retained ring entries; evicted violations are not
    /// reflected, so the count can understate long-running abuse. The
    /// drop counter is the tell.
    #[must_use]
    pub fn violations_for(&self, id: &ComponentId) -> u32 {
        self.violations
            .iter()
            .filter(|v| &v.component == id)
            .count() as u32
    }

    /// Iterates retained violations, oldest first.
    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    /// Number of violations evicted from the ring.
    #[must_use]
    pub fn violations_dropped(&self) -> u64 {
        self.violations_dropped
    }

    /// Current nonce value. Advances on every zero-trust validation.
    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    fn record(
        &mut self,
        subject: &SubjectView<'_>,
        kind: ViolationKind,
        timestamp_ns: u64,
        detail: String,
    ) {
        warn!(component = %subject.id, ?kind, %detail, "security violation");
        if self.violations.len() == self.violation_capacity {
            self.violations.pop_front();
            self.violations_dropped += 1;
        }
        self.violations.push_back(Violation {
            component: subject.id.clone(),
            kind,
            timestamp_ns,
            detail,
        });
    }

    /// Validates an operation for a component.
    ///
    /// Runs the five checks in order; the first failure records a
    /// violation and returns that check's error.
    ///
    /// # Errors
    ///
    /// `SecurityViolation`, `PermissionDenied`, or `IsolationBreach`
    /// depending on which check failed.
    pub fn validate(
        &mut self,
        subject: &SubjectView<'_>,
        operation: &str,
        timestamp_ns: u64,
    ) -> Result<()> {
        // 1. Trust.
        if self.zero_trust && !self.trusted.contains(subject.id) {
            if self.violations_for(subject.id) > 0 {
                let detail = format!("untrusted component with violations: {operation}");
                self.record(subject, ViolationKind::TrustFailure, timestamp_ns, detail.clone());
                return Err(AdapterError::SecurityViolation(detail));
            }
            if subject.isolation < IsolationLevel::Standard {
                let detail = format!(
                    "untrusted component below standard isolation ({}): {operation}",
                    subject.isolation
                );
                self.record(subject, ViolationKind::TrustFailure, timestamp_ns, detail.clone());
                return Err(AdapterError::SecurityViolation(detail));
            }
        }

        // 2. Threshold.
        if self.violations_for(subject.id) >= self.max_violations_per_component {
            let detail = format!(
                "violation budget exhausted ({} recorded): {operation}",
                self.violations_for(subject.id)
            );
            self.record(
                subject,
                ViolationKind::ThresholdExceeded,
                timestamp_ns,
                detail.clone(),
            );
            return Err(AdapterError::SecurityViolation(detail));
        }

        // 3. Rule.
        let Some(rule) = rule_for(operation) else {
            let detail = format!("operation not in rule table: {operation}");
            self.record(
                subject,
                ViolationKind::UnknownOperation,
                timestamp_ns,
                detail.clone(),
            );
            return Err(AdapterError::SecurityViolation(detail));
        };
        if !subject.allowed.contains(rule.required) {
            let missing = rule.required.difference(subject.allowed);
            let detail = format!("{operation} requires {missing}");
            self.record(
                subject,
                ViolationKind::PermissionDenied,
                timestamp_ns,
                detail.clone(),
            );
            return Err(AdapterError::PermissionDenied(detail));
        }
        if subject.isolation < rule.min_isolation {
            let detail = format!(
                "{operation} requires isolation {} or above, component at {}",
                rule.min_isolation, subject.isolation
            );
            self.record(
                subject,
                ViolationKind::IsolationInsufficient,
                timestamp_ns,
                detail.clone(),
            );
            return Err(AdapterError::SecurityViolation(detail));
        }

        // 4. Boundary. Skipped entirely when isolation enforcement is
        // disabled.
        if self.isolation_enforcement {
            if let Some(inferred) = infer_isolation(operation) {
                if subject.isolation < inferred {
                    let detail = format!(
                        "{operation} crosses a {inferred} boundary, component at {}",
                        subject.isolation
                    );
                    self.record(
                        subject,
                        ViolationKind::BoundaryViolation,
                        timestamp_ns,
                        detail.clone(),
                    );
                    return Err(AdapterError::IsolationBreach(detail));
                }
            }
            if operation.contains("memory") && subject.allocated_bytes > subject.max_memory_bytes {
                let detail = format!(
                    "allocation {} over ceiling {}: {operation}",
                    subject.allocated_bytes, subject.max_memory_bytes
                );
                self.record(
                    subject,
                    ViolationKind::BoundaryViolation,
                    timestamp_ns,
                    detail.clone(),
                );
                return Err(AdapterError::IsolationBreach(detail));
            }
        }

        // 5. Zero-trust extras.
        if self.zero_trust {
            self.nonce = self.nonce.wrapping_add(1);
            if self.violations_for(subject.id) > 0 && subject.isolation < IsolationLevel::Strict {
                let detail = format!(
                    "component with violations below strict isolation: {operation}"
                );
                self.record(
                    subject,
                    ViolationKind::ZeroTrustRejection,
                    timestamp_ns,
                    detail.clone(),
                );
                return Err(AdapterError::SecurityViolation(detail));
            }
        }

        Ok(())
    }
}

/// Infers a minimum isolation boundary from the operation name.
///
/// Memory operations demand `Standard`, file and network operations
/// `Strict`, privileged operations `Paranoid`. Keyword order matters:
/// `privileged` wins over `network`, which wins over `memory`.
///
/// Matching is deliberately by substring: any operation whose name
/// merely contains a keyword picks up the stricter boundary.
pub fn infer_isolation(operation: &str) -> Option<IsolationLevel> {
    if operation.contains("privileged") {
        Some(IsolationLevel::Paranoid)
    } else if operation.contains("network") || operation.contains("file") {
        Some(IsolationLevel::Strict)
    } else if operation.contains("memory") {
        Some(IsolationLevel::Standard)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject<'a>(
        id: &'a ComponentId,
        isolation: IsolationLevel,
        allowed: Permission,
    ) -> SubjectView<'a> {
        SubjectView {
            id,
            isolation,
            allowed,
            allocated_bytes: 0,
            max_memory_bytes: 512 * 1024,
        }
    }

    fn engine() -> SecurityContext {
        SecurityContext::new(true, true, false, 3, 16)
    }

    #[test]
    fn rule_table_covers_eight_operations() {
        assert_eq!(RULES.len(), 8);
        assert!(rule_for("memory_allocate").is_some());
        assert!(rule_for("privileged_operation").is_some());
        assert!(rule_for("does_not_exist").is_none());
    }

    #[test]
    fn invoke_local_passes_with_permission() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = engine();
        let view = subject(
            &id,
            IsolationLevel::Standard,
            Permission::INVOKE_LOCAL | Permission::MEMORY_READ,
        );
        assert!(ctx.validate(&view, "component_invoke_local", 0).is_ok());
        assert_eq!(ctx.violations_for(&id), 0);
    }

    #[test]
    fn missing_permission_denied_and_recorded() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = engine();
        let view = subject(&id, IsolationLevel::Standard, Permission::MEMORY_READ);

        let err = ctx.validate(&view, "network_access", 0).unwrap_err();
        assert!(matches!(err, AdapterError::PermissionDenied(_)));
        assert_eq!(ctx.violations_for(&id), 1);
    }

    #[test]
    fn isolation_below_rule_minimum_rejected() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = SecurityContext::new(false, false, false, 3, 16);
        // Basic isolation, but memory_share demands Standard.
        let view = subject(
            &id,
            IsolationLevel::Basic,
            Permission::MEMORY_READ | Permission::MEMORY_WRITE,
        );
        let err = ctx.validate(&view, "memory_share", 0).unwrap_err();
        assert!(matches!(err, AdapterError::SecurityViolation(_)));
    }

    #[test]
    fn unknown_operation_rejected() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = engine();
        let view = subject(&id, IsolationLevel::Standard, Permission::all());
        let err = ctx.validate(&view, "format_disk", 0).unwrap_err();
        assert!(matches!(err, AdapterError::SecurityViolation(_)));
        assert_eq!(ctx.violations_for(&id), 1);
    }

    #[test]
    fn untrusted_below_standard_rejected_under_zero_trust() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = engine();
        let view = subject(&id, IsolationLevel::Basic, Permission::all());
        let err = ctx.validate(&view, "component_invoke_local", 0).unwrap_err();
        assert!(matches!(err, AdapterError::SecurityViolation(_)));
        assert_eq!(ctx.violations_for(&id), 1);
    }

    #[test]
    fn trusted_component_skips_entry_check() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = engine();
        ctx.trust(id.clone());
        // Basic isolation would fail the untrusted entry check;
        // trust exempts it. invoke_local infers no extra boundary.
        let view = subject(&id, IsolationLevel::Basic, Permission::all());
        assert!(ctx.validate(&view, "component_invoke_local", 0).is_ok());
    }

    #[test]
    fn boundary_enforcement_gates_memory_at_basic() {
        let id = ComponentId::new("comp").unwrap();

        // With enforcement, a Basic component cannot touch memory
        // operations even when fully permitted and trusted.
        let mut strict = SecurityContext::new(true, true, false, 3, 16);
        strict.trust(id.clone());
        let view = subject(&id, IsolationLevel::Basic, Permission::all());
        let err = strict.validate(&view, "memory_allocate", 0).unwrap_err();
        assert!(matches!(err, AdapterError::IsolationBreach(_)));

        // With enforcement off, the same operation passes.
        let mut lax = SecurityContext::new(true, false, false, 3, 16);
        lax.trust(id.clone());
        assert!(lax.validate(&view, "memory_allocate", 0).is_ok());
    }

    #[test]
    fn untrusted_with_prior_violation_refused() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = engine();
        let view = subject(&id, IsolationLevel::Standard, Permission::empty());

        // First attempt records a permission violation.
        assert!(ctx.validate(&view, "memory_allocate", 0).is_err());
        assert_eq!(ctx.violations_for(&id), 1);

        // Any further operation from the untrusted component is now a
        // trust failure, and each refusal records another violation.
        let rich = subject(&id, IsolationLevel::Standard, Permission::all());
        let err = ctx.validate(&rich, "component_invoke_local", 1).unwrap_err();
        assert!(matches!(err, AdapterError::SecurityViolation(_)));
        assert_eq!(ctx.violations_for(&id), 2);
    }

    #[test]
    fn threshold_refuses_repeat_offender() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = SecurityContext::new(false, false, false, 2, 16);
        let view = subject(&id, IsolationLevel::Standard, Permission::empty());

        assert!(ctx.validate(&view, "memory_allocate", 0).is_err());
        assert!(ctx.validate(&view, "memory_allocate", 1).is_err());
        assert_eq!(ctx.violations_for(&id), 2);

        // Budget of 2 reached; even a fully-permitted operation is
        // refused at the threshold check.
        let rich = subject(&id, IsolationLevel::Standard, Permission::all());
        let err = ctx.validate(&rich, "component_invoke_local", 2).unwrap_err();
        assert!(matches!(err, AdapterError::SecurityViolation(_)));
    }

    #[test]
    fn memory_ceiling_checked_for_memory_operations() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = SecurityContext::new(false, true, false, 10, 16);
        let view = SubjectView {
            id: &id,
            isolation: IsolationLevel::Standard,
            allowed: Permission::all(),
            allocated_bytes: 600 * 1024,
            max_memory_bytes: 512 * 1024,
        };
        let err = ctx.validate(&view, "memory_allocate", 0).unwrap_err();
        assert!(matches!(err, AdapterError::IsolationBreach(_)));

        // Non-memory operations ignore the allocation figure.
        assert!(ctx.validate(&view, "component_invoke_local", 1).is_ok());
    }

    #[test]
    fn boundary_inference_from_operation_name() {
        assert_eq!(infer_isolation("memory_allocate"), Some(IsolationLevel::Standard));
        assert_eq!(infer_isolation("network_access"), Some(IsolationLevel::Strict));
        assert_eq!(infer_isolation("file_access"), Some(IsolationLevel::Strict));
        assert_eq!(
            infer_isolation("privileged_operation"),
            Some(IsolationLevel::Paranoid)
        );
        assert_eq!(infer_isolation("component_invoke_local"), None);
    }

    #[test]
    fn nonce_advances_on_zero_trust_validation() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = engine();
        ctx.trust(id.clone());
        let view = subject(&id, IsolationLevel::Standard, Permission::all());

        assert_eq!(ctx.nonce(), 0);
        ctx.validate(&view, "component_invoke_local", 0).unwrap();
        assert_eq!(ctx.nonce(), 1);
        ctx.validate(&view, "component_invoke_local", 1).unwrap();
        assert_eq!(ctx.nonce(), 2);
    }

    #[test]
    fn violation_ring_evicts_and_counts() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = SecurityContext::new(false, false, false, 100, 2);
        let view = subject(&id, IsolationLevel::Standard, Permission::empty());

        for ts in 0..3 {
            let _ = ctx.validate(&view, "memory_allocate", ts);
        }
        assert_eq!(ctx.violations().count(), 2);
        assert_eq!(ctx.violations_dropped(), 1);
        // Retained-only count.
        assert_eq!(ctx.violations_for(&id), 2);
    }

    #[test]
    fn untrust_revokes() {
        let id = ComponentId::new("comp").unwrap();
        let mut ctx = engine();
        ctx.trust(id.clone());
        assert!(ctx.is_trusted(&id));
        ctx.untrust(&id);
        assert!(!ctx.is_trusted(&id));
    }
}
