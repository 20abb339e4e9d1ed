//! Append-only audit log.
//!
//! Every security-relevant operation records an [`AuditEvent`]. The
//! log is a fixed-capacity ring: when full, the oldest event is
//! dropped and a counter is bumped so hosts can detect the loss
//! instead of silently missing history.
//!
//! An optional [`AuditSigner`] lets hosts attach a keyed integrity
//! tag to each event. The adapter never interprets the tag.

use enclave_types::ComponentId;
use std::collections::VecDeque;

/// Kind of audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Component registered and brought to Ready.
    ComponentCreated,
    /// Component unregistered and destroyed.
    ComponentDestroyed,
    /// Method invocation completed (success or failure).
    MethodInvoked,
    /// Memory region allocated.
    MemoryAllocated,
    /// Memory region freed.
    MemoryFreed,
    /// Memory region shared between components.
    MemoryShared,
    /// Lifecycle state transition applied.
    StateTransition,
    /// Security validation passed, recorded when audit-all is on.
    SecurityValidated,
    /// Security engine recorded a violation.
    SecurityViolation,
    /// Operation refused for a missing permission.
    PermissionDenied,
    /// Memory boundary or ceiling crossed.
    IsolationBreach,
}

/// A single audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Kind of operation.
    pub kind: AuditKind,
    /// Monotonic timestamp in nanoseconds since adapter start.
    pub timestamp_ns: u64,
    /// Component the event concerns, if any.
    pub component: Option<ComponentId>,
    /// Method name for invocation events.
    pub method: Option<String>,
    /// Stable error code when the operation failed.
    pub error_code: Option<&'static str>,
    /// Free-form detail.
    pub detail: String,
    /// Host-supplied integrity tag, if a signer is installed.
    pub tag: Option<u64>,
}

/// Host-supplied keyed integrity hook.
///
/// Called once per recorded event with the event's fields already
/// filled in (except `tag`). The returned value is stored verbatim.
pub type AuditSigner = Box<dyn Fn(&AuditEvent) -> u64 + Send>;

/// Fixed-capacity audit ring.
pub struct AuditLog {
    events: VecDeque<AuditEvent>,
    capacity: usize,
    dropped: u64,
    signer: Option<AuditSigner>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("len", &self.events.len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

impl AuditLog {
    /// Creates an empty log with the given ring capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
            signer: None,
        }
    }

    /// Installs a keyed integrity signer. Events recorded from now on
    /// carry its tag.
    pub fn set_signer(&mut self, signer: AuditSigner) {
        self.signer = Some(signer);
    }

    /// Records an event, evicting the oldest when the ring is full.
    pub fn record(&mut self, mut event: AuditEvent) {
        if let Some(signer) = &self.signer {
            event.tag = Some(signer(&event));
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Iterates retained events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &AuditEvent> {
        self.events.iter()
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events evicted to make room.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
