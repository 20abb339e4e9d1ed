//! The adapter context: root of the runtime.
//!
//! An [`Adapter`] exclusively owns the security engine, memory
//! manager, bridge registry, component table, and audit log. All
//! mutating operations take `&mut self`; an embedder sharing one
//! adapter across threads wraps it in a `parking_lot::Mutex` and
//! holds the lock around each call. The adapter itself runs no
//! scheduler and never blocks except inside a bridge dispatch.
//!
//! # Example
//!
//! ```
//! use enclave_adapter::{Adapter, AdapterConfig, ComponentConfig};
//! use enclave_types::{ComponentId, Language};
//!
//! let mut adapter = Adapter::new(AdapterConfig::default()).unwrap();
//! let id = ComponentId::new("worker").unwrap();
//! let config = ComponentConfig::with_defaults(id.clone(), "Worker", Language::Native);
//!
//! adapter.register(config).unwrap();
//! assert!(adapter.find(&id).is_ok());
//! adapter.unregister(&id).unwrap();
//! assert!(adapter.find(&id).is_err());
//! ```

use crate::audit::{AuditEvent, AuditKind, AuditLog, AuditSigner};
use crate::bridge::{Bridge, BridgeLoader, BridgeRegistry, NativeBridge};
use crate::component::{Component, ComponentConfig, ComponentStats, SecurityVeto};
use crate::config::AdapterConfig;
use crate::error::{AdapterError, Result};
use crate::lifecycle::LifecycleState;
use crate::memory::{MemoryManager, MemoryStats, OwnerView};
use crate::security::{SecurityContext, SubjectView};
use enclave_types::{ComponentId, ErrorCode, Language, Permission, RegionId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Root runtime context.
///
/// See the [module docs](self) for the ownership and locking model.
pub struct Adapter {
    pub(crate) config: AdapterConfig,
    pub(crate) epoch: Instant,
    pub(crate) security: SecurityContext,
    pub(crate) memory: MemoryManager,
    pub(crate) bridges: BridgeRegistry,
    pub(crate) components: HashMap<ComponentId, Component>,
    /// Registration order, for deterministic shutdown.
    pub(crate) order: Vec<ComponentId>,
    pub(crate) audit: AuditLog,
    pub(crate) initialized: bool,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("components", &self.components.len())
            .field("bridges", &self.bridges.available())
            .field("initialized", &self.initialized)
            .finish()
    }
}

/// Maps an error to the audit kind its refusal is filed under.
pub(crate) fn audit_kind_for(err: &AdapterError) -> AuditKind {
    match err {
        AdapterError::PermissionDenied(_) => AuditKind::PermissionDenied,
        AdapterError::IsolationBreach(_) => AuditKind::IsolationBreach,
        _ => AuditKind::SecurityViolation,
    }
}

impl Adapter {
    /// Creates an adapter from a validated configuration.
    ///
    /// The native bridge is registered up front; other bridges are
    /// the host's to add.
    ///
    /// # Errors
    ///
    /// `ConfigurationInvalid` when the configuration is inconsistent.
    pub fn new(config: AdapterConfig) -> Result<Self> {
        config.validate()?;

        let mut adapter = Self {
            security: SecurityContext::new(
                config.zero_trust,
                config.isolation_enforcement,
                config.audit_all_operations,
                config.max_violations_per_component,
                config.violation_capacity,
            ),
            memory: MemoryManager::new(config.zero_on_free, config.guard_pages),
            bridges: BridgeRegistry::new(
                config.auto_discover_bridges,
                config.bridge_search_paths.clone(),
            ),
            components: HashMap::with_capacity(config.initial_component_capacity),
            order: Vec::with_capacity(config.initial_component_capacity),
            audit: AuditLog::new(config.audit_capacity),
            epoch: Instant::now(),
            initialized: false,
            config,
        };

        adapter.bridges.register(Arc::new(NativeBridge::new()))?;
        adapter.initialized = true;

        let ts = adapter.timestamp_ns();
        adapter.audit.record(AuditEvent {
            kind: AuditKind::StateTransition,
            timestamp_ns: ts,
            component: None,
            method: None,
            error_code: None,
            detail: "adapter initialized".into(),
            tag: None,
        });
        info!(zero_trust = adapter.config.zero_trust, "adapter initialized");
        Ok(adapter)
    }

    /// Nanoseconds since the adapter was created. Monotonic.
    #[must_use]
    pub fn timestamp_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    pub(crate) fn guard_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(AdapterError::InvalidState("adapter not initialized".into()))
        }
    }

    pub(crate) fn record_audit(
        &mut self,
        kind: AuditKind,
        component: Option<ComponentId>,
        method: Option<String>,
        error_code: Option<&'static str>,
        detail: String,
    ) {
        let timestamp_ns = self.timestamp_ns();
        self.audit.record(AuditEvent {
            kind,
            timestamp_ns,
            component,
            method,
            error_code,
            detail,
            tag: None,
        });
    }

    // ------------------------------------------------------------------
    // Component registry
    // ------------------------------------------------------------------

    /// Registers a component and brings it to `Ready`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` before initialization
    /// - `ConfigurationInvalid` for a rejected configuration
    /// - `InvalidParameter` for a duplicate id
    /// - `BridgeUnavailable` when no bridge serves the language
    /// - whatever the bridge's `create_component` returns
    pub fn register(&mut self, config: ComponentConfig) -> Result<()> {
        self.guard_initialized()?;
        config.validate()?;

        if self.components.contains_key(&config.id) {
            return Err(AdapterError::InvalidParameter(format!(
                "component {} already registered",
                config.id
            )));
        }

        let bridge = self.bridges.get(config.language)?;

        let mut component = Component {
            id: config.id.clone(),
            name: config.name,
            version: config.version,
            language: config.language,
            state: LifecycleState::Uninitialized,
            policy: config.policy.clone(),
            methods: config.methods.clone(),
            regions: Vec::new(),
            stats: ComponentStats::default(),
            runtime: None,
            bridge: Arc::clone(&bridge),
            security_veto: None,
        };
        component.transition_to(LifecycleState::Initializing)?;

        let setup = ComponentConfig {
            id: component.id.clone(),
            name: component.name.clone(),
            version: component.version.clone(),
            language: component.language,
            policy: component.policy.clone(),
            methods: component.methods.clone(),
        };
        match bridge.create_component(&setup) {
            Ok(handle) => component.runtime = Some(handle),
            Err(e) => {
                self.record_audit(
                    AuditKind::ComponentCreated,
                    Some(setup.id.clone()),
                    None,
                    Some(e.code()),
                    format!("bridge setup failed: {e}"),
                );
                return Err(e);
            }
        }
        component.transition_to(LifecycleState::Ready)?;

        let id = component.id.clone();
        self.bridges.retain(component.language);
        self.components.insert(id.clone(), component);
        self.order.push(id.clone());

        self.record_audit(
            AuditKind::ComponentCreated,
            Some(id.clone()),
            None,
            None,
            "component registered".into(),
        );
        debug!(component = %id, "registered");
        Ok(())
    }

    /// Unregisters a component, releasing its resources.
    ///
    /// Owned regions are freed through the normal free path, and any
    /// shares the component holds on other components' regions are
    /// revoked first.
    ///
    /// # Errors
    ///
    /// - `ComponentNotFound` for an unknown id
    /// - `LifecycleViolation` when `Cleanup` is not reachable from
    ///   the current state
    /// - `IsolationBreach` while another component still holds a
    ///   share on one of this component's regions: forced revocation
    ///   would break the holder's isolation guarantees
    pub fn unregister(&mut self, id: &ComponentId) -> Result<()> {
        self.guard_initialized()?;
        let component = self
            .components
            .get(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;

        crate::lifecycle::check_transition(component.state, LifecycleState::Cleanup)?;

        if self.memory.external_holders(id) > 0 {
            return Err(AdapterError::IsolationBreach(format!(
                "{id} owns regions still shared with other components"
            )));
        }

        let language = component.language;
        let runtime = component.runtime;
        let bridge = Arc::clone(&component.bridge);

        // Past this point the component is committed to destruction.
        let component = self
            .components
            .get_mut(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        component.transition_to(LifecycleState::Cleanup)?;

        for region in self.memory.shares_held_by(id) {
            if let Err(e) = self.memory.revoke_share(id, region) {
                warn!(component = %id, %region, error = %e, "share revocation failed");
            }
        }
        for region in self.memory.regions_of(id) {
            self.memory.free(id, region)?;
        }

        // A failing bridge must not strand the component in Cleanup;
        // teardown always runs to completion.
        if let Some(handle) = runtime {
            if let Err(e) = bridge.destroy_component(handle) {
                warn!(component = %id, error = %e, "bridge destroy failed");
            }
        }
        self.bridges.release(language);

        let component = self
            .components
            .get_mut(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        component.regions.clear();
        component.transition_to(LifecycleState::Destroyed)?;

        self.components.remove(id);
        self.order.retain(|c| c != id);
        self.security.untrust(id);

        self.record_audit(
            AuditKind::ComponentDestroyed,
            Some(id.clone()),
            None,
            None,
            "component unregistered".into(),
        );
        debug!(component = %id, "unregistered");
        Ok(())
    }

    /// Looks up a component.
    ///
    /// # Errors
    ///
    /// `ComponentNotFound` for an unknown id.
    pub fn find(&self, id: &ComponentId) -> Result<&Component> {
        self.components
            .get(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))
    }

    /// Number of registered components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Execution counters for a component.
    ///
    /// # Errors
    ///
    /// `ComponentNotFound` for an unknown id.
    pub fn component_stats(&self, id: &ComponentId) -> Result<ComponentStats> {
        Ok(self.find(id)?.stats)
    }

    /// Installs a per-component security veto hook.
    ///
    /// # Errors
    ///
    /// `ComponentNotFound` for an unknown id.
    pub fn set_security_veto(&mut self, id: &ComponentId, veto: SecurityVeto) -> Result<()> {
        let component = self
            .components
            .get_mut(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        component.security_veto = Some(veto);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle surface
    // ------------------------------------------------------------------

    fn transition(&mut self, id: &ComponentId, to: LifecycleState) -> Result<()> {
        self.guard_initialized()?;
        let component = self
            .components
            .get_mut(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        let from = component.state;
        component.transition_to(to)?;
        self.record_audit(
            AuditKind::StateTransition,
            Some(id.clone()),
            None,
            None,
            format!("{from} -> {to}"),
        );
        Ok(())
    }

    /// Suspends a `Ready` component.
    ///
    /// # Errors
    ///
    /// `LifecycleViolation` from any other state.
    pub fn suspend(&mut self, id: &ComponentId) -> Result<()> {
        self.transition(id, LifecycleState::Suspended)
    }

    /// Resumes a `Suspended` component.
    ///
    /// # Errors
    ///
    /// `LifecycleViolation` from any other state.
    pub fn resume(&mut self, id: &ComponentId) -> Result<()> {
        self.transition(id, LifecycleState::Ready)
    }

    /// Resets a component out of `Error` back to `Ready`.
    ///
    /// Violation counters are deliberately untouched: a reset clears
    /// the state, not the record.
    ///
    /// # Errors
    ///
    /// `LifecycleViolation` from any state other than `Error`.
    pub fn reset(&mut self, id: &ComponentId) -> Result<()> {
        self.guard_initialized()?;
        let component = self
            .components
            .get_mut(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        if component.state != LifecycleState::Error {
            return Err(AdapterError::LifecycleViolation(format!(
                "reset requires error state, component is {}",
                component.state
            )));
        }
        component.transition_to(LifecycleState::Ready)?;
        self.record_audit(
            AuditKind::StateTransition,
            Some(id.clone()),
            None,
            None,
            "error -> ready (reset)".into(),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Trust surface
    // ------------------------------------------------------------------

    /// Adds a registered component to the trust list.
    ///
    /// # Errors
    ///
    /// `ComponentNotFound` for an unknown id.
    pub fn trust(&mut self, id: &ComponentId) -> Result<()> {
        self.find(id)?;
        self.security.trust(id.clone());
        Ok(())
    }

    /// Removes a component from the trust list.
    pub fn untrust(&mut self, id: &ComponentId) {
        self.security.untrust(id);
    }

    /// Violations recorded against a component (retained entries
    /// only).
    #[must_use]
    pub fn violations_for(&self, id: &ComponentId) -> u32 {
        self.security.violations_for(id)
    }

    // ------------------------------------------------------------------
    // Memory surface
    // ------------------------------------------------------------------

    pub(crate) fn subject_view<'a>(component: &'a Component, allocated: u64) -> SubjectView<'a> {
        SubjectView {
            id: &component.id,
            isolation: component.policy.isolation,
            allowed: component.policy.allowed,
            allocated_bytes: allocated,
            max_memory_bytes: component.policy.max_memory_bytes,
        }
    }

    fn owner_view<'a>(component: &'a Component) -> OwnerView<'a> {
        OwnerView {
            id: &component.id,
            isolation: component.policy.isolation,
            allowed: component.policy.allowed,
            max_memory_bytes: component.policy.max_memory_bytes,
        }
    }

    fn audit_refusal(&mut self, id: &ComponentId, err: &AdapterError, operation: &str) {
        self.record_audit(
            audit_kind_for(err),
            Some(id.clone()),
            None,
            Some(err.code()),
            format!("{operation}: {err}"),
        );
    }

    /// Runs the security engine for a memory-surface operation and
    /// audits the outcome. Refusals are always audited; passes are
    /// audited when audit-all is configured and the component's
    /// policy has auditing enabled.
    pub(crate) fn security_gate(&mut self, id: &ComponentId, operation: &'static str) -> Result<()> {
        let ts = self.timestamp_ns();
        let allocated = self.memory.usage_of(id);

        let component = self
            .components
            .get(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        let audit_pass = component.policy.audit_enabled;
        let subject = Self::subject_view(component, allocated);
        if let Err(e) = self.security.validate(&subject, operation, ts) {
            self.audit_refusal(id, &e, operation);
            return Err(e);
        }
        if self.security.audit_all() && audit_pass {
            self.record_audit(
                AuditKind::SecurityValidated,
                Some(id.clone()),
                None,
                None,
                format!("{operation} validated"),
            );
        }
        Ok(())
    }

    /// Allocates an isolated region owned by `id`.
    ///
    /// # Errors
    ///
    /// Security-engine refusals, `PermissionDenied` without
    /// `MEMORY_WRITE`, `IsolationBreach` over the component's
    /// ceiling.
    pub fn allocate(
        &mut self,
        id: &ComponentId,
        size: usize,
        permissions: Permission,
    ) -> Result<RegionId> {
        self.guard_initialized()?;
        self.security_gate(id, "memory_allocate")?;

        let component = self
            .components
            .get(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        let region = match self.memory.allocate(&Self::owner_view(component), size, permissions) {
            Ok(region) => region,
            Err(e) => {
                self.audit_refusal(id, &e, "memory_allocate");
                return Err(e);
            }
        };

        let component = self
            .components
            .get_mut(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        component.regions.push(region);
        component.stats.memory_allocated += size as u64;

        self.record_audit(
            AuditKind::MemoryAllocated,
            Some(id.clone()),
            None,
            None,
            format!("{region}: {size} bytes"),
        );
        Ok(region)
    }

    /// Frees a region owned by `id`, or drops one reference while
    /// shares remain.
    ///
    /// # Errors
    ///
    /// Security-engine refusals, `PermissionDenied` for a non-owner,
    /// `InvalidParameter` for an unknown region.
    pub fn free(&mut self, id: &ComponentId, region: RegionId) -> Result<()> {
        self.guard_initialized()?;
        self.security_gate(id, "memory_free")?;

        let size = self.memory.region(region).map_or(0, |r| r.size as u64);
        if let Err(e) = self.memory.free(id, region) {
            self.audit_refusal(id, &e, "memory_free");
            return Err(e);
        }
        let fully_freed = self.memory.region(region).is_none();

        let component = self
            .components
            .get_mut(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        if fully_freed {
            component.regions.retain(|r| *r != region);
            component.stats.memory_allocated =
                component.stats.memory_allocated.saturating_sub(size);
        }

        self.record_audit(
            AuditKind::MemoryFreed,
            Some(id.clone()),
            None,
            None,
            format!("{region}: {}", if fully_freed { "released" } else { "reference dropped" }),
        );
        Ok(())
    }

    /// Shares a region owned by `source` with `target` under the
    /// given (possibly narrower) permissions.
    ///
    /// # Errors
    ///
    /// Security-engine refusals, ownership and policy
    /// `PermissionDenied`, `IsolationBreach` when either party runs
    /// at `Paranoid` isolation.
    pub fn share(
        &mut self,
        source: &ComponentId,
        target: &ComponentId,
        region: RegionId,
        permissions: Permission,
    ) -> Result<()> {
        self.guard_initialized()?;
        self.security_gate(source, "memory_share")?;

        let src = self
            .components
            .get(source)
            .ok_or_else(|| AdapterError::ComponentNotFound(source.to_string()))?;
        let dst = self
            .components
            .get(target)
            .ok_or_else(|| AdapterError::ComponentNotFound(target.to_string()))?;
        if let Err(e) = self.memory.share(
            &Self::owner_view(src),
            &Self::owner_view(dst),
            region,
            permissions,
        ) {
            self.audit_refusal(source, &e, "memory_share");
            return Err(e);
        }

        self.record_audit(
            AuditKind::MemoryShared,
            Some(target.clone()),
            None,
            None,
            format!("{region} shared by {source}"),
        );
        Ok(())
    }

    /// Validates an access by `id` to a range of a region.
    ///
    /// # Errors
    ///
    /// `IsolationBreach` when the boundary refuses the access.
    pub fn validate_access(
        &mut self,
        id: &ComponentId,
        region: RegionId,
        offset: usize,
        len: usize,
        permissions: Permission,
    ) -> Result<()> {
        self.guard_initialized()?;
        self.find(id)?;
        if let Err(e) = self.memory.validate_access(id, region, offset, len, permissions) {
            self.audit_refusal(id, &e, "memory_access");
            return Err(e);
        }
        Ok(())
    }

    /// Lifetime memory counters.
    #[must_use]
    pub fn memory_stats(&self) -> MemoryStats {
        self.memory.stats()
    }

    // ------------------------------------------------------------------
    // Bridge surface
    // ------------------------------------------------------------------

    /// Registers a language bridge.
    ///
    /// # Errors
    ///
    /// See [`BridgeRegistry::register`].
    pub fn register_bridge(&mut self, bridge: Arc<dyn Bridge>) -> Result<()> {
        self.guard_initialized()?;
        self.bridges.register(bridge)
    }

    /// Unregisters a language's bridge.
    ///
    /// # Errors
    ///
    /// `InvalidState` while components of that language remain
    /// registered; see [`BridgeRegistry::unregister`].
    pub fn unregister_bridge(&mut self, language: Language) -> Result<()> {
        self.guard_initialized()?;
        self.bridges.unregister(language)
    }

    /// Languages with a registered bridge.
    #[must_use]
    pub fn available_bridges(&self) -> Vec<Language> {
        self.bridges.available()
    }

    /// Installs the bridge discovery hook.
    pub fn set_bridge_loader(&mut self, loader: Box<dyn BridgeLoader>) {
        self.bridges.set_loader(loader);
    }

    // ------------------------------------------------------------------
    // Audit surface
    // ------------------------------------------------------------------

    /// Iterates retained audit events, oldest first.
    pub fn audit_events(&self) -> impl Iterator<Item = &AuditEvent> {
        self.audit.events()
    }

    /// Audit events evicted to make room.
    #[must_use]
    pub fn audit_dropped(&self) -> u64 {
        self.audit.dropped()
    }

    /// Installs a keyed audit-integrity signer.
    pub fn set_audit_signer(&mut self, signer: AuditSigner) {
        self.audit.set_signer(signer);
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Shuts the adapter down, destroying remaining components in
    /// reverse registration order and closing every bridge.
    ///
    /// Consuming `self` makes a second cleanup unrepresentable.
    pub fn shutdown(mut self) {
        let ids: Vec<ComponentId> = self.order.iter().rev().cloned().collect();
        for id in ids {
            // Components stuck outside a Cleanup-legal state are
            // forced through Error first so teardown can proceed.
            if let Some(component) = self.components.get_mut(&id) {
                if !component.state.can_transition_to(LifecycleState::Cleanup)
                    && component.state.can_transition_to(LifecycleState::Error)
                {
                    let _ = component.transition_to(LifecycleState::Error);
                }
            }
            if let Err(e) = self.unregister(&id) {
                warn!(component = %id, error = %e, "shutdown: unregister failed");
            }
        }
        self.bridges.shutdown_all();
        self.initialized = false;
        info!("adapter shut down");
    }
}
