//! Language bridges and the per-adapter bridge registry.
//!
//! A [`Bridge`] connects the adapter to one language runtime. The
//! adapter owns its registry; nothing here is global, so two adapters
//! in one process can carry different bridge sets.
//!
//! Bridges are shared `Arc`s because components hold a reference to
//! the bridge serving them. Interior state a bridge keeps (such as
//! [`NativeBridge`] statistics) is its own concern and must be
//! `Send + Sync`.

use crate::component::ComponentConfig;
use crate::error::{AdapterError, Result};
use enclave_types::{ComponentId, Language, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Opaque handle a bridge assigns to a component's runtime instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeHandle(u64);

impl RuntimeHandle {
    /// Creates a handle from a raw value. Only bridges mint these.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime#{}", self.0)
    }
}

/// What a bridge sees when dispatching one invocation.
#[derive(Debug)]
pub struct InvocationContext<'a> {
    /// Component being invoked.
    pub component: &'a ComponentId,
    /// The component's runtime handle from `create_component`.
    pub runtime: RuntimeHandle,
    /// Method name.
    pub method: &'a str,
    /// Arguments, already screened by the pipeline.
    pub args: &'a [Value],
    /// Effective timeout budget in milliseconds. Advisory: the
    /// adapter measures after the call returns.
    pub timeout_ms: u64,
}

/// Contract between the adapter and one language runtime.
///
/// Implementations live outside the adapter except for
/// [`NativeBridge`]. All methods take `&self`; a bridge needing
/// mutable state guards it internally.
pub trait Bridge: Send + Sync {
    /// Language this bridge serves.
    fn language(&self) -> Language;

    /// Human-readable bridge name. Must be non-empty.
    fn name(&self) -> &str;

    /// Bridge version string. Must be non-empty.
    fn version(&self) -> &str;

    /// One-time setup, run at registration. Registration fails if
    /// this fails.
    fn init(&self) -> Result<()>;

    /// Creates the runtime-side instance for a component.
    fn create_component(&self, config: &ComponentConfig) -> Result<RuntimeHandle>;

    /// Dispatches one method invocation.
    fn invoke(&self, ctx: &InvocationContext<'_>) -> Result<Value>;

    /// Tears down a runtime-side instance.
    fn destroy_component(&self, handle: RuntimeHandle) -> Result<()>;

    /// One-time teardown, run at unregistration or adapter shutdown.
    fn shutdown(&self) -> Result<()>;

    /// Converts a host value into the runtime's representation.
    /// Identity unless the runtime needs coercion.
    fn import_value(&self, value: Value) -> Result<Value> {
        Ok(value)
    }

    /// Converts a runtime value back into the host representation.
    fn export_value(&self, value: Value) -> Result<Value> {
        Ok(value)
    }
}

impl fmt::Debug for dyn Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("language", &self.language())
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}

/// Host-provided bridge discovery hook.
///
/// Consulted on a registry miss when auto-discovery is enabled. The
/// adapter never loads libraries itself; a host wanting dynamic
/// bridges supplies a loader that does.
pub trait BridgeLoader: Send {
    /// Searches the given paths for a bridge serving `language`.
    fn discover(&self, paths: &[PathBuf], language: Language) -> Option<Arc<dyn Bridge>>;
}

/// Per-adapter bridge table.
pub struct BridgeRegistry {
    bridges: HashMap<Language, Arc<dyn Bridge>>,
    refs: HashMap<Language, usize>,
    loader: Option<Box<dyn BridgeLoader>>,
    auto_discover: bool,
    search_paths: Vec<PathBuf>,
}

impl fmt::Debug for BridgeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeRegistry")
            .field("languages", &self.available())
            .field("auto_discover", &self.auto_discover)
            .finish()
    }
}

impl BridgeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(auto_discover: bool, search_paths: Vec<PathBuf>) -> Self {
        Self {
            bridges: HashMap::new(),
            refs: HashMap::new(),
            loader: None,
            auto_discover,
            search_paths,
        }
    }

    /// Installs the discovery hook.
    pub fn set_loader(&mut self, loader: Box<dyn BridgeLoader>) {
        self.loader = Some(loader);
    }

    /// Registers a bridge, running its `init`.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for an empty name or version
    /// - `InvalidState` when the language already has a bridge
    /// - whatever `init` returns on failure
    pub fn register(&mut self, bridge: Arc<dyn Bridge>) -> Result<()> {
        if bridge.name().is_empty() || bridge.version().is_empty() {
            return Err(AdapterError::InvalidParameter(
                "bridge name and version must be non-empty".into(),
            ));
        }
        let language = bridge.language();
        if self.bridges.contains_key(&language) {
            return Err(AdapterError::InvalidState(format!(
                "a bridge for {language} is already registered"
            )));
        }

        bridge.init()?;
        info!(%language, name = bridge.name(), version = bridge.version(), "bridge registered");
        self.bridges.insert(language, bridge);
        Ok(())
    }

    /// Resolves the bridge for a language.
    ///
    /// On a miss with auto-discovery enabled, consults the loader
    /// over the configured search paths and registers what it finds.
    ///
    /// # Errors
    ///
    /// `BridgeUnavailable` when no bridge serves the language.
    pub fn get(&mut self, language: Language) -> Result<Arc<dyn Bridge>> {
        if let Some(bridge) = self.bridges.get(&language) {
            return Ok(Arc::clone(bridge));
        }

        if self.auto_discover {
            if let Some(loader) = &self.loader {
                if let Some(bridge) = loader.discover(&self.search_paths, language) {
                    debug!(%language, "bridge discovered");
                    self.register(bridge)?;
                    if let Some(bridge) = self.bridges.get(&language) {
                        return Ok(Arc::clone(bridge));
                    }
                }
            }
        }

        Err(AdapterError::BridgeUnavailable(format!(
            "no bridge registered for {language}"
        )))
    }

    /// Unregisters a language's bridge, running its `shutdown`.
    ///
    /// # Errors
    ///
    /// - `BridgeUnavailable` when no bridge serves the language
    /// - `InvalidState` while components still reference the bridge
    pub fn unregister(&mut self, language: Language) -> Result<()> {
        if !self.bridges.contains_key(&language) {
            return Err(AdapterError::BridgeUnavailable(format!(
                "no bridge registered for {language}"
            )));
        }
        let refs = self.refs.get(&language).copied().unwrap_or(0);
        if refs > 0 {
            return Err(AdapterError::InvalidState(format!(
                "{refs} component(s) still use the {language} bridge"
            )));
        }

        if let Some(bridge) = self.bridges.remove(&language) {
            bridge.shutdown()?;
            info!(%language, "bridge unregistered");
        }
        Ok(())
    }

    /// Languages with a registered bridge.
    #[must_use]
    pub fn available(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self.bridges.keys().copied().collect();
        langs.sort_by_key(|l| l.to_string());
        langs
    }

    /// Records one component using the language's bridge.
    pub fn retain(&mut self, language: Language) {
        *self.refs.entry(language).or_insert(0) += 1;
    }

    /// Records one component no longer using the language's bridge.
    pub fn release(&mut self, language: Language) {
        if let Some(count) = self.refs.get_mut(&language) {
            *count = count.saturating_sub(1);
        }
    }

    /// Runs `shutdown` on every bridge. Used by adapter shutdown,
    /// which has already destroyed all components.
    pub fn shutdown_all(&mut self) {
        for (language, bridge) in self.bridges.drain() {
            if let Err(e) = bridge.shutdown() {
                tracing::warn!(%language, error = %e, "bridge shutdown failed");
            }
        }
        self.refs.clear();
    }
}

/// Per-bridge execution counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Components created through the bridge.
    pub components_created: u64,
    /// Invocations dispatched.
    pub invocations: u64,
    /// Invocations that returned an error.
    pub errors: u64,
    /// Total time spent in `invoke`, in nanoseconds.
    pub total_execution_ns: u64,
}

/// In-process reference bridge for [`Language::Native`].
///
/// Components it hosts have no runtime of their own: every method
/// returns `Null`. It exists so the pipeline has a complete in-tree
/// implementation and so embedders hosting pure-Rust components get
/// bookkeeping for free.
pub struct NativeBridge {
    next_handle: Mutex<u64>,
    stats: Mutex<BridgeStats>,
}

impl NativeBridge {
    /// Creates the bridge.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_handle: Mutex::new(0),
            stats: Mutex::new(BridgeStats::default()),
        }
    }

    /// Snapshot of the execution counters.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        *self.stats.lock()
    }
}

impl Default for NativeBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge for NativeBridge {
    fn language(&self) -> Language {
        Language::Native
    }

    fn name(&self) -> &str {
        "native"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn create_component(&self, _config: &ComponentConfig) -> Result<RuntimeHandle> {
        let mut next = self.next_handle.lock();
        let handle = RuntimeHandle::from_raw(*next);
        *next += 1;
        self.stats.lock().components_created += 1;
        Ok(handle)
    }

    fn invoke(&self, _ctx: &InvocationContext<'_>) -> Result<Value> {
        let start = std::time::Instant::now();
        let mut stats = self.stats.lock();
        stats.invocations += 1;
        stats.total_execution_ns += start.elapsed().as_nanos() as u64;
        Ok(Value::Null)
    }

    fn destroy_component(&self, _handle: RuntimeHandle) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enclave_types::IsolationLevel;

    fn native_config() -> ComponentConfig {
        ComponentConfig::with_defaults(
            ComponentId::new("comp").unwrap(),
            "Component",
            Language::Native,
        )
    }

    #[test]
    fn register_and_get() {
        let mut registry = BridgeRegistry::new(false, vec![]);
        registry.register(Arc::new(NativeBridge::new())).unwrap();

        let bridge = registry.get(Language::Native).unwrap();
        assert_eq!(bridge.language(), Language::Native);
        assert_eq!(registry.available(), vec![Language::Native]);
    }

    #[test]
    fn duplicate_language_rejected() {
        let mut registry = BridgeRegistry::new(false, vec![]);
        registry.register(Arc::new(NativeBridge::new())).unwrap();
        let err = registry.register(Arc::new(NativeBridge::new())).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidState(_)));
    }

    #[test]
    fn missing_bridge_unavailable() {
        let mut registry = BridgeRegistry::new(false, vec![]);
        let err = registry.get(Language::Python).unwrap_err();
        assert!(matches!(err, AdapterError::BridgeUnavailable(_)));
    }

    #[test]
    fn unregister_refused_while_referenced() {
        let mut registry = BridgeRegistry::new(false, vec![]);
        registry.register(Arc::new(NativeBridge::new())).unwrap();
        registry.retain(Language::Native);

        let err = registry.unregister(Language::Native).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidState(_)));

        registry.release(Language::Native);
        assert!(registry.unregister(Language::Native).is_ok());
        assert!(registry.available().is_empty());
    }

    #[test]
    fn auto_discovery_consults_loader() {
        struct NativeLoader;
        impl BridgeLoader for NativeLoader {
            fn discover(
                &self,
                _paths: &[PathBuf],
                language: Language,
            ) -> Option<Arc<dyn Bridge>> {
                (language == Language::Native).then(|| Arc::new(NativeBridge::new()) as _)
            }
        }

        let mut registry = BridgeRegistry::new(true, vec![PathBuf::from("/nowhere")]);
        registry.set_loader(Box::new(NativeLoader));

        assert!(registry.get(Language::Native).is_ok());
        // Discovered bridge is now registered.
        assert_eq!(registry.available(), vec![Language::Native]);
        // Languages the loader declines stay unavailable.
        assert!(registry.get(Language::Jvm).is_err());
    }

    #[test]
    fn native_bridge_counts_activity() {
        let bridge = NativeBridge::new();
        let config = native_config();

        let h1 = bridge.create_component(&config).unwrap();
        let h2 = bridge.create_component(&config).unwrap();
        assert_ne!(h1, h2);

        let id = ComponentId::new("comp").unwrap();
        let ctx = InvocationContext {
            component: &id,
            runtime: h1,
            method: "noop",
            args: &[],
            timeout_ms: 1000,
        };
        assert_eq!(bridge.invoke(&ctx).unwrap(), Value::Null);

        let stats = bridge.stats();
        assert_eq!(stats.components_created, 2);
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn default_value_conversion_is_identity() {
        let bridge = NativeBridge::new();
        let v = Value::Str("x".into());
        assert_eq!(bridge.import_value(v.clone()).unwrap(), v);
        assert_eq!(bridge.export_value(v.clone()).unwrap(), v);
    }

    // Isolation level only matters to the adapter, but the config
    // helper must produce the language default.
    #[test]
    fn config_helper_uses_language_default() {
        let config = native_config();
        assert_eq!(config.policy.isolation, IsolationLevel::Basic);
    }
}
