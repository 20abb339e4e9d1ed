//! Components and their registration configuration.
//!
//! A [`Component`] is the adapter's record of one hosted guest: its
//! identity, lifecycle state, immutable policy, method table, owned
//! regions, statistics, and the bridge serving it. The registry in
//! the adapter owns each `Component` exclusively until
//! unregistration.

use crate::bridge::{Bridge, RuntimeHandle};
use crate::error::{AdapterError, Result};
use crate::invoke::Invocation;
use crate::lifecycle::{check_transition, LifecycleState};
use enclave_types::{
    ComponentId, Language, Permission, RegionId, SecurityPolicy, ValueType,
    MAX_COMPONENT_NAME_LEN, MAX_METHODS_PER_COMPONENT, MAX_METHOD_NAME_LEN, MAX_PARAMETERS,
    MAX_VERSION_LEN,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Declared shape of one invocable method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Method name, unique within the component.
    pub name: String,
    /// Declared parameter types, in order.
    pub params: Vec<ValueType>,
    /// Declared return type.
    pub returns: ValueType,
    /// Permissions the invocation requires beyond `INVOKE_LOCAL`.
    pub required_permissions: Permission,
    /// Per-method timeout in milliseconds. Zero defers to the
    /// adapter default.
    pub max_execution_time_ms: u64,
}

impl MethodSignature {
    /// Validates the signature.
    ///
    /// # Errors
    ///
    /// `ConfigurationInvalid` for a malformed name, too many
    /// parameters, or an out-of-range timeout.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() > MAX_METHOD_NAME_LEN {
            return Err(AdapterError::ConfigurationInvalid(format!(
                "method name empty or over {MAX_METHOD_NAME_LEN} bytes"
            )));
        }
        let mut chars = self.name.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !first_ok || chars.any(|c| !c.is_ascii_alphanumeric() && c != '_') {
            return Err(AdapterError::ConfigurationInvalid(format!(
                "method name {:?} is not a valid identifier",
                self.name
            )));
        }
        if self.params.len() > MAX_PARAMETERS {
            return Err(AdapterError::ConfigurationInvalid(format!(
                "method {:?} declares {} parameters, maximum is {MAX_PARAMETERS}",
                self.name,
                self.params.len()
            )));
        }
        if self.max_execution_time_ms > enclave_types::MAX_EXECUTION_TIME_MS {
            return Err(AdapterError::ConfigurationInvalid(format!(
                "method {:?} timeout {} over the one-hour ceiling",
                self.name, self.max_execution_time_ms
            )));
        }
        Ok(())
    }
}

/// Everything needed to register a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Unique component id.
    pub id: ComponentId,
    /// Display name.
    pub name: String,
    /// Version string, e.g. `"1.2.0"` or `"2.0.0-beta"`.
    pub version: String,
    /// Language tag selecting the bridge.
    pub language: Language,
    /// Security policy. Immutable after registration.
    pub policy: SecurityPolicy,
    /// Invocable methods.
    pub methods: Vec<MethodSignature>,
}

impl ComponentConfig {
    /// Builds a configuration with the language-default policy and no
    /// methods.
    #[must_use]
    pub fn with_defaults(id: ComponentId, name: impl Into<String>, language: Language) -> Self {
        Self {
            id,
            name: name.into(),
            version: "1.0.0".into(),
            language,
            policy: SecurityPolicy::for_isolation(language.default_isolation()),
            methods: Vec::new(),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// `ConfigurationInvalid` for bounded-length breaches, a
    /// malformed version, a rejected policy, duplicate method names,
    /// or an invalid method signature.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() > MAX_COMPONENT_NAME_LEN {
            return Err(AdapterError::ConfigurationInvalid(format!(
                "component name empty or over {MAX_COMPONENT_NAME_LEN} bytes"
            )));
        }
        if !is_valid_version(&self.version) {
            return Err(AdapterError::ConfigurationInvalid(format!(
                "version {:?} is not a valid version string",
                self.version
            )));
        }
        self.policy
            .validate()
            .map_err(|e| AdapterError::ConfigurationInvalid(e.to_string()))?;
        if self.methods.len() > MAX_METHODS_PER_COMPONENT {
            return Err(AdapterError::ConfigurationInvalid(format!(
                "{} methods declared, maximum is {MAX_METHODS_PER_COMPONENT}",
                self.methods.len()
            )));
        }
        for (i, method) in self.methods.iter().enumerate() {
            method.validate()?;
            if self.methods[..i].iter().any(|m| m.name == method.name) {
                return Err(AdapterError::ConfigurationInvalid(format!(
                    "duplicate method name {:?}",
                    method.name
                )));
            }
        }
        Ok(())
    }
}

/// Version strings must contain at least one digit and one dot, and
/// only digits, letters, `.`, `-`, `_`. Accepts `"1.2.3"` and
/// pre-release forms like `"1.0.0-beta"`.
pub fn is_valid_version(version: &str) -> bool {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return false;
    }
    let mut has_digit = false;
    let mut has_dot = false;
    for c in version.chars() {
        if c.is_ascii_digit() {
            has_digit = true;
        } else if c == '.' {
            has_dot = true;
        } else if !c.is_ascii_alphabetic() && c != '-' && c != '_' {
            return false;
        }
    }
    has_digit && has_dot
}

/// Per-component execution counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStats {
    /// Successfully completed invocations.
    pub invocations: u64,
    /// Total guest execution time in nanoseconds.
    pub total_execution_ns: u64,
    /// Bytes the component currently has allocated.
    pub memory_allocated: u64,
    /// Security violations attributed to the component.
    pub violations: u64,
}

impl ComponentStats {
    /// Mean guest execution time, zero before the first invocation.
    #[must_use]
    pub fn average_execution_ns(&self) -> u64 {
        if self.invocations == 0 {
            0
        } else {
            self.total_execution_ns / self.invocations
        }
    }
}

/// Per-component veto hook consulted during invocation screening.
///
/// Runs after the adapter's own checks pass; returning an error
/// refuses the invocation with that error.
pub type SecurityVeto = Box<dyn Fn(&Invocation) -> Result<()> + Send>;

/// A registered component.
pub struct Component {
    /// Unique id.
    pub id: ComponentId,
    /// Display name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Language tag.
    pub language: Language,
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Immutable security policy.
    pub policy: SecurityPolicy,
    /// Method table.
    pub methods: Vec<MethodSignature>,
    /// Regions the component owns.
    pub regions: Vec<RegionId>,
    /// Execution counters.
    pub stats: ComponentStats,
    /// Runtime handle from the bridge, absent until created.
    pub runtime: Option<RuntimeHandle>,
    /// The bridge serving this component.
    pub bridge: Arc<dyn Bridge>,
    /// Optional per-component veto hook.
    pub security_veto: Option<SecurityVeto>,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("language", &self.language)
            .field("state", &self.state)
            .field("methods", &self.methods.len())
            .field("regions", &self.regions.len())
            .finish()
    }
}

impl Component {
    /// Looks up a method by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Applies a lifecycle transition after checking the matrix.
    ///
    /// # Errors
    ///
    /// `LifecycleViolation` when the matrix forbids the move; the
    /// state is left untouched.
    pub fn transition_to(&mut self, to: LifecycleState) -> Result<()> {
        check_transition(self.state, to)?;
        self.state = to;
        Ok(())
    }
}
