//! Adapter configuration.
//!
//! An [`AdapterConfig`] is fixed at [`Adapter::new`] and never changes
//! afterwards. Serde support lets hosts load it from JSON alongside
//! their own configuration.
//!
//! [`Adapter::new`]: crate::Adapter::new

use crate::error::{AdapterError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable appended to the bridge search paths by
/// [`AdapterConfig::with_env_paths`].
pub const BRIDGE_PATH_ENV: &str = "ENCLAVE_BRIDGE_PATH";

/// Global adapter configuration.
///
/// The defaults encode the Zero-Trust posture: untrusted until
/// proven otherwise, everything audited on failure, memory zeroed on
/// free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Treat every component as untrusted until explicitly trusted.
    pub zero_trust: bool,
    /// Apply isolation-boundary checks to validated operations.
    pub isolation_enforcement: bool,
    /// Audit successful operations as well as failures.
    pub audit_all_operations: bool,
    /// Capacity of the audit ring buffer.
    pub audit_capacity: usize,
    /// Capacity of the security-violation ring buffer.
    pub violation_capacity: usize,
    /// Initial capacity of the component table. The table grows past
    /// this on demand.
    pub initial_component_capacity: usize,
    /// Violations a component may accumulate before further
    /// operations are refused.
    pub max_violations_per_component: u32,
    /// Zero region contents when freed.
    pub zero_on_free: bool,
    /// Mark regions guarded for components at Strict isolation or
    /// above.
    pub guard_pages: bool,
    /// Invocation timeout applied when neither the invocation nor the
    /// method signature carries one, in milliseconds.
    pub default_timeout_ms: u64,
    /// Consult the bridge loader when a bridge is missing.
    pub auto_discover_bridges: bool,
    /// Directories the bridge loader searches.
    pub bridge_search_paths: Vec<PathBuf>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            zero_trust: true,
            isolation_enforcement: true,
            audit_all_operations: false,
            audit_capacity: 1024,
            violation_capacity: 1024,
            initial_component_capacity: 32,
            max_violations_per_component: 3,
            zero_on_free: true,
            guard_pages: true,
            default_timeout_ms: 5_000,
            auto_discover_bridges: false,
            bridge_search_paths: vec![
                PathBuf::from("/usr/local/lib/enclave/bridges"),
                PathBuf::from("./bridges"),
            ],
        }
    }
}

impl AdapterConfig {
    /// Parses a configuration from JSON.
    ///
    /// Absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` when the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| AdapterError::ConfigurationInvalid(format!("config json: {e}")))
    }

    /// Appends paths from the `ENCLAVE_BRIDGE_PATH` environment
    /// variable (colon-separated) to the bridge search paths.
    #[must_use]
    pub fn with_env_paths(mut self) -> Self {
        if let Ok(raw) = std::env::var(BRIDGE_PATH_ENV) {
            for part in raw.split(':').filter(|p| !p.is_empty()) {
                self.bridge_search_paths.push(PathBuf::from(part));
            }
        }
        self
    }

    /// Validates configuration consistency.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` when a capacity is zero or the
    /// default timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.audit_capacity == 0 {
            return Err(AdapterError::ConfigurationInvalid(
                "audit_capacity must be greater than zero".into(),
            ));
        }
        if self.violation_capacity == 0 {
            return Err(AdapterError::ConfigurationInvalid(
                "violation_capacity must be greater than zero".into(),
            ));
        }
        if self.initial_component_capacity == 0 {
            return Err(AdapterError::ConfigurationInvalid(
                "initial_component_capacity must be greater than zero".into(),
            ));
        }
        if self.default_timeout_ms == 0 {
            return Err(AdapterError::ConfigurationInvalid(
                "default_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_zero_trust() {
        let config = AdapterConfig::default();
        assert!(config.zero_trust);
        assert!(config.isolation_enforcement);
        assert!(config.zero_on_free);
        assert!(config.guard_pages);
        assert!(!config.audit_all_operations);
        assert_eq!(config.audit_capacity, 1024);
        assert_eq!(config.initial_component_capacity, 32);
        assert_eq!(config.max_violations_per_component, 3);
        assert_eq!(config.default_timeout_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_json_partial() {
        let config = AdapterConfig::from_json(r#"{"zero_trust": false, "audit_capacity": 16}"#)
            .expect("parse");
        assert!(!config.zero_trust);
        assert_eq!(config.audit_capacity, 16);
        // Unspecified fields keep their defaults.
        assert_eq!(config.default_timeout_ms, 5_000);
    }

    #[test]
    fn from_json_malformed() {
        assert!(AdapterConfig::from_json("{not json").is_err());
    }

    #[test]
    fn validate_rejects_zero_capacities() {
        let mut config = AdapterConfig::default();
        config.audit_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AdapterConfig::default();
        config.violation_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AdapterConfig::default();
        config.default_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_paths_appended() {
        // Temporary env mutation; test runs are process-wide so use a
        // dedicated variable value and restore afterwards.
        let prev = std::env::var(BRIDGE_PATH_ENV).ok();
        std::env::set_var(BRIDGE_PATH_ENV, "/opt/bridges:/home/x/bridges");

        let config = AdapterConfig::default().with_env_paths();
        assert!(config
            .bridge_search_paths
            .contains(&PathBuf::from("/opt/bridges")));
        assert!(config
            .bridge_search_paths
            .contains(&PathBuf::from("/home/x/bridges")));

        match prev {
            Some(v) => std::env::set_var(BRIDGE_PATH_ENV, v),
            None => std::env::remove_var(BRIDGE_PATH_ENV),
        }
    }
}
