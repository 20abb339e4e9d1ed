//! Core types for Enclave.
//!
//! This crate provides the shared vocabulary of the Enclave adapter:
//! identifiers, the language-neutral value system, permission flags,
//! isolation levels, and security policies.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SDK Layer                              │
//! │  (External, SemVer stable, safe to depend on)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  enclave-types  : ids, Value, Permission, Policy  ◄── HERE  │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Runtime Layer                            │
//! │  (Internal implementation, NOT for bridges to depend on     │
//! │   beyond the Bridge trait)                                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  enclave-adapter : registry, security, memory, invoke       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Why a separate crate?
//!
//! Bridges for foreign language runtimes live outside this
//! repository. They need the value system and the policy vocabulary,
//! not the adapter internals:
//!
//! - **SemVer stable**: API changes follow semantic versioning
//! - **Minimal dependencies**: serde, thiserror, bitflags only
//! - **Implementation freedom**: the adapter can change without
//!   breaking bridges
//!
//! # Example
//!
//! ```
//! use enclave_types::{ComponentId, IsolationLevel, SecurityPolicy, Value, ValueType};
//!
//! let id = ComponentId::new("ads-module").unwrap();
//! let policy = SecurityPolicy::for_isolation(IsolationLevel::Standard);
//! assert!(policy.validate().is_ok());
//!
//! let arg = Value::Str("hello".into());
//! assert!(arg.matches(ValueType::Str));
//! # let _ = id;
//! ```

mod error;
mod id;
mod language;
mod permission;
mod policy;
mod value;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{
    ComponentId, IdError, RegionId, MAX_COMPONENT_ID_LEN, MAX_COMPONENT_NAME_LEN,
    MAX_METHODS_PER_COMPONENT, MAX_METHOD_NAME_LEN, MAX_PARAMETERS, MAX_VERSION_LEN,
};
pub use language::Language;
pub use permission::{IsolationLevel, Permission};
pub use policy::{PolicyError, SecurityPolicy, MAX_EXECUTION_TIME_MS};
pub use value::{Value, ValueType};
