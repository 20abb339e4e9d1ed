//! Component isolation and invocation runtime.
//!
//! This crate hosts foreign components behind strict isolation
//! boundaries and mediates every interaction with them: lifecycle,
//! memory, invocation, and audit.
//!
//! ```text
//!                      +--------------------+
//!                      |      Adapter       |
//!                      +---------+----------+
//!                                |
//!        +-----------+-----------+-----------+-----------+
//!        |           |           |           |           |
//!   +----v----+ +----v-----+ +--v-------+ +-v--------+ +v--------+
//!   |component| | security | |  memory  | | bridges  | |  audit  |
//!   | registry| |  engine  | | manager  | | registry | |   log   |
//!   +---------+ +----------+ +----------+ +----------+ +---------+
//! ```
//!
//! | Concern    | Entry points |
//! |------------|--------------|
//! | Registry   | [`Adapter::register`], [`Adapter::unregister`], [`Adapter::find`] |
//! | Lifecycle  | [`Adapter::suspend`], [`Adapter::resume`], [`Adapter::reset`] |
//! | Invocation | [`Adapter::invoke`], [`Adapter::call`], [`Adapter::invoke_batch`] |
//! | Memory     | [`Adapter::allocate`], [`Adapter::free`], [`Adapter::share`] |
//! | Bridges    | [`Adapter::register_bridge`], [`Bridge`] |
//! | Audit      | [`Adapter::audit_events`], [`AuditEvent`] |
//!
//! Every mutating entry point takes `&mut self`; wrap the adapter in
//! a `parking_lot::Mutex` to share it across threads.
//!
//! # Example
//!
//! ```
//! use enclave_adapter::{Adapter, AdapterConfig, ComponentConfig};
//! use enclave_types::{ComponentId, Language};
//!
//! let mut adapter = Adapter::new(AdapterConfig::default())?;
//! let id = ComponentId::new("greeter")?;
//! adapter.register(ComponentConfig::with_defaults(
//!     id.clone(),
//!     "Greeter",
//!     Language::Native,
//! ))?;
//! # adapter.unregister(&id)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod adapter;
mod audit;
mod bridge;
mod component;
mod config;
mod error;
mod invoke;
mod lifecycle;
mod memory;
mod security;

pub use adapter::Adapter;
pub use audit::{AuditEvent, AuditKind, AuditLog, AuditSigner};
pub use bridge::{
    Bridge, BridgeLoader, BridgeRegistry, BridgeStats, InvocationContext, NativeBridge,
    RuntimeHandle,
};
pub use component::{
    is_valid_version, Component, ComponentConfig, ComponentStats, MethodSignature, SecurityVeto,
};
pub use config::{AdapterConfig, BRIDGE_PATH_ENV};
pub use error::{AdapterError, Result};
pub use invoke::{BatchError, ExecutionModel, Invocation, InvokeOutcome};
pub use lifecycle::{check_transition, LifecycleState};
pub use memory::{Boundary, MemoryManager, MemoryStats, OwnerView, Region};
pub use security::{
    infer_isolation, rule_for, PermissionRule, SecurityContext, SubjectView, Violation,
    ViolationKind, RULES,
};
