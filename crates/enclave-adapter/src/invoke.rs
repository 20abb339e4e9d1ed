//! Method invocation pipeline.
//!
//! An invocation moves through fixed stages:
//!
//! ```text
//!   guard -> Executing -> validate -> security -> prepare
//!         -> execute -> timeout check -> result check -> stats
//!         -> Ready (success) | Ready (validation refusal) | Error
//! ```
//!
//! A refusal during argument validation is a caller mistake, not a
//! component fault: the component returns to `Ready` and can be
//! called again immediately. Any failure after the security gate
//! marks the component `Error`; a [`crate::Adapter::reset`] is
//! required before further calls.

use crate::adapter::{audit_kind_for, Adapter};
use crate::audit::AuditKind;
use crate::component::MethodSignature;
use crate::error::{AdapterError, Result};
use crate::lifecycle::LifecycleState;
use enclave_types::{ComponentId, ErrorCode, Permission, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// String arguments are scanned for traversal sequences; byte
/// arguments larger than this are refused outright.
const MAX_BYTES_ARG: usize = 1024 * 1024;

/// How an invocation is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionModel {
    /// Dispatch on the caller's thread and wait for the result.
    Synchronous,
    /// Queue and return a future. Not yet wired up.
    Asynchronous,
    /// Submit as part of a batch. Reached through
    /// [`Adapter::invoke_batch`], never directly.
    Batch,
}

/// A single method call request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Invocation {
    pub method: String,
    pub args: Vec<Value>,
    pub model: ExecutionModel,
    /// Per-call budget in milliseconds. Zero defers to the method
    /// signature, which in turn defers to the adapter default.
    pub timeout_ms: u64,
}

impl Invocation {
    /// A synchronous call with no per-call timeout override.
    #[must_use]
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
            model: ExecutionModel::Synchronous,
            timeout_ms: 0,
        }
    }
}

/// Result of a completed invocation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct InvokeOutcome {
    pub value: Value,
    pub execution_time_ms: u64,
    /// Bytes the component had allocated when the call returned.
    pub memory_used: u64,
}

/// A batch failure, carrying the outcomes that completed before it.
#[derive(Debug)]
pub struct BatchError {
    /// Index of the call that failed.
    pub index: usize,
    pub completed: Vec<InvokeOutcome>,
    pub error: AdapterError,
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "batch call {} failed after {} completed: {}",
            self.index,
            self.completed.len(),
            self.error
        )
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Rejects values that smell like boundary-crossing attacks:
/// traversal sequences in strings, oversized byte payloads.
fn screen_argument(value: &Value) -> Result<()> {
    match value {
        Value::Str(s) if s.contains("../") || s.contains("..\\") => Err(
            AdapterError::SecurityViolation(format!("traversal sequence in argument: {s:?}")),
        ),
        Value::Bytes(b) if b.len() > MAX_BYTES_ARG => Err(AdapterError::SecurityViolation(
            format!("byte argument of {} bytes exceeds {MAX_BYTES_ARG}", b.len()),
        )),
        Value::Array(items) => items.iter().try_for_each(screen_argument),
        _ => Ok(()),
    }
}

/// Checks shape only. Security screening is a separate stage.
fn validate_call(method: &MethodSignature, invocation: &Invocation) -> Result<()> {
    if invocation.args.len() != method.params.len() {
        return Err(AdapterError::InvalidParameter(format!(
            "{} takes {} argument(s), {} given",
            method.name,
            method.params.len(),
            invocation.args.len()
        )));
    }
    for (i, (arg, expected)) in invocation.args.iter().zip(&method.params).enumerate() {
        if !arg.matches(*expected) {
            return Err(AdapterError::InvalidParameter(format!(
                "{} argument {i}: expected {expected}, got {}",
                method.name,
                arg.value_type()
            )));
        }
    }
    Ok(())
}

impl Adapter {
    /// Invokes a method on a `Ready` component.
    ///
    /// # Errors
    ///
    /// - `ComponentNotFound` / `InvalidState` from the entry guards
    /// - `InvalidParameter` for an unknown method, wrong arity, or a
    ///   type mismatch; the component stays callable
    /// - `NotImplemented` for the asynchronous model
    /// - `SecurityViolation` / `PermissionDenied` / `IsolationBreach`
    ///   from the security gate; the component goes to `Error`
    /// - `Timeout` when execution overran its budget
    /// - `InvokeFailed` from the bridge or a mistyped result
    pub fn invoke(&mut self, id: &ComponentId, invocation: &Invocation) -> Result<InvokeOutcome> {
        self.guard_initialized()?;

        let component = self
            .components
            .get(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        if !component.state.is_ready() {
            return Err(AdapterError::InvalidState(format!(
                "{id} is {}, invocation requires ready",
                component.state
            )));
        }

        // The component is visibly Executing for the whole pipeline,
        // including validation, so concurrent callers observe it busy.
        {
            let component = self
                .components
                .get_mut(id)
                .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
            component.transition_to(LifecycleState::Executing)?;
        }

        match self.invoke_validated(id, invocation) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Security refusals keep their own audit kinds; other
                // failures are filed as failed invocations.
                let kind = match &e {
                    AdapterError::SecurityViolation(_)
                    | AdapterError::PermissionDenied(_)
                    | AdapterError::IsolationBreach(_) => audit_kind_for(&e),
                    _ => AuditKind::MethodInvoked,
                };
                self.record_audit(
                    kind,
                    Some(id.clone()),
                    Some(invocation.method.clone()),
                    Some(e.code()),
                    format!("invocation failed: {e}"),
                );
                Err(e)
            }
        }
    }

    /// Pipeline body. The caller has already moved the component to
    /// `Executing`; this settles the final state on every path.
    fn invoke_validated(&mut self, id: &ComponentId, invocation: &Invocation) -> Result<InvokeOutcome> {
        let settle = |adapter: &mut Self, to: LifecycleState| {
            if let Some(component) = adapter.components.get_mut(id) {
                let _ = component.transition_to(to);
            }
        };

        // Shape validation. Refusals here leave the component Ready.
        if let Err(e) = self.validate_invocation(id, invocation) {
            settle(self, LifecycleState::Ready);
            return Err(e);
        }
        let effective_timeout = self.effective_timeout(id, invocation);

        // From the security gate on, failures settle in Error.
        let result = self.execute_invocation(id, invocation, effective_timeout);
        match &result {
            Ok(_) => settle(self, LifecycleState::Ready),
            Err(_) => {
                if let Some(component) = self.components.get_mut(id) {
                    component.stats.violations += 1;
                }
                settle(self, LifecycleState::Error);
            }
        }
        result
    }

    fn validate_invocation(&self, id: &ComponentId, invocation: &Invocation) -> Result<()> {
        if invocation.method.is_empty()
            || invocation.method.len() > enclave_types::MAX_METHOD_NAME_LEN
        {
            return Err(AdapterError::InvalidParameter(
                "method name empty or too long".into(),
            ));
        }
        let component = self.find(id)?;
        let method = component.method(&invocation.method).ok_or_else(|| {
            AdapterError::InvalidParameter(format!(
                "{id} has no method {:?}",
                invocation.method
            ))
        })?;
        validate_call(method, invocation)?;
        match invocation.model {
            ExecutionModel::Synchronous | ExecutionModel::Batch => Ok(()),
            ExecutionModel::Asynchronous => Err(AdapterError::NotImplemented(
                "asynchronous execution".into(),
            )),
        }
    }

    fn effective_timeout(&self, id: &ComponentId, invocation: &Invocation) -> u64 {
        if invocation.timeout_ms != 0 {
            return invocation.timeout_ms;
        }
        let per_method = self
            .components
            .get(id)
            .and_then(|c| c.method(&invocation.method))
            .map_or(0, |m| m.max_execution_time_ms);
        if per_method != 0 {
            per_method
        } else {
            self.config.default_timeout_ms
        }
    }

    fn execute_invocation(
        &mut self,
        id: &ComponentId,
        invocation: &Invocation,
        effective_timeout: u64,
    ) -> Result<InvokeOutcome> {
        let ts = self.timestamp_ns();
        let allocated = self.memory.usage_of(id);

        // Security gate. Field access keeps the component borrow
        // disjoint from the security engine's.
        let component = self
            .components
            .get(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        let audit_pass = component.policy.audit_enabled;
        let subject = Self::subject_view(component, allocated);
        self.security.validate(&subject, "component_invoke_local", ts)?;
        if self.security.audit_all() && audit_pass {
            self.record_audit(
                AuditKind::SecurityValidated,
                Some(id.clone()),
                Some(invocation.method.clone()),
                None,
                "component_invoke_local validated".into(),
            );
        }

        let component = self.find(id)?;
        let method = component.method(&invocation.method).ok_or_else(|| {
            AdapterError::InvalidParameter(format!("{id} has no method {:?}", invocation.method))
        })?;
        let required = Permission::INVOKE_LOCAL | method.required_permissions;
        if !component.policy.allowed.contains(required) {
            return Err(AdapterError::PermissionDenied(format!(
                "{} requires {required}, {id} allows {}",
                method.name, component.policy.allowed
            )));
        }
        if component.policy.denied.intersects(required) {
            return Err(AdapterError::PermissionDenied(format!(
                "{} requires permissions explicitly denied to {id}",
                method.name
            )));
        }
        if effective_timeout > component.policy.max_execution_time_ms {
            return Err(AdapterError::SecurityViolation(format!(
                "timeout {effective_timeout}ms exceeds policy ceiling {}ms",
                component.policy.max_execution_time_ms
            )));
        }
        invocation.args.iter().try_for_each(screen_argument)?;
        if let Some(veto) = &component.security_veto {
            veto(invocation)?;
        }

        // Prepare: strictly isolated components must enter execution
        // within their memory ceiling.
        let component = self.find(id)?;
        if component.policy.isolation.requires_guards()
            && allocated > component.policy.max_memory_bytes
        {
            return Err(AdapterError::IsolationBreach(format!(
                "{id} over memory ceiling before execution"
            )));
        }

        let runtime = component.runtime.ok_or_else(|| {
            AdapterError::InvalidState(format!("{id} has no runtime handle"))
        })?;
        let bridge = Arc::clone(&component.bridge);
        let returns = method.returns;

        let args: Vec<Value> = invocation
            .args
            .iter()
            .map(|a| bridge.import_value(a.clone()))
            .collect::<Result<_>>()?;
        let context = crate::bridge::InvocationContext {
            component: id,
            runtime,
            method: &invocation.method,
            args: &args,
            timeout_ms: effective_timeout,
        };

        let started = Instant::now();
        let raw = bridge.invoke(&context)?;
        let elapsed = started.elapsed();
        let value = bridge.export_value(raw)?;

        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed_ms > effective_timeout {
            return Err(AdapterError::Timeout(format!(
                "{} ran {elapsed_ms}ms against a {effective_timeout}ms budget",
                invocation.method
            )));
        }
        if !value.matches(returns) {
            return Err(AdapterError::InvokeFailed(format!(
                "{} returned {}, signature promises {returns}",
                invocation.method,
                value.value_type()
            )));
        }
        let memory_used = self.memory.usage_of(id);
        let component = self.find(id)?;
        if memory_used > component.policy.max_memory_bytes {
            return Err(AdapterError::IsolationBreach(format!(
                "{id} over memory ceiling after execution"
            )));
        }

        let component = self
            .components
            .get_mut(id)
            .ok_or_else(|| AdapterError::ComponentNotFound(id.to_string()))?;
        component.stats.invocations += 1;
        component.stats.total_execution_ns += elapsed.as_nanos() as u64;

        self.record_audit(
            AuditKind::MethodInvoked,
            Some(id.clone()),
            Some(invocation.method.clone()),
            None,
            format!("completed in {elapsed_ms}ms"),
        );
        debug!(component = %id, method = %invocation.method, elapsed_ms, "invoked");

        Ok(InvokeOutcome {
            value,
            execution_time_ms: elapsed_ms,
            memory_used,
        })
    }

    /// Convenience wrapper: synchronous call with default timeouts.
    ///
    /// # Errors
    ///
    /// Same as [`Adapter::invoke`].
    pub fn call(&mut self, id: &ComponentId, method: &str, args: Vec<Value>) -> Result<InvokeOutcome> {
        self.invoke(id, &Invocation::new(method, args))
    }

    /// Runs a sequence of calls, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// A [`BatchError`] naming the failed index and carrying the
    /// outcomes that completed before it.
    pub fn invoke_batch(
        &mut self,
        id: &ComponentId,
        calls: &[(String, Vec<Value>)],
    ) -> std::result::Result<Vec<InvokeOutcome>, BatchError> {
        let mut completed = Vec::with_capacity(calls.len());
        for (index, (method, args)) in calls.iter().enumerate() {
            let invocation = Invocation {
                method: method.clone(),
                args: args.clone(),
                model: ExecutionModel::Batch,
                timeout_ms: 0,
            };
            match self.invoke(id, &invocation) {
                Ok(outcome) => completed.push(outcome),
                Err(error) => {
                    return Err(BatchError {
                        index,
                        completed,
                        error,
                    })
                }
            }
        }
        Ok(completed)
    }
}
