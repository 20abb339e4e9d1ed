//! Component lifecycle states and the legal-transition matrix.
//!
//! Every component moves through a fixed state machine. The matrix is
//! the single source of truth: any transition it does not list is a
//! `LifecycleViolation`, and violations never change the current
//! state.
//!
//! ```text
//! Uninitialized ──▶ Initializing ──▶ Ready ◀──▶ Executing
//!                        │            │ ▲
//!                        │            │ └───── Suspended
//!                        ▼            ▼  ▲
//!                      Error ◀────────┘  │ (reset)
//!                        │   └───────────┘
//!                        ▼
//!                     Cleanup ──▶ Destroyed
//! ```

use crate::error::{AdapterError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a component.
///
/// | State | Meaning |
/// |-------|---------|
/// | `Uninitialized` | Slot exists, nothing set up |
/// | `Initializing` | Bridge is creating the runtime instance |
/// | `Ready` | Accepting invocations |
/// | `Executing` | A method is running |
/// | `Suspended` | Paused by the host, no invocations |
/// | `Error` | A failure occurred, reset required |
/// | `Cleanup` | Resources being released |
/// | `Destroyed` | Terminal, slot unusable |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Slot exists, nothing set up.
    Uninitialized,
    /// Bridge is creating the runtime instance.
    Initializing,
    /// Accepting invocations.
    Ready,
    /// A method is running.
    Executing,
    /// Paused by the host.
    Suspended,
    /// A failure occurred, reset required.
    Error,
    /// Resources being released.
    Cleanup,
    /// Terminal.
    Destroyed,
}

/// Legal transitions, indexed `[from][to]` by state discriminant.
const TRANSITIONS: [[bool; 8]; 8] = {
    const U: usize = LifecycleState::Uninitialized as usize;
    const I: usize = LifecycleState::Initializing as usize;
    const R: usize = LifecycleState::Ready as usize;
    const X: usize = LifecycleState::Executing as usize;
    const S: usize = LifecycleState::Suspended as usize;
    const E: usize = LifecycleState::Error as usize;
    const C: usize = LifecycleState::Cleanup as usize;
    const D: usize = LifecycleState::Destroyed as usize;

    let mut t = [[false; 8]; 8];
    t[U][I] = true;
    t[I][R] = true;
    t[I][E] = true;
    t[R][X] = true;
    t[R][S] = true;
    t[R][C] = true;
    t[R][E] = true;
    t[X][R] = true;
    t[X][E] = true;
    t[S][R] = true;
    t[S][C] = true;
    t[S][E] = true;
    t[E][R] = true; // reset
    t[E][C] = true;
    t[C][D] = true;
    t
};

impl LifecycleState {
    /// All states, in discriminant order.
    pub const ALL: [LifecycleState; 8] = [
        Self::Uninitialized,
        Self::Initializing,
        Self::Ready,
        Self::Executing,
        Self::Suspended,
        Self::Error,
        Self::Cleanup,
        Self::Destroyed,
    ];

    /// Returns whether transitioning to `to` is legal from this state.
    #[must_use]
    pub fn can_transition_to(&self, to: LifecycleState) -> bool {
        TRANSITIONS[*self as usize][to as usize]
    }

    /// Returns whether the component accepts invocations.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns whether the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Destroyed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::Suspended => "suspended",
            Self::Error => "error",
            Self::Cleanup => "cleanup",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Checks a transition against the matrix.
///
/// # Errors
///
/// Returns `LifecycleViolation` naming both states when the matrix
/// forbids the move.
pub fn check_transition(from: LifecycleState, to: LifecycleState) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AdapterError::LifecycleViolation(format!(
            "illegal transition {from} -> {to}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn legal_transitions() {
        assert!(Uninitialized.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Ready));
        assert!(Initializing.can_transition_to(Error));
        assert!(Ready.can_transition_to(Executing));
        assert!(Ready.can_transition_to(Suspended));
        assert!(Ready.can_transition_to(Cleanup));
        assert!(Executing.can_transition_to(Ready));
        assert!(Executing.can_transition_to(Error));
        assert!(Suspended.can_transition_to(Ready));
        assert!(Error.can_transition_to(Ready));
        assert!(Error.can_transition_to(Cleanup));
        assert!(Cleanup.can_transition_to(Destroyed));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!Uninitialized.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Destroyed));
        assert!(!Executing.can_transition_to(Suspended));
        assert!(!Suspended.can_transition_to(Executing));
        assert!(!Error.can_transition_to(Executing));
        assert!(!Cleanup.can_transition_to(Ready));
    }

    #[test]
    fn destroyed_is_terminal() {
        for to in LifecycleState::ALL {
            assert!(!Destroyed.can_transition_to(to), "destroyed -> {to}");
        }
        assert!(Destroyed.is_terminal());
        assert!(!Ready.is_terminal());
    }

    #[test]
    fn no_self_transitions() {
        for state in LifecycleState::ALL {
            assert!(!state.can_transition_to(state), "{state} -> {state}");
        }
    }

    #[test]
    fn suspend_resume_only_through_ready() {
        // Suspension is only reachable from Ready, and resumes only
        // back to Ready.
        for from in LifecycleState::ALL {
            if from != Ready {
                assert!(!from.can_transition_to(Suspended), "{from} -> suspended");
            }
        }
        for to in LifecycleState::ALL {
            let legal = matches!(to, Ready | Cleanup | Error);
            assert_eq!(Suspended.can_transition_to(to), legal, "suspended -> {to}");
        }
    }

    #[test]
    fn check_transition_error_carries_states() {
        let err = check_transition(Ready, Destroyed).unwrap_err();
        assert_eq!(
            err,
            AdapterError::LifecycleViolation("illegal transition ready -> destroyed".into())
        );
        assert!(check_transition(Ready, Executing).is_ok());
    }

    #[test]
    fn is_ready_only_in_ready() {
        for state in LifecycleState::ALL {
            assert_eq!(state.is_ready(), state == Ready);
        }
    }
}
