//! Permission flags and isolation levels.
//!
//! Permissions are a bitset so that policies can be composed and
//! checked with set operations. Isolation levels form a total order
//! from `None` (no barriers) to `Paranoid` (deny by default).
//!
//! # Example
//!
//! ```
//! use enclave_types::{Permission, IsolationLevel};
//!
//! let allowed = Permission::MEMORY_READ | Permission::INVOKE_LOCAL;
//! assert!(allowed.contains(Permission::MEMORY_READ));
//! assert!(!allowed.contains(Permission::NETWORK));
//!
//! assert!(IsolationLevel::Strict > IsolationLevel::Basic);
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Fine-grained permission flags for component operations.
    ///
    /// | Flag | Grants |
    /// |------|--------|
    /// | `MEMORY_READ` | Read access to shared memory regions |
    /// | `MEMORY_WRITE` | Write access and region allocation |
    /// | `INVOKE_LOCAL` | Invoking methods on local components |
    /// | `INVOKE_REMOTE` | Invoking methods across process boundaries |
    /// | `FILE_ACCESS` | Filesystem operations |
    /// | `NETWORK` | Network operations |
    /// | `PRIVILEGED` | Privileged adapter operations |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Permission: u32 {
        /// Read access to shared memory regions.
        const MEMORY_READ = 1 << 0;
        /// Write access to memory regions and region allocation.
        const MEMORY_WRITE = 1 << 1;
        /// Invoking methods on components in the same process.
        const INVOKE_LOCAL = 1 << 2;
        /// Invoking methods across process boundaries.
        const INVOKE_REMOTE = 1 << 3;
        /// Filesystem operations.
        const FILE_ACCESS = 1 << 4;
        /// Network operations.
        const NETWORK = 1 << 5;
        /// Privileged adapter operations.
        const PRIVILEGED = 1 << 6;
    }
}

impl Permission {
    /// Returns the names of the set flags.
    ///
    /// ```
    /// use enclave_types::Permission;
    ///
    /// let p = Permission::MEMORY_READ | Permission::NETWORK;
    /// assert_eq!(p.names(), vec!["MEMORY_READ", "NETWORK"]);
    /// ```
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.contains(Self::MEMORY_READ) {
            out.push("MEMORY_READ");
        }
        if self.contains(Self::MEMORY_WRITE) {
            out.push("MEMORY_WRITE");
        }
        if self.contains(Self::INVOKE_LOCAL) {
            out.push("INVOKE_LOCAL");
        }
        if self.contains(Self::INVOKE_REMOTE) {
            out.push("INVOKE_REMOTE");
        }
        if self.contains(Self::FILE_ACCESS) {
            out.push("FILE_ACCESS");
        }
        if self.contains(Self::NETWORK) {
            out.push("NETWORK");
        }
        if self.contains(Self::PRIVILEGED) {
            out.push("PRIVILEGED");
        }
        out
    }

    /// Parses a single flag name into a permission.
    ///
    /// Returns `None` for unknown names. Matching is exact, names are
    /// UPPER_SNAKE_CASE.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "MEMORY_READ" => Some(Self::MEMORY_READ),
            "MEMORY_WRITE" => Some(Self::MEMORY_WRITE),
            "INVOKE_LOCAL" => Some(Self::INVOKE_LOCAL),
            "INVOKE_REMOTE" => Some(Self::INVOKE_REMOTE),
            "FILE_ACCESS" => Some(Self::FILE_ACCESS),
            "NETWORK" => Some(Self::NETWORK),
            "PRIVILEGED" => Some(Self::PRIVILEGED),
            _ => None,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(none)");
        }
        f.write_str(&self.names().join(" | "))
    }
}

/// Isolation level applied to a component.
///
/// Levels form a total order. A higher level is strictly more
/// restrictive and is never loosened at runtime. The order is used
/// directly when two components interact: the pair is subject to the
/// stricter of the two levels.
///
/// | Level | Posture |
/// |-------|---------|
/// | `None` | No barriers, trusted in-process code |
/// | `Basic` | Default limits, local invocation allowed |
/// | `Standard` | Read-mostly, no remote invocation |
/// | `Strict` | Read-only memory, guarded regions |
/// | `Paranoid` | Deny by default, no sharing |
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// No barriers.
    None,
    /// Default limits.
    Basic,
    /// Read-mostly posture.
    Standard,
    /// Read-only memory, guarded regions.
    Strict,
    /// Deny by default.
    Paranoid,
}

impl IsolationLevel {
    /// Returns whether this level requires guarded memory regions.
    #[must_use]
    pub fn requires_guards(&self) -> bool {
        *self >= Self::Strict
    }

    /// Returns whether components at this level may participate in
    /// memory sharing. Only `Paranoid` forbids it.
    #[must_use]
    pub fn allows_sharing(&self) -> bool {
        *self < Self::Paranoid
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Strict => "strict",
            Self::Paranoid => "paranoid",
        };
        f.write_str(s)
    }
}
