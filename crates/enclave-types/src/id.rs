//! Identifier types and size limits.
//!
//! This module provides validated identifier newtypes used across the
//! Enclave crates, plus the size limits the adapter enforces on
//! identifiers and component surfaces.
//!
//! # Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`ComponentId`] | Validated, unique component identifier |
//! | [`RegionId`] | Opaque handle for an isolated memory region |
//!
//! # Validation
//!
//! A [`ComponentId`] must be:
//!
//! - Non-empty and at most [`MAX_COMPONENT_ID_LEN`] bytes
//! - First character ASCII alphanumeric or `_`
//! - Remaining characters ASCII alphanumeric or `-`, `_`, `.`
//!
//! ```
//! use enclave_types::ComponentId;
//!
//! let id = ComponentId::new("ads-module").unwrap();
//! assert_eq!(id.as_str(), "ads-module");
//!
//! assert!(ComponentId::new("").is_err());
//! assert!(ComponentId::new("no spaces allowed").is_err());
//! assert!(ComponentId::new("-leading-dash").is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a component identifier in bytes.
pub const MAX_COMPONENT_ID_LEN: usize = 64;

/// Maximum length of a component display name in bytes.
pub const MAX_COMPONENT_NAME_LEN: usize = 128;

/// Maximum length of a component version string in bytes.
pub const MAX_VERSION_LEN: usize = 32;

/// Maximum length of a method name in bytes.
pub const MAX_METHOD_NAME_LEN: usize = 64;

/// Maximum number of methods a single component may expose.
pub const MAX_METHODS_PER_COMPONENT: usize = 256;

/// Maximum number of parameters a method signature may declare.
pub const MAX_PARAMETERS: usize = 16;

/// Validated component identifier.
///
/// Uniquely identifies a component within an adapter instance. The
/// identifier is validated at construction, so holding a `ComponentId`
/// guarantees the contained string is well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentId(String);

impl ComponentId {
    /// Creates a new component identifier, validating its format.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` for an empty string, `IdError::TooLong`
    /// when it exceeds [`MAX_COMPONENT_ID_LEN`] bytes, and
    /// `IdError::InvalidChar` when the first character is not ASCII
    /// alphanumeric or `_`, or a later character falls outside
    /// `[A-Za-z0-9._-]`.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();

        if id.is_empty() {
            return Err(IdError::Empty);
        }

        if id.len() > MAX_COMPONENT_ID_LEN {
            return Err(IdError::TooLong {
                len: id.len(),
                max: MAX_COMPONENT_ID_LEN,
            });
        }

        let mut chars = id.chars();
        if let Some(first) = chars.next() {
            if !first.is_ascii_alphanumeric() && first != '_' {
                return Err(IdError::InvalidChar { c: first });
            }
        }
        if let Some(c) =
            chars.find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.'))
        {
            return Err(IdError::InvalidChar { c });
        }

        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ComponentId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ComponentId> for String {
    fn from(id: ComponentId) -> Self {
        id.0
    }
}

impl AsRef<str> for ComponentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Error produced by [`ComponentId::new`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Identifier is empty.
    #[error("component id must not be empty")]
    Empty,

    /// Identifier exceeds the maximum length.
    #[error("component id is {len} bytes, maximum is {max}")]
    TooLong {
        /// Actual byte length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// Identifier contains a character outside the allowed set.
    #[error("component id contains invalid character {c:?}")]
    InvalidChar {
        /// Offending character.
        c: char,
    },
}

/// Opaque handle for an isolated memory region.
///
/// Region ids are allocated by the memory manager and never reused
/// within the lifetime of an adapter instance. Holding a `RegionId`
/// grants nothing by itself. All access goes through the adapter,
/// which checks the caller against the region's boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(u64);

impl RegionId {
    /// Creates a region id from a raw slot value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw slot value.
    #[must_use]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}
