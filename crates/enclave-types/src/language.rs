//! Source languages of hosted components.
//!
//! The adapter is language-agnostic. The [`Language`] tag selects
//! which bridge handles a component's invocations and supplies a
//! conservative default isolation level when a component's
//! configuration does not pick one.

use crate::IsolationLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source language of a hosted component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// In-process native code.
    Native,
    /// JavaScript runtime.
    JavaScript,
    /// Python runtime.
    Python,
    /// JVM-hosted languages.
    Jvm,
    /// WebAssembly module.
    Wasm,
    /// A runtime not covered by the built-in tags.
    Unknown,
}

impl Language {
    /// All language tags, for iteration.
    pub const ALL: [Language; 6] = [
        Self::Native,
        Self::JavaScript,
        Self::Python,
        Self::Jvm,
        Self::Wasm,
        Self::Unknown,
    ];

    /// Default isolation level applied when a component configuration
    /// leaves isolation unspecified.
    ///
    /// Native code is trusted the most and the JVM the least among
    /// the built-in tags. Unrecognized runtimes fall back to
    /// `Standard`.
    #[must_use]
    pub fn default_isolation(&self) -> IsolationLevel {
        match self {
            Self::Native => IsolationLevel::Basic,
            Self::JavaScript | Self::Python => IsolationLevel::Standard,
            Self::Jvm => IsolationLevel::Strict,
            Self::Wasm | Self::Unknown => IsolationLevel::Standard,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Native => "native",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Jvm => "jvm",
            Self::Wasm => "wasm",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}
