//! Unified error interface for Enclave.
//!
//! This module provides the [`ErrorCode`] trait for standardized
//! error handling across all Enclave crates.
//!
//! # Design
//!
//! All Enclave error types should implement [`ErrorCode`] to provide:
//!
//! - **Machine-readable codes**: For programmatic error handling
//! - **Recoverability info**: For retry logic and host feedback
//!
//! # Example
//!
//! ```
//! use enclave_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     NotFound(String),
//!     Timeout,
//! }
//!
//! impl ErrorCode for MyError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::NotFound(_) => "NOT_FOUND",
//!             Self::Timeout => "TIMEOUT",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Timeout)
//!     }
//! }
//!
//! let err = MyError::Timeout;
//! assert_eq!(err.code(), "TIMEOUT");
//! assert!(err.is_recoverable());
//! ```

/// Unified error code interface for Enclave errors.
///
/// Implement this trait for all error types to enable:
///
/// - Consistent error code format across crates
/// - Unified error handling in the adapter and bridges
/// - Standardized audit-event error fields
///
/// # Code Format
///
/// Error codes should be:
///
/// - **UPPER_SNAKE_CASE**: e.g., `"TIMEOUT"`, `"PERMISSION_DENIED"`
/// - **Namespace-prefixed for specificity**: e.g., `"ADAPTER_TIMEOUT"`
/// - **Stable**: Codes should not change once defined (API contract)
///
/// # Recoverability
///
/// An error is recoverable if:
///
/// - Retrying the operation may succeed
/// - The host can take action to fix it
/// - It's a transient condition (timeout, allocation pressure)
///
/// Non-recoverable errors:
///
/// - Invalid input (won't change on retry)
/// - Permission denied (requires policy change, not retry)
/// - Lifecycle violations (requires a different state, not retry)
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    ///
    /// # Format
    ///
    /// - UPPER_SNAKE_CASE
    /// - Optionally prefixed with domain (e.g., `"ADAPTER_"`)
    /// - Stable across versions (breaking change if modified)
    fn code(&self) -> &'static str;

    /// Returns whether the error is recoverable.
    ///
    /// # Returns
    ///
    /// - `true`: Retry may succeed, or the host can take corrective action
    /// - `false`: Retry will not help, requires code/config change
    fn is_recoverable(&self) -> bool;
}

/// Validates that an error code follows Enclave conventions.
///
/// # Checks
///
/// 1. Code is UPPER_SNAKE_CASE
/// 2. Code starts with expected prefix
/// 3. Code is not empty
///
/// # Panics
///
/// Panics with descriptive message if validation fails.
///
/// # Example
///
/// ```
/// use enclave_types::{ErrorCode, assert_error_code};
///
/// #[derive(Debug)]
/// enum MyError { Timeout }
///
/// impl ErrorCode for MyError {
///     fn code(&self) -> &'static str { "MY_TIMEOUT" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// let err = MyError::Timeout;
/// assert_error_code(&err, "MY_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");

    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );

    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Validates multiple error codes at once.
///
/// Use this to verify all variants of an error enum.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

/// Checks if a string is UPPER_SNAKE_CASE.
fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }

    if s.starts_with('_') || s.ends_with('_') {
        return false;
    }

    if s.contains("__") {
        return false;
    }

    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
