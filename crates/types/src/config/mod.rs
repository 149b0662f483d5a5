//! Configuration types for palimpsest storages.
//!
//! A storage is described by two structs. [`StorageConfig`] is fixed when the
//! storage is created and persisted next to its data. [`SessionConfig`] says
//! where the storage lives and how a process uses it. Both validate their
//! values at construction time via fallible builders; `validate()` is
//! available for values obtained through deserialization.

// The schemars `JsonSchema` derive expands to code using `.unwrap()`.
#![allow(clippy::disallowed_methods)]

mod session;
mod storage;

pub use session::*;
use snafu::Snafu;
pub use storage::*;

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}
