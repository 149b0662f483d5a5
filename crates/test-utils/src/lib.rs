//! Shared test utilities for the palimpsest crates.
//!
//! This crate provides common test helpers to reduce boilerplate across test modules:
//!
//! - [`TestDir`] - Temporary storage directory with session and byte-level helpers
//! - [`test_storage_config`] / [`test_session_config`] - Ready-made configurations
//! - [`strategies`] - Proptest generators for record histories and configurations
//! - [`CrashInjector`] - Deterministic fault points for commit-atomicity tests

#![deny(unsafe_code)]
// Test utilities are allowed to use unwrap for simplicity
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod test_dir;
pub use test_dir::TestDir;

mod config;
pub use config::{
    TEST_CACHE_CAPACITY, all_storage_configs, test_session_config, test_storage_config,
};

mod crash_injector;
pub use crash_injector::{CrashInjector, CrashPoint};

pub mod strategies;
