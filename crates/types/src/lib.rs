//! Shared types for the palimpsest page store.
//!
//! This crate holds the pieces that more than one crate needs:
//! - [`config`]: storage and session configuration, validated at construction
//! - [`codec`]: postcard encode/decode helpers with snafu errors

pub mod codec;
pub mod config;

pub use codec::{CodecError, decode, encode};
pub use config::{
    BackendKind, ConfigError, RevisioningKind, SessionConfig, StorageConfig, TransformKind,
};
