//! Postcard encoding for values persisted outside page payloads.
//!
//! Pages have their own tagged binary layout; this codec covers the small
//! serde-friendly records around them, such as the storage properties row
//! kept by the key-value backend.

use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};

/// Error type for codec operations.
#[derive(Debug, Snafu)]
pub enum CodecError {
    /// Encoding failed.
    #[snafu(display("Encoding failed: {source}"))]
    Encode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// Decoding failed.
    #[snafu(display("Decoding failed: {source}"))]
    Decode {
        /// The underlying postcard error.
        source: postcard::Error,
    },
}

/// Encodes a value with postcard.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).context(EncodeSnafu)
}

/// Decodes a postcard-encoded value.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes do not describe a `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).context(DecodeSnafu)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, RevisioningKind, StorageConfig, TransformKind};

    #[test]
    fn test_storage_config_survives_codec() {
        let config = StorageConfig::builder()
            .backend(BackendKind::Kv)
            .revisioning(RevisioningKind::Differential)
            .revisions_to_restore(7)
            .transform(TransformKind::Zstd)
            .compression_level(11)
            .build()
            .unwrap();
        let bytes = encode(&config).expect("encode config");
        let decoded: StorageConfig = decode(&bytes).expect("decode config");
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_decode_truncated_input_fails() {
        let bytes = encode(&StorageConfig::default()).unwrap();
        let result: Result<StorageConfig, _> = decode(&bytes[..1]);
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[test]
    fn test_decode_empty_input_fails() {
        let result: Result<u64, _> = decode(&[]);
        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("Decoding failed"), "got: {err}");
    }
}
