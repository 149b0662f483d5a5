//! Checksum framing shared by both backends.
//!
//! ```text
//! +----------------------+-----------------------------------+
//! | checksum (16 bytes)  | transformed page bytes            |
//! +----------------------+-----------------------------------+
//! ```
//!
//! The checksum is computed over the untransformed page bytes, so it also
//! catches a transform that silently produces the wrong output.

use std::sync::Arc;

use super::transform::ByteTransform;
use crate::{
    error::{Error, Result},
    page::{CHECKSUM_SIZE, Checksum, Key, Page},
};

/// A page ready for the backend.
pub(crate) struct Framed {
    pub(crate) bytes: Vec<u8>,
    pub(crate) checksum: Checksum,
}

/// Serializes, checksums and transforms pages, and reverses the process.
///
/// Every call works on fresh buffers, so a codec may be shared freely.
#[derive(Debug, Clone)]
pub struct PageCodec {
    transform: Arc<dyn ByteTransform>,
}

impl PageCodec {
    /// Creates a codec applying `transform` to page payloads.
    pub fn new(transform: Arc<dyn ByteTransform>) -> Self {
        Self { transform }
    }

    pub(crate) fn encode(&self, page: &Page) -> Result<Framed> {
        let raw = page.to_bytes()?;
        let checksum = Checksum::of(&raw);
        let payload = self.transform.encode(&raw)?;
        let mut bytes = Vec::with_capacity(CHECKSUM_SIZE + payload.len());
        bytes.extend_from_slice(checksum.as_bytes());
        bytes.extend_from_slice(&payload);
        Ok(Framed { bytes, checksum })
    }

    /// Decodes the frame stored under `key`.
    ///
    /// `expected` is the checksum recorded in the reference that led here.
    pub(crate) fn decode(&self, key: Key, expected: Checksum, frame: &[u8]) -> Result<Page> {
        if frame.len() < CHECKSUM_SIZE {
            return Err(Error::Corrupted {
                reason: format!(
                    "frame at {key} is {} bytes, shorter than its checksum",
                    frame.len()
                ),
            });
        }
        let (stored, payload) = frame.split_at(CHECKSUM_SIZE);
        let mut stored_bytes = [0u8; CHECKSUM_SIZE];
        stored_bytes.copy_from_slice(stored);
        let stored = Checksum::from_bytes(stored_bytes);

        let raw = self.transform.decode(payload)?;
        if raw.is_empty() {
            return Err(Error::EmptyTransform);
        }
        if Checksum::of(&raw) != stored || stored != expected {
            return Err(Error::ChecksumMismatch { key });
        }
        Page::from_bytes(&raw)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::{
        io::transform::{Identity, Zstd},
        page::{NodePage, NodeRecord},
    };

    const KEY: Key = Key::Kv { id: 1 };

    fn page() -> Page {
        let mut node = NodePage::new(3, 1);
        node.set_slot(2, Some(NodeRecord::Data(b"payload".to_vec())));
        Page::Node(node)
    }

    #[test]
    fn test_frame_round_trip_identity() {
        let codec = PageCodec::new(Arc::new(Identity));
        let framed = codec.encode(&page()).unwrap();
        assert_eq!(&framed.bytes[..CHECKSUM_SIZE], framed.checksum.as_bytes());
        assert_eq!(codec.decode(KEY, framed.checksum, &framed.bytes).unwrap(), page());
    }

    #[test]
    fn test_frame_round_trip_zstd() {
        let codec = PageCodec::new(Arc::new(Zstd::new(5)));
        let framed = codec.encode(&page()).unwrap();
        assert_eq!(codec.decode(KEY, framed.checksum, &framed.bytes).unwrap(), page());
    }

    #[test]
    fn test_flipped_payload_byte_is_detected() {
        let codec = PageCodec::new(Arc::new(Identity));
        let mut framed = codec.encode(&page()).unwrap();
        let last = framed.bytes.len() - 1;
        framed.bytes[last] ^= 0x01;
        let err = codec.decode(KEY, framed.checksum, &framed.bytes).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { key: KEY }), "got: {err}");
    }

    #[test]
    fn test_reference_checksum_must_match() {
        let codec = PageCodec::new(Arc::new(Identity));
        let framed = codec.encode(&page()).unwrap();
        let err = codec.decode(KEY, Checksum::of(b"other"), &framed.bytes).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_empty_payload_is_transform_failure() {
        let codec = PageCodec::new(Arc::new(Identity));
        let frame = Checksum::of(b"").as_bytes().to_vec();
        let err = codec.decode(KEY, Checksum::of(b""), &frame).unwrap_err();
        assert!(matches!(err, Error::EmptyTransform));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_short_frame_is_corruption() {
        let codec = PageCodec::new(Arc::new(Identity));
        assert!(matches!(
            codec.decode(KEY, Checksum::default(), &[1, 2, 3]),
            Err(Error::Corrupted { .. })
        ));
    }
}
