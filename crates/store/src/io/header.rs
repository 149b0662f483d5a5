//! Beacon header of the flat page file.
//!
//! The beacon locates the current [`UberPage`](crate::page::UberPage). It is
//! kept in two slots so that publishing a revision is atomic even if the
//! process dies halfway through rewriting the header:
//!
//! 1. The new beacon is written to the inactive slot, then synced.
//! 2. The god byte is flipped to make that slot primary, then synced.
//!
//! On open the primary slot is tried first; if its checksum fails the other
//! slot still holds the previous, fully valid beacon.
//!
//! # Layout (128 bytes)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----------------------------------
//! 0       8     Magic "PALIMPS1"
//! 8       2     Format version
//! 10      2     Checksum size
//! 12      3     Reserved
//! 15      1     God byte (bit 0 = primary slot)
//! 16      48    Beacon slot 0
//! 64      48    Beacon slot 1
//! 112     16    Reserved
//! ```

use byteorder::{BigEndian, ByteOrder};

use crate::{
    error::{Error, Result},
    page::{CHECKSUM_SIZE, Checksum, Key},
};

/// Size of the header; pages are appended after it.
pub const HEADER_SIZE: usize = 128;

/// Magic number of palimpsest page files.
pub const MAGIC: &[u8; 8] = b"PALIMPS1";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

const SLOT_OFFSETS: [usize; 2] = [16, 64];

/// One copy of the beacon: where the UberPage frame lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeaconSlot {
    /// Offset of the UberPage frame.
    pub offset: u64,
    /// Length of the UberPage frame; 0 means no beacon.
    pub length: u32,
    /// Checksum of the UberPage.
    pub checksum: Checksum,
    stored_checksum: u64,
}

impl BeaconSlot {
    /// Size of a slot on disk.
    pub const SIZE: usize = 48;

    /// Bytes covered by the slot checksum.
    const CHECKSUMMED_SIZE: usize = 12 + CHECKSUM_SIZE;

    /// Creates a slot pointing at an UberPage frame.
    pub fn new(offset: u64, length: u32, checksum: Checksum) -> Self {
        Self { offset, length, checksum, stored_checksum: 0 }
    }

    /// Returns the UberPage key, or `None` for an empty slot.
    pub fn key(&self) -> Option<Key> {
        (self.length > 0).then_some(Key::File { offset: self.offset, length: self.length })
    }

    /// Serializes the slot, computing its checksum.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        BigEndian::write_u64(&mut buf[0..8], self.offset);
        BigEndian::write_u32(&mut buf[8..12], self.length);
        buf[12..Self::CHECKSUMMED_SIZE].copy_from_slice(self.checksum.as_bytes());
        let slot_checksum = xxhash_rust::xxh3::xxh3_64(&buf[..Self::CHECKSUMMED_SIZE]);
        BigEndian::write_u64(
            &mut buf[Self::CHECKSUMMED_SIZE..Self::CHECKSUMMED_SIZE + 8],
            slot_checksum,
        );
        buf
    }

    /// Deserializes a slot without verifying it.
    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Self {
        let mut checksum = [0u8; CHECKSUM_SIZE];
        checksum.copy_from_slice(&buf[12..Self::CHECKSUMMED_SIZE]);
        Self {
            offset: BigEndian::read_u64(&buf[0..8]),
            length: BigEndian::read_u32(&buf[8..12]),
            checksum: Checksum::from_bytes(checksum),
            stored_checksum: BigEndian::read_u64(
                &buf[Self::CHECKSUMMED_SIZE..Self::CHECKSUMMED_SIZE + 8],
            ),
        }
    }

    /// Returns true if the stored slot checksum matches the slot fields.
    pub fn verify_checksum(&self) -> bool {
        let buf = self.to_bytes();
        let expected = xxhash_rust::xxh3::xxh3_64(&buf[..Self::CHECKSUMMED_SIZE]);
        self.stored_checksum == expected
    }
}

/// Parsed file header with its two beacon slots.
#[derive(Debug, Clone)]
pub struct FileHeader {
    god_byte: u8,
    slots: [BeaconSlot; 2],
}

impl FileHeader {
    /// Mask of the primary slot index in the god byte.
    const GOD_BYTE_SLOT_MASK: u8 = 0x01;

    /// Header of a file without any beacon.
    pub fn new() -> Self {
        let empty = BeaconSlot::from_bytes(&BeaconSlot::default().to_bytes());
        Self { god_byte: 0, slots: [empty; 2] }
    }

    /// Index of the primary slot.
    pub fn primary_slot_index(&self) -> usize {
        (self.god_byte & Self::GOD_BYTE_SLOT_MASK) as usize
    }

    /// Index of the inactive slot.
    pub fn secondary_slot_index(&self) -> usize {
        1 - self.primary_slot_index()
    }

    /// Returns a slot by index.
    pub fn slot(&self, index: usize) -> &BeaconSlot {
        &self.slots[index]
    }

    /// Overwrites the inactive slot.
    pub fn set_secondary_slot(&mut self, slot: BeaconSlot) {
        let index = self.secondary_slot_index();
        self.slots[index] = BeaconSlot::from_bytes(&slot.to_bytes());
    }

    /// Makes the inactive slot primary.
    pub fn flip_primary_slot(&mut self) {
        self.god_byte ^= Self::GOD_BYTE_SLOT_MASK;
    }

    /// Returns the beacon to use: the primary slot if intact, else the
    /// secondary one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] if both slots fail their checksum.
    pub fn current_beacon(&self) -> Result<&BeaconSlot> {
        let primary = self.slot(self.primary_slot_index());
        if primary.verify_checksum() {
            return Ok(primary);
        }
        let secondary = self.slot(self.secondary_slot_index());
        if secondary.verify_checksum() {
            tracing::warn!(
                slot = self.secondary_slot_index(),
                "Primary beacon slot corrupt, recovering from secondary"
            );
            return Ok(secondary);
        }
        Err(Error::Corrupted { reason: "both beacon slots have invalid checksums".to_string() })
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        BigEndian::write_u16(&mut buf[8..10], FORMAT_VERSION);
        BigEndian::write_u16(&mut buf[10..12], CHECKSUM_SIZE as u16);
        buf[15] = self.god_byte;
        for (slot, offset) in self.slots.iter().zip(SLOT_OFFSETS) {
            buf[offset..offset + BeaconSlot::SIZE].copy_from_slice(&slot.to_bytes_preserving());
        }
        buf
    }

    /// Deserializes and validates the fixed fields of a header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMagic`] for foreign files,
    /// [`Error::UnsupportedVersion`] for newer formats, and
    /// [`Error::Corrupted`] if the checksum size differs from this build's.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if &buf[0..8] != MAGIC {
            return Err(Error::InvalidMagic);
        }
        let version = BigEndian::read_u16(&buf[8..10]);
        if version > FORMAT_VERSION {
            return Err(Error::UnsupportedVersion { version });
        }
        let checksum_size = BigEndian::read_u16(&buf[10..12]);
        if usize::from(checksum_size) != CHECKSUM_SIZE {
            return Err(Error::Corrupted {
                reason: format!("checksum size {checksum_size}, expected {CHECKSUM_SIZE}"),
            });
        }
        let slots = SLOT_OFFSETS.map(|offset| {
            let mut slot = [0u8; BeaconSlot::SIZE];
            slot.copy_from_slice(&buf[offset..offset + BeaconSlot::SIZE]);
            BeaconSlot::from_bytes(&slot)
        });
        Ok(Self { god_byte: buf[15], slots })
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconSlot {
    /// Serializes the slot keeping its stored checksum, so a damaged slot
    /// stays damaged when the other slot is rewritten.
    fn to_bytes_preserving(&self) -> [u8; Self::SIZE] {
        let mut buf = self.to_bytes();
        BigEndian::write_u64(
            &mut buf[Self::CHECKSUMMED_SIZE..Self::CHECKSUMMED_SIZE + 8],
            self.stored_checksum,
        );
        buf
    }
}
