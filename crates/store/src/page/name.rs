//! Name dictionary page.

use std::collections::BTreeMap;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use snafu::ResultExt;

use super::{checked_len, put_bytes, take_bytes};
use crate::error::{Error, Result, TruncatedSnafu};

/// Maps integer name keys to the names used by a revision's nodes.
///
/// Keys are derived from the name's hash and shifted upward on collision,
/// so the same name always gets the same key within a storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamePage {
    revision: u64,
    names: BTreeMap<i32, String>,
}

impl NamePage {
    /// Creates an empty dictionary.
    pub fn new(revision: u64) -> Self {
        Self { revision, names: BTreeMap::new() }
    }

    /// Returns the revision that produced this page.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns a copy of this dictionary for a new revision.
    pub fn for_revision(&self, revision: u64) -> Self {
        Self { revision, names: self.names.clone() }
    }

    /// Looks up a name by key.
    pub fn name(&self, key: i32) -> Option<&str> {
        self.names.get(&key).map(String::as_str)
    }

    /// Returns the key of `name`, inserting it if absent.
    pub fn create_name(&mut self, name: &str) -> i32 {
        let mut key = xxhash_rust::xxh3::xxh3_64(name.as_bytes()) as i32;
        loop {
            match self.names.get(&key) {
                Some(existing) if existing == name => return key,
                Some(_) => key = key.wrapping_add(1),
                None => {
                    self.names.insert(key, name.to_string());
                    return key;
                },
            }
        }
    }

    /// Number of names in the dictionary.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u64::<BigEndian>(self.revision)?;
        buf.write_u32::<BigEndian>(checked_len(self.names.len(), "name dictionary")?)?;
        for (key, name) in &self.names {
            buf.write_i32::<BigEndian>(*key)?;
            put_bytes(buf, name.as_bytes(), "name")?;
        }
        Ok(())
    }

    pub(crate) fn read_from(buf: &mut &[u8]) -> Result<Self> {
        const WHAT: &str = "name page";
        let revision = buf.read_u64::<BigEndian>().context(TruncatedSnafu { what: WHAT })?;
        let count = buf.read_u32::<BigEndian>().context(TruncatedSnafu { what: WHAT })?;
        let mut names = BTreeMap::new();
        for _ in 0..count {
            let key = buf.read_i32::<BigEndian>().context(TruncatedSnafu { what: WHAT })?;
            let bytes = take_bytes(buf, WHAT)?;
            let name = String::from_utf8(bytes).map_err(|err| Error::Corrupted {
                reason: format!("name {key} is not UTF-8: {err}"),
            })?;
            names.insert(key, name);
        }
        Ok(Self { revision, names })
    }
}
