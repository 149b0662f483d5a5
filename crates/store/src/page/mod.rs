//! Page family of the versioned store.
//!
//! Every persisted object is one of five page kinds, serialized with a leading
//! big-endian `i32` type tag:
//!
//! ```text
//! Tag  Kind              Role
//! ---  ----------------  ------------------------------------------------
//! 1    NodePage          leaf holding a fixed array of node records
//! 2    NamePage          name dictionary of one revision
//! 3    UberPage          storage root, points to the revision tree
//! 4    IndirectPage      fixed-fanout trie node of child references
//! 5    RevisionRootPage  root of one committed revision
//! ```
//!
//! Pages refer to each other only through [`PageReference`]s, which carry the
//! backend [`Key`] and [`Checksum`] once written.

mod container;
mod indirect;
mod name;
mod node;
mod reference;
mod revision_root;
mod uber;

use std::io;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
pub use container::NodePageContainer;
pub use indirect::{
    INDIRECT_FANOUT, INDIRECT_FANOUT_EXPONENT, INDIRECT_LEVELS, IndirectPage, MAX_PAGE_KEY,
    level_offsets,
};
pub use name::NamePage;
pub use node::{NODE_PAGE_SLOTS, NODE_PAGE_SLOTS_EXPONENT, NodePage, NodeRecord, node_location};
pub use reference::{CHECKSUM_SIZE, Checksum, Key, PageReference};
pub use revision_root::RevisionRootPage;
use snafu::ResultExt;
pub use uber::UberPage;

use crate::error::{Error, Result, TruncatedSnafu};

/// Page type tags used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PageKind {
    /// Leaf page of node records.
    Node = 1,
    /// Name dictionary page.
    Name = 2,
    /// Storage root page.
    Uber = 3,
    /// Indirection trie node.
    Indirect = 4,
    /// Root of one revision.
    RevisionRoot = 5,
}

impl TryFrom<i32> for PageKind {
    type Error = Error;

    fn try_from(tag: i32) -> Result<Self> {
        match tag {
            1 => Ok(Self::Node),
            2 => Ok(Self::Name),
            3 => Ok(Self::Uber),
            4 => Ok(Self::Indirect),
            5 => Ok(Self::RevisionRoot),
            _ => Err(Error::UnknownPageTag { tag }),
        }
    }
}

/// A deserialized page of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    /// Leaf page of node records.
    Node(NodePage),
    /// Name dictionary page.
    Name(NamePage),
    /// Storage root page.
    Uber(UberPage),
    /// Indirection trie node.
    Indirect(IndirectPage),
    /// Root of one revision.
    RevisionRoot(RevisionRootPage),
}

impl Page {
    /// Returns the kind of this page.
    pub fn kind(&self) -> PageKind {
        match self {
            Page::Node(_) => PageKind::Node,
            Page::Name(_) => PageKind::Name,
            Page::Uber(_) => PageKind::Uber,
            Page::Indirect(_) => PageKind::Indirect,
            Page::RevisionRoot(_) => PageKind::RevisionRoot,
        }
    }

    /// Serializes the page, type tag first.
    ///
    /// Child references must already be committed; a dirty child is written
    /// as a null reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooLarge`] if a record or name does not fit its
    /// length prefix.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(self.kind() as i32)?;
        match self {
            Page::Node(page) => page.write_to(&mut buf)?,
            Page::Name(page) => page.write_to(&mut buf)?,
            Page::Uber(page) => page.write_to(&mut buf)?,
            Page::Indirect(page) => page.write_to(&mut buf)?,
            Page::RevisionRoot(page) => page.write_to(&mut buf)?,
        }
        Ok(buf)
    }

    /// Deserializes a page produced by [`Page::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPageTag`] for an unrecognized leading tag,
    /// [`Error::Truncated`] if the bytes end early, and [`Error::Corrupted`]
    /// if bytes remain after the page.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        let tag = buf.read_i32::<BigEndian>().context(TruncatedSnafu { what: "page tag" })?;
        let page = match PageKind::try_from(tag)? {
            PageKind::Node => Page::Node(NodePage::read_from(&mut buf)?),
            PageKind::Name => Page::Name(NamePage::read_from(&mut buf)?),
            PageKind::Uber => Page::Uber(UberPage::read_from(&mut buf)?),
            PageKind::Indirect => Page::Indirect(IndirectPage::read_from(&mut buf)?),
            PageKind::RevisionRoot => Page::RevisionRoot(RevisionRootPage::read_from(&mut buf)?),
        };
        if !buf.is_empty() {
            return Err(Error::Corrupted {
                reason: format!("{} trailing bytes after {:?} page", buf.len(), page.kind()),
            });
        }
        Ok(page)
    }

    /// Returns the node page, or a corruption error naming the actual kind.
    pub(crate) fn into_node(self) -> Result<NodePage> {
        match self {
            Page::Node(page) => Ok(page),
            other => Err(unexpected(PageKind::Node, other.kind())),
        }
    }

    pub(crate) fn into_name(self) -> Result<NamePage> {
        match self {
            Page::Name(page) => Ok(page),
            other => Err(unexpected(PageKind::Name, other.kind())),
        }
    }

    pub(crate) fn into_uber(self) -> Result<UberPage> {
        match self {
            Page::Uber(page) => Ok(page),
            other => Err(unexpected(PageKind::Uber, other.kind())),
        }
    }

    pub(crate) fn into_indirect(self) -> Result<IndirectPage> {
        match self {
            Page::Indirect(page) => Ok(page),
            other => Err(unexpected(PageKind::Indirect, other.kind())),
        }
    }

    pub(crate) fn into_revision_root(self) -> Result<RevisionRootPage> {
        match self {
            Page::RevisionRoot(page) => Ok(page),
            other => Err(unexpected(PageKind::RevisionRoot, other.kind())),
        }
    }
}

fn unexpected(expected: PageKind, found: PageKind) -> Error {
    Error::Corrupted { reason: format!("expected {expected:?} page, found {found:?}") }
}

// ---------------------------------------------------------------------------
// Length-prefixed encoding helpers shared by the page kinds
// ---------------------------------------------------------------------------

/// Converts a length to its big-endian `u32` prefix value.
pub(crate) fn checked_len(len: usize, what: &'static str) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::TooLarge { what, len })
}

/// Writes a `u32` length prefix followed by the bytes.
pub(crate) fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8], what: &'static str) -> Result<()> {
    buf.write_u32::<BigEndian>(checked_len(bytes.len(), what)?)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Reads a `u32` length prefix and that many bytes.
pub(crate) fn take_bytes(buf: &mut &[u8], what: &'static str) -> Result<Vec<u8>> {
    let len = buf.read_u32::<BigEndian>().context(TruncatedSnafu { what })? as usize;
    if buf.len() < len {
        return Err(Error::Truncated {
            what,
            source: io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("need {len} bytes, {} left", buf.len()),
            ),
        });
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head.to_vec())
}
