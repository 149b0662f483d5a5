//! Integrity scrubber for detecting silent data corruption.
//!
//! Walks every page reachable from the beacon, across all committed
//! revisions, and reports pages that fail to load, fail checksum
//! verification, or sit where the trie layout expects another page kind.
//! Pages shared between revisions are visited once.

use std::collections::HashSet;

use crate::{
    error::Result,
    io::Reader,
    page::{INDIRECT_LEVELS, Key, Page, PageKind, PageReference},
    storage::Storage,
};

/// Result of an integrity scrub.
#[derive(Debug, Clone, Default)]
pub struct ScrubResult {
    /// Number of pages read and verified.
    pub pages_checked: u64,
    /// Number of revision roots reached.
    pub revisions_checked: u64,
    /// Detailed error descriptions.
    pub errors: Vec<ScrubError>,
}

impl ScrubResult {
    /// Returns true if no error was found.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A single integrity error detected during scrubbing.
#[derive(Debug, Clone)]
pub struct ScrubError {
    /// Revision of the page holding the failing reference.
    pub revision: u64,
    /// Backend key of the failing page.
    pub key: Key,
    /// Human-readable description of the error.
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
enum Position {
    RevisionTree(usize),
    NodeTree(usize),
    Names,
}

impl Position {
    fn expected(self) -> PageKind {
        match self {
            Self::RevisionTree(depth) | Self::NodeTree(depth) if depth < INDIRECT_LEVELS => {
                PageKind::Indirect
            },
            Self::RevisionTree(_) => PageKind::RevisionRoot,
            Self::NodeTree(_) => PageKind::Node,
            Self::Names => PageKind::Name,
        }
    }

    fn child(self) -> Self {
        match self {
            Self::RevisionTree(depth) => Self::RevisionTree(depth + 1),
            Self::NodeTree(depth) => Self::NodeTree(depth + 1),
            Self::Names => Self::Names,
        }
    }
}

/// Verifies every committed page of a storage.
///
/// Reads through a fresh reader, bypassing transaction caches, so what is
/// verified is what the backend actually holds.
pub struct IntegrityScrubber<'a> {
    storage: &'a Storage,
}

impl<'a> IntegrityScrubber<'a> {
    /// Creates a scrubber for the given storage.
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Walks all committed revisions.
    ///
    /// Damaged pages are reported in the result and their subtrees skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the beacon or the UberPage cannot be loaded,
    /// since nothing else is reachable without them.
    pub fn scrub(&self) -> Result<ScrubResult> {
        let reader = self.storage.factory().reader()?;
        let beacon = reader.read_first_reference()?;
        let uber_key = beacon.key();
        let uber = beacon.into_page()?.into_uber()?;

        let mut walk = Walk {
            reader: reader.as_ref(),
            visited: HashSet::new(),
            result: ScrubResult::default(),
        };
        walk.result.pages_checked += 1;
        walk.visit(uber.revision_tree(), uber.latest_revision(), Position::RevisionTree(0));

        let mut result = walk.result;
        if result.revisions_checked != uber.revision_count() {
            if let Some(key) = uber_key {
                result.errors.push(ScrubError {
                    revision: uber.latest_revision(),
                    key,
                    reason: format!(
                        "reached {} of {} revisions",
                        result.revisions_checked,
                        uber.revision_count()
                    ),
                });
            }
        }
        tracing::debug!(
            pages_checked = result.pages_checked,
            revisions_checked = result.revisions_checked,
            errors = result.errors.len(),
            "Integrity scrub finished"
        );
        Ok(result)
    }
}

struct Walk<'r> {
    reader: &'r dyn Reader,
    visited: HashSet<Key>,
    result: ScrubResult,
}

impl Walk<'_> {
    fn visit(&mut self, reference: &PageReference, revision: u64, position: Position) {
        let Some(key) = reference.key() else {
            return;
        };
        if !self.visited.insert(key) {
            return;
        }
        let page = match self.reader.read(reference) {
            Ok(page) => page,
            Err(err) => {
                self.fail(revision, key, format!("cannot read page: {err}"));
                return;
            },
        };
        self.result.pages_checked += 1;

        if page.kind() != position.expected() {
            let reason =
                format!("expected {:?} page, found {:?}", position.expected(), page.kind());
            self.fail(revision, key, reason);
            return;
        }
        match page {
            Page::Indirect(indirect) => {
                for child in indirect.references() {
                    self.visit(child, indirect.revision(), position.child());
                }
            },
            Page::RevisionRoot(root) => {
                self.result.revisions_checked += 1;
                self.visit(root.name_page(), root.revision(), Position::Names);
                self.visit(root.node_tree(), root.revision(), Position::NodeTree(0));
            },
            Page::Node(_) | Page::Name(_) | Page::Uber(_) => {},
        }
    }

    fn fail(&mut self, revision: u64, key: Key, reason: String) {
        self.result.errors.push(ScrubError { revision, key, reason });
    }
}
