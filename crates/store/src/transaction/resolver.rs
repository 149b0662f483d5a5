//! Loading committed pages through the indirection trees.

use std::{cell::RefCell, collections::HashMap, sync::Arc};

use crate::{
    error::{Error, Result},
    io::Reader,
    page::{
        IndirectPage, Key, NamePage, NodePage, PageReference, RevisionRootPage, UberPage,
        level_offsets,
    },
};

/// Resolves committed references against one pinned UberPage.
///
/// Every page loaded is kept for the resolver's lifetime, keyed by its
/// backend key. Committed pages never change, so entries never go stale.
pub(crate) struct PageResolver {
    reader: Box<dyn Reader>,
    uber: Arc<UberPage>,
    roots: RefCell<HashMap<u64, Arc<RevisionRootPage>>>,
    indirect: RefCell<HashMap<Key, Arc<IndirectPage>>>,
    nodes: RefCell<HashMap<Key, Arc<NodePage>>>,
    names: RefCell<HashMap<Key, Arc<NamePage>>>,
}

impl PageResolver {
    pub(crate) fn new(reader: Box<dyn Reader>, uber: Arc<UberPage>) -> Self {
        Self {
            reader,
            uber,
            roots: RefCell::default(),
            indirect: RefCell::default(),
            nodes: RefCell::default(),
            names: RefCell::default(),
        }
    }

    pub(crate) fn uber(&self) -> &UberPage {
        &self.uber
    }

    pub(crate) fn latest_revision(&self) -> u64 {
        self.uber.latest_revision()
    }

    /// Loads the root page of a committed revision.
    pub(crate) fn revision_root(&self, revision: u64) -> Result<Arc<RevisionRootPage>> {
        if let Some(root) = self.roots.borrow().get(&revision) {
            return Ok(Arc::clone(root));
        }
        let latest = self.latest_revision();
        if revision > latest {
            return Err(Error::RevisionNotFound { revision, latest });
        }
        let leaf = self.leaf_reference(self.uber.revision_tree(), revision)?.ok_or_else(|| {
            Error::Corrupted { reason: format!("revision {revision} missing from revision tree") }
        })?;
        let root = Arc::new(self.reader.read(&leaf)?.into_revision_root()?);
        self.roots.borrow_mut().insert(revision, Arc::clone(&root));
        Ok(root)
    }

    /// Follows `root` down to the leaf reference for `key`.
    ///
    /// Returns `None` if any reference on the path is null.
    pub(crate) fn leaf_reference(
        &self,
        root: &PageReference,
        key: u64,
    ) -> Result<Option<PageReference>> {
        let offsets = level_offsets(key)?;
        let mut reference = root.detached();
        for offset in offsets {
            let Some(page) = self.indirect(&reference)? else {
                return Ok(None);
            };
            reference = page.reference(offset).detached();
        }
        Ok((!reference.is_null()).then_some(reference))
    }

    /// Loads a committed indirect page, or `None` for a null reference.
    pub(crate) fn indirect(&self, reference: &PageReference) -> Result<Option<Arc<IndirectPage>>> {
        let Some(key) = reference.key() else {
            return Ok(None);
        };
        if let Some(page) = self.indirect.borrow().get(&key) {
            return Ok(Some(Arc::clone(page)));
        }
        let page = Arc::new(self.reader.read(reference)?.into_indirect()?);
        self.indirect.borrow_mut().insert(key, Arc::clone(&page));
        Ok(Some(page))
    }

    /// Loads one stored node page snapshot.
    pub(crate) fn node_snapshot(&self, reference: &PageReference) -> Result<Arc<NodePage>> {
        let key = reference.key().ok_or_else(|| Error::Corrupted {
            reason: "node page reference has no key".to_string(),
        })?;
        if let Some(page) = self.nodes.borrow().get(&key) {
            return Ok(Arc::clone(page));
        }
        let page = Arc::new(self.reader.read(reference)?.into_node()?);
        self.nodes.borrow_mut().insert(key, Arc::clone(&page));
        Ok(page)
    }

    /// Loads the name dictionary of `revision`, if it has one.
    pub(crate) fn name_page(&self, revision: u64) -> Result<Option<Arc<NamePage>>> {
        let root = self.revision_root(revision)?;
        let reference = root.name_page();
        let Some(key) = reference.key() else {
            return Ok(None);
        };
        if let Some(page) = self.names.borrow().get(&key) {
            return Ok(Some(Arc::clone(page)));
        }
        let page = Arc::new(self.reader.read(reference)?.into_name()?);
        self.names.borrow_mut().insert(key, Arc::clone(&page));
        Ok(Some(page))
    }

    /// Stored snapshots of `page_key`, newest first, starting at `revision`.
    pub(crate) fn snapshots(&self, page_key: u64, revision: u64) -> SnapshotWalk<'_> {
        SnapshotWalk { resolver: self, page_key, next_revision: Some(revision), last_key: None }
    }
}

/// Lazily yields the distinct stored snapshots of one page key.
///
/// Starts at the pinned revision and walks back towards revision 0. Each
/// snapshot records the revision that wrote it, so the walk resumes just
/// below that revision. It ends at the first revision whose tree does not
/// reach the page key, or on the first error.
pub(crate) struct SnapshotWalk<'r> {
    resolver: &'r PageResolver,
    page_key: u64,
    next_revision: Option<u64>,
    last_key: Option<Key>,
}

impl SnapshotWalk<'_> {
    fn step(&mut self, revision: u64) -> Result<Option<NodePage>> {
        let root = self.resolver.revision_root(revision)?;
        let Some(leaf) = self.resolver.leaf_reference(root.node_tree(), self.page_key)? else {
            self.next_revision = None;
            return Ok(None);
        };
        if leaf.key() == self.last_key {
            self.next_revision = revision.checked_sub(1);
            return Ok(None);
        }
        self.last_key = leaf.key();
        let page = self.resolver.node_snapshot(&leaf)?;
        self.next_revision = page.revision().min(revision).checked_sub(1);
        Ok(Some(NodePage::clone(&page)))
    }
}

impl Iterator for SnapshotWalk<'_> {
    type Item = Result<NodePage>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(revision) = self.next_revision {
            match self.step(revision) {
                Ok(Some(page)) => return Some(Ok(page)),
                Ok(None) => {},
                Err(err) => {
                    self.next_revision = None;
                    return Some(Err(err));
                },
            }
        }
        None
    }
}
