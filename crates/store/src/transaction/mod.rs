//! Read and write transactions over committed revisions.
//!
//! ```text
//!            UberPage (beacon)
//!                 |
//!          revision trie ── IndirectPage x5
//!                 |
//!         RevisionRootPage (one per revision)
//!            /          \
//!      NamePage      node trie ── IndirectPage x5
//!                         |
//!                      NodePage
//! ```
//!
//! A [`ReadTransaction`] pins one committed revision and reconstructs node
//! pages on demand. The single [`WriteTransaction`] copies the path to every
//! page it touches and publishes the new revision through the beacon.

mod read;
mod resolver;
mod tree;
mod write;

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

pub use read::ReadTransaction;
pub(crate) use resolver::PageResolver;
pub use write::WriteTransaction;

use crate::{
    error::Result,
    io::IoFactory,
    page::{NamePage, NodePage, Page, PageReference, RevisionRootPage, UberPage},
    revisioning::Revisioning,
};

/// Loads the window `strategy` needs to rebuild `page_key` as of `revision`.
///
/// An empty window means the page key has never been written.
pub(crate) fn collect_window(
    resolver: &PageResolver,
    strategy: &dyn Revisioning,
    page_key: u64,
    revision: u64,
    revisions_to_restore: u32,
) -> Result<Vec<NodePage>> {
    let mut snapshots = resolver.snapshots(page_key, revision);
    strategy.collect_window(&mut snapshots, revisions_to_restore)
}

/// Writes revision 0 of a fresh storage: an empty name dictionary, an empty
/// node trie, and the first beacon.
pub(crate) fn write_bootstrap(factory: &IoFactory) -> Result<UberPage> {
    let resolver = PageResolver::new(factory.reader()?, Arc::new(UberPage::bootstrap()));
    let mut writer = factory.writer()?;

    let mut root = RevisionRootPage::bootstrap(0);
    root.name_page_mut().set_page(Page::Name(NamePage::new(0)));
    root.set_commit_timestamp(now_millis());

    let mut uber = UberPage::bootstrap();
    tree::prepare_leaf(&resolver, uber.revision_tree_mut(), 0, 0)?
        .set_page(Page::RevisionRoot(root));
    tree::commit_page(writer.as_mut(), uber.revision_tree_mut())?;

    let committed = uber.clone();
    writer.write_first_reference(&mut PageReference::with_page(Page::Uber(uber)))?;
    Ok(committed)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
