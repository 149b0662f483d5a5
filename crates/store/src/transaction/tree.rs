//! Copy-on-write edits of the in-memory indirection trees.

use super::resolver::PageResolver;
use crate::{
    error::{Error, Result},
    io::Writer,
    page::{IndirectPage, Page, PageReference, level_offsets},
};

/// Makes the path from `root` to `key` writable in `revision` and returns
/// the leaf slot.
///
/// Committed indirect pages on the path are replaced by in-memory copies
/// whose children still point at the committed pages, so only the path
/// itself is rewritten at commit.
pub(crate) fn prepare_leaf<'a>(
    resolver: &PageResolver,
    root: &'a mut PageReference,
    key: u64,
    revision: u64,
) -> Result<&'a mut PageReference> {
    let offsets = level_offsets(key)?;
    let mut reference = root;
    for offset in offsets {
        reference = writable_indirect(resolver, reference, revision)?.reference_mut(offset);
    }
    Ok(reference)
}

fn writable_indirect<'a>(
    resolver: &PageResolver,
    reference: &'a mut PageReference,
    revision: u64,
) -> Result<&'a mut IndirectPage> {
    if !reference.is_dirty() {
        let page = match resolver.indirect(reference)? {
            Some(committed) => committed.for_revision(revision),
            None => IndirectPage::new(revision),
        };
        reference.set_page(Page::Indirect(page));
    }
    match reference.page_mut() {
        Some(Page::Indirect(page)) => Ok(page),
        Some(other) => Err(Error::Corrupted {
            reason: format!("expected an indirect page, found {:?}", other.kind()),
        }),
        None => Err(Error::Corrupted { reason: "indirect reference lost its page".to_string() }),
    }
}

/// Writes every dirty page reachable from `reference`, children first.
///
/// Written pages are dropped from memory; their references keep the key.
/// Returns the number of pages written.
pub(crate) fn commit_page(writer: &mut dyn Writer, reference: &mut PageReference) -> Result<usize> {
    if !reference.is_dirty() {
        return Ok(0);
    }
    let mut written = 0;
    match reference.page_mut() {
        Some(Page::Indirect(page)) => {
            for child in page.references_mut() {
                written += commit_page(writer, child)?;
            }
        },
        Some(Page::RevisionRoot(page)) => {
            written += commit_page(writer, page.name_page_mut())?;
            written += commit_page(writer, page.node_tree_mut())?;
        },
        Some(Page::Uber(page)) => {
            written += commit_page(writer, page.revision_tree_mut())?;
        },
        Some(Page::Node(_) | Page::Name(_)) | None => {},
    }
    writer.write(reference)?;
    reference.clear_page();
    Ok(written + 1)
}
