//! Incremental revisioning: each snapshot holds only its own changes.

use palimpsest_types::RevisioningKind;

use super::{Revisioning, copy_for_revision, is_full_dump, merge_newest_first};
use crate::{
    error::Result,
    page::{NodePage, NodePageContainer},
};

/// Reads merge every snapshot back to the last full dump.
#[derive(Debug, Clone, Copy, Default)]
pub struct Incremental;

impl Revisioning for Incremental {
    fn kind(&self) -> RevisioningKind {
        RevisioningKind::Incremental
    }

    fn collect_window(
        &self,
        snapshots: &mut dyn Iterator<Item = Result<NodePage>>,
        revisions_to_restore: u32,
    ) -> Result<Vec<NodePage>> {
        let mut window = Vec::new();
        for snapshot in snapshots {
            let snapshot = snapshot?;
            let done = is_full_dump(&snapshot, revisions_to_restore);
            window.push(snapshot);
            if done {
                break;
            }
        }
        Ok(window)
    }

    fn reconstruct_for_read(&self, pages: &[NodePage]) -> NodePage {
        merge_newest_first(pages)
    }

    fn reconstruct_for_write(
        &self,
        pages: &[NodePage],
        _revisions_to_restore: u32,
        new_revision: u64,
        full_dump_required: bool,
    ) -> NodePageContainer {
        let complete = merge_newest_first(pages);
        let modified = if full_dump_required {
            copy_for_revision(&complete, new_revision)
        } else {
            NodePage::new(complete.page_key(), new_revision)
        };
        NodePageContainer::new(complete, modified)
    }
}
