//! On-disk overflow for evicted page containers.

use std::{fs, io, path::PathBuf};

use redb::{Database, Durability, ReadableTable, TableDefinition};
use snafu::ResultExt;

use crate::{
    error::{
        KvCommitSnafu, KvDatabaseSnafu, KvStorageSnafu, KvTableSnafu, KvTransactionSnafu, Result,
    },
    page::NodePageContainer,
};

/// File name of the overflow database inside its directory.
const LOG_FILE: &str = "log.redb";

/// Containers keyed by page key.
const CONTAINERS: TableDefinition<u64, &[u8]> = TableDefinition::new("containers");

/// Persistent store for containers evicted from the hot tier.
///
/// The database is opened on the first spill and removed by
/// [`clear`](Self::clear) or on drop. Spills skip fsync: the log never
/// outlives its transaction.
pub(crate) struct OverflowLog {
    dir: PathBuf,
    db: Option<Database>,
}

impl OverflowLog {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir, db: None }
    }

    pub(crate) fn put(&mut self, page_key: u64, container: &NodePageContainer) -> Result<()> {
        let bytes = container.to_bytes()?;
        let db = self.open()?;
        let mut txn = db.begin_write().context(KvTransactionSnafu)?;
        txn.set_durability(Durability::None);
        {
            let mut table = txn.open_table(CONTAINERS).context(KvTableSnafu)?;
            table.insert(page_key, bytes.as_slice()).context(KvStorageSnafu)?;
        }
        txn.commit().context(KvCommitSnafu)
    }

    pub(crate) fn get(&self, page_key: u64) -> Result<Option<NodePageContainer>> {
        let Some(db) = &self.db else {
            return Ok(None);
        };
        let txn = db.begin_read().context(KvTransactionSnafu)?;
        let table = txn.open_table(CONTAINERS).context(KvTableSnafu)?;
        match table.get(page_key).context(KvStorageSnafu)? {
            Some(bytes) => Ok(Some(NodePageContainer::from_bytes(bytes.value())?)),
            None => Ok(None),
        }
    }

    pub(crate) fn clear(&mut self) -> Result<()> {
        self.db = None;
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn open(&mut self) -> Result<&Database> {
        let db = match self.db.take() {
            Some(db) => db,
            None => {
                fs::create_dir_all(&self.dir)?;
                let db = Database::create(self.dir.join(LOG_FILE)).context(KvDatabaseSnafu)?;
                // Create the table up front so readers never see it missing.
                let txn = db.begin_write().context(KvTransactionSnafu)?;
                txn.open_table(CONTAINERS).context(KvTableSnafu)?;
                txn.commit().context(KvCommitSnafu)?;
                db
            },
        };
        Ok(self.db.insert(db))
    }
}

impl Drop for OverflowLog {
    fn drop(&mut self) {
        if let Err(err) = self.clear() {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %err,
                "Failed to remove overflow log"
            );
        }
    }
}
