//! Buffer pool: the page cache every heap-file access goes through.
//!
//! - LRU residency bounded by a fixed page count
//! - NO-STEAL eviction: dirty pages stay resident until flushed or discarded
//! - Per-transaction flush on commit and discard on abort
//! - One writer per dirty page: another transaction cannot write it until
//!   the owner completes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use buffer::BufferPool;
//! use catalog::Catalog;
//! use common::{Permissions, TransactionId};
//! use storage::PageCache;
//!
//! let catalog = Arc::new(Catalog::new());
//! let mut pool = BufferPool::new(Arc::clone(&catalog), 50).unwrap();
//! let txn = TransactionId::next();
//! # let pid = common::PageId::new(common::TableId(1), 0);
//! let page = pool.get_page(txn, pid, Permissions::ReadOnly).unwrap();
//! println!("{} free slots", page.num_empty_slots());
//! pool.transaction_complete(txn, true).unwrap();
//! ```

#[cfg(test)]
mod tests;

use std::{num::NonZeroUsize, sync::Arc};

use catalog::Catalog;
use common::{DbError, DbResult, PageId, Permissions, TableId, TransactionId, Tuple};
use lru::LruCache;
use storage::{HeapPage, PageCache};
use tracing::{debug, trace, warn};

/// Fixed-capacity page cache over the heap files registered in a [`Catalog`].
#[derive(Debug)]
pub struct BufferPool {
    catalog: Arc<Catalog>,
    capacity: usize,
    cache: LruCache<PageId, HeapPage>,
}

impl BufferPool {
    /// Create a pool holding at most `num_pages` pages.
    pub fn new(catalog: Arc<Catalog>, num_pages: usize) -> DbResult<Self> {
        let cap = NonZeroUsize::new(num_pages).ok_or_else(|| {
            DbError::InvalidArgument("buffer pool needs room for at least one page".into())
        })?;
        Ok(Self {
            catalog,
            capacity: num_pages,
            cache: LruCache::new(cap),
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pages currently resident.
    pub fn num_cached_pages(&self) -> usize {
        self.cache.len()
    }

    pub fn holds_page(&self, pid: PageId) -> bool {
        self.cache.contains(&pid)
    }

    /// Whether `pid` is resident and dirty.
    pub fn is_dirty(&self, pid: PageId) -> bool {
        self.cache
            .peek(&pid)
            .is_some_and(|page| page.dirtied_by().is_some())
    }

    /// Evict the least recently used clean page. Fails when every resident
    /// page is dirty.
    fn evict_page(&mut self) -> DbResult<()> {
        let victim = self
            .cache
            .iter()
            .rev()
            .find(|(_, page)| page.dirtied_by().is_none())
            .map(|(pid, _)| *pid);
        match victim {
            Some(pid) => {
                self.cache.pop(&pid);
                trace!(%pid, "evicted page");
                Ok(())
            }
            None => {
                warn!(capacity = self.capacity, "no clean page to evict");
                Err(DbError::Storage(format!(
                    "buffer pool full: all {} pages are dirty",
                    self.capacity
                )))
            }
        }
    }

    /// Insert `tuple` into `table`. Pages touched are marked dirty by `txn`.
    pub fn insert_tuple(
        &mut self,
        txn: TransactionId,
        table: TableId,
        tuple: Tuple,
    ) -> DbResult<Vec<PageId>> {
        let file = self.catalog.database_file(table)?;
        file.insert_tuple(txn, tuple, self)
    }

    /// Delete `tuple` from the table named by its record id.
    pub fn delete_tuple(&mut self, txn: TransactionId, tuple: &Tuple) -> DbResult<Vec<PageId>> {
        let rid = tuple
            .rid()
            .ok_or_else(|| DbError::Storage("tuple has no record id".into()))?;
        let file = self.catalog.database_file(rid.page_id.table)?;
        file.delete_tuple(txn, tuple, self)
    }

    /// Write `pid` back to its heap file if it is resident and dirty.
    pub fn flush_page(&mut self, pid: PageId) -> DbResult<()> {
        let Some(page) = self.cache.peek_mut(&pid) else {
            return Ok(());
        };
        if page.dirtied_by().is_none() {
            return Ok(());
        }
        let file = self.catalog.database_file(pid.table)?;
        file.write_page(page)?;
        page.mark_dirty(None);
        debug!(%pid, "flushed page");
        Ok(())
    }

    /// Write every dirty page back to disk.
    pub fn flush_all_pages(&mut self) -> DbResult<()> {
        let dirty = self.dirty_pages(|_| true);
        for pid in dirty {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Write back the pages dirtied by `txn`.
    pub fn flush_pages(&mut self, txn: TransactionId) -> DbResult<()> {
        let dirty = self.dirty_pages(|owner| owner == txn);
        for pid in dirty {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Drop `pid` from the cache without writing it.
    pub fn discard_page(&mut self, pid: PageId) {
        if self.cache.pop(&pid).is_some() {
            trace!(%pid, "discarded page");
        }
    }

    /// Finish `txn`: flush its pages on commit, or discard them on abort so
    /// the next read sees the on-disk image.
    pub fn transaction_complete(&mut self, txn: TransactionId, commit: bool) -> DbResult<()> {
        if commit {
            self.flush_pages(txn)?;
        } else {
            for pid in self.dirty_pages(|owner| owner == txn) {
                self.discard_page(pid);
            }
        }
        debug!(txn = txn.0, commit, "transaction complete");
        Ok(())
    }

    fn dirty_pages(&self, owner: impl Fn(TransactionId) -> bool) -> Vec<PageId> {
        self.cache
            .iter()
            .filter(|(_, page)| page.dirtied_by().is_some_and(&owner))
            .map(|(pid, _)| *pid)
            .collect()
    }
}

impl PageCache for BufferPool {
    /// A page dirtied by one live transaction is not handed out for writing
    /// to another until the first commits or aborts.
    fn get_page(
        &mut self,
        txn: TransactionId,
        pid: PageId,
        perm: Permissions,
    ) -> DbResult<&mut HeapPage> {
        if !self.cache.contains(&pid) {
            let file = self.catalog.database_file(pid.table)?;
            let page = file.read_page(pid)?;
            if self.cache.len() >= self.capacity {
                self.evict_page()?;
            }
            trace!(%pid, ?perm, "loaded page");
            self.cache.push(pid, page);
        }
        let page = self
            .cache
            .get_mut(&pid)
            .ok_or_else(|| DbError::IllegalState(format!("page {pid} vanished from the cache")))?;
        if perm == Permissions::ReadWrite {
            if let Some(owner) = page.dirtied_by().filter(|owner| *owner != txn) {
                warn!(%pid, owner = owner.0, txn = txn.0, "write conflict");
                return Err(DbError::Storage(format!(
                    "page {pid} has uncommitted changes from transaction {}",
                    owner.0
                )));
            }
        }
        Ok(page)
    }
}
