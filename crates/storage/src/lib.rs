//! Heap-file storage: fixed-size slotted pages holding fixed-width tuples.
//!
//! Pages are addressed by [`common::PageId`] and always fetched through a
//! [`PageCache`], which owns residency and dirty tracking. The heap file
//! itself only reads pages directly when the cache asks it to, and writes
//! directly only when appending a freshly allocated page.

mod heap_file;
mod page;

pub use heap_file::{HeapFile, HeapFileIterator};
pub use page::HeapPage;

use common::{DbResult, PageId, Permissions, TransactionId};

/// Page-cache collaborator consulted by heap files for every page access.
///
/// Repeated requests for the same page inside one transaction must hand
/// back the same cached page so mutations are observed by later reads.
pub trait PageCache {
    fn get_page(
        &mut self,
        txn: TransactionId,
        pid: PageId,
        perm: Permissions,
    ) -> DbResult<&mut HeapPage>;
}
