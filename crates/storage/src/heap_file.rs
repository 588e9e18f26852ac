use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{
    DbError, DbResult, PageId, Permissions, Schema, TableId, TransactionId, Tuple,
};
use tracing::{debug, trace};

use crate::{HeapPage, PageCache};

/// Page-organized tuple store for one table, backed by a single file.
///
/// The file is a contiguous run of `page_size`-byte pages numbered from 0.
/// It only ever grows by appending one empty page.
#[derive(Debug)]
pub struct HeapFile {
    file: File,
    path: PathBuf,
    id: TableId,
    schema: Arc<Schema>,
    page_size: usize,
}

impl HeapFile {
    /// Open (creating if missing) the heap file at `path`.
    pub fn open(path: &Path, schema: Schema, page_size: usize) -> DbResult<Self> {
        if schema.is_empty() {
            return Err(DbError::InvalidArgument(
                "heap file schema must have at least one field".into(),
            ));
        }
        if HeapPage::slot_count(page_size, &schema) == 0 {
            return Err(DbError::InvalidArgument(format!(
                "tuples of {} bytes do not fit in a {page_size}-byte page",
                schema.byte_width()
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(DbError::Storage(format!(
                "{} is {len} bytes, not a multiple of the {page_size}-byte page size",
                path.display()
            )));
        }

        let path = path.canonicalize()?;
        let id = TableId(u64::from(crc32fast::hash(
            path.to_string_lossy().as_bytes(),
        )));
        Ok(Self {
            file,
            path,
            id,
            schema: Arc::new(schema),
            page_size,
        })
    }

    /// Stable id derived from the file's absolute path.
    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len() / self.page_size as u64)
    }

    fn offset(&self, pid: PageId) -> DbResult<u64> {
        if pid.table != self.id {
            return Err(DbError::Storage(format!(
                "page {pid} does not belong to table {}",
                self.id
            )));
        }
        pid.page_no
            .checked_mul(self.page_size as u64)
            .ok_or_else(|| {
                DbError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("page {pid} is beyond the addressable file size"),
                ))
            })
    }

    /// Read and decode one page directly from disk.
    pub fn read_page(&self, pid: PageId) -> DbResult<HeapPage> {
        let num_pages = self.num_pages()?;
        if pid.page_no >= num_pages {
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("page {pid} is outside a file of {num_pages} pages"),
            )));
        }
        let offset = self.offset(pid)?;

        let mut buf = vec![0u8; self.page_size];
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        trace!(%pid, "read page");
        HeapPage::from_bytes(pid, Arc::clone(&self.schema), self.page_size, &buf)
    }

    /// Write exactly one page image at the page's offset.
    pub fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        let offset = self.offset(page.id())?;
        let data = page.to_bytes()?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&data)?;
        file.flush()?;
        trace!(pid = %page.id(), "wrote page");
        Ok(())
    }

    /// Insert into the first page with a free slot, appending a new page when
    /// every existing page is full. Returns the ids of the mutated pages.
    pub fn insert_tuple(
        &self,
        txn: TransactionId,
        tuple: Tuple,
        cache: &mut dyn PageCache,
    ) -> DbResult<Vec<PageId>> {
        self.schema.validate(&tuple)?;

        let num_pages = self.num_pages()?;
        for page_no in 0..num_pages {
            let pid = PageId::new(self.id, page_no);
            let page = cache.get_page(txn, pid, Permissions::ReadWrite)?;
            if page.num_empty_slots() > 0 {
                page.insert_tuple(tuple)?;
                page.mark_dirty(Some(txn));
                return Ok(vec![pid]);
            }
        }

        let pid = PageId::new(self.id, num_pages);
        self.write_page(&HeapPage::empty(
            pid,
            Arc::clone(&self.schema),
            self.page_size,
        ))?;
        debug!(%pid, "appended empty page");

        let page = cache.get_page(txn, pid, Permissions::ReadWrite)?;
        page.insert_tuple(tuple)?;
        page.mark_dirty(Some(txn));
        Ok(vec![pid])
    }

    /// Free the slot recorded on `tuple`. Returns the ids of the mutated pages.
    pub fn delete_tuple(
        &self,
        txn: TransactionId,
        tuple: &Tuple,
        cache: &mut dyn PageCache,
    ) -> DbResult<Vec<PageId>> {
        let rid = tuple
            .rid()
            .ok_or_else(|| DbError::Storage("tuple has no record id".into()))?;
        if rid.page_id.table != self.id || rid.page_id.page_no >= self.num_pages()? {
            return Err(DbError::Storage(format!(
                "tuple {tuple} at {} is not in table {}",
                rid.page_id, self.id
            )));
        }

        let page = cache.get_page(txn, rid.page_id, Permissions::ReadWrite)?;
        page.delete_tuple(tuple)?;
        page.mark_dirty(Some(txn));
        Ok(vec![rid.page_id])
    }

    /// Lazy, restartable iterator over every stored tuple.
    pub fn iter(self: &Arc<Self>, txn: TransactionId) -> HeapFileIterator {
        HeapFileIterator {
            file: Arc::clone(self),
            txn,
            cursor: None,
        }
    }
}

#[derive(Debug)]
struct Cursor {
    next_page: u64,
    pending: VecDeque<Tuple>,
    pages_loaded: u64,
}

/// Page-by-page iterator over a heap file, reading through the page cache.
///
/// Empty pages are skipped before `has_next` reports, so `has_next` is
/// true exactly when another tuple can be produced.
#[derive(Debug)]
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    txn: TransactionId,
    cursor: Option<Cursor>,
}

impl HeapFileIterator {
    pub fn open(&mut self, cache: &mut dyn PageCache) -> DbResult<()> {
        if self.cursor.is_some() {
            return Err(DbError::IllegalState(format!(
                "iterator over table {} is already open",
                self.file.id()
            )));
        }
        let mut cursor = Cursor {
            next_page: 0,
            pending: VecDeque::new(),
            pages_loaded: 0,
        };
        self.fill(&mut cursor, cache)?;
        self.cursor = Some(cursor);
        Ok(())
    }

    /// Load pages until a tuple is buffered or the file runs out.
    fn fill(&self, cursor: &mut Cursor, cache: &mut dyn PageCache) -> DbResult<()> {
        let num_pages = self.file.num_pages()?;
        while cursor.pending.is_empty() && cursor.next_page < num_pages {
            let pid = PageId::new(self.file.id(), cursor.next_page);
            let page = cache.get_page(self.txn, pid, Permissions::ReadOnly)?;
            cursor.pending.extend(page.tuples().cloned());
            cursor.next_page += 1;
            cursor.pages_loaded += 1;
        }
        Ok(())
    }

    fn not_open(&self) -> DbError {
        DbError::IllegalState(format!(
            "iterator over table {} is not open",
            self.file.id()
        ))
    }

    pub fn has_next(&self) -> DbResult<bool> {
        let cursor = self.cursor.as_ref().ok_or_else(|| self.not_open())?;
        Ok(!cursor.pending.is_empty())
    }

    pub fn next(&mut self, cache: &mut dyn PageCache) -> DbResult<Tuple> {
        let mut cursor = self.cursor.take().ok_or_else(|| self.not_open())?;
        let result = match cursor.pending.pop_front() {
            Some(tuple) => self.fill(&mut cursor, cache).map(|()| tuple),
            None => Err(DbError::NoSuchElement(format!(
                "table {} has no more tuples",
                self.file.id()
            ))),
        };
        self.cursor = Some(cursor);
        result
    }

    /// Restart from the first page; equivalent to close followed by open.
    pub fn rewind(&mut self, cache: &mut dyn PageCache) -> DbResult<()> {
        if self.cursor.is_none() {
            return Err(self.not_open());
        }
        self.close();
        self.open(cache)
    }

    pub fn close(&mut self) {
        self.cursor = None;
    }

    pub fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    /// Pages read since the last open.
    pub fn pages_loaded(&self) -> u64 {
        self.cursor.as_ref().map_or(0, |c| c.pages_loaded)
    }

    pub fn file(&self) -> &Arc<HeapFile> {
        &self.file
    }
}
