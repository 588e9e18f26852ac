//! Sequential scan over one heap file.

use std::{sync::Arc, time::Instant};

use crate::{ExecutionContext, Executor};
use catalog::Catalog;
use common::{DbError, DbResult, ExecutionStats, Schema, TableId, Tuple};
use storage::{HeapFile, HeapFileIterator};

/// Sequential scan operator: every tuple of a table, page by page.
///
/// Output field names are prefixed with the table alias (`alias.field`) so
/// two scans of one table under different aliases stay distinguishable.
pub struct SeqScanExec {
    table: TableId,
    table_name: String,
    alias: String,
    file: Arc<HeapFile>,
    schema: Schema,
    iter: Option<HeapFileIterator>,
    stats: ExecutionStats,
}

impl SeqScanExec {
    /// Create a scan of `table`, renaming its fields under `alias`.
    pub fn new(catalog: &Catalog, table: TableId, alias: &str) -> DbResult<Self> {
        let meta = catalog.table_by_id(table)?;
        Ok(Self {
            table,
            schema: meta.file.schema().with_alias(alias),
            table_name: meta.name,
            alias: alias.to_string(),
            file: meta.file,
            iter: None,
            stats: ExecutionStats::default(),
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table
    }

    /// Name the catalog knows the scanned table by.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Point the scan at another table and alias. Only legal while closed.
    pub fn reset(&mut self, catalog: &Catalog, table: TableId, alias: &str) -> DbResult<()> {
        if self.iter.is_some() {
            return Err(DbError::IllegalState(format!(
                "cannot reset scan of '{}' while it is open",
                self.table_name
            )));
        }
        *self = Self::new(catalog, table, alias)?;
        Ok(())
    }

    fn iter_mut(&mut self) -> DbResult<&mut HeapFileIterator> {
        let table_name = &self.table_name;
        self.iter
            .as_mut()
            .ok_or_else(|| DbError::IllegalState(format!("scan of '{table_name}' is not open")))
    }
}

impl Executor for SeqScanExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        if self.iter.is_some() {
            return Err(DbError::IllegalState(format!(
                "scan of '{}' is already open",
                self.table_name
            )));
        }
        self.stats = ExecutionStats::default();

        let mut iter = self.file.iter(ctx.txn);
        iter.open(&mut *ctx.pool)?;
        self.stats.pages_scanned = iter.pages_loaded();
        self.iter = Some(iter);

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Tuple>> {
        let start = Instant::now();
        let iter = self.iter_mut()?;

        let tuple = if iter.has_next()? {
            Some(iter.next(&mut *ctx.pool)?)
        } else {
            None
        };
        let pages_loaded = iter.pages_loaded();

        self.stats.pages_scanned = pages_loaded;
        if tuple.is_some() {
            self.stats.rows_produced += 1;
        }
        self.stats.total_next_time += start.elapsed();
        Ok(tuple)
    }

    fn rewind(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.iter_mut()?.rewind(&mut *ctx.pool)
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        if let Some(mut iter) = self.iter.take() {
            iter.close();
        }
        self.stats.close_time = start.elapsed();
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }

    fn name(&self) -> &'static str {
        "SeqScan"
    }
}
