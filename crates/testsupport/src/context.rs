//! Test database with isolated temporary storage.
//!
//! Each test gets its own data directory, catalog and buffer pool, all of
//! which disappear when the context is dropped.

use std::{path::Path, sync::Arc};

use anyhow::Result;
use catalog::Catalog;
use common::{Config, Schema, TableId, TransactionId, Tuple};
use database::Database;
use executor::{ExecutionContext, Executor};
use tempfile::TempDir;

use crate::fixtures::{int_tuples, schemas};

/// Page size that fits exactly four single-INT tuples.
pub const FOUR_SLOT_PAGE: usize = 20;

/// A database over a temporary directory.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let mut ctx = TestContext::new().unwrap();
/// let table = ctx.table_with_ints("t", &[1, 2, 3]).unwrap();
/// assert_eq!(ctx.catalog().table_name(table).unwrap(), "t");
/// ```
pub struct TestContext {
    db: Database,
    _temp_dir: TempDir,
}

impl TestContext {
    /// Create a context with the default page size.
    pub fn new() -> Result<Self> {
        Self::with_config(|config| config)
    }

    /// Create a context whose heap files use `page_size` byte pages.
    pub fn with_page_size(page_size: usize) -> Result<Self> {
        Self::with_config(|config| Config {
            page_size,
            ..config
        })
    }

    /// Create a context from a default config adjusted by `adjust`. The data
    /// directory is always the context's temporary directory.
    pub fn with_config(adjust: impl FnOnce(Config) -> Config) -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..adjust(Config::default())
        };
        let db = Database::open(config)?;
        Ok(Self {
            db,
            _temp_dir: temp_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.db.config().data_dir
    }

    pub fn database(&mut self) -> &mut Database {
        &mut self.db
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.db.catalog()
    }

    /// Execution context for driving operators by hand under `txn`.
    pub fn execution_context(&mut self, txn: TransactionId) -> ExecutionContext<'_> {
        self.db.execution_context(txn)
    }

    /// Create an empty table.
    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<TableId> {
        self.db.create_table(name, schema, None)
    }

    /// Insert `rows` into `table` in one committed transaction.
    pub fn insert_rows(&mut self, table: TableId, rows: Vec<Tuple>) -> Result<()> {
        let txn = self.db.begin();
        for row in rows {
            self.db.buffer_pool().insert_tuple(txn, table, row)?;
        }
        self.db.commit(txn)
    }

    /// Create a table and fill it with `rows`.
    pub fn table_with_rows(&mut self, name: &str, schema: Schema, rows: Vec<Tuple>) -> Result<TableId> {
        let table = self.create_table(name, schema)?;
        self.insert_rows(table, rows)?;
        Ok(table)
    }

    /// Create a single-INT-column table (`v`) holding `values`.
    pub fn table_with_ints(&mut self, name: &str, values: &[i32]) -> Result<TableId> {
        self.table_with_rows(name, schemas::single_int_schema(), int_tuples(values))
    }

    /// Run `root` to completion in its own committed transaction.
    pub fn run(&mut self, root: &mut dyn Executor) -> Result<Vec<Tuple>> {
        let txn = self.db.begin();
        let batch = self.db.query(txn, root)?;
        self.db.commit(txn)?;
        Ok(batch.rows)
    }

    /// Number of pages the heap file behind `table` occupies.
    pub fn num_pages(&self, table: TableId) -> Result<u64> {
        Ok(self.catalog().database_file(table)?.num_pages()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::data;

    #[test]
    fn test_context_creation() {
        let ctx = TestContext::new().unwrap();
        assert!(ctx.data_dir().exists());
        assert!(ctx.catalog().table_ids().is_empty());
    }

    #[test]
    fn test_table_with_rows_creates_heap_file() {
        let mut ctx = TestContext::new().unwrap();
        let users = ctx
            .table_with_rows("users", schemas::users_schema(), data::sample_users())
            .unwrap();
        assert!(ctx.data_dir().join("users.dat").exists());
        assert_eq!(ctx.num_pages(users).unwrap(), 1);
    }

    #[test]
    fn test_small_pages_spill() {
        let mut ctx = TestContext::with_page_size(FOUR_SLOT_PAGE).unwrap();
        let table = ctx.table_with_ints("t", &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(ctx.num_pages(table).unwrap(), 2);
    }
}
