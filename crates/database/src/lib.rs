//! Database facade: configuration, catalog, buffer pool and transactions in
//! one place.
//!
//! ```no_run
//! use common::{Config, Schema};
//! use database::Database;
//! use executor::SeqScanExec;
//! use types::SqlType;
//!
//! let mut db = Database::open(Config::default())?;
//! let users = db.create_table(
//!     "users",
//!     Schema::from_types(&[SqlType::Int, SqlType::Text], &["id", "name"]),
//!     Some("id"),
//! )?;
//! let txn = db.begin();
//! let mut scan = SeqScanExec::new(db.catalog(), users, "u")?;
//! let batch = db.query(txn, &mut scan)?;
//! db.commit(txn)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use buffer::BufferPool;
use catalog::Catalog;
use common::{
    pretty::{render_record_batch, TableStyleKind},
    Config, RecordBatch, Schema, TableId, TransactionId,
};
use executor::{execute_query, format_explain_analyze, ExecutionContext, Executor, JoinExec};
use expr::JoinPredicate;
use storage::HeapFile;
use tracing::{debug, info};

/// Name of the catalog file inside the data directory.
pub const CATALOG_FILE: &str = "catalog.json";

/// Single-process database over a data directory.
pub struct Database {
    config: Config,
    catalog_path: PathBuf,
    catalog: Arc<Catalog>,
    pool: BufferPool,
}

impl Database {
    /// Open (or create) the database rooted at `config.data_dir`, loading
    /// any previously saved catalog.
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).with_context(|| {
            format!(
                "failed to create data directory {}",
                config.data_dir.display()
            )
        })?;

        let catalog_path = config.data_dir.join(CATALOG_FILE);
        let catalog = Catalog::load(&catalog_path, config.page_size)
            .with_context(|| format!("failed to load catalog {}", catalog_path.display()))?;
        let catalog = Arc::new(catalog);
        let pool = BufferPool::new(Arc::clone(&catalog), config.buffer_pool_pages)?;

        info!(
            data_dir = %config.data_dir.display(),
            tables = catalog.table_ids().len(),
            "database opened"
        );
        Ok(Self {
            config,
            catalog_path,
            catalog,
            pool,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&mut self) -> &mut BufferPool {
        &mut self.pool
    }

    /// Create `<data_dir>/<name>.dat`, register it, and persist the catalog.
    pub fn create_table(
        &mut self,
        name: &str,
        schema: Schema,
        primary_key: Option<&str>,
    ) -> Result<TableId> {
        let path = self.config.data_dir.join(format!("{name}.dat"));
        let file = HeapFile::open(&path, schema, self.config.page_size)
            .with_context(|| format!("failed to create heap file {}", path.display()))?;
        let table = self.catalog.add_table(file, name, primary_key)?;
        self.save_catalog()?;
        debug!(name, %table, "created table");
        Ok(table)
    }

    /// Start a new transaction.
    pub fn begin(&self) -> TransactionId {
        TransactionId::next()
    }

    /// Flush the pages `txn` dirtied.
    pub fn commit(&mut self, txn: TransactionId) -> Result<()> {
        self.pool.transaction_complete(txn, true)?;
        Ok(())
    }

    /// Drop the pages `txn` dirtied so later reads see the last commit.
    pub fn abort(&mut self, txn: TransactionId) -> Result<()> {
        self.pool.transaction_complete(txn, false)?;
        Ok(())
    }

    /// Context for driving operators by hand under `txn`.
    pub fn execution_context(&mut self, txn: TransactionId) -> ExecutionContext<'_> {
        ExecutionContext::new(&mut self.pool, txn)
    }

    /// Block nested-loop join whose outer block holds `config.join_buffer_bytes`.
    pub fn join(
        &self,
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        predicate: JoinPredicate,
    ) -> Result<JoinExec> {
        let join = JoinExec::builder()
            .left(left)
            .right(right)
            .predicate(predicate)
            .block_bytes(self.config.join_buffer_bytes)
            .build()?;
        Ok(join)
    }

    /// Run an operator tree to completion under `txn`.
    pub fn query(&mut self, txn: TransactionId, root: &mut dyn Executor) -> Result<RecordBatch> {
        let mut ctx = self.execution_context(txn);
        let rows = execute_query(root, &mut ctx)?;
        Ok(RecordBatch {
            columns: root.schema().names(),
            rows,
        })
    }

    /// Run an operator tree and describe how each operator spent its time.
    pub fn explain_analyze(&mut self, txn: TransactionId, root: &mut dyn Executor) -> Result<String> {
        let batch = self.query(txn, root)?;
        let mut output = String::from("EXPLAIN ANALYZE:\n");
        output.push_str(&format_explain_analyze(root, "Query"));
        output.push_str(&format!("Total rows: {}", batch.rows.len()));
        Ok(output)
    }

    /// Render a result set as a text table.
    pub fn render(batch: &RecordBatch) -> String {
        render_record_batch(batch, TableStyleKind::Modern)
    }

    /// Write the catalog to `<data_dir>/catalog.json`.
    pub fn save_catalog(&self) -> Result<()> {
        self.catalog
            .save(&self.catalog_path)
            .with_context(|| format!("failed to save catalog {}", self.catalog_path.display()))
    }

    /// Flush every dirty page and persist the catalog.
    pub fn close(mut self) -> Result<()> {
        self.pool.flush_all_pages()?;
        self.save_catalog()
    }
}
