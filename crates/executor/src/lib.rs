//! Query executor: pull-based operator trees over heap-file storage.
//!
//! Every operator follows the same lifecycle:
//!
//! ```text
//! Closed --open()--> Open --next()*--> Open --close()--> Closed
//!                     ^                 |
//!                     +----rewind()-----+
//! ```
//!
//! `rewind()` reproduces exactly the sequence a fresh `open()` would. Filter,
//! join, aggregate and the DML operators materialize their output on `open()`
//! so rewinding never re-runs side effects.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use buffer::BufferPool;
//! use catalog::Catalog;
//! use common::TransactionId;
//! use executor::{execute_query, ExecutionContext, FilterExec, SeqScanExec};
//! use expr::{CompareOp, Predicate};
//! use types::Value;
//!
//! let catalog = Arc::new(Catalog::new());
//! let mut pool = BufferPool::new(Arc::clone(&catalog), 50).unwrap();
//! let table = catalog.table_id("users").unwrap();
//! let scan = SeqScanExec::new(&catalog, table, "u").unwrap();
//! let mut root = FilterExec::new(
//!     Box::new(scan),
//!     Predicate::new(0, CompareOp::Gt, Value::Int(10)),
//! );
//! let mut ctx = ExecutionContext::new(&mut pool, TransactionId::next());
//! let rows = execute_query(&mut root, &mut ctx).unwrap();
//! ```


mod aggregate;
mod dml;
mod filter;
mod join;
mod scan;

pub use aggregate::{
    AggregateExec, AggregateOp, Aggregator, IntegerAggregator, StringAggregator,
};
pub use dml::{DeleteExec, InsertExec};
pub use filter::FilterExec;
pub use join::JoinExec;
pub use scan::SeqScanExec;

use std::{fmt::Write, sync::Arc};

use buffer::BufferPool;
use catalog::Catalog;
use common::{DbError, DbResult, ExecutionStats, Schema, TransactionId, Tuple};

/// Pull-based iterator interface shared by every operator.
///
/// Operators own their children and propagate `open`, `rewind` and `close`
/// to them.
pub trait Executor {
    /// Prepare output. Fails with `IllegalState` if already open.
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Next output tuple, or `None` once exhausted. Fails with `IllegalState`
    /// if the operator is not open.
    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Tuple>>;

    /// Restart output from the beginning.
    fn rewind(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Release buffered output and close children. Safe to call at any time.
    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Schema of the tuples produced by this operator.
    fn schema(&self) -> &Schema;

    fn children(&self) -> Vec<&dyn Executor> {
        Vec::new()
    }

    /// Swap in new children, returning the old ones. Only legal while closed.
    fn replace_children(
        &mut self,
        children: Vec<Box<dyn Executor>>,
    ) -> DbResult<Vec<Box<dyn Executor>>> {
        if children.is_empty() {
            Ok(Vec::new())
        } else {
            Err(DbError::InvalidArgument(format!(
                "operator takes no children, got {}",
                children.len()
            )))
        }
    }

    /// Execution statistics, if the operator collects them.
    fn stats(&self) -> Option<&ExecutionStats> {
        None
    }

    /// Short operator name used in EXPLAIN ANALYZE output.
    fn name(&self) -> &'static str {
        "Operator"
    }
}

/// State shared by every operator in one query: the page cache and the
/// transaction the query runs under.
pub struct ExecutionContext<'a> {
    pub pool: &'a mut BufferPool,
    pub txn: TransactionId,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(pool: &'a mut BufferPool, txn: TransactionId) -> Self {
        Self { pool, txn }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.pool.catalog()
    }
}

/// Open `root`, drain it and close it. The tree is closed on failure too.
pub fn execute_query(root: &mut dyn Executor, ctx: &mut ExecutionContext) -> DbResult<Vec<Tuple>> {
    let drained = root.open(ctx).and_then(|()| drain(root, ctx));
    match drained {
        Ok(results) => {
            root.close(ctx)?;
            Ok(results)
        }
        Err(err) => {
            let _ = root.close(ctx);
            Err(err)
        }
    }
}

/// Render the statistics of an executed tree, one indented line per operator.
///
/// ```text
/// Query: Aggregate rows=1 time=1.2ms (open=1.1ms, next=4µs, close=2µs)
///   Filter rows=3 filtered=2 time=...
///     SeqScan rows=5 pages=2 time=...
/// ```
pub fn format_explain_analyze(root: &dyn Executor, label: &str) -> String {
    let mut out = String::new();
    write_stats(root, &format!("{label}: "), 0, &mut out);
    out
}

fn write_stats(node: &dyn Executor, prefix: &str, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let _ = write!(out, "{indent}{prefix}{}", node.name());
    match node.stats() {
        Some(stats) => {
            let _ = write!(out, " rows={}", stats.rows_produced);
            if stats.rows_filtered > 0 {
                let _ = write!(out, " filtered={}", stats.rows_filtered);
            }
            if stats.pages_scanned > 0 {
                let _ = write!(out, " pages={}", stats.pages_scanned);
            }
            if stats.blocks_probed > 0 {
                let _ = write!(out, " blocks={}", stats.blocks_probed);
            }
            let _ = writeln!(
                out,
                " time={:?} (open={:?}, next={:?}, close={:?})",
                stats.total_time(),
                stats.open_time,
                stats.total_next_time,
                stats.close_time
            );
        }
        None => out.push('\n'),
    }
    for child in node.children() {
        write_stats(child, "", depth + 1, out);
    }
}

/// Output buffered by an eager operator, plus the read cursor over it.
/// `None` while the operator is closed.
#[derive(Debug, Default)]
pub(crate) struct Materialized {
    state: Option<(Vec<Tuple>, usize)>,
}

impl Materialized {
    pub(crate) fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub(crate) fn ensure_closed(&self, operator: &str) -> DbResult<()> {
        if self.is_open() {
            return Err(DbError::IllegalState(format!("{operator} is already open")));
        }
        Ok(())
    }

    pub(crate) fn ensure_open(&self, operator: &str) -> DbResult<()> {
        if !self.is_open() {
            return Err(DbError::IllegalState(format!("{operator} is not open")));
        }
        Ok(())
    }

    pub(crate) fn load(&mut self, rows: Vec<Tuple>) {
        self.state = Some((rows, 0));
    }

    pub(crate) fn next(&mut self, operator: &str) -> DbResult<Option<Tuple>> {
        let (rows, cursor) = self
            .state
            .as_mut()
            .ok_or_else(|| DbError::IllegalState(format!("{operator} is not open")))?;
        let tuple = rows.get(*cursor).cloned();
        if tuple.is_some() {
            *cursor += 1;
        }
        Ok(tuple)
    }

    /// Move the cursor back to the first buffered tuple.
    pub(crate) fn restart(&mut self) {
        if let Some((_, cursor)) = self.state.as_mut() {
            *cursor = 0;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.state = None;
    }
}

/// Pull every remaining tuple from `input`.
pub(crate) fn drain(input: &mut dyn Executor, ctx: &mut ExecutionContext) -> DbResult<Vec<Tuple>> {
    let mut rows = Vec::new();
    while let Some(tuple) = input.next(ctx)? {
        rows.push(tuple);
    }
    Ok(rows)
}

/// Validate the child count handed to `replace_children`.
pub(crate) fn expect_children(
    children: Vec<Box<dyn Executor>>,
    expected: usize,
) -> DbResult<Vec<Box<dyn Executor>>> {
    if children.len() != expected {
        return Err(DbError::InvalidArgument(format!(
            "expected {expected} children, got {}",
            children.len()
        )));
    }
    Ok(children)
}
