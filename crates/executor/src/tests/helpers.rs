//! Test helpers and utilities for executor tests.

use std::{collections::VecDeque, sync::Arc};

use crate::{ExecutionContext, Executor};
use buffer::BufferPool;
use catalog::Catalog;
use common::{DbError, DbResult, Schema, TableId, TransactionId, Tuple};
use storage::HeapFile;
use tempfile::TempDir;
use types::{SqlType, Value};

/// One INT column on a 20-byte page: four slots per page.
pub const FOUR_SLOT_PAGE: usize = 20;

/// Mock executor for testing operators in isolation.
///
/// Replays a fixed list of tuples, counts lifecycle calls, and can inject a
/// one-shot error into `open()` or `next()`.
pub struct MockExecutor {
    rows: Vec<Tuple>,
    pending: VecDeque<Tuple>,
    schema: Schema,
    next_error: Option<DbError>,
    open_error: Option<DbError>,
    pub open_calls: usize,
    pub rewind_calls: usize,
    pub close_calls: usize,
}

impl MockExecutor {
    /// Create a mock executor that returns the given rows.
    pub fn new(rows: Vec<Tuple>, schema: Schema) -> Self {
        Self {
            rows,
            pending: VecDeque::new(),
            schema,
            next_error: None,
            open_error: None,
            open_calls: 0,
            rewind_calls: 0,
            close_calls: 0,
        }
    }

    /// Mock with a single INT column named `name`.
    pub fn ints(name: &str, values: &[i32]) -> Self {
        Self::new(
            int_tuples(values),
            Schema::from_types(&[SqlType::Int], &[name]),
        )
    }

    /// Create a mock executor that returns an error on the first next().
    pub fn with_next_error(schema: Schema, error: DbError) -> Self {
        let mut mock = Self::new(Vec::new(), schema);
        mock.next_error = Some(error);
        mock
    }

    /// Create a mock executor that returns an error on the first open().
    pub fn with_open_error(schema: Schema, error: DbError) -> Self {
        let mut mock = Self::new(Vec::new(), schema);
        mock.open_error = Some(error);
        mock
    }
}

impl Executor for MockExecutor {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.open_calls += 1;
        if let Some(error) = self.open_error.take() {
            return Err(error);
        }
        self.pending = self.rows.iter().cloned().collect();
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Tuple>> {
        if let Some(error) = self.next_error.take() {
            return Err(error);
        }
        Ok(self.pending.pop_front())
    }

    fn rewind(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.rewind_calls += 1;
        self.pending = self.rows.iter().cloned().collect();
        Ok(())
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.close_calls += 1;
        self.pending.clear();
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Set up an ExecutionContext over an empty catalog in a temporary directory.
///
/// Uses Box::leak to create the 'static pool reference required by the
/// context. Keep the TempDir alive for the duration of the test.
pub fn setup_test_context() -> (ExecutionContext<'static>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(Catalog::new());
    let pool = Box::leak(Box::new(BufferPool::new(catalog, 16).unwrap()));
    (ExecutionContext::new(pool, TransactionId::next()), temp_dir)
}

/// Register a single-INT-column table `name` (column `v`, four slots per
/// page) and fill it with `values`, flushed to disk.
pub fn seed_table(
    ctx: &mut ExecutionContext,
    temp_dir: &TempDir,
    name: &str,
    values: &[i32],
) -> TableId {
    let schema = Schema::from_types(&[SqlType::Int], &["v"]);
    create_table(ctx, temp_dir, name, schema, FOUR_SLOT_PAGE, int_tuples(values))
}

/// Register a table with an arbitrary schema and page size and fill it.
pub fn create_table(
    ctx: &mut ExecutionContext,
    temp_dir: &TempDir,
    name: &str,
    schema: Schema,
    page_size: usize,
    rows: Vec<Tuple>,
) -> TableId {
    let path = temp_dir.path().join(format!("{name}.dat"));
    let file = HeapFile::open(&path, schema, page_size).unwrap();
    let table = ctx.catalog().add_table(file, name, None).unwrap();
    for row in rows {
        ctx.pool.insert_tuple(ctx.txn, table, row).unwrap();
    }
    ctx.pool.flush_all_pages().unwrap();
    table
}

/// Create a tuple with a single integer value.
pub fn int_tuple(v: i32) -> Tuple {
    Tuple::new(vec![Value::Int(v)])
}

/// Create one single-integer tuple per value.
pub fn int_tuples(values: &[i32]) -> Vec<Tuple> {
    values.iter().copied().map(int_tuple).collect()
}

/// Create a tuple from integer values.
pub fn ints(values: &[i32]) -> Tuple {
    Tuple::new(values.iter().map(|&v| Value::Int(v)).collect())
}

/// Create a `(Int, Text)` tuple.
pub fn int_text(n: i32, s: &str) -> Tuple {
    Tuple::new(vec![Value::Int(n), Value::Text(s.into())])
}

// Assertion helpers

/// Assert that next() returns the expected tuple.
pub fn assert_next_row(exec: &mut dyn Executor, ctx: &mut ExecutionContext, expected: Tuple) {
    match exec.next(ctx) {
        Ok(Some(tuple)) => assert_eq!(tuple.values, expected.values, "row mismatch"),
        Ok(None) => panic!("expected row, got None"),
        Err(e) => panic!("expected row, got error: {}", e),
    }
}

/// Assert that next() returns None (exhausted).
pub fn assert_exhausted(exec: &mut dyn Executor, ctx: &mut ExecutionContext) {
    match exec.next(ctx) {
        Ok(None) => {}
        Ok(Some(tuple)) => panic!("expected exhausted, got row: {}", tuple),
        Err(e) => panic!("expected exhausted, got error: {}", e),
    }
}

/// Drain an open executor.
pub fn drain_rows(exec: &mut dyn Executor, ctx: &mut ExecutionContext) -> Vec<Tuple> {
    let mut rows = Vec::new();
    while let Some(tuple) = exec.next(ctx).unwrap() {
        rows.push(tuple);
    }
    rows
}

/// Assert that a result is an error containing the expected message.
pub fn assert_error_contains<T: std::fmt::Debug>(result: DbResult<T>, expected_msg: &str) {
    match result {
        Ok(val) => panic!(
            "expected error containing '{}', got Ok({:?})",
            expected_msg, val
        ),
        Err(e) => {
            let error_str = format!("{}", e);
            assert!(
                error_str.contains(expected_msg),
                "expected error containing '{}', got '{}'",
                expected_msg,
                error_str
            );
        }
    }
}

/// Assert that a result is an `IllegalState` error.
pub fn assert_illegal_state<T>(result: DbResult<T>) {
    match result {
        Ok(_) => panic!("expected IllegalState error, got Ok"),
        Err(DbError::IllegalState(_)) => {}
        Err(e) => panic!("expected IllegalState error, got {}", e),
    }
}
