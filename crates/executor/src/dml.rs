//! DML operators: Insert and Delete.
//!
//! Both drain their child on `open()`, apply the change through the buffer
//! pool, and emit a single `(count)` tuple. Rewinding replays the count
//! without touching storage again.

use std::time::Instant;

use tracing::debug;

use crate::{drain, expect_children, ExecutionContext, Executor, Materialized};
use catalog::Catalog;
use common::{DbError, DbResult, ExecutionStats, Field, Schema, TableId, Tuple};
use types::{SqlType, Value};

fn count_schema() -> Schema {
    Schema::new(vec![Field::new("count", SqlType::Int)])
}

fn count_tuple(count: usize) -> DbResult<Tuple> {
    let count = i32::try_from(count)
        .map_err(|_| DbError::Executor(format!("row count {count} overflows INT")))?;
    Ok(Tuple::new(vec![Value::Int(count)]))
}

/// Insert operator - writes every child tuple into a table.
pub struct InsertExec {
    table: TableId,
    input: Box<dyn Executor>,
    table_schema: Schema,
    schema: Schema,
    output: Materialized,
    stats: ExecutionStats,
}

impl InsertExec {
    /// Create an insert of `input` into `table`.
    ///
    /// Fails with `InvalidArgument` if the child's field types differ from
    /// the table's.
    pub fn new(catalog: &Catalog, input: Box<dyn Executor>, table: TableId) -> DbResult<Self> {
        let table_schema = catalog.schema(table)?;
        check_types(input.schema(), &table_schema, table)?;
        Ok(Self {
            table,
            input,
            table_schema,
            schema: count_schema(),
            output: Materialized::default(),
            stats: ExecutionStats::default(),
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table
    }
}

fn check_types(child: &Schema, table: &Schema, id: TableId) -> DbResult<()> {
    if !child.same_types(table) {
        return Err(DbError::InvalidArgument(format!(
            "cannot insert ({child}) into table {id} with schema ({table})"
        )));
    }
    Ok(())
}

impl Executor for InsertExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.output.ensure_closed("insert")?;
        self.stats = ExecutionStats::default();

        self.input.open(ctx)?;
        // Drain first so a child scanning the target table never sees its own
        // inserts.
        let rows = drain(self.input.as_mut(), ctx)?;
        let mut inserted = 0;
        for row in rows {
            ctx.pool.insert_tuple(ctx.txn, self.table, row)?;
            inserted += 1;
        }
        debug!(table = %self.table, inserted, "insert complete");
        self.output.load(vec![count_tuple(inserted)?]);

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Tuple>> {
        let start = Instant::now();
        let tuple = self.output.next("insert")?;
        if tuple.is_some() {
            self.stats.rows_produced += 1;
        }
        self.stats.total_next_time += start.elapsed();
        Ok(tuple)
    }

    /// Rewinds the child and re-emits the count. Rows are not inserted again.
    fn rewind(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.output.ensure_open("insert")?;
        self.input.rewind(ctx)?;
        self.output.restart();
        Ok(())
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.output.clear();
        self.input.close(ctx)?;
        self.stats.close_time = start.elapsed();
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn children(&self) -> Vec<&dyn Executor> {
        vec![self.input.as_ref()]
    }

    fn replace_children(
        &mut self,
        children: Vec<Box<dyn Executor>>,
    ) -> DbResult<Vec<Box<dyn Executor>>> {
        self.output.ensure_closed("insert")?;
        let Some(input) = expect_children(children, 1)?.pop() else {
            return Ok(Vec::new());
        };
        check_types(input.schema(), &self.table_schema, self.table)?;
        Ok(vec![std::mem::replace(&mut self.input, input)])
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }

    fn name(&self) -> &'static str {
        "Insert"
    }
}

/// Delete operator - removes every child tuple from the table its record id
/// points into.
pub struct DeleteExec {
    input: Box<dyn Executor>,
    schema: Schema,
    output: Materialized,
    stats: ExecutionStats,
}

impl DeleteExec {
    pub fn new(input: Box<dyn Executor>) -> Self {
        Self {
            input,
            schema: count_schema(),
            output: Materialized::default(),
            stats: ExecutionStats::default(),
        }
    }
}

impl Executor for DeleteExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.output.ensure_closed("delete")?;
        self.stats = ExecutionStats::default();

        self.input.open(ctx)?;
        let rows = drain(self.input.as_mut(), ctx)?;
        let mut deleted = 0;
        for row in &rows {
            ctx.pool.delete_tuple(ctx.txn, row)?;
            deleted += 1;
        }
        debug!(deleted, "delete complete");
        self.output.load(vec![count_tuple(deleted)?]);

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Tuple>> {
        let start = Instant::now();
        let tuple = self.output.next("delete")?;
        if tuple.is_some() {
            self.stats.rows_produced += 1;
        }
        self.stats.total_next_time += start.elapsed();
        Ok(tuple)
    }

    fn rewind(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.output.ensure_open("delete")?;
        self.input.rewind(ctx)?;
        self.output.restart();
        Ok(())
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.output.clear();
        self.input.close(ctx)?;
        self.stats.close_time = start.elapsed();
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn children(&self) -> Vec<&dyn Executor> {
        vec![self.input.as_ref()]
    }

    fn replace_children(
        &mut self,
        children: Vec<Box<dyn Executor>>,
    ) -> DbResult<Vec<Box<dyn Executor>>> {
        self.output.ensure_closed("delete")?;
        let Some(input) = expect_children(children, 1)?.pop() else {
            return Ok(Vec::new());
        };
        Ok(vec![std::mem::replace(&mut self.input, input)])
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }

    fn name(&self) -> &'static str {
        "Delete"
    }
}
