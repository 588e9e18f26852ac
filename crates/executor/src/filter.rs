//! Filter operator: keeps the input tuples a predicate accepts.

use std::time::Instant;

use crate::{drain, expect_children, ExecutionContext, Executor, Materialized};
use common::{DbResult, ExecutionStats, Schema, Tuple};
use expr::TuplePredicate;

/// Filter operator - applies a predicate to the tuples of one child.
///
/// The child is drained on `open()` and the accepted tuples are kept in
/// input order. `rewind()` rewinds the child and filters it again.
pub struct FilterExec {
    input: Box<dyn Executor>,
    predicate: Box<dyn TuplePredicate>,
    output: Materialized,
    stats: ExecutionStats,
}

impl FilterExec {
    /// Create a new filter operator.
    pub fn new(input: Box<dyn Executor>, predicate: impl TuplePredicate + 'static) -> Self {
        Self {
            input,
            predicate: Box::new(predicate),
            output: Materialized::default(),
            stats: ExecutionStats::default(),
        }
    }

    /// Pull the child dry, keeping matching tuples.
    fn collect_matches(&mut self, ctx: &mut ExecutionContext) -> DbResult<Vec<Tuple>> {
        let mut kept = Vec::new();
        for tuple in drain(self.input.as_mut(), ctx)? {
            if self.predicate.matches(&tuple)? {
                kept.push(tuple);
            } else {
                self.stats.rows_filtered += 1;
            }
        }
        Ok(kept)
    }
}

impl Executor for FilterExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.output.ensure_closed("filter")?;
        self.stats = ExecutionStats::default();

        self.input.open(ctx)?;
        let kept = self.collect_matches(ctx)?;
        self.output.load(kept);

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Tuple>> {
        let start = Instant::now();
        let tuple = self.output.next("filter")?;
        if tuple.is_some() {
            self.stats.rows_produced += 1;
        }
        self.stats.total_next_time += start.elapsed();
        Ok(tuple)
    }

    fn rewind(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.output.ensure_open("filter")?;
        self.input.rewind(ctx)?;
        self.stats.rows_filtered = 0;
        let kept = self.collect_matches(ctx)?;
        self.output.load(kept);
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
        self.input.schema()
    }

    fn children(&self) -> Vec<&dyn Executor> {
        vec![self.input.as_ref()]
    }

    fn replace_children(
        &mut self,
        children: Vec<Box<dyn Executor>>,
    ) -> DbResult<Vec<Box<dyn Executor>>> {
        self.output.ensure_closed("filter")?;
        let mut children = expect_children(children, 1)?.into_iter();
        match children.next() {
            Some(input) => Ok(vec![std::mem::replace(&mut self.input, input)]),
            None => Ok(Vec::new()),
        }
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }

    fn name(&self) -> &'static str {
        "Filter"
    }
}
