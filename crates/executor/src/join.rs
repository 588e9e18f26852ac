//! Join operator: block nested-loop join of two children.

use std::time::Instant;

use crate::{drain, expect_children, ExecutionContext, Executor, Materialized};
use common::{DbError, DbResult, ExecutionStats, Schema, Tuple, DEFAULT_JOIN_BUFFER_BYTES};
use expr::JoinPredicate;
use tracing::{debug, trace};

/// Block nested-loop join.
///
/// # Algorithm
///
/// 1. Buffer up to `block_capacity` left (outer) tuples.
/// 2. Rewind the right (inner) child and scan it once, testing every right
///    tuple against every buffered left tuple; emit `left ++ right` on a match.
/// 3. Clear the block and repeat until the left child is exhausted. The final
///    partial block, even an empty one, is probed once.
///
/// The whole result is materialized on `open()`. Output schema is the left
/// schema followed by the right schema.
pub struct JoinExec {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    predicate: JoinPredicate,
    block_bytes: usize,
    block_capacity: usize,
    schema: Schema,
    output: Materialized,
    stats: ExecutionStats,
}

#[bon::bon]
impl JoinExec {
    /// Create a new join operator using a builder pattern.
    ///
    /// # Example
    /// ```ignore
    /// let join = JoinExec::builder()
    ///     .left(Box::new(orders))
    ///     .right(Box::new(customers))
    ///     .predicate(JoinPredicate::equals(1, 0))
    ///     .block_bytes(4096)
    ///     .build()?;
    /// ```
    #[builder]
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        predicate: JoinPredicate,
        #[builder(default = DEFAULT_JOIN_BUFFER_BYTES)] block_bytes: usize,
    ) -> DbResult<Self> {
        let (schema, block_capacity) =
            Self::plan(left.schema(), right.schema(), &predicate, block_bytes)?;
        Ok(Self {
            left,
            right,
            predicate,
            block_bytes,
            block_capacity,
            schema,
            output: Materialized::default(),
            stats: ExecutionStats::default(),
        })
    }
}

impl JoinExec {
    /// Check the predicate against both schemas and derive the output schema
    /// and block capacity.
    fn plan(
        left: &Schema,
        right: &Schema,
        predicate: &JoinPredicate,
        block_bytes: usize,
    ) -> DbResult<(Schema, usize)> {
        if predicate.left_field >= left.len() || predicate.right_field >= right.len() {
            return Err(DbError::InvalidArgument(format!(
                "join predicate {predicate} does not fit inputs of width {} and {}",
                left.len(),
                right.len()
            )));
        }
        let capacity = (block_bytes / left.byte_width()).max(1);
        Ok((Schema::merge(left, right), capacity))
    }

    pub fn predicate(&self) -> &JoinPredicate {
        &self.predicate
    }

    /// Left tuples buffered per block.
    pub fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    /// Qualified name of the left join field.
    pub fn left_field_name(&self) -> &str {
        &self.schema.fields()[self.predicate.left_field].name
    }

    /// Qualified name of the right join field.
    pub fn right_field_name(&self) -> &str {
        &self.schema.fields()[self.left.schema().len() + self.predicate.right_field].name
    }

    /// Run the join from the left child's current position to its end.
    fn compute(&mut self, ctx: &mut ExecutionContext) -> DbResult<Vec<Tuple>> {
        let mut out = Vec::new();
        let mut block = Vec::with_capacity(self.block_capacity.min(1024));
        self.stats.blocks_probed = 0;

        while let Some(tuple) = self.left.next(ctx)? {
            block.push(tuple);
            if block.len() == self.block_capacity {
                self.probe(&block, ctx, &mut out)?;
                block.clear();
            }
        }
        self.probe(&block, ctx, &mut out)?;

        debug!(
            blocks = self.stats.blocks_probed,
            rows = out.len(),
            predicate = %self.predicate,
            "join materialized"
        );
        Ok(out)
    }

    /// Scan the right child once against a block of left tuples.
    fn probe(
        &mut self,
        block: &[Tuple],
        ctx: &mut ExecutionContext,
        out: &mut Vec<Tuple>,
    ) -> DbResult<()> {
        self.right.rewind(ctx)?;
        for right in drain(self.right.as_mut(), ctx)? {
            for left in block {
                if self.predicate.matches(left, &right)? {
                    out.push(Tuple::concat(left, &right));
                }
            }
        }
        self.stats.blocks_probed += 1;
        trace!(block_len = block.len(), "probed join block");
        Ok(())
    }
}

impl Executor for JoinExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.output.ensure_closed("join")?;
        self.stats = ExecutionStats::default();

        self.left.open(ctx)?;
        self.right.open(ctx)?;
        let rows = self.compute(ctx)?;
        self.output.load(rows);

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Tuple>> {
        let start = Instant::now();
        let tuple = self.output.next("join")?;
        if tuple.is_some() {
            self.stats.rows_produced += 1;
        }
        self.stats.total_next_time += start.elapsed();
        Ok(tuple)
    }

    fn rewind(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.output.ensure_open("join")?;
        self.left.rewind(ctx)?;
        self.right.rewind(ctx)?;
        let rows = self.compute(ctx)?;
        self.output.load(rows);
        Ok(())
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.output.clear();
        let left = self.left.close(ctx);
        let right = self.right.close(ctx);
        self.stats.close_time = start.elapsed();
        left.and(right)
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn children(&self) -> Vec<&dyn Executor> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn replace_children(
        &mut self,
        children: Vec<Box<dyn Executor>>,
    ) -> DbResult<Vec<Box<dyn Executor>>> {
        self.output.ensure_closed("join")?;
        let mut children = expect_children(children, 2)?;
        let (Some(right), Some(left)) = (children.pop(), children.pop()) else {
            return Ok(Vec::new());
        };
        let (schema, capacity) =
            Self::plan(left.schema(), right.schema(), &self.predicate, self.block_bytes)?;
        self.schema = schema;
        self.block_capacity = capacity;
        let old_left = std::mem::replace(&mut self.left, left);
        let old_right = std::mem::replace(&mut self.right, right);
        Ok(vec![old_left, old_right])
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }

    fn name(&self) -> &'static str {
        "Join"
    }
}
