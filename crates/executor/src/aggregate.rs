//! Aggregate operator and the per-type aggregators behind it.

use std::{fmt, time::Instant};

use ahash::RandomState;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{drain, expect_children, ExecutionContext, Executor, Materialized};
use common::{DbError, DbResult, ExecutionStats, Field, Schema, Tuple};
use types::{SqlType, Value};

/// Aggregation functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
        };
        f.write_str(name)
    }
}

/// Accumulates tuples into groups and finalizes one result tuple per group.
///
/// Grouped results are `(group value, aggregate)`; ungrouped results are a
/// single `(aggregate)`.
pub trait Aggregator {
    /// Fold one input tuple into its group.
    fn merge(&mut self, tuple: &Tuple) -> DbResult<()>;

    /// Finalize every group, in first-seen order.
    fn results(&self) -> DbResult<Vec<Tuple>>;

    /// Forget all groups.
    fn clear(&mut self);
}

/// Groups in first-seen order, keyed by the group value (`None` when
/// ungrouped).
#[derive(Debug)]
struct Groups<A> {
    index: HashMap<Option<Value>, usize, RandomState>,
    entries: Vec<(Option<Value>, A)>,
}

impl<A: Default> Groups<A> {
    fn new() -> Self {
        Self {
            index: HashMap::with_hasher(RandomState::new()),
            entries: Vec::new(),
        }
    }

    fn entry(&mut self, key: Option<Value>) -> &mut A {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.entries.len();
                self.index.insert(key.clone(), slot);
                self.entries.push((key, A::default()));
                slot
            }
        };
        &mut self.entries[slot].1
    }

    fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
    }
}

fn group_key(tuple: &Tuple, group: Option<usize>) -> DbResult<Option<Value>> {
    group.map(|idx| tuple.get(idx).cloned()).transpose()
}

fn result_tuple(key: &Option<Value>, value: Value) -> Tuple {
    match key {
        Some(group) => Tuple::new(vec![group.clone(), value]),
        None => Tuple::new(vec![value]),
    }
}

fn count_value(count: usize) -> DbResult<Value> {
    i32::try_from(count)
        .map(Value::Int)
        .map_err(|_| DbError::Executor(format!("count {count} overflows INT")))
}

/// Aggregator over an INT field. Supports every [`AggregateOp`].
#[derive(Debug)]
pub struct IntegerAggregator {
    group_field: Option<usize>,
    aggregate_field: usize,
    op: AggregateOp,
    groups: Groups<Vec<i32>>,
}

impl IntegerAggregator {
    pub fn new(group_field: Option<usize>, aggregate_field: usize, op: AggregateOp) -> Self {
        Self {
            group_field,
            aggregate_field,
            op,
            groups: Groups::new(),
        }
    }

    fn finalize(&self, values: &[i32]) -> DbResult<Value> {
        let empty = || DbError::EmptyAggregate(format!("{} over an empty group", self.op));
        let sum = || values.iter().map(|&v| i64::from(v)).sum::<i64>();
        let result = match self.op {
            AggregateOp::Count => return count_value(values.len()),
            AggregateOp::Min => i64::from(*values.iter().min().ok_or_else(empty)?),
            AggregateOp::Max => i64::from(*values.iter().max().ok_or_else(empty)?),
            AggregateOp::Sum => sum(),
            AggregateOp::Avg => {
                if values.is_empty() {
                    return Err(empty());
                }
                sum() / values.len() as i64
            }
        };
        i32::try_from(result)
            .map(Value::Int)
            .map_err(|_| DbError::Executor(format!("{} result {result} overflows INT", self.op)))
    }
}

impl Aggregator for IntegerAggregator {
    fn merge(&mut self, tuple: &Tuple) -> DbResult<()> {
        let value = tuple.get(self.aggregate_field)?;
        let value = value.as_int().ok_or_else(|| {
            DbError::Executor(format!(
                "expected INT in field {}, got {}",
                self.aggregate_field,
                value.sql_type()
            ))
        })?;
        let key = group_key(tuple, self.group_field)?;
        self.groups.entry(key).push(value);
        Ok(())
    }

    fn results(&self) -> DbResult<Vec<Tuple>> {
        if self.group_field.is_none() && self.groups.entries.is_empty() {
            return Ok(vec![result_tuple(&None, self.finalize(&[])?)]);
        }
        self.groups
            .entries
            .iter()
            .map(|(key, values)| Ok(result_tuple(key, self.finalize(values)?)))
            .collect()
    }

    fn clear(&mut self) {
        self.groups.clear();
    }
}

/// Aggregator over a TEXT field. Only COUNT is defined.
#[derive(Debug)]
pub struct StringAggregator {
    group_field: Option<usize>,
    groups: Groups<usize>,
}

impl StringAggregator {
    /// Fails with `InvalidArgument` for any operator but COUNT.
    pub fn new(group_field: Option<usize>, op: AggregateOp) -> DbResult<Self> {
        if op != AggregateOp::Count {
            return Err(DbError::InvalidArgument(format!(
                "{op} is not supported on TEXT fields, only count"
            )));
        }
        Ok(Self {
            group_field,
            groups: Groups::new(),
        })
    }
}

impl Aggregator for StringAggregator {
    fn merge(&mut self, tuple: &Tuple) -> DbResult<()> {
        let key = group_key(tuple, self.group_field)?;
        *self.groups.entry(key) += 1;
        Ok(())
    }

    fn results(&self) -> DbResult<Vec<Tuple>> {
        if self.group_field.is_none() && self.groups.entries.is_empty() {
            return Ok(vec![Tuple::new(vec![Value::Int(0)])]);
        }
        self.groups
            .entries
            .iter()
            .map(|(key, count)| Ok(result_tuple(key, count_value(*count)?)))
            .collect()
    }

    fn clear(&mut self) {
        self.groups.clear();
    }
}

/// Aggregate operator: groups the child's tuples on an optional field and
/// reduces one field per group.
///
/// The aggregate column is named `op(field)`, e.g. `sum(t.price)`.
pub struct AggregateExec {
    input: Box<dyn Executor>,
    aggregate_field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
    aggregator: Box<dyn Aggregator>,
    schema: Schema,
    output: Materialized,
    stats: ExecutionStats,
}

impl AggregateExec {
    /// Aggregate `aggregate_field` of `input` with `op`, grouped by
    /// `group_field` when given.
    ///
    /// Fails with `InvalidArgument` when a field is out of range, or when
    /// `op` is not COUNT and the aggregate field is TEXT.
    pub fn new(
        input: Box<dyn Executor>,
        aggregate_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> DbResult<Self> {
        let (schema, aggregator) = Self::plan(input.schema(), aggregate_field, group_field, op)?;
        Ok(Self {
            input,
            aggregate_field,
            group_field,
            op,
            aggregator,
            schema,
            output: Materialized::default(),
            stats: ExecutionStats::default(),
        })
    }

    fn plan(
        child: &Schema,
        aggregate_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> DbResult<(Schema, Box<dyn Aggregator>)> {
        let agg = child
            .field(aggregate_field)
            .map_err(|_| invalid_field("aggregate", aggregate_field, child))?;
        let mut fields = Vec::with_capacity(2);
        if let Some(idx) = group_field {
            let group = child
                .field(idx)
                .map_err(|_| invalid_field("group", idx, child))?;
            fields.push(group.clone());
        }
        fields.push(Field::new(format!("{op}({})", agg.name), SqlType::Int));

        let aggregator: Box<dyn Aggregator> = match agg.ty {
            SqlType::Int => Box::new(IntegerAggregator::new(group_field, aggregate_field, op)),
            SqlType::Text => Box::new(StringAggregator::new(group_field, op)?),
        };
        Ok((Schema::new(fields), aggregator))
    }

    pub fn group_field(&self) -> Option<usize> {
        self.group_field
    }

    /// Name of the grouping column, the first output column when grouped.
    pub fn group_field_name(&self) -> Option<&str> {
        self.group_field
            .map(|_| self.schema.fields()[0].name.as_str())
    }

    pub fn aggregate_field(&self) -> usize {
        self.aggregate_field
    }

    /// Name of the aggregate output column, e.g. `sum(amount)`.
    pub fn aggregate_field_name(&self) -> &str {
        let idx = usize::from(self.group_field.is_some());
        &self.schema.fields()[idx].name
    }

    pub fn aggregate_op(&self) -> AggregateOp {
        self.op
    }

    fn compute(&mut self, ctx: &mut ExecutionContext) -> DbResult<Vec<Tuple>> {
        self.aggregator.clear();
        for tuple in drain(self.input.as_mut(), ctx)? {
            self.aggregator.merge(&tuple)?;
        }
        let results = self.aggregator.results()?;
        debug!(groups = results.len(), op = %self.op, "aggregate finalized");
        Ok(results)
    }
}

fn invalid_field(role: &str, idx: usize, schema: &Schema) -> DbError {
    DbError::InvalidArgument(format!(
        "{role} field {idx} out of range for {} input fields",
        schema.len()
    ))
}

impl Executor for AggregateExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.output.ensure_closed("aggregate")?;
        self.stats = ExecutionStats::default();

        self.input.open(ctx)?;
        let rows = self.compute(ctx)?;
        self.output.load(rows);

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Tuple>> {
        let start = Instant::now();
        let tuple = self.output.next("aggregate")?;
        if tuple.is_some() {
            self.stats.rows_produced += 1;
        }
        self.stats.total_next_time += start.elapsed();
        Ok(tuple)
    }

    fn rewind(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.output.ensure_open("aggregate")?;
        self.input.rewind(ctx)?;
        let rows = self.compute(ctx)?;
        self.output.load(rows);
        Ok(())
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.output.clear();
        self.aggregator.clear();
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
        self.output.ensure_closed("aggregate")?;
        let Some(input) = expect_children(children, 1)?.pop() else {
            return Ok(Vec::new());
        };
        let (schema, aggregator) =
            Self::plan(input.schema(), self.aggregate_field, self.group_field, self.op)?;
        self.schema = schema;
        self.aggregator = aggregator;
        Ok(vec![std::mem::replace(&mut self.input, input)])
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }

    fn name(&self) -> &'static str {
        "Aggregate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{
        assert_exhausted, assert_illegal_state, drain_rows, int_text, int_tuple, ints,
        setup_test_context, MockExecutor,
    };
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn sales() -> MockExecutor {
        // (region, amount)
        MockExecutor::new(
            vec![
                ints(&[1, 10]),
                ints(&[2, 5]),
                ints(&[1, 7]),
                ints(&[2, -3]),
                ints(&[3, 4]),
            ],
            Schema::from_types(&[SqlType::Int, SqlType::Int], &["region", "amount"]),
        )
    }

    fn run(exec: &mut AggregateExec) -> Vec<Tuple> {
        let (mut ctx, _temp) = setup_test_context();
        exec.open(&mut ctx).unwrap();
        drain_rows(exec, &mut ctx)
    }

    fn names() -> MockExecutor {
        MockExecutor::new(
            vec![int_text(1, "a"), int_text(2, "b"), int_text(1, "c")],
            Schema::from_types(&[SqlType::Int, SqlType::Text], &["team", "name"]),
        )
    }

    #[test]
    fn grouped_sum() {
        let mut agg = AggregateExec::new(Box::new(sales()), 1, Some(0), AggregateOp::Sum).unwrap();
        assert_eq!(
            run(&mut agg),
            vec![ints(&[1, 17]), ints(&[2, 2]), ints(&[3, 4])]
        );
    }

    #[test]
    fn grouped_min_max_count_avg() {
        let cases = [
            (AggregateOp::Min, vec![ints(&[1, 7]), ints(&[2, -3]), ints(&[3, 4])]),
            (AggregateOp::Max, vec![ints(&[1, 10]), ints(&[2, 5]), ints(&[3, 4])]),
            (AggregateOp::Count, vec![ints(&[1, 2]), ints(&[2, 2]), ints(&[3, 1])]),
            (AggregateOp::Avg, vec![ints(&[1, 8]), ints(&[2, 1]), ints(&[3, 4])]),
        ];
        for (op, expected) in cases {
            let mut agg = AggregateExec::new(Box::new(sales()), 1, Some(0), op).unwrap();
            assert_eq!(run(&mut agg), expected, "{op}");
        }
    }

    #[test]
    fn ungrouped_aggregates_produce_single_tuple() {
        let mut agg = AggregateExec::new(Box::new(sales()), 1, None, AggregateOp::Sum).unwrap();
        assert_eq!(run(&mut agg), vec![int_tuple(23)]);

        let mut agg = AggregateExec::new(Box::new(sales()), 1, None, AggregateOp::Avg).unwrap();
        assert_eq!(run(&mut agg), vec![int_tuple(4)]);
    }

    #[test]
    fn avg_truncates_toward_zero() {
        let input = MockExecutor::ints("x", &[-7, 0]);
        let mut agg = AggregateExec::new(Box::new(input), 0, None, AggregateOp::Avg).unwrap();
        assert_eq!(run(&mut agg), vec![int_tuple(-3)]);
    }

    #[test]
    fn empty_input_ungrouped() {
        let (mut ctx, _temp) = setup_test_context();
        for op in [AggregateOp::Min, AggregateOp::Max, AggregateOp::Avg] {
            let mut agg =
                AggregateExec::new(Box::new(MockExecutor::ints("x", &[])), 0, None, op).unwrap();
            let err = agg.open(&mut ctx).unwrap_err();
            assert!(matches!(err, DbError::EmptyAggregate(_)), "{op}");
            agg.close(&mut ctx).unwrap();
        }
        for op in [AggregateOp::Count, AggregateOp::Sum] {
            let mut agg =
                AggregateExec::new(Box::new(MockExecutor::ints("x", &[])), 0, None, op).unwrap();
            assert_eq!(run(&mut agg), vec![int_tuple(0)], "{op}");
        }
    }

    #[test]
    fn empty_input_grouped_has_no_groups() {
        let input = MockExecutor::new(
            vec![],
            Schema::from_types(&[SqlType::Int, SqlType::Int], &["g", "v"]),
        );
        let mut agg = AggregateExec::new(Box::new(input), 1, Some(0), AggregateOp::Min).unwrap();
        assert!(run(&mut agg).is_empty());
    }

    #[test]
    fn sum_overflow_is_executor_error() {
        let (mut ctx, _temp) = setup_test_context();
        let input = MockExecutor::ints("x", &[i32::MAX, 1]);
        let mut agg = AggregateExec::new(Box::new(input), 0, None, AggregateOp::Sum).unwrap();
        assert!(matches!(agg.open(&mut ctx), Err(DbError::Executor(_))));
    }

    #[test]
    fn string_count_by_group() {
        let mut agg = AggregateExec::new(Box::new(names()), 1, Some(0), AggregateOp::Count).unwrap();
        assert_eq!(run(&mut agg), vec![ints(&[1, 2]), ints(&[2, 1])]);
        assert_eq!(agg.schema().names(), vec!["team", "count(name)"]);
    }

    #[test]
    fn string_field_rejects_non_count_at_construction() {
        for op in [AggregateOp::Min, AggregateOp::Max, AggregateOp::Sum, AggregateOp::Avg] {
            let result = AggregateExec::new(Box::new(names()), 1, None, op);
            assert!(matches!(result, Err(DbError::InvalidArgument(_))), "{op}");
        }
        assert!(StringAggregator::new(None, AggregateOp::Sum).is_err());
    }

    #[test]
    fn text_group_values_are_kept() {
        let input = MockExecutor::new(
            vec![int_text(3, "x"), int_text(4, "y"), int_text(5, "x")],
            Schema::from_types(&[SqlType::Int, SqlType::Text], &["v", "tag"]),
        );
        let mut agg = AggregateExec::new(Box::new(input), 0, Some(1), AggregateOp::Max).unwrap();
        assert_eq!(
            run(&mut agg),
            vec![
                Tuple::new(vec![Value::Text("x".into()), Value::Int(5)]),
                Tuple::new(vec![Value::Text("y".into()), Value::Int(4)]),
            ]
        );
        assert_eq!(agg.schema().field_type(0).unwrap(), SqlType::Text);
    }

    #[test]
    fn accessors_and_column_names() {
        let agg = AggregateExec::new(Box::new(sales()), 1, Some(0), AggregateOp::Avg).unwrap();
        assert_eq!(agg.group_field(), Some(0));
        assert_eq!(agg.group_field_name(), Some("region"));
        assert_eq!(agg.aggregate_field(), 1);
        assert_eq!(agg.aggregate_field_name(), "avg(amount)");
        assert_eq!(agg.aggregate_op(), AggregateOp::Avg);
        assert_eq!(agg.schema().names(), vec!["region", "avg(amount)"]);

        let agg = AggregateExec::new(Box::new(sales()), 1, None, AggregateOp::Min).unwrap();
        assert_eq!(agg.group_field_name(), None);
        assert_eq!(agg.aggregate_field_name(), "min(amount)");
        assert_eq!(agg.schema().names(), vec!["min(amount)"]);
    }

    #[test]
    fn out_of_range_fields_rejected() {
        assert!(matches!(
            AggregateExec::new(Box::new(sales()), 5, None, AggregateOp::Sum),
            Err(DbError::InvalidArgument(_))
        ));
        assert!(matches!(
            AggregateExec::new(Box::new(sales()), 1, Some(9), AggregateOp::Sum),
            Err(DbError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rewind_recomputes_same_groups() {
        let (mut ctx, _temp) = setup_test_context();
        let mut agg = AggregateExec::new(Box::new(sales()), 1, Some(0), AggregateOp::Count).unwrap();
        assert_illegal_state(agg.next(&mut ctx));

        agg.open(&mut ctx).unwrap();
        let first = drain_rows(&mut agg, &mut ctx);
        assert_exhausted(&mut agg, &mut ctx);
        agg.rewind(&mut ctx).unwrap();
        assert_eq!(drain_rows(&mut agg, &mut ctx), first);
    }

    #[test]
    fn op_names_are_lowercase() {
        assert_eq!(AggregateOp::Min.to_string(), "min");
        assert_eq!(AggregateOp::Count.to_string(), "count");
    }

    proptest! {
        #[test]
        fn grouped_sum_matches_reference(
            rows in proptest::collection::vec((0i32..5, -1000i32..1000), 0..50),
        ) {
            let tuples = rows.iter().map(|&(g, v)| ints(&[g, v])).collect();
            let input = MockExecutor::new(
                tuples,
                Schema::from_types(&[SqlType::Int, SqlType::Int], &["g", "v"]),
            );
            let mut agg = AggregateExec::new(Box::new(input), 1, Some(0), AggregateOp::Sum).unwrap();

            let mut expected: BTreeMap<i32, i32> = BTreeMap::new();
            for (g, v) in &rows {
                *expected.entry(*g).or_default() += v;
            }
            let mut actual: BTreeMap<i32, i32> = BTreeMap::new();
            for tuple in run(&mut agg) {
                let g = tuple.get(0).unwrap().as_int().unwrap();
                let s = tuple.get(1).unwrap().as_int().unwrap();
                prop_assert!(actual.insert(g, s).is_none(), "group {} emitted twice", g);
            }
            prop_assert_eq!(actual, expected);
        }
    }
}
