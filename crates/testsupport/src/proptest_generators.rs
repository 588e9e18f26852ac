//! Property-based test generators using proptest.
//!
//! Strategies for values, tuples and schemas that the heap file can store.

use common::{Schema, Tuple};
use proptest::prelude::*;
use types::{SqlType, Value};

/// Strategy for generating a value of `ty`.
///
/// Text values stay well under the on-disk string length.
pub fn arb_value_of(ty: SqlType) -> BoxedStrategy<Value> {
    match ty {
        SqlType::Int => any::<i32>().prop_map(Value::Int).boxed(),
        SqlType::Text => "[a-z]{0,20}".prop_map(Value::Text).boxed(),
    }
}

/// Strategy for generating random `Value` instances.
pub fn arb_value() -> impl Strategy<Value = Value> {
    arb_sql_type().prop_flat_map(arb_value_of)
}

/// Strategy for generating random `SqlType` instances.
pub fn arb_sql_type() -> impl Strategy<Value = SqlType> {
    prop_oneof![Just(SqlType::Int), Just(SqlType::Text)]
}

/// Strategy for schemas of 1-5 columns named `c0`, `c1`, ...
pub fn arb_schema() -> impl Strategy<Value = Schema> {
    prop::collection::vec(arb_sql_type(), 1..=5).prop_map(|types| {
        let names: Vec<String> = (0..types.len()).map(|i| format!("c{i}")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        Schema::from_types(&types, &names)
    })
}

/// Strategy for tuples conforming to `schema`.
///
/// # Example
///
/// ```
/// use proptest::prelude::*;
/// use testsupport::{fixtures::schemas, proptest_generators::arb_tuple_for};
///
/// proptest! {
///     #[test]
///     fn test_tuple_fits(tuple in arb_tuple_for(&schemas::users_schema())) {
///         prop_assert!(schemas::users_schema().validate(&tuple).is_ok());
///     }
/// }
/// ```
pub fn arb_tuple_for(schema: &Schema) -> impl Strategy<Value = Tuple> {
    let fields: Vec<_> = schema.fields().iter().map(|f| arb_value_of(f.ty)).collect();
    fields.prop_map(Tuple::new)
}

/// Strategy for a schema together with up to `max_rows` tuples of it.
pub fn arb_table(max_rows: usize) -> impl Strategy<Value = (Schema, Vec<Tuple>)> {
    arb_schema().prop_flat_map(move |schema| {
        let rows = prop::collection::vec(arb_tuple_for(&schema), 0..=max_rows);
        (Just(schema), rows)
    })
}
