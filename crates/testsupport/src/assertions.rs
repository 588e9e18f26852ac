//! Custom assertion helpers for testing.
//!
//! Provides specialized assertion functions for driving operators and
//! checking their output.

use common::{DbError, DbResult, Tuple};
use executor::{ExecutionContext, Executor};
use types::Value;

/// Assert that an executor returns a tuple with `expected` values next.
///
/// # Example
///
/// ```no_run
/// use testsupport::prelude::*;
/// use executor::Executor;
/// use types::Value;
///
/// # fn example(mut exec: impl Executor, mut ctx: executor::ExecutionContext) {
/// assert_next_tuple(&mut exec, &mut ctx, &[Value::Int(1), Value::Text("Alice".into())]);
/// # }
/// ```
pub fn assert_next_tuple<E: Executor + ?Sized>(
    executor: &mut E,
    ctx: &mut ExecutionContext,
    expected: &[Value],
) {
    let tuple = executor
        .next(ctx)
        .expect("executor next failed")
        .expect("expected tuple but got None");
    assert_eq!(
        &tuple.values, expected,
        "Tuple mismatch: expected {:?}, got {:?}",
        expected, tuple.values
    );
}

/// Assert that an executor is exhausted (returns None).
pub fn assert_exhausted<E: Executor + ?Sized>(executor: &mut E, ctx: &mut ExecutionContext) {
    let result = executor.next(ctx).expect("executor next failed");
    assert!(
        result.is_none(),
        "Expected executor to be exhausted, but got tuple: {:?}",
        result
    );
}

/// Assert that an operation returns an error containing a specific substring.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let result: Result<(), common::DbError> = Err(common::DbError::Catalog("no table 'x'".into()));
/// assert_error_contains(result, "no table");
/// ```
pub fn assert_error_contains<T>(result: DbResult<T>, expected_msg: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}', but got Ok", expected_msg),
        Err(e) => {
            let error_string = e.to_string();
            assert!(
                error_string.contains(expected_msg),
                "Expected error to contain '{}', but got: {}",
                expected_msg,
                error_string
            );
        }
    }
}

/// Assert that an operation was rejected as an operator protocol violation.
pub fn assert_illegal_state<T: std::fmt::Debug>(result: DbResult<T>) {
    match result {
        Err(DbError::IllegalState(_)) => {}
        other => panic!("Expected illegal state error, but got: {:?}", other),
    }
}

/// Assert that two tuple sequences hold the same values in the same order.
/// Record ids are ignored.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let left = vec![int_tuple(&[1, 2]), int_tuple(&[3, 4])];
/// let right = vec![int_tuple(&[1, 2]), int_tuple(&[3, 4])];
/// assert_row_sets_equal(&left, &right);
/// ```
pub fn assert_row_sets_equal(actual: &[Tuple], expected: &[Tuple]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Row count mismatch: expected {} rows, got {}",
        expected.len(),
        actual.len()
    );

    for (i, (actual_row, expected_row)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(
            actual_row.values, expected_row.values,
            "Row {} mismatch:\nExpected: {:?}\nActual:   {:?}",
            i, expected_row.values, actual_row.values
        );
    }
}

/// Like [`assert_row_sets_equal`], but ignores order.
pub fn assert_same_multiset(actual: &[Tuple], expected: &[Tuple]) {
    let mut actual: Vec<_> = actual.iter().map(|t| t.values.clone()).collect();
    let mut expected: Vec<_> = expected.iter().map(|t| t.values.clone()).collect();
    actual.sort_by_key(|values| format!("{values:?}"));
    expected.sort_by_key(|values| format!("{values:?}"));
    pretty_assertions::assert_eq!(actual, expected);
}
