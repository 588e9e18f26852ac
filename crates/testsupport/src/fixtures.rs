//! Common test fixtures and data generators.
//!
//! Provides reusable tuples, schemas and sample tables shared by the
//! workspace's integration tests.

use common::Tuple;
use types::Value;

/// Build a tuple of integer values.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let tuple = int_tuple(&[1, 2, 3]);
/// assert_eq!(tuple.values.len(), 3);
/// ```
pub fn int_tuple(values: &[i32]) -> Tuple {
    Tuple::new(values.iter().map(|&v| Value::Int(v)).collect())
}

/// Build one single-column tuple per value.
pub fn int_tuples(values: &[i32]) -> Vec<Tuple> {
    values.iter().map(|&v| int_tuple(&[v])).collect()
}

/// Build a tuple of text values.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let tuple = text_tuple(&["Alice", "Bob"]);
/// assert_eq!(tuple.values.len(), 2);
/// ```
pub fn text_tuple(values: &[&str]) -> Tuple {
    Tuple::new(values.iter().map(|&v| Value::Text(v.to_string())).collect())
}

/// Build a tuple from arbitrary values.
pub fn mixed_tuple(values: Vec<Value>) -> Tuple {
    Tuple::new(values)
}

/// Common table schemas for testing.
pub mod schemas {
    use common::Schema;
    use types::SqlType;

    /// One INT column named `v`.
    pub fn single_int_schema() -> Schema {
        Schema::from_types(&[SqlType::Int], &["v"])
    }

    /// Users table: id INT, name TEXT, age INT.
    pub fn users_schema() -> Schema {
        Schema::from_types(
            &[SqlType::Int, SqlType::Text, SqlType::Int],
            &["id", "name", "age"],
        )
    }

    /// Orders table: id INT, user_id INT, quantity INT.
    pub fn orders_schema() -> Schema {
        Schema::from_types(
            &[SqlType::Int, SqlType::Int, SqlType::Int],
            &["id", "user_id", "quantity"],
        )
    }
}

/// Sample test data generators.
pub mod data {
    use super::*;

    /// (1, "Alice", 30), (2, "Bob", 25), (3, "Charlie", 35)
    pub fn sample_users() -> Vec<Tuple> {
        vec![
            user(1, "Alice", 30),
            user(2, "Bob", 25),
            user(3, "Charlie", 35),
        ]
    }

    /// Alice has two orders, Bob one, Charlie none.
    pub fn sample_orders() -> Vec<Tuple> {
        vec![
            int_tuple(&[10, 1, 2]),
            int_tuple(&[11, 1, 5]),
            int_tuple(&[12, 2, 1]),
        ]
    }

    fn user(id: i32, name: &str, age: i32) -> Tuple {
        mixed_tuple(vec![
            Value::Int(id),
            Value::Text(name.into()),
            Value::Int(age),
        ])
    }
}
