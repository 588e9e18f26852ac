//! Test support utilities for the heap-file database workspace.
//!
//! This crate provides shared testing infrastructure:
//! - Isolated databases over temporary directories
//! - Common tuple and schema fixtures
//! - Property-based generators for values, tuples and schemas
//! - Assertion helpers for driving operator trees
//!
//! # Example Usage
//!
//! ```no_run
//! use executor::{AggregateExec, AggregateOp, SeqScanExec};
//! use testsupport::prelude::*;
//!
//! let mut ctx = TestContext::new().unwrap();
//! let table = ctx.table_with_ints("t", &[1, 2, 3, 4, 5]).unwrap();
//! let scan = SeqScanExec::new(ctx.catalog(), table, "t").unwrap();
//! let mut count = AggregateExec::new(Box::new(scan), 0, None, AggregateOp::Count).unwrap();
//!
//! let rows = ctx.run(&mut count).unwrap();
//! assert_row_sets_equal(&rows, &[int_tuple(&[5])]);
//! ```

pub mod assertions;
pub mod context;
pub mod fixtures;
pub mod proptest_generators;

/// Convenient re-exports for common testing patterns.
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::context::*;
    pub use crate::fixtures::*;
}
