#[cfg(test)]
mod tests;

use common::{DbError, DbResult, Tuple};
use std::cmp::Ordering;
use std::fmt;
use types::Value;

/// Comparison operators usable in selection and join predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring containment for text; plain equality for integers.
    Like,
}

impl CompareOp {
    /// Apply the operator to two values of the same type.
    pub fn compare(self, left: &Value, right: &Value) -> DbResult<bool> {
        if let (CompareOp::Like, Value::Text(l), Value::Text(r)) = (self, left, right) {
            return Ok(l.contains(r.as_str()));
        }

        let ord = left.cmp_same_type(right).ok_or_else(|| {
            DbError::Executor(format!(
                "cannot compare {} with {}",
                left.sql_type(),
                right.sql_type()
            ))
        })?;

        Ok(match self {
            CompareOp::Eq | CompareOp::Like => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        })
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like => "LIKE",
        };
        f.write_str(s)
    }
}

/// Boolean test over a single tuple.
///
/// Implemented by [`Predicate`] and by any `Fn(&Tuple) -> bool` closure.
pub trait TuplePredicate {
    fn matches(&self, tuple: &Tuple) -> DbResult<bool>;
}

impl<F> TuplePredicate for F
where
    F: Fn(&Tuple) -> bool,
{
    fn matches(&self, tuple: &Tuple) -> DbResult<bool> {
        Ok(self(tuple))
    }
}

/// Compares one field of a tuple against a constant operand.
/// Examples:
/// - `Predicate::new(0, CompareOp::Gt, Value::Int(15))` keeps tuples whose first field exceeds 15
/// - `Predicate::new(1, CompareOp::Like, Value::Text("ali".into()))`
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Predicate {
    pub field: usize,
    pub op: CompareOp,
    pub operand: Value,
}

impl Predicate {
    pub fn new(field: usize, op: CompareOp, operand: Value) -> Self {
        Self { field, op, operand }
    }
}

impl TuplePredicate for Predicate {
    fn matches(&self, tuple: &Tuple) -> DbResult<bool> {
        self.op.compare(tuple.get(self.field)?, &self.operand)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{} {} {}", self.field, self.op, self.operand)
    }
}

/// Compares one field of a left tuple against one field of a right tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JoinPredicate {
    pub left_field: usize,
    pub op: CompareOp,
    pub right_field: usize,
}

impl JoinPredicate {
    pub fn new(left_field: usize, op: CompareOp, right_field: usize) -> Self {
        Self {
            left_field,
            op,
            right_field,
        }
    }

    /// Equality join on one column from each side.
    pub fn equals(left_field: usize, right_field: usize) -> Self {
        Self::new(left_field, CompareOp::Eq, right_field)
    }

    pub fn matches(&self, left: &Tuple, right: &Tuple) -> DbResult<bool> {
        self.op
            .compare(left.get(self.left_field)?, right.get(self.right_field)?)
    }
}

impl fmt::Display for JoinPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{} {} r{}", self.left_field, self.op, self.right_field)
    }
}
