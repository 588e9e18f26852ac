
pub mod pretty;

use serde::{Deserialize, Serialize};
use std::{
    fmt, io,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use thiserror::Error;
use types::{SqlType, Value};

/// Default size of every page, in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;
/// Default number of pages the buffer pool keeps resident.
pub const DEFAULT_BUFFER_POOL_PAGES: usize = 50;
/// Default memory budget for one block of outer tuples in a block nested-loop join.
pub const DEFAULT_JOIN_BUFFER_BYTES: usize = 131_072;

/// Stable identifier of a table, equal to the id of the heap file backing it.
/// Examples:
/// - `let users = TableId(7);`
/// - `let orders = TableId(0x9f3a_11c2);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u64);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a page: the owning file plus a zero-based page number.
/// Examples:
/// - `let first = PageId::new(TableId(7), 0);`
/// - `let third = PageId::new(TableId(7), 2);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId {
    pub table: TableId,
    pub page_no: u64,
}

impl PageId {
    pub fn new(table: TableId, page_no: u64) -> Self {
        Self { table, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table.0, self.page_no)
    }
}

/// Location of a stored tuple within a page.
/// Examples:
/// - `let rid = RecordId { page_id: PageId::new(TableId(7), 0), slot: 3 };`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&pretty::format_record_id(self))
    }
}

/// Identifier of a running transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

impl TransactionId {
    /// Allocate a process-wide unique transaction id.
    pub fn next() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Access mode requested when fetching a page from the page cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

/// One named, typed column of a schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub ty: SqlType,
    pub name: String,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            ty,
            name: name.into(),
        }
    }
}

/// Ordered sequence of typed fields describing a tuple's shape.
/// Examples:
/// - `let s = Schema::new(vec![Field::new("id", SqlType::Int)]);`
/// - `let s = Schema::from_types(&[SqlType::Int, SqlType::Text], &["id", "name"]);`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Zip parallel type and name slices into a schema; extra entries of the longer slice are ignored.
    pub fn from_types(types: &[SqlType], names: &[&str]) -> Self {
        Self::new(
            types
                .iter()
                .zip(names)
                .map(|(ty, name)| Field::new(*name, *ty))
                .collect(),
        )
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> DbResult<&Field> {
        self.fields.get(idx).ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "field index {idx} out of bounds (schema has {} fields)",
                self.fields.len()
            ))
        })
    }

    pub fn field_type(&self, idx: usize) -> DbResult<SqlType> {
        Ok(self.field(idx)?.ty)
    }

    pub fn field_name(&self, idx: usize) -> DbResult<&str> {
        Ok(&self.field(idx)?.name)
    }

    pub fn index_of(&self, name: &str) -> DbResult<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| DbError::InvalidArgument(format!("no field named '{name}'")))
    }

    /// Bytes one tuple of this schema occupies on disk.
    pub fn byte_width(&self) -> usize {
        self.fields.iter().map(|f| f.ty.byte_width()).sum()
    }

    /// Positional concatenation; duplicate names are kept as-is.
    pub fn merge(left: &Schema, right: &Schema) -> Schema {
        let mut fields = left.fields.clone();
        fields.extend(right.fields.iter().cloned());
        Schema { fields }
    }

    /// Rename every field to `alias.name`.
    pub fn with_alias(&self, alias: &str) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .map(|f| Field::new(format!("{alias}.{}", f.name), f.ty))
                .collect(),
        }
    }

    /// True when both schemas have the same field types in the same order.
    pub fn same_types(&self, other: &Schema) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.ty == b.ty)
    }

    /// Check that a tuple's arity and value types conform to this schema.
    pub fn validate(&self, tuple: &Tuple) -> DbResult<()> {
        if tuple.len() != self.len() {
            return Err(DbError::InvalidArgument(format!(
                "tuple has {} fields, schema expects {}",
                tuple.len(),
                self.len()
            )));
        }
        for (idx, (value, field)) in tuple.values.iter().zip(&self.fields).enumerate() {
            if value.sql_type() != field.ty {
                return Err(DbError::InvalidArgument(format!(
                    "field {idx} ('{}') expects {}, got {}",
                    field.name,
                    field.ty,
                    value.sql_type()
                )));
            }
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("{}({})", field.ty, field.name))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Positional record of values, optionally stamped with its storage location.
/// Examples:
/// - `let t = Tuple::new(vec![Value::Int(1)]);`
/// - `let t = Tuple::new(vec![Value::Int(10), Value::Text("alice".into())]);`
///
/// Equality compares values only; the record id is location metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tuple {
    pub values: Vec<Value>,
    #[serde(skip)]
    #[serde(default)]
    rid: Option<RecordId>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, rid: None }
    }

    pub fn with_rid(mut self, rid: RecordId) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn set_rid(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> DbResult<&Value> {
        self.values.get(idx).ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "field index {idx} out of bounds (tuple has {} fields)",
                self.values.len()
            ))
        })
    }

    pub fn set(&mut self, idx: usize, value: Value) -> DbResult<()> {
        let len = self.values.len();
        let slot = self.values.get_mut(idx).ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "field index {idx} out of bounds (tuple has {len} fields)"
            ))
        })?;
        *slot = value;
        Ok(())
    }

    /// Left values followed by right values; the result has no record id.
    pub fn concat(left: &Tuple, right: &Tuple) -> Tuple {
        let mut values = Vec::with_capacity(left.len() + right.len());
        values.extend(left.values.iter().cloned());
        values.extend(right.values.iter().cloned());
        Tuple::new(values)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Eq for Tuple {}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Tuple::new(values)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&pretty::format_tuple(&self.values))
    }
}

/// Rectangular result set carrying column labels and tuples.
/// Examples:
/// - `let rb = RecordBatch { columns: vec!["count".into()], rows: vec![Tuple::new(vec![Value::Int(5)])] };`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Tuple>,
}

/// Canonical error type shared across database subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("no such element: {0}")]
    NoSuchElement(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("empty aggregate: {0}")]
    EmptyAggregate(String),
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("exec: {0}")]
    Executor(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the database components.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .page_size(8192)
///     .buffer_pool_pages(128)
///     .build();
/// assert_eq!(config.join_buffer_bytes, common::DEFAULT_JOIN_BUFFER_BYTES);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where heap files and catalog metadata live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Fixed page size in bytes, shared by every heap file.
    #[builder(default = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,
    /// Number of pages the buffer pool keeps resident.
    #[builder(default = DEFAULT_BUFFER_POOL_PAGES)]
    pub buffer_pool_pages: usize,
    /// Bytes of outer tuples buffered per block nested-loop join block.
    #[builder(default = DEFAULT_JOIN_BUFFER_BYTES)]
    pub join_buffer_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_BUFFER_POOL_PAGES,
            join_buffer_bytes: DEFAULT_JOIN_BUFFER_BYTES,
        }
    }
}

/// Execution statistics collected by each operator.
///
/// # Examples
/// ```
/// use common::ExecutionStats;
/// use std::time::Duration;
///
/// let stats = ExecutionStats {
///     open_time: Duration::from_millis(5),
///     total_next_time: Duration::from_millis(150),
///     close_time: Duration::from_millis(2),
///     rows_produced: 1000,
///     ..Default::default()
/// };
/// assert_eq!(stats.total_time().as_millis(), 157);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ExecutionStats {
    /// Time spent in open(), including eager materialization
    pub open_time: Duration,
    /// Cumulative time spent across all next() calls
    pub total_next_time: Duration,
    /// Time spent in close()
    pub close_time: Duration,
    /// Number of tuples returned by this operator
    pub rows_produced: u64,
    /// Number of tuples rejected by a predicate (FilterExec only)
    pub rows_filtered: u64,
    /// Number of pages visited (SeqScanExec only)
    pub pages_scanned: u64,
    /// Number of outer blocks probed against the inner input (JoinExec only)
    pub blocks_probed: u64,
}

impl ExecutionStats {
    /// Returns total execution time (open + next + close)
    pub fn total_time(&self) -> Duration {
        self.open_time + self.total_next_time + self.close_time
    }
}
