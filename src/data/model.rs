use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDateTime, Timelike};
use serde::{Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Value – a single cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value mirroring common Pandas dtypes.
/// Used in `BTreeSet` / `HashSet` downstream so `Value` must be `Ord + Hash`.
///
/// `Float(NaN)` is a missing value, same as `Null`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Whether the cell is missing (`Null` or a NaN float).
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Try to interpret the value as an `f64` for range comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) if !v.is_nan() => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    fn discriminant(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
            Value::DateTime(_) => 5,
        }
    }
}

// -- Manual Eq/Ord so we can put Value in BTreeSet --

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        let da = self.discriminant();
        let db = other.discriminant();
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.discriminant().hash(state);
        match self {
            Value::Text(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::DateTime(d) => d.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) if v.is_nan() => write!(f, "NaN"),
            Value::Float(v) => write!(f, "{v:.4}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::DateTime(d) => write!(f, "{}", format_datetime(d)),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Float(v) if v.is_nan() => serializer.serialize_none(),
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(s) => serializer.serialize_str(s),
            Value::DateTime(d) => serializer.serialize_str(&format_datetime(d)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

/// Dates at midnight print without their time part, like Pandas does.
pub fn format_datetime(d: &NaiveDateTime) -> String {
    if d.num_seconds_from_midnight() == 0 && d.nanosecond() == 0 {
        d.format("%Y-%m-%d").to_string()
    } else {
        d.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

// ---------------------------------------------------------------------------
// DType – the storage type of a column
// ---------------------------------------------------------------------------

/// Inferred column type, mirroring Pandas dtypes
/// (`int64`, `float64`, `bool`, `object`, `datetime64`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Int,
    Float,
    Bool,
    /// Every non-null value is text.
    Text,
    /// Non-null values of more than one incompatible type.
    Mixed,
    DateTime,
}

impl DType {
    /// Infer the dtype from a column's values, ignoring nulls.
    ///
    /// A column without any non-null value is `Float`, the same as Pandas
    /// reading an all-empty column.
    pub fn infer(values: &[Value]) -> DType {
        let mut dtype: Option<DType> = None;
        for value in values.iter().filter(|v| !v.is_null()) {
            let this = match value {
                Value::Bool(_) => DType::Bool,
                Value::Integer(_) => DType::Int,
                Value::Float(_) => DType::Float,
                Value::Text(_) => DType::Text,
                Value::DateTime(_) => DType::DateTime,
                Value::Null => continue,
            };
            dtype = Some(match (dtype, this) {
                (None, t) => t,
                (Some(a), b) if a == b => a,
                (Some(DType::Int), DType::Float) | (Some(DType::Float), DType::Int) => {
                    DType::Float
                }
                _ => return DType::Mixed,
            });
        }
        dtype.unwrap_or(DType::Float)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Int => "int64",
            DType::Float => "float64",
            DType::Bool => "bool",
            DType::Text | DType::Mixed => "object",
            DType::DateTime => "datetime64",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Column – one named, homogeneous sequence of values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    dtype: DType,
    values: Vec<Value>,
}

impl Column {
    /// Build a column, inferring its dtype.
    ///
    /// NaN floats are normalised to `Null`, and integers in a `Float` column
    /// are widened so the column stays homogeneous.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        let dtype = DType::infer(&values);
        let values = values
            .into_iter()
            .map(|v| match v {
                v if v.is_null() => Value::Null,
                Value::Integer(i) if dtype == DType::Float => Value::Float(i as f64),
                v => v,
            })
            .collect();
        Column {
            name: name.into(),
            dtype,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of missing cells.
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Iterate over the non-null cells.
    pub fn non_null(&self) -> impl Iterator<Item = &Value> + '_ {
        self.values.iter().filter(|v| !v.is_null())
    }

    fn take(&self, indices: &[usize]) -> Column {
        Column {
            name: self.name.clone(),
            dtype: self.dtype,
            values: indices.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset – the complete loaded table
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
#[error("column '{column}' has {actual} rows, expected {expected}")]
pub struct RaggedColumns {
    pub column: String,
    pub expected: usize,
    pub actual: usize,
}

/// An immutable table: ordered named columns sharing one row count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    /// Build a dataset; every column must have the same length.
    /// Repeated column names are made unique (see [`dedup_names`]).
    pub fn new(mut columns: Vec<Column>) -> Result<Self, RaggedColumns> {
        let row_count = columns.first().map(Column::len).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.len() != row_count) {
            return Err(RaggedColumns {
                column: bad.name.clone(),
                expected: row_count,
                actual: bad.len(),
            });
        }
        let names = dedup_names(columns.iter().map(|c| c.name.clone()).collect());
        for (column, name) in columns.iter_mut().zip(names) {
            column.name = name;
        }
        Ok(Dataset { columns, row_count })
    }

    /// Build a dataset from row-oriented cells, one `Vec` per row.
    /// Short rows are padded with `Null`.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for row in rows {
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.push(cells.next().unwrap_or(Value::Null));
            }
        }
        let row_count = columns.first().map(Vec::len).unwrap_or(0);
        let columns = dedup_names(names)
            .into_iter()
            .zip(columns)
            .map(|(name, values)| Column::new(name, values))
            .collect();
        Dataset { columns, row_count }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.row_count
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// First column with the given name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cells of one row, in column order.
    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[index]).collect()
    }

    /// A new dataset with only the given rows, in the given order.
    pub fn take(&self, indices: &[usize]) -> Dataset {
        Dataset {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            row_count: indices.len(),
        }
    }

    /// Index of the dataset's columns by name.
    pub fn name_index(&self) -> HashMap<&str, usize> {
        let mut index = HashMap::new();
        for (i, c) in self.columns.iter().enumerate() {
            index.entry(c.name.as_str()).or_insert(i);
        }
        index
    }
}

/// Rename repeated names the way Pandas does: the second `x` becomes `x.1`,
/// the third `x.2`. A generated name that is already taken is suffixed again.
pub fn dedup_names(names: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(names.len());
    for mut name in names {
        let mut seen = counts.get(&name).copied().unwrap_or(0);
        while seen > 0 {
            counts.insert(name.clone(), seen + 1);
            name = format!("{name}.{seen}");
            seen = counts.get(&name).copied().unwrap_or(0);
        }
        counts.insert(name.clone(), seen + 1);
        out.push(name);
    }
    out
}
