use std::io::Cursor;
use std::path::Path;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Float32Type, Float64Type, Int16Type, Int32Type,
    Int64Type, Int8Type, TimeUnit, TimestampMicrosecondType, TimestampMillisecondType,
    TimestampNanosecondType, TimestampSecondType, UInt16Type, UInt32Type, UInt64Type,
    UInt8Type,
};
use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Data, DataType as _, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::export::csv_field;

use super::model::{Column, Dataset, RaggedColumns, Value};

// ---------------------------------------------------------------------------
// Errors and options
// ---------------------------------------------------------------------------

/// The file could not be decoded as a table. No partial dataset is produced.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel error: {0}")]
    Excel(#[from] calamine::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Unsupported file extension: .{0}")]
    UnsupportedFormat(String),

    #[error("File contains no header row")]
    Empty,

    #[error("Row {row}: expected {expected} fields, saw {found}")]
    TooManyFields {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid JSON layout: {0}")]
    InvalidJson(String),

    #[error(transparent)]
    Ragged(#[from] RaggedColumns),
}

/// Decoder settings supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadOptions {
    /// Field delimiter for delimited text.
    pub delimiter: u8,
    /// Worksheet to read from a workbook; the first sheet when `None`.
    pub sheet: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            sheet: None,
        }
    }
}

/// Decoder chosen from a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Csv,
    Excel,
    Json,
    Parquet,
}

impl SourceFormat {
    /// Dispatch by extension.
    pub fn from_name(name: &str) -> Result<Self, LoadError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "csv" | "tsv" | "txt" => Ok(SourceFormat::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceFormat::Excel),
            "json" => Ok(SourceFormat::Json),
            "parquet" | "pq" => Ok(SourceFormat::Parquet),
            other => Err(LoadError::UnsupportedFormat(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a dataset from a file on disk.
///
/// Supported formats:
/// * `.csv` / `.tsv` / `.txt` – header row plus delimited records
/// * `.xlsx` / `.xlsm` / `.xlsb` / `.xls` / `.ods` – first row of the sheet is the header
/// * `.json` – `[{ "col": value, ... }, ...]`
/// * `.parquet` / `.pq` – flat columns of scalar types
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<Dataset, LoadError> {
    let name = path.to_string_lossy();
    let format = SourceFormat::from_name(&name)?;
    let bytes = std::fs::read(path)?;
    load_with_format(format, &bytes, options)
}

/// Load a dataset from uploaded bytes; `name` selects the decoder.
pub fn load_bytes(name: &str, bytes: &[u8], options: &LoadOptions) -> Result<Dataset, LoadError> {
    load_with_format(SourceFormat::from_name(name)?, bytes, options)
}

pub fn load_with_format(
    format: SourceFormat,
    bytes: &[u8],
    options: &LoadOptions,
) -> Result<Dataset, LoadError> {
    let dataset = match format {
        SourceFormat::Csv => load_csv(bytes, options)?,
        SourceFormat::Excel => load_excel(bytes, options)?,
        SourceFormat::Json => load_json(bytes)?,
        SourceFormat::Parquet => load_parquet(bytes)?,
    };
    log::info!(
        "Decoded {:?} input: {} rows x {} columns",
        format,
        dataset.len(),
        dataset.column_count()
    );
    Ok(dataset)
}

fn unnamed(index: usize) -> String {
    format!("Unnamed: {index}")
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Tokens Pandas reads as a missing value by default.
const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND",
    "1.#QNAN", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// CSV layout: header row with column names, one record per row.
/// Records shorter than the header are padded with nulls.
fn load_csv(bytes: &[u8], options: &LoadOptions) -> Result<Dataset, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| if h.is_empty() { unnamed(i) } else { h.to_string() })
        .collect();
    if headers.is_empty() {
        return Err(LoadError::Empty);
    }

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        if record.len() > headers.len() {
            return Err(LoadError::TooManyFields {
                row: row_no,
                expected: headers.len(),
                found: record.len(),
            });
        }
        rows.push(record.iter().map(parse_cell).collect());
    }

    Ok(Dataset::from_rows(headers, rows))
}

/// Type one delimited-text cell.
pub fn parse_cell(s: &str) -> Value {
    if NA_TOKENS.contains(&s) {
        return Value::Null;
    }
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return if f.is_nan() { Value::Null } else { Value::Float(f) };
    }
    match trimmed {
        "True" | "true" | "TRUE" => return Value::Bool(true),
        "False" | "false" | "FALSE" => return Value::Bool(false),
        _ => {}
    }
    if let Some(d) = parse_datetime(trimmed) {
        return Value::DateTime(d);
    }
    Value::Text(s.to_string())
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

// ---------------------------------------------------------------------------
// Excel loader
// ---------------------------------------------------------------------------

/// Read the configured (or first) worksheet; its first row is the header.
fn load_excel(bytes: &[u8], options: &LoadOptions) -> Result<Dataset, LoadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

    let sheet_name = match &options.sheet {
        Some(name) => name.clone(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(LoadError::Empty)?,
    };
    let range = workbook.worksheet_range(&sheet_name)?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or(LoadError::Empty)?
        .iter()
        .enumerate()
        .map(|(i, cell)| excel_header(i, cell))
        .collect();

    let body = rows.map(|row| row.iter().map(excel_cell).collect()).collect();
    log::debug!("Read worksheet '{sheet_name}'");
    Ok(Dataset::from_rows(headers, body))
}

/// Column name from a header cell; numbers print in shortest form (`2.5`).
fn excel_header(index: usize, cell: &Data) -> String {
    match excel_cell(cell) {
        Value::Null => unnamed(index),
        value => csv_field(&value),
    }
}

/// Whole-number floats become integers, as Pandas does when reading a sheet.
fn excel_cell(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Integer(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Value::Integer(*f as i64)
        }
        Data::Float(f) => Value::Float(*f),
        Data::String(s) => Value::Text(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(_) | Data::DateTimeIso(_) => {
            cell.as_datetime().map(Value::DateTime).unwrap_or(Value::Null)
        }
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "category": "A", "value": 5 },
///   { "category": "B", "value": 7 }
/// ]
/// ```
///
/// Column order is first-seen key order; absent keys are null.
fn load_json(bytes: &[u8]) -> Result<Dataset, LoadError> {
    let root: JsonValue = serde_json::from_slice(bytes)?;
    let records = root
        .as_array()
        .ok_or_else(|| LoadError::InvalidJson("expected a top-level array".into()))?;

    let mut names: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| LoadError::InvalidJson(format!("row {i} is not an object")))?;
        for key in obj.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }
    if names.is_empty() && !records.is_empty() {
        return Err(LoadError::Empty);
    }

    let rows = records
        .iter()
        .filter_map(JsonValue::as_object)
        .map(|obj| {
            names
                .iter()
                .map(|name| obj.get(name).map(json_to_value).unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    Ok(Dataset::from_rows(names, rows))
}

fn json_to_value(val: &JsonValue) -> Value {
    match val {
        JsonValue::String(s) => match parse_datetime(s) {
            Some(d) => Value::DateTime(d),
            None => Value::Text(s.clone()),
        },
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Null => Value::Null,
        other => Value::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file of flat scalar columns.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(bytes: &[u8]) -> Result<Dataset, LoadError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(bytes))?;
    let names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut values: Vec<Vec<Value>> = vec![Vec::new(); names.len()];
    for batch_result in reader {
        let batch = batch_result?;
        for (col_idx, column) in values.iter_mut().enumerate() {
            let array = batch.column(col_idx);
            column.extend((0..batch.num_rows()).map(|row| arrow_cell(array, row)));
        }
    }

    let columns = names
        .into_iter()
        .zip(values)
        .map(|(name, values)| Column::new(name, values))
        .collect();
    Ok(Dataset::new(columns)?)
}

/// Extract a single value from an Arrow column at a given row.
fn arrow_cell(col: &ArrayRef, row: usize) -> Value {
    if col.is_null(row) {
        return Value::Null;
    }
    let datetime = |d: Option<NaiveDateTime>| d.map(Value::DateTime).unwrap_or(Value::Null);
    match col.data_type() {
        DataType::Utf8 => Value::Text(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::Text(col.as_string::<i64>().value(row).to_string()),
        DataType::Int8 => Value::Integer(col.as_primitive::<Int8Type>().value(row) as i64),
        DataType::Int16 => Value::Integer(col.as_primitive::<Int16Type>().value(row) as i64),
        DataType::Int32 => Value::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => Value::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::Integer(col.as_primitive::<UInt8Type>().value(row) as i64),
        DataType::UInt16 => Value::Integer(col.as_primitive::<UInt16Type>().value(row) as i64),
        DataType::UInt32 => Value::Integer(col.as_primitive::<UInt32Type>().value(row) as i64),
        DataType::UInt64 => {
            let v = col.as_primitive::<UInt64Type>().value(row);
            i64::try_from(v)
                .map(Value::Integer)
                .unwrap_or(Value::Float(v as f64))
        }
        DataType::Float32 => Value::Float(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => Value::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => Value::Bool(col.as_boolean().value(row)),
        DataType::Date32 => datetime(col.as_primitive::<Date32Type>().value_as_datetime(row)),
        DataType::Date64 => datetime(col.as_primitive::<Date64Type>().value_as_datetime(row)),
        DataType::Timestamp(unit, _) => datetime(match unit {
            TimeUnit::Second => col
                .as_primitive::<TimestampSecondType>()
                .value_as_datetime(row),
            TimeUnit::Millisecond => col
                .as_primitive::<TimestampMillisecondType>()
                .value_as_datetime(row),
            TimeUnit::Microsecond => col
                .as_primitive::<TimestampMicrosecondType>()
                .value_as_datetime(row),
            TimeUnit::Nanosecond => col
                .as_primitive::<TimestampNanosecondType>()
                .value_as_datetime(row),
        }),
        _ => arrow::util::display::array_value_to_string(&**col, row)
            .map(Value::Text)
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::data::filter::{apply, build_filter_specs};
    use crate::data::model::DType;

    #[test]
    fn extension_dispatch() {
        assert_eq!(SourceFormat::from_name("a.CSV").unwrap(), SourceFormat::Csv);
        assert_eq!(SourceFormat::from_name("a.xlsx").unwrap(), SourceFormat::Excel);
        assert_eq!(SourceFormat::from_name("a.pq").unwrap(), SourceFormat::Parquet);
        assert!(matches!(
            SourceFormat::from_name("a.pkl"),
            Err(LoadError::UnsupportedFormat(ext)) if ext == "pkl"
        ));
    }

    #[test]
    fn cells_are_typed_like_pandas() {
        assert_eq!(parse_cell("42"), Value::Integer(42));
        assert_eq!(parse_cell("2.5"), Value::Float(2.5));
        assert_eq!(parse_cell("NA"), Value::Null);
        assert_eq!(parse_cell(""), Value::Null);
        assert_eq!(parse_cell("nan"), Value::Null);
        assert_eq!(parse_cell("True"), Value::Bool(true));
        assert_eq!(parse_cell("hello"), Value::from("hello"));
        assert!(matches!(parse_cell("2023-01-05"), Value::DateTime(_)));
    }

    #[test]
    fn csv_columns_get_dtypes() {
        let csv = "date,category,value,score\n2023-01-01,A,5,1.5\n2023-01-02,B,,2\n";
        let ds = load_bytes("data.csv", csv.as_bytes(), &LoadOptions::default()).unwrap();
        assert_eq!(ds.len(), 2);
        let dtypes: Vec<DType> = ds.columns().iter().map(|c| c.dtype()).collect();
        assert_eq!(dtypes, vec![DType::DateTime, DType::Text, DType::Int, DType::Float]);
        assert_eq!(ds.column("value").unwrap().null_count(), 1);
    }

    #[test]
    fn csv_short_rows_pad_and_long_rows_fail() {
        let ds = load_bytes("d.csv", b"a,b\n1\n", &LoadOptions::default()).unwrap();
        assert_eq!(ds.row(0), vec![&Value::Integer(1), &Value::Null]);

        let err = load_bytes("d.csv", b"a,b\n1,2,3\n", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::TooManyFields { found: 3, .. }));
    }

    #[test]
    fn csv_respects_delimiter_and_blank_headers() {
        let options = LoadOptions {
            delimiter: b';',
            ..LoadOptions::default()
        };
        let ds = load_bytes("d.csv", b";x\n1;a\n", &options).unwrap();
        assert_eq!(ds.column_names(), vec!["Unnamed: 0", "x"]);
    }

    #[test]
    fn csv_duplicate_headers_are_renamed() {
        let ds = load_bytes("d.csv", b"x,x\n1,100\n2,200\n", &LoadOptions::default()).unwrap();
        assert_eq!(ds.column_names(), vec!["x", "x.1"]);

        let specs = build_filter_specs(&ds);
        assert_eq!(specs.len(), 2);
        assert_eq!(apply(&ds, &specs).len(), 2);
    }

    #[test]
    fn excel_headers_print_numbers_in_shortest_form() {
        assert_eq!(excel_header(0, &Data::Float(2.5)), "2.5");
        assert_eq!(excel_header(1, &Data::Float(2021.0)), "2021");
        assert_eq!(excel_header(2, &Data::Bool(true)), "True");
        assert_eq!(excel_header(3, &Data::String("name".into())), "name");
        assert_eq!(excel_header(4, &Data::Empty), "Unnamed: 4");
    }

    #[test]
    fn empty_csv_is_a_load_error() {
        let err = load_bytes("d.csv", b"", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Empty));
    }

    #[test]
    fn json_records_keep_first_seen_key_order() {
        let json = r#"[{"b": 1, "a": "x"}, {"a": "y", "c": true}]"#;
        let ds = load_bytes("d.json", json.as_bytes(), &LoadOptions::default()).unwrap();
        assert_eq!(ds.column_names(), vec!["b", "a", "c"]);
        assert_eq!(ds.row(1), vec![&Value::Null, &Value::from("y"), &Value::Bool(true)]);
    }

    #[test]
    fn json_must_be_an_array_of_objects() {
        let err = load_bytes("d.json", b"{\"a\": 1}", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidJson(_)));
        let err = load_bytes("d.json", b"[1, 2]", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidJson(_)));
    }

    #[test]
    fn corrupt_excel_is_a_load_error() {
        let err = load_bytes("d.xlsx", b"not a workbook", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Excel(_)));
    }

    #[test]
    fn parquet_round_trip_through_arrow_writer() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("category", DataType::Utf8, true),
            Field::new("value", DataType::Int64, true),
            Field::new("score", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![Some("A"), None])),
                Arc::new(Int64Array::from(vec![5, 7])),
                Arc::new(Float64Array::from(vec![0.5, 1.5])),
            ],
        )
        .unwrap();

        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let ds = load_bytes("d.parquet", &buf, &LoadOptions::default()).unwrap();
        assert_eq!(ds.column_names(), vec!["category", "value", "score"]);
        assert_eq!(
            ds.row(1),
            vec![&Value::Null, &Value::Integer(7), &Value::Float(1.5)]
        );
    }
}
