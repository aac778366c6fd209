use std::io::Write;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use thiserror::Error;

use crate::data::model::{format_datetime, Column, DType, Dataset, Value};
use crate::data::summary::{describe, Summary};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

// ---------------------------------------------------------------------------
// Cell formatting
// ---------------------------------------------------------------------------

/// Shortest round-trip form with a trailing `.0` for whole numbers; NaN is blank.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        format!("{v:?}")
    }
}

/// Text form of one cell in an exported file.
pub fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(v) => format_float(*v),
        Value::Text(s) => s.clone(),
        Value::DateTime(d) => format_datetime(d),
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Write every row of `dataset` as CSV, header first, without an index column.
pub fn write_dataset<W: Write>(dataset: &Dataset, out: W) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(dataset.columns().iter().map(|c| c.name()))?;
    for row in 0..dataset.len() {
        writer.write_record(dataset.row(row).into_iter().map(csv_field))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the `describe()` table of `dataset`: one column per numeric column,
/// one row per statistic. Falls back to the non-numeric layout
/// (`count`, `unique`, `top`, `freq`) when there is no numeric column.
pub fn write_summary<W: Write>(dataset: &Dataset, out: W) -> Result<(), ExportError> {
    let Summary {
        numeric,
        categorical,
    } = describe(dataset);
    let mut writer = csv::Writer::from_writer(out);
    let record = |label: &str, cells: Vec<String>| {
        let mut record = vec![label.to_string()];
        record.extend(cells);
        record
    };

    if !numeric.is_empty() || categorical.is_empty() {
        writer.write_record(record("", numeric.iter().map(|s| s.column.clone()).collect()))?;
        let columns: Vec<_> = numeric.iter().map(|s| s.rows()).collect();
        for i in 0..columns.first().map(|rows| rows.len()).unwrap_or(0) {
            let label = columns[0][i].0;
            writer.write_record(record(
                label,
                columns.iter().map(|rows| format_float(rows[i].1)).collect(),
            ))?;
        }
    } else {
        writer.write_record(record(
            "",
            categorical.iter().map(|s| s.column.clone()).collect(),
        ))?;
        writer.write_record(record(
            "count",
            categorical.iter().map(|s| s.count.to_string()).collect(),
        ))?;
        writer.write_record(record(
            "unique",
            categorical.iter().map(|s| s.unique.to_string()).collect(),
        ))?;
        writer.write_record(record(
            "top",
            categorical
                .iter()
                .map(|s| s.top.as_ref().map(csv_field).unwrap_or_default())
                .collect(),
        ))?;
        writer.write_record(record(
            "freq",
            categorical.iter().map(|s| s.freq.to_string()).collect(),
        ))?;
    }
    writer.flush()?;
    Ok(())
}

/// CSV bytes of the dataset.
pub fn dataset_to_csv(dataset: &Dataset) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    write_dataset(dataset, &mut buf)?;
    Ok(buf)
}

/// CSV bytes of the dataset's summary statistics.
pub fn summary_to_csv(dataset: &Dataset) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    write_summary(dataset, &mut buf)?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Arrow conversion (terminal tables)
// ---------------------------------------------------------------------------

fn column_to_arrow(column: &Column) -> (DataType, ArrayRef) {
    let values = column.values();
    match column.dtype() {
        DType::Int => (
            DataType::Int64,
            Arc::new(Int64Array::from_iter(values.iter().map(|v| match v {
                Value::Integer(i) => Some(*i),
                _ => None,
            }))) as ArrayRef,
        ),
        DType::Float => (
            DataType::Float64,
            Arc::new(Float64Array::from_iter(values.iter().map(Value::as_f64))) as ArrayRef,
        ),
        DType::Bool => (
            DataType::Boolean,
            Arc::new(BooleanArray::from_iter(values.iter().map(|v| match v {
                Value::Bool(b) => Some(*b),
                _ => None,
            }))) as ArrayRef,
        ),
        DType::Text | DType::Mixed | DType::DateTime => (
            DataType::Utf8,
            Arc::new(StringArray::from_iter(values.iter().map(|v| {
                (!v.is_null()).then(|| csv_field(v))
            }))) as ArrayRef,
        ),
    }
}

/// Convert a dataset into one Arrow record batch. Date-times become text.
pub fn to_record_batch(dataset: &Dataset) -> Result<RecordBatch, ArrowError> {
    let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) = dataset
        .columns()
        .iter()
        .map(|c| {
            let (data_type, array) = column_to_arrow(c);
            (Field::new(c.name(), data_type, true), array)
        })
        .unzip();
    let options = RecordBatchOptions::new().with_row_count(Some(dataset.len()));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)
}

/// Render the first `limit` rows as a boxed text table.
pub fn pretty_table(dataset: &Dataset, limit: usize) -> Result<String, ExportError> {
    let head: Vec<usize> = (0..dataset.len().min(limit)).collect();
    let batch = to_record_batch(&dataset.take(&head))?;
    Ok(arrow::util::pretty::pretty_format_batches(&[batch])?.to_string())
}

#[cfg(test)]
mod tests {
    use arrow::array::Array;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::data::model::Column;

    fn sample() -> Dataset {
        let day = |d| {
            Value::DateTime(
                NaiveDate::from_ymd_opt(2023, 1, d)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            )
        };
        Dataset::new(vec![
            Column::new("date", vec![day(1), day(2), day(3)]),
            Column::new(
                "category",
                vec![Value::from("A"), Value::from("B, C"), Value::Null],
            ),
            Column::new("value", vec![Value::Integer(5), Value::Integer(7), Value::Null]),
            Column::new("score", vec![Value::Float(0.5), Value::Float(2.0), Value::Null]),
        ])
        .unwrap()
    }

    #[test]
    fn dataset_csv_formats_cells_like_pandas() {
        let csv = String::from_utf8(dataset_to_csv(&sample()).unwrap()).unwrap();
        assert_eq!(
            csv,
            "date,category,value,score\n\
             2023-01-01,A,5,0.5\n\
             2023-01-02,\"B, C\",7,2.0\n\
             2023-01-03,,,\n"
        );
    }

    #[test]
    fn summary_csv_has_describe_layout() {
        let csv = String::from_utf8(summary_to_csv(&sample()).unwrap()).unwrap();
        assert_eq!(
            csv,
            ",value,score\n\
             count,2.0,2.0\n\
             mean,6.0,1.25\n\
             std,1.4142135623730951,1.0606601717798212\n\
             min,5.0,0.5\n\
             25%,5.5,0.875\n\
             50%,6.0,1.25\n\
             75%,6.5,1.625\n\
             max,7.0,2.0\n"
        );
    }

    #[test]
    fn summary_csv_without_numeric_columns_uses_categorical_layout() {
        let ds = Dataset::new(vec![Column::new(
            "c",
            vec![Value::from("x"), Value::from("y"), Value::from("x")],
        )])
        .unwrap();
        let csv = String::from_utf8(summary_to_csv(&ds).unwrap()).unwrap();
        assert_eq!(csv, ",c\ncount,3\nunique,2\ntop,x\nfreq,2\n");
    }

    #[test]
    fn record_batch_keeps_types_and_nulls() {
        let batch = to_record_batch(&sample()).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Utf8);
        assert_eq!(batch.schema().field(2).data_type(), &DataType::Int64);
        assert_eq!(batch.column(3).null_count(), 1);

        let table = pretty_table(&sample(), 1).unwrap();
        assert!(table.contains("2023-01-01"));
        assert!(!table.contains("2023-01-02"));
    }

    #[test]
    fn floats_and_booleans() {
        assert_eq!(format_float(f64::NAN), "");
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(csv_field(&Value::Bool(true)), "True");
        assert_eq!(csv_field(&Value::Null), "");
    }
}
