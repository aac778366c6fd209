use std::collections::HashMap;

use serde::Serialize;

use super::filter::{classify, ColumnKind};
use super::model::{Column, DType, Dataset, Value};

// ---------------------------------------------------------------------------
// Per-column statistics
// ---------------------------------------------------------------------------

/// `describe()` row for a numeric column. Undefined statistics are NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
}

impl NumericSummary {
    pub fn of(column: &Column) -> Self {
        let mut values: Vec<f64> = column.non_null().filter_map(Value::as_f64).collect();
        values.sort_by(f64::total_cmp);

        let count = values.len();
        let mean = if count == 0 {
            f64::NAN
        } else {
            values.iter().sum::<f64>() / count as f64
        };
        // Sample standard deviation (ddof = 1).
        let std = if count < 2 {
            f64::NAN
        } else {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        };

        NumericSummary {
            column: column.name().to_string(),
            count,
            mean,
            std,
            min: values.first().copied().unwrap_or(f64::NAN),
            q25: quantile(&values, 0.25),
            q50: quantile(&values, 0.50),
            q75: quantile(&values, 0.75),
            max: values.last().copied().unwrap_or(f64::NAN),
        }
    }

    /// Statistics in `describe()` row order, with their labels.
    pub fn rows(&self) -> [(&'static str, f64); 8] {
        [
            ("count", self.count as f64),
            ("mean", self.mean),
            ("std", self.std),
            ("min", self.min),
            ("25%", self.q25),
            ("50%", self.q50),
            ("75%", self.q75),
            ("max", self.max),
        ]
    }
}

/// Linear-interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// `describe()` row for a non-numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalSummary {
    pub column: String,
    pub count: usize,
    pub unique: usize,
    /// Most frequent value; ties go to the value seen first.
    pub top: Option<Value>,
    pub freq: usize,
}

impl CategoricalSummary {
    pub fn of(column: &Column) -> Self {
        let mut counts: HashMap<&Value, (usize, usize)> = HashMap::new();
        let mut count = 0;
        for (position, value) in column.non_null().enumerate() {
            count += 1;
            counts.entry(value).or_insert((0, position)).0 += 1;
        }
        let top = counts
            .iter()
            .max_by(|(_, (ca, pa)), (_, (cb, pb))| ca.cmp(cb).then(pb.cmp(pa)))
            .map(|(v, (c, _))| ((*v).clone(), *c));

        CategoricalSummary {
            column: column.name().to_string(),
            count,
            unique: counts.len(),
            freq: top.as_ref().map(|(_, c)| *c).unwrap_or(0),
            top: top.map(|(v, _)| v),
        }
    }
}

/// `describe(include='all')`: numeric and non-numeric summaries, column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub numeric: Vec<NumericSummary>,
    pub categorical: Vec<CategoricalSummary>,
}

pub fn describe(dataset: &Dataset) -> Summary {
    let mut summary = Summary::default();
    for column in dataset.columns() {
        match classify(column) {
            ColumnKind::Numeric => summary.numeric.push(NumericSummary::of(column)),
            ColumnKind::Categorical | ColumnKind::Other => {
                summary.categorical.push(CategoricalSummary::of(column))
            }
        }
    }
    summary
}

/// Null count per column.
pub fn missing_values(dataset: &Dataset) -> Vec<(String, usize)> {
    dataset
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.null_count()))
        .collect()
}

pub fn column_types(dataset: &Dataset) -> Vec<(String, DType)> {
    dataset
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.dtype()))
        .collect()
}

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: DType,
    pub kind: ColumnKind,
    pub missing: usize,
}

/// Everything the "data overview" screen shows for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataOverview {
    pub row_count: usize,
    pub columns: Vec<ColumnInfo>,
    pub summary: Summary,
}

impl DataOverview {
    pub fn of(dataset: &Dataset) -> Self {
        let columns = dataset
            .columns()
            .iter()
            .map(|c| ColumnInfo {
                name: c.name().to_string(),
                dtype: c.dtype(),
                kind: classify(c),
                missing: c.null_count(),
            })
            .collect();
        DataOverview {
            row_count: dataset.len(),
            columns,
            summary: describe(dataset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn numeric_summary_matches_pandas_describe() {
        let col = Column::new(
            "value",
            [5, 7, 3, 8, 2, 9, 4, 6, 1, 10]
                .iter()
                .map(|&i| Value::Integer(i))
                .collect(),
        );
        let s = NumericSummary::of(&col);
        assert_eq!(s.count, 10);
        assert!(close(s.mean, 5.5));
        assert!(close(s.std, 3.0276503540974917));
        assert!(close(s.min, 1.0));
        assert!(close(s.q25, 3.25));
        assert!(close(s.q50, 5.5));
        assert!(close(s.q75, 7.75));
        assert!(close(s.max, 10.0));
    }

    #[test]
    fn undefined_statistics_are_nan() {
        let one = NumericSummary::of(&Column::new("v", vec![Value::Float(2.0), Value::Null]));
        assert_eq!(one.count, 1);
        assert!(one.std.is_nan());
        assert!(close(one.q75, 2.0));

        let none = NumericSummary::of(&Column::new("v", vec![Value::Null]));
        assert_eq!(none.count, 0);
        assert!(none.mean.is_nan() && none.min.is_nan() && none.q50.is_nan());
    }

    #[test]
    fn categorical_top_prefers_first_seen_on_ties() {
        let col = Column::new(
            "c",
            vec![
                Value::from("B"),
                Value::from("A"),
                Value::Null,
                Value::from("A"),
                Value::from("B"),
            ],
        );
        let s = CategoricalSummary::of(&col);
        assert_eq!(s.count, 4);
        assert_eq!(s.unique, 2);
        assert_eq!(s.top, Some(Value::from("B")));
        assert_eq!(s.freq, 2);
    }

    #[test]
    fn overview_reports_types_and_missing() {
        let ds = Dataset::new(vec![
            Column::new("c", vec![Value::from("A"), Value::Null]),
            Column::new("v", vec![Value::Integer(1), Value::Integer(2)]),
        ])
        .unwrap();
        let overview = DataOverview::of(&ds);
        assert_eq!(overview.row_count, 2);
        assert_eq!(overview.columns[0].kind, ColumnKind::Categorical);
        assert_eq!(overview.columns[0].missing, 1);
        assert_eq!(overview.columns[1].dtype, DType::Int);
        assert_eq!(overview.summary.numeric.len(), 1);
        assert_eq!(overview.summary.categorical.len(), 1);
        assert_eq!(
            missing_values(&ds),
            vec![("c".to_string(), 1), ("v".to_string(), 0)]
        );
        assert_eq!(
            column_types(&ds),
            vec![("c".to_string(), DType::Text), ("v".to_string(), DType::Int)]
        );
    }
}
