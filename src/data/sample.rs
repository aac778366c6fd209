use chrono::{Days, NaiveDate};

use super::model::{Dataset, Value};

/// Built-in demo table: ten days of an A/B category with integer values.
pub fn sample_dataset() -> Dataset {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();

    const VALUES: [i64; 10] = [5, 7, 3, 8, 2, 9, 4, 6, 1, 10];

    let rows = VALUES
        .iter()
        .zip(["A", "B"].iter().cycle())
        .enumerate()
        .map(|(i, (&value, &category))| {
            let date = start
                .checked_add_days(Days::new(i as u64))
                .map(Value::DateTime)
                .unwrap_or(Value::Null);
            vec![date, Value::from(category), Value::Integer(value)]
        })
        .collect();

    Dataset::from_rows(
        vec!["date".into(), "category".into(), "value".into()],
        rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::DType;

    #[test]
    fn sample_has_ten_rows_of_three_types() {
        let ds = sample_dataset();
        assert_eq!(ds.len(), 10);
        let dtypes: Vec<DType> = ds.columns().iter().map(|c| c.dtype()).collect();
        assert_eq!(dtypes, vec![DType::DateTime, DType::Text, DType::Int]);
        assert_eq!(ds.row(9)[1], &Value::from("B"));
        assert_eq!(ds.row(9)[0].to_string(), "2023-01-10");
    }
}
