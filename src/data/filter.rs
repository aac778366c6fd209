use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use super::model::{Column, DType, Dataset, Value};

// ---------------------------------------------------------------------------
// Column classification
// ---------------------------------------------------------------------------

/// How a column can be filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Integer or floating-point: range filter.
    Numeric,
    /// Text or mixed values: set filter.
    Categorical,
    /// Date-times, booleans: not filterable.
    Other,
}

/// Classify a column by its dtype.
pub fn classify(column: &Column) -> ColumnKind {
    match column.dtype() {
        DType::Int | DType::Float => ColumnKind::Numeric,
        DType::Text | DType::Mixed => ColumnKind::Categorical,
        DType::Bool | DType::DateTime => ColumnKind::Other,
    }
}

// ---------------------------------------------------------------------------
// Filter specs
// ---------------------------------------------------------------------------

/// Inclusive numeric range over one column.
///
/// Always `min_bound <= selected_min <= selected_max <= max_bound`. When the
/// requested range lies wholly outside the bounds the selection is `empty`
/// and matches nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeFilter {
    pub column: String,
    pub min_bound: f64,
    pub max_bound: f64,
    selected_min: f64,
    selected_max: f64,
    empty: bool,
}

impl RangeFilter {
    /// A filter spanning the full `[min_bound, max_bound]`, or `None` if
    /// either bound is NaN.
    pub fn new(column: impl Into<String>, min_bound: f64, max_bound: f64) -> Option<Self> {
        if min_bound.is_nan() || max_bound.is_nan() {
            return None;
        }
        let (min_bound, max_bound) = ordered(min_bound, max_bound);
        Some(RangeFilter {
            column: column.into(),
            min_bound,
            max_bound,
            selected_min: min_bound,
            selected_max: max_bound,
            empty: false,
        })
    }

    pub fn selected_min(&self) -> f64 {
        self.selected_min
    }

    pub fn selected_max(&self) -> f64 {
        self.selected_max
    }

    /// Whether the selection matches no value at all.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Narrow the selection. Reversed bounds are swapped and both ends are
    /// clamped into the column's bounds; NaN is rejected. A range that misses
    /// the bounds entirely leaves an empty selection.
    pub fn set_range(&mut self, min: f64, max: f64) -> bool {
        if min.is_nan() || max.is_nan() {
            return false;
        }
        let (min, max) = ordered(min, max);
        self.empty = max < self.min_bound || min > self.max_bound;
        self.selected_min = min.clamp(self.min_bound, self.max_bound);
        self.selected_max = max.clamp(self.min_bound, self.max_bound);
        true
    }

    /// Null and non-numeric cells never match.
    pub fn matches(&self, value: &Value) -> bool {
        !self.empty
            && value
                .as_f64()
                .is_some_and(|v| self.selected_min <= v && v <= self.selected_max)
    }

    fn reset(&mut self) {
        self.selected_min = self.min_bound;
        self.selected_max = self.max_bound;
        self.empty = false;
    }

    fn is_full(&self) -> bool {
        !self.empty && self.selected_min <= self.min_bound && self.selected_max >= self.max_bound
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Membership filter over one column.
///
/// `available_values` holds the column's distinct non-null values in
/// first-seen order; `selected_values` is always a subset of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetFilter {
    pub column: String,
    pub available_values: Vec<Value>,
    selected_values: BTreeSet<Value>,
}

impl SetFilter {
    /// A filter with every available value selected. Nulls and duplicates are
    /// dropped from `available`.
    pub fn new(column: impl Into<String>, available: impl IntoIterator<Item = Value>) -> Self {
        let mut seen = HashSet::new();
        let available_values: Vec<Value> = available
            .into_iter()
            .filter(|v| !v.is_null() && seen.insert(v.clone()))
            .collect();
        let selected_values = available_values.iter().cloned().collect();
        SetFilter {
            column: column.into(),
            available_values,
            selected_values,
        }
    }

    pub fn selected_values(&self) -> &BTreeSet<Value> {
        &self.selected_values
    }

    /// Replace the selection. Values that are not available are ignored.
    pub fn set_selected(&mut self, values: impl IntoIterator<Item = Value>) {
        let available: HashSet<&Value> = self.available_values.iter().collect();
        self.selected_values = values
            .into_iter()
            .filter(|v| available.contains(v))
            .collect();
    }

    /// Null cells never match: nulls are never available, so never selected.
    pub fn matches(&self, value: &Value) -> bool {
        !value.is_null() && self.selected_values.contains(value)
    }

    fn is_full(&self) -> bool {
        self.selected_values.len() == self.available_values.len()
    }
}

/// The current allowed range or set for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    Range(RangeFilter),
    Set(SetFilter),
}

impl FilterSpec {
    pub fn column(&self) -> &str {
        match self {
            FilterSpec::Range(r) => &r.column,
            FilterSpec::Set(s) => &s.column,
        }
    }

    /// The column kind this spec applies to.
    pub fn kind(&self) -> ColumnKind {
        match self {
            FilterSpec::Range(_) => ColumnKind::Numeric,
            FilterSpec::Set(_) => ColumnKind::Categorical,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FilterSpec::Range(r) => r.matches(value),
            FilterSpec::Set(s) => s.matches(value),
        }
    }

    /// Whether the selection is narrower than the default.
    pub fn is_active(&self) -> bool {
        match self {
            FilterSpec::Range(r) => !r.is_full(),
            FilterSpec::Set(s) => !s.is_full(),
        }
    }

    /// Set the range of a [`RangeFilter`]. Returns `false` for a set filter
    /// or a NaN bound.
    pub fn set_range(&mut self, min: f64, max: f64) -> bool {
        match self {
            FilterSpec::Range(r) => r.set_range(min, max),
            FilterSpec::Set(_) => false,
        }
    }

    /// Set the selection of a [`SetFilter`]. Returns `false` for a range filter.
    pub fn set_selected(&mut self, values: impl IntoIterator<Item = Value>) -> bool {
        match self {
            FilterSpec::Set(s) => {
                s.set_selected(values);
                true
            }
            FilterSpec::Range(_) => false,
        }
    }

    /// Reset to the default selection (full range / full set).
    pub fn select_all(&mut self) {
        match self {
            FilterSpec::Range(r) => r.reset(),
            FilterSpec::Set(s) => {
                s.selected_values = s.available_values.iter().cloned().collect();
            }
        }
    }

    /// Clear a set filter's selection, excluding every row. A range filter
    /// cannot be emptied and is left unchanged.
    pub fn select_none(&mut self) -> bool {
        match self {
            FilterSpec::Set(s) => {
                s.selected_values.clear();
                true
            }
            FilterSpec::Range(_) => false,
        }
    }
}

/// Derive the default filter spec for one column.
///
/// Returns `None` for `Other` columns and for columns without a single
/// non-null value.
pub fn build_filter_spec(column: &Column) -> Option<FilterSpec> {
    match classify(column) {
        ColumnKind::Numeric => {
            let (min, max) = column
                .non_null()
                .filter_map(Value::as_f64)
                .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                    None => Some((v, v)),
                    Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                })?;
            RangeFilter::new(column.name(), min, max).map(FilterSpec::Range)
        }
        ColumnKind::Categorical => {
            let spec = SetFilter::new(column.name(), column.non_null().cloned());
            if spec.available_values.is_empty() {
                return None;
            }
            Some(FilterSpec::Set(spec))
        }
        ColumnKind::Other => None,
    }
}

/// Default filter specs for every filterable column, in column order.
pub fn build_filter_specs(dataset: &Dataset) -> Vec<FilterSpec> {
    let specs: Vec<FilterSpec> = dataset
        .columns()
        .iter()
        .filter_map(build_filter_spec)
        .collect();
    log::debug!(
        "Built {} filter specs for {} columns",
        specs.len(),
        dataset.column_count()
    );
    specs
}

// ---------------------------------------------------------------------------
// Applying filters
// ---------------------------------------------------------------------------

/// The dataset restricted to the rows passing every filter.
pub type FilteredView = Dataset;

/// Return indices of rows that pass all filters.
///
/// A row passes when every applicable spec matches its cell. A spec is
/// skipped when its column is missing or no longer of the spec's kind.
pub fn filtered_indices(dataset: &Dataset, specs: &[FilterSpec]) -> Vec<usize> {
    let names = dataset.name_index();
    let active: Vec<(&Column, &FilterSpec)> = specs
        .iter()
        .filter_map(|spec| {
            let column = &dataset.columns()[*names.get(spec.column())?];
            (classify(column) == spec.kind()).then_some((column, spec))
        })
        .collect();

    (0..dataset.len())
        .filter(|&row| {
            active
                .iter()
                .all(|(column, spec)| spec.matches(&column.values()[row]))
        })
        .collect()
}

/// Build the filtered view: the conjunction of all specs over `dataset`.
pub fn apply(dataset: &Dataset, specs: &[FilterSpec]) -> FilteredView {
    let indices = filtered_indices(dataset, specs);
    log::debug!("Filter kept {} of {} rows", indices.len(), dataset.len());
    dataset.take(&indices)
}

// ---------------------------------------------------------------------------
// Column partition
// ---------------------------------------------------------------------------

/// Numeric and categorical columns of a view, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnPartition {
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
}

pub fn partition_columns(view: &FilteredView) -> ColumnPartition {
    let mut partition = ColumnPartition::default();
    for column in view.columns() {
        match classify(column) {
            ColumnKind::Numeric => partition.numeric_columns.push(column.name().to_string()),
            ColumnKind::Categorical => partition
                .categorical_columns
                .push(column.name().to_string()),
            ColumnKind::Other => {}
        }
    }
    partition
}
