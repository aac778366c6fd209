use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::data::filter::ColumnPartition;

// ---------------------------------------------------------------------------
// Chart kinds and their axis menus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Histogram,
    Scatter,
    Bar,
    Pie,
    Line,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartKind::Histogram => "Histogram",
            ChartKind::Scatter => "Scatter",
            ChartKind::Bar => "Bar",
            ChartKind::Pie => "Pie",
            ChartKind::Line => "Line",
        };
        write!(f, "{name}")
    }
}

/// Columns a user may pick for each axis of one chart kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AxisMenus {
    pub x: Vec<String>,
    pub y: Vec<String>,
    pub color: Vec<String>,
}

impl ChartKind {
    pub const ALL: [ChartKind; 5] = [
        ChartKind::Histogram,
        ChartKind::Scatter,
        ChartKind::Bar,
        ChartKind::Pie,
        ChartKind::Line,
    ];

    /// Axis menus for this kind over a view with the given columns.
    pub fn axis_menus(self, partition: &ColumnPartition, all_columns: &[String]) -> AxisMenus {
        let numeric = partition.numeric_columns.clone();
        let categorical = partition.categorical_columns.clone();
        match self {
            ChartKind::Histogram => AxisMenus {
                x: numeric,
                ..AxisMenus::default()
            },
            ChartKind::Scatter => AxisMenus {
                x: numeric.clone(),
                y: numeric,
                color: categorical,
            },
            ChartKind::Bar => AxisMenus {
                x: categorical.clone(),
                y: numeric,
                color: categorical,
            },
            ChartKind::Pie => AxisMenus {
                x: categorical,
                ..AxisMenus::default()
            },
            ChartKind::Line => AxisMenus {
                x: all_columns.to_vec(),
                y: numeric,
                color: Vec::new(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Chart configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ChartError {
    #[error("{kind} chart needs {needs}, but the view has none")]
    MissingColumns { kind: ChartKind, needs: &'static str },

    #[error("column '{column}' cannot be used as the {axis} axis of a {kind} chart")]
    NotAllowed {
        kind: ChartKind,
        axis: &'static str,
        column: String,
    },
}

/// Which columns a chart plots. For a pie chart `x` holds the slice names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartConfig {
    pub kind: ChartKind,
    pub x: String,
    pub y: Option<String>,
    pub color: Option<String>,
    #[serde(skip)]
    menus: AxisMenus,
}

impl ChartConfig {
    /// Default axes for `kind`:
    ///
    /// * Histogram – first numeric column
    /// * Scatter – first two numeric columns (the first twice if only one),
    ///   coloured by the first categorical column if any
    /// * Bar – first categorical against first numeric, coloured by category
    /// * Pie – first categorical column
    /// * Line – first column of the view against first numeric
    pub fn default_for(
        kind: ChartKind,
        partition: &ColumnPartition,
        all_columns: &[String],
    ) -> Result<Self, ChartError> {
        let menus = kind.axis_menus(partition, all_columns);
        let missing = |needs| ChartError::MissingColumns { kind, needs };

        let (x, y, color) = match kind {
            ChartKind::Histogram => {
                let x = menus.x.first().ok_or_else(|| missing("a numeric column"))?;
                (x.clone(), None, None)
            }
            ChartKind::Scatter => {
                let x = menus.x.first().ok_or_else(|| missing("a numeric column"))?;
                let y = menus.y.get(1).unwrap_or(x);
                (x.clone(), Some(y.clone()), menus.color.first().cloned())
            }
            ChartKind::Bar => {
                let x = menus
                    .x
                    .first()
                    .ok_or_else(|| missing("a categorical column"))?;
                let y = menus.y.first().ok_or_else(|| missing("a numeric column"))?;
                (x.clone(), Some(y.clone()), Some(x.clone()))
            }
            ChartKind::Pie => {
                let x = menus
                    .x
                    .first()
                    .ok_or_else(|| missing("a categorical column"))?;
                (x.clone(), None, None)
            }
            ChartKind::Line => {
                let x = menus.x.first().ok_or_else(|| missing("a column"))?;
                let y = menus.y.first().ok_or_else(|| missing("a numeric column"))?;
                (x.clone(), Some(y.clone()), None)
            }
        };

        Ok(ChartConfig {
            kind,
            x,
            y,
            color,
            menus,
        })
    }

    pub fn menus(&self) -> &AxisMenus {
        &self.menus
    }

    /// Pick the x column. A bar chart's colour follows its category.
    pub fn set_x(&mut self, column: &str) -> Result<(), ChartError> {
        if !self.menus.x.iter().any(|c| c == column) {
            return Err(self.not_allowed("x", column));
        }
        self.x = column.to_string();
        if self.kind == ChartKind::Bar {
            self.color = Some(self.x.clone());
        }
        Ok(())
    }

    pub fn set_y(&mut self, column: &str) -> Result<(), ChartError> {
        if !self.menus.y.iter().any(|c| c == column) {
            return Err(self.not_allowed("y", column));
        }
        self.y = Some(column.to_string());
        Ok(())
    }

    fn not_allowed(&self, axis: &'static str, column: &str) -> ChartError {
        ChartError::NotAllowed {
            kind: self.kind,
            axis,
            column: column.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn partition(numeric: &[&str], categorical: &[&str]) -> ColumnPartition {
        ColumnPartition {
            numeric_columns: numeric.iter().map(|s| s.to_string()).collect(),
            categorical_columns: categorical.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scatter_uses_second_numeric_column_when_present() {
        let all = names(&["date", "category", "value", "score"]);
        let p = partition(&["value", "score"], &["category"]);
        let cfg = ChartConfig::default_for(ChartKind::Scatter, &p, &all).unwrap();
        assert_eq!(cfg.x, "value");
        assert_eq!(cfg.y.as_deref(), Some("score"));
        assert_eq!(cfg.color.as_deref(), Some("category"));

        let p = partition(&["value"], &[]);
        let cfg = ChartConfig::default_for(ChartKind::Scatter, &p, &all).unwrap();
        assert_eq!(cfg.y.as_deref(), Some("value"));
        assert_eq!(cfg.color, None);
    }

    #[test]
    fn line_x_may_be_any_column() {
        let all = names(&["date", "category", "value"]);
        let p = partition(&["value"], &["category"]);
        let mut cfg = ChartConfig::default_for(ChartKind::Line, &p, &all).unwrap();
        assert_eq!(cfg.x, "date");
        assert_eq!(cfg.y.as_deref(), Some("value"));
        assert!(cfg.set_x("category").is_ok());
        assert!(cfg.set_y("category").is_err());
    }

    #[test]
    fn bar_colour_follows_category() {
        let all = names(&["a", "b", "v"]);
        let p = partition(&["v"], &["a", "b"]);
        let mut cfg = ChartConfig::default_for(ChartKind::Bar, &p, &all).unwrap();
        assert_eq!(cfg.color.as_deref(), Some("a"));
        cfg.set_x("b").unwrap();
        assert_eq!(cfg.color.as_deref(), Some("b"));
        assert_eq!(
            cfg.set_x("v"),
            Err(ChartError::NotAllowed {
                kind: ChartKind::Bar,
                axis: "x",
                column: "v".into()
            })
        );
    }

    #[test]
    fn missing_columns_are_reported() {
        let all = names(&["v"]);
        let p = partition(&["v"], &[]);
        assert!(matches!(
            ChartConfig::default_for(ChartKind::Pie, &p, &all),
            Err(ChartError::MissingColumns { kind: ChartKind::Pie, .. })
        ));
        let empty = ColumnPartition::default();
        for kind in ChartKind::ALL {
            assert!(ChartConfig::default_for(kind, &empty, &[]).is_err());
        }
    }
}
