use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::chart::{AxisMenus, ChartConfig, ChartKind};
use crate::data::filter::{ColumnPartition, FilterSpec};
use crate::data::loader::LoadOptions;
use crate::data::model::{Dataset, Value};
use crate::data::summary::DataOverview;
use crate::export::{csv_field, format_float, pretty_table, write_dataset, write_summary};
use crate::session::Session;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Command-line surface of the `tabex` binary.
#[derive(Debug, Parser)]
#[command(
    name = "tabex",
    about = "Load a CSV / Excel / JSON / Parquet table, filter it by column type, and inspect or export the result."
)]
pub struct Args {
    /// Table to load (.csv, .tsv, .xlsx, .xls, .ods, .json, .parquet).
    #[arg(
        short,
        long,
        value_name = "PATH",
        required_unless_present = "sample",
        conflicts_with = "sample"
    )]
    pub file: Option<PathBuf>,

    /// Use the built-in sample dataset instead of a file.
    #[arg(long)]
    pub sample: bool,

    /// Worksheet to read from a workbook (default: the first sheet).
    #[arg(long)]
    pub sheet: Option<String>,

    /// Field delimiter for delimited text.
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,

    /// Output format for reports.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Column types, missing values and summary statistics.
    Overview,

    /// The generated filter for every filterable column.
    Filters(SelectionArgs),

    /// Rows of the filtered view.
    View {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Maximum number of rows to print.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Write the filtered view (and optionally its statistics) as CSV.
    Export {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Destination of the filtered rows.
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Destination of the summary statistics.
        #[arg(long, value_name = "PATH")]
        stats: Option<PathBuf>,
    },

    /// Axis choices for a chart over the filtered view.
    Chart {
        #[command(flatten)]
        selection: SelectionArgs,

        #[arg(long, value_enum)]
        kind: ChartKind,

        /// Override the default x column.
        #[arg(long)]
        x: Option<String>,

        /// Override the default y column.
        #[arg(long)]
        y: Option<String>,
    },
}

/// Filter selections, applied in order: `--none`, `--range`, `--select`.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct SelectionArgs {
    /// Keep rows with MIN <= COL <= MAX (repeatable).
    #[arg(long = "range", value_name = "COL=MIN:MAX", value_parser = parse_range)]
    pub ranges: Vec<RangeArg>,

    /// Keep rows whose COL is one of the listed values (repeatable).
    #[arg(long = "select", value_name = "COL=V1,V2", value_parser = parse_select)]
    pub selects: Vec<SelectArg>,

    /// Deselect every value of a categorical column (repeatable).
    #[arg(long = "none", value_name = "COL")]
    pub none: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeArg {
    pub column: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectArg {
    pub column: String,
    pub values: Vec<String>,
}

/// Parse `COL=MIN:MAX`; the column name may itself contain `=`.
pub fn parse_range(s: &str) -> Result<RangeArg, String> {
    let (column, bounds) = s.rsplit_once('=').ok_or("expected COL=MIN:MAX")?;
    let (min, max) = bounds.split_once(':').ok_or("expected COL=MIN:MAX")?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid bound '{v}': {e}"))
    };
    Ok(RangeArg {
        column: column.to_string(),
        min: parse(min)?,
        max: parse(max)?,
    })
}

/// Parse `COL=V1,V2,...`; `COL=` selects nothing.
pub fn parse_select(s: &str) -> Result<SelectArg, String> {
    let (column, values) = s.split_once('=').ok_or("expected COL=V1,V2")?;
    let values = if values.is_empty() {
        Vec::new()
    } else {
        values.split(',').map(str::to_string).collect()
    };
    Ok(SelectArg {
        column: column.to_string(),
        values,
    })
}

impl Args {
    pub fn load_options(&self) -> Result<LoadOptions> {
        if !self.delimiter.is_ascii() {
            bail!("delimiter must be a single ASCII character");
        }
        Ok(LoadOptions {
            delimiter: self.delimiter as u8,
            sheet: self.sheet.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Load the table, apply the selections, and write the requested report.
pub fn run<W: Write>(args: Args, out: &mut W) -> Result<()> {
    let mut session = Session::new();
    if args.sample {
        session.use_sample();
    } else if let Some(path) = &args.file {
        let options = args.load_options()?;
        session
            .load_file(path, &options)
            .with_context(|| format!("loading {}", path.display()))?;
    }

    match &args.command {
        Command::Overview => {
            let dataset = session.dataset().context("no dataset loaded")?;
            let overview = DataOverview::of(dataset);
            match args.format {
                OutputFormat::Json => write_json(out, &overview)?,
                OutputFormat::Text => write_overview(out, &overview)?,
            }
        }
        Command::Filters(selection) => {
            apply_selections(&mut session, selection)?;
            let report = FiltersReport::of(&session);
            match args.format {
                OutputFormat::Json => write_json(out, &report)?,
                OutputFormat::Text => write_filters(out, &report)?,
            }
        }
        Command::View { selection, limit } => {
            apply_selections(&mut session, selection)?;
            let total = session.dataset().map(Dataset::len).unwrap_or(0);
            let view = session.view();
            match args.format {
                OutputFormat::Json => write_json(out, &view_records(view, *limit)?)?,
                OutputFormat::Text => {
                    writeln!(out, "Filtered rows: {} of {}", view.len(), total)?;
                    writeln!(out, "{}", pretty_table(view, *limit)?)?;
                }
            }
        }
        Command::Export {
            selection,
            output,
            stats,
        } => {
            apply_selections(&mut session, selection)?;
            let view = session.view();

            let file = File::create(output)
                .with_context(|| format!("creating {}", output.display()))?;
            write_dataset(view, BufWriter::new(file))?;
            writeln!(out, "Wrote {} rows to {}", view.len(), output.display())?;

            if let Some(stats) = stats {
                let file = File::create(stats)
                    .with_context(|| format!("creating {}", stats.display()))?;
                write_summary(view, BufWriter::new(file))?;
                writeln!(out, "Wrote summary statistics to {}", stats.display())?;
            }
        }
        Command::Chart {
            selection,
            kind,
            x,
            y,
        } => {
            apply_selections(&mut session, selection)?;
            let mut config = session.chart(*kind)?;
            if let Some(x) = x {
                config.set_x(x)?;
            }
            if let Some(y) = y {
                config.set_y(y)?;
            }
            match args.format {
                OutputFormat::Json => write_json(
                    out,
                    &ChartReport {
                        config: &config,
                        menus: config.menus(),
                    },
                )?,
                OutputFormat::Text => write_chart(out, &config)?,
            }
        }
    }
    Ok(())
}

/// Push command-line selections into the session's filter specs.
pub fn apply_selections(session: &mut Session, selection: &SelectionArgs) -> Result<()> {
    for column in &selection.none {
        session.select_none(column)?;
    }
    for range in &selection.ranges {
        session.set_range(&range.column, range.min, range.max)?;
    }
    for select in &selection.selects {
        let values = resolve_values(session, select);
        session.set_selected(&select.column, values)?;
    }
    Ok(())
}

/// Map typed-in strings onto the column's available values by their text form.
fn resolve_values(session: &Session, select: &SelectArg) -> Vec<Value> {
    let Some(FilterSpec::Set(spec)) = session
        .specs()
        .iter()
        .find(|s| s.column() == select.column)
    else {
        return Vec::new();
    };

    select
        .values
        .iter()
        .filter_map(|text| {
            let found = spec
                .available_values
                .iter()
                .find(|v| csv_field(v) == *text)
                .cloned();
            if found.is_none() {
                log::warn!("'{text}' is not a value of column '{}'", select.column);
            }
            found
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct FiltersReport<'a> {
    total_rows: usize,
    filtered_rows: usize,
    filters: &'a [FilterSpec],
    partition: &'a ColumnPartition,
}

impl<'a> FiltersReport<'a> {
    fn of(session: &'a Session) -> Self {
        FiltersReport {
            total_rows: session.dataset().map(Dataset::len).unwrap_or(0),
            filtered_rows: session.view().len(),
            filters: session.specs(),
            partition: session.partition(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChartReport<'a> {
    config: &'a ChartConfig,
    menus: &'a AxisMenus,
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn view_records(
    view: &Dataset,
    limit: usize,
) -> Result<Vec<serde_json::Map<String, serde_json::Value>>> {
    let mut records = Vec::new();
    for row in 0..view.len().min(limit) {
        let mut record = serde_json::Map::new();
        for column in view.columns() {
            record.insert(
                column.name().to_string(),
                serde_json::to_value(&column.values()[row])?,
            );
        }
        records.push(record);
    }
    Ok(records)
}

fn write_overview<W: Write>(out: &mut W, overview: &DataOverview) -> Result<()> {
    writeln!(
        out,
        "Rows: {}    Columns: {}",
        overview.row_count,
        overview.columns.len()
    )?;
    writeln!(out)?;
    writeln!(out, "{:<24} {:<12} {:<12} {:>8}", "column", "dtype", "kind", "missing")?;
    for c in &overview.columns {
        writeln!(
            out,
            "{:<24} {:<12} {:<12} {:>8}",
            c.name,
            c.dtype.to_string(),
            format!("{:?}", c.kind),
            c.missing
        )?;
    }

    if !overview.summary.numeric.is_empty() {
        writeln!(out)?;
        write!(out, "{:<24}", "")?;
        for (label, _) in overview.summary.numeric[0].rows() {
            write!(out, " {label:>12}")?;
        }
        writeln!(out)?;
        for s in &overview.summary.numeric {
            write!(out, "{:<24}", s.column)?;
            for (_, v) in s.rows() {
                write!(out, " {:>12}", format_stat(v))?;
            }
            writeln!(out)?;
        }
    }

    if !overview.summary.categorical.is_empty() {
        writeln!(out)?;
        writeln!(
            out,
            "{:<24} {:>8} {:>8} {:<24} {:>8}",
            "", "count", "unique", "top", "freq"
        )?;
        for s in &overview.summary.categorical {
            writeln!(
                out,
                "{:<24} {:>8} {:>8} {:<24} {:>8}",
                s.column,
                s.count,
                s.unique,
                s.top.as_ref().map(csv_field).unwrap_or_default(),
                s.freq
            )?;
        }
    }
    Ok(())
}

fn format_stat(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else {
        format!("{v:.4}")
    }
}

fn write_filters<W: Write>(out: &mut W, report: &FiltersReport<'_>) -> Result<()> {
    for spec in report.filters {
        match spec {
            FilterSpec::Range(r) => {
                let selected = if r.is_empty() {
                    "none".to_string()
                } else {
                    format!(
                        "[{}, {}]",
                        format_float(r.selected_min()),
                        format_float(r.selected_max())
                    )
                };
                writeln!(
                    out,
                    "{:<24} range  [{}, {}]  selected {}",
                    r.column,
                    format_float(r.min_bound),
                    format_float(r.max_bound),
                    selected
                )?
            }
            FilterSpec::Set(s) => {
                let selected: Vec<String> = s
                    .available_values
                    .iter()
                    .filter(|v| s.selected_values().contains(*v))
                    .map(csv_field)
                    .collect();
                writeln!(
                    out,
                    "{:<24} set    {}/{} selected: {}",
                    s.column,
                    selected.len(),
                    s.available_values.len(),
                    selected.join(", ")
                )?
            }
        }
    }
    writeln!(out)?;
    writeln!(
        out,
        "Filtered rows: {} of {}",
        report.filtered_rows, report.total_rows
    )?;
    writeln!(
        out,
        "Numeric columns: {}",
        report.partition.numeric_columns.join(", ")
    )?;
    writeln!(
        out,
        "Categorical columns: {}",
        report.partition.categorical_columns.join(", ")
    )?;
    Ok(())
}

fn write_chart<W: Write>(out: &mut W, config: &ChartConfig) -> Result<()> {
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    writeln!(out, "{} chart", config.kind)?;
    writeln!(out, "  x:     {}", config.x)?;
    writeln!(out, "  y:     {}", or_dash(&config.y))?;
    writeln!(out, "  color: {}", or_dash(&config.color))?;
    let menus = config.menus();
    writeln!(out, "  x options: {}", menus.x.join(", "))?;
    if !menus.y.is_empty() {
        writeln!(out, "  y options: {}", menus.y.join(", "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_arguments_parse() {
        assert_eq!(
            parse_range("value=3:5").unwrap(),
            RangeArg {
                column: "value".into(),
                min: 3.0,
                max: 5.0
            }
        );
        assert_eq!(parse_range("a=b=-1.5:2").unwrap().column, "a=b");
        assert!(parse_range("value").is_err());
        assert!(parse_range("value=3").is_err());
        assert!(parse_range("value=x:5").is_err());
    }

    #[test]
    fn select_arguments_parse() {
        assert_eq!(
            parse_select("category=A,B").unwrap(),
            SelectArg {
                column: "category".into(),
                values: vec!["A".into(), "B".into()]
            }
        );
        assert!(parse_select("category=").unwrap().values.is_empty());
        assert!(parse_select("category").is_err());
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let args = Args::try_parse_from(["tabex", "--sample", "--delimiter", "§", "overview"])
            .unwrap();
        assert!(args.load_options().is_err());
    }

    #[test]
    fn file_and_sample_are_exclusive() {
        assert!(Args::try_parse_from(["tabex", "overview"]).is_err());
        assert!(
            Args::try_parse_from(["tabex", "--sample", "--file", "a.csv", "overview"]).is_err()
        );
    }
}
