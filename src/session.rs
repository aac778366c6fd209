use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::chart::{ChartConfig, ChartError, ChartKind};
use crate::data::cache::{CacheKey, DatasetCache};
use crate::data::filter::{
    apply, build_filter_specs, partition_columns, ColumnKind, ColumnPartition, FilterSpec,
    FilteredView,
};
use crate::data::loader::{LoadError, LoadOptions};
use crate::data::model::{Dataset, Value};
use crate::data::sample::sample_dataset;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to load file: {0}")]
    Load(#[from] LoadError),

    #[error("No dataset loaded")]
    NoDataset,

    #[error("No filter for column '{0}'")]
    UnknownFilter(String),

    #[error("Column '{column}' has a {actual:?} filter, not a {expected:?} one")]
    WrongFilterKind {
        column: String,
        expected: ColumnKind,
        actual: ColumnKind,
    },
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// One user's state, independent of rendering. Sessions share nothing.
///
/// Filter specs are rebuilt only when the dataset changes; the view and the
/// column partition are rebuilt after every selection change.
#[derive(Debug, Default)]
pub struct Session {
    /// Loaded dataset (None until a file or the sample is loaded).
    dataset: Option<Arc<Dataset>>,

    /// Per-column filter specs, in column order.
    specs: Vec<FilterSpec>,

    /// Rows passing the current specs.
    view: FilteredView,

    /// Numeric / categorical split of `view`.
    partition: ColumnPartition,

    /// Last error shown to the user.
    status_message: Option<String>,

    /// Parsed uploads, keyed by content digest.
    cache: DatasetCache,

    /// Cache entry of the current upload.
    upload_key: Option<CacheKey>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a dataset: default filter specs, full view, fresh partition.
    pub fn set_dataset(&mut self, dataset: impl Into<Arc<Dataset>>) {
        let dataset = dataset.into();
        self.specs = build_filter_specs(&dataset);
        self.dataset = Some(dataset);
        self.status_message = None;
        self.refilter();
    }

    /// Load a file from disk. On failure the session is left as it was.
    pub fn load_file(&mut self, path: &Path, options: &LoadOptions) -> Result<(), SessionError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.load_failed(LoadError::Io(e))),
        };
        self.upload(&path.to_string_lossy(), &bytes, options)
    }

    /// Load uploaded bytes; `name` selects the decoder.
    ///
    /// A different upload evicts the previous one from the cache. On failure
    /// the session is left as it was and `status_message` is set.
    pub fn upload(
        &mut self,
        name: &str,
        bytes: &[u8],
        options: &LoadOptions,
    ) -> Result<(), SessionError> {
        let (key, dataset) = match self.cache.get_or_load(name, bytes, options) {
            Ok(loaded) => loaded,
            Err(e) => return Err(self.load_failed(e)),
        };

        if let Some(previous) = self.upload_key.take() {
            if previous != key {
                self.cache.invalidate(&previous);
            }
        }
        self.upload_key = Some(key);

        log::info!(
            "Loaded '{name}': {} rows with columns {:?}",
            dataset.len(),
            dataset.column_names()
        );
        self.set_dataset(dataset);
        Ok(())
    }

    fn load_failed(&mut self, e: LoadError) -> SessionError {
        log::error!("Failed to load file: {e}");
        let err = SessionError::Load(e);
        self.status_message = Some(err.to_string());
        err
    }

    /// Replace the dataset with the built-in sample.
    pub fn use_sample(&mut self) {
        self.set_dataset(sample_dataset());
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_deref()
    }

    pub fn specs(&self) -> &[FilterSpec] {
        &self.specs
    }

    pub fn view(&self) -> &FilteredView {
        &self.view
    }

    pub fn partition(&self) -> &ColumnPartition {
        &self.partition
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Recompute the view and the partition from the current specs.
    pub fn refilter(&mut self) {
        if let Some(ds) = &self.dataset {
            self.view = apply(ds, &self.specs);
            self.partition = partition_columns(&self.view);
        }
    }

    fn spec_mut(&mut self, column: &str) -> Result<&mut FilterSpec, SessionError> {
        if self.dataset.is_none() {
            return Err(SessionError::NoDataset);
        }
        self.specs
            .iter_mut()
            .find(|s| s.column() == column)
            .ok_or_else(|| SessionError::UnknownFilter(column.to_string()))
    }

    /// Narrow a numeric column's range.
    pub fn set_range(&mut self, column: &str, min: f64, max: f64) -> Result<(), SessionError> {
        let spec = self.spec_mut(column)?;
        if !spec.set_range(min, max) {
            return Err(wrong_kind(spec, ColumnKind::Numeric));
        }
        self.refilter();
        Ok(())
    }

    /// Replace a categorical column's selection.
    pub fn set_selected(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<(), SessionError> {
        let spec = self.spec_mut(column)?;
        if !spec.set_selected(values) {
            return Err(wrong_kind(spec, ColumnKind::Categorical));
        }
        self.refilter();
        Ok(())
    }

    /// Select every value (or the full range) of a column.
    pub fn select_all(&mut self, column: &str) -> Result<(), SessionError> {
        self.spec_mut(column)?.select_all();
        self.refilter();
        Ok(())
    }

    /// Deselect every value of a categorical column.
    pub fn select_none(&mut self, column: &str) -> Result<(), SessionError> {
        let spec = self.spec_mut(column)?;
        if !spec.select_none() {
            return Err(wrong_kind(spec, ColumnKind::Categorical));
        }
        self.refilter();
        Ok(())
    }

    /// Restore every spec to its default selection.
    pub fn reset_filters(&mut self) {
        self.specs.iter_mut().for_each(FilterSpec::select_all);
        self.refilter();
    }

    /// Default chart configuration for the current view.
    pub fn chart(&self, kind: ChartKind) -> Result<ChartConfig, ChartError> {
        ChartConfig::default_for(kind, &self.partition, &self.view.column_names())
    }
}

fn wrong_kind(spec: &FilterSpec, expected: ColumnKind) -> SessionError {
    SessionError::WrongFilterKind {
        column: spec.column().to_string(),
        expected,
        actual: spec.kind(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn sample_session_starts_unfiltered() {
        let mut session = Session::new();
        session.use_sample();
        assert_eq!(session.view().len(), 10);
        assert_eq!(session.specs().len(), 2);
        assert_eq!(session.partition().numeric_columns, vec!["value"]);
        assert_eq!(session.partition().categorical_columns, vec!["category"]);
    }

    #[test]
    fn selections_rebuild_the_view() {
        let mut session = Session::new();
        session.use_sample();
        session.set_selected("category", vec![Value::from("A")]).unwrap();
        assert_eq!(session.view().len(), 5);
        // A rows hold 5, 3, 2, 4, 1.
        session.set_range("value", 3.0, 5.0).unwrap();
        assert_eq!(session.view().len(), 3);
        session.select_none("category").unwrap();
        assert!(session.view().is_empty());
        session.reset_filters();
        assert_eq!(session.view().len(), 10);
    }

    #[test]
    fn range_beyond_the_data_empties_the_view() {
        let mut session = Session::new();
        session.use_sample();
        session.set_range("value", 11.0, 20.0).unwrap();
        assert!(session.view().is_empty());
        session.select_all("value").unwrap();
        assert_eq!(session.view().len(), 10);
    }

    #[test]
    fn duplicate_headers_are_addressable_by_their_new_names() {
        let mut session = Session::new();
        session
            .upload("d.csv", b"x,x\n1,100\n2,200\n", &LoadOptions::default())
            .unwrap();
        assert_eq!(session.view().len(), 2);
        assert_eq!(session.partition().numeric_columns, vec!["x", "x.1"]);

        session.set_range("x.1", 150.0, 250.0).unwrap();
        assert_eq!(session.view().len(), 1);
        assert_eq!(session.view().row(0), vec![&Value::Integer(2), &Value::Integer(200)]);
    }

    #[test]
    fn wrong_or_unknown_columns_are_errors() {
        let mut session = Session::new();
        assert!(matches!(
            session.set_range("value", 0.0, 1.0),
            Err(SessionError::NoDataset)
        ));
        session.use_sample();
        assert!(matches!(
            session.set_range("category", 0.0, 1.0),
            Err(SessionError::WrongFilterKind { .. })
        ));
        assert!(matches!(
            session.select_none("value"),
            Err(SessionError::WrongFilterKind { .. })
        ));
        assert!(matches!(
            session.select_all("date"),
            Err(SessionError::UnknownFilter(c)) if c == "date"
        ));
    }

    #[test]
    fn failed_upload_keeps_previous_state() {
        let mut session = Session::new();
        session.use_sample();
        session.set_selected("category", vec![Value::from("B")]).unwrap();

        let err = session
            .upload("broken.csv", b"a\n1,2,3\n", &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, SessionError::Load(_)));
        assert!(session.status_message().unwrap().starts_with("Failed to load file"));
        assert_eq!(session.view().len(), 5);
        assert_eq!(session.dataset().unwrap().len(), 10);
    }

    #[test]
    fn new_upload_evicts_previous_cache_entry() {
        let mut session = Session::new();
        let options = LoadOptions::default();
        session.upload("a.csv", b"x\n1\n", &options).unwrap();
        session.upload("a.csv", b"x\n1\n", &options).unwrap();
        assert_eq!(session.cache.len(), 1);
        session.upload("b.csv", b"y\n2\n", &options).unwrap();
        assert_eq!(session.cache.len(), 1);
        assert_eq!(session.dataset().unwrap().column_names(), vec!["y"]);
    }

    #[test]
    fn load_file_reads_from_disk() {
        let mut tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(tmp, "category,value\nA,1\nB,2\n").unwrap();
        let mut session = Session::new();
        session.load_file(tmp.path(), &LoadOptions::default()).unwrap();
        assert_eq!(session.view().len(), 2);
        assert!(session.status_message().is_none());
    }

    #[test]
    fn chart_defaults_follow_the_view() {
        let mut session = Session::new();
        session.use_sample();
        let cfg = session.chart(ChartKind::Line).unwrap();
        assert_eq!(cfg.x, "date");
        assert_eq!(cfg.y.as_deref(), Some("value"));
    }
}
