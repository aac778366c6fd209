//! Load a table, derive typed filters for its columns, and inspect the
//! filtered view: summaries, CSV exports and chart axis choices.
//!
//! ```no_run
//! use tabular_explorer::data::model::Value;
//! use tabular_explorer::session::Session;
//!
//! let mut session = Session::new();
//! session.use_sample();
//! session.set_selected("category", vec![Value::from("A")])?;
//! session.set_range("value", 3.0, 5.0)?;
//! assert_eq!(session.view().len(), 3);
//! # Ok::<(), tabular_explorer::session::SessionError>(())
//! ```

pub mod chart;
pub mod cli;
pub mod data;
pub mod export;
pub mod session;
