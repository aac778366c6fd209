/// Data layer: core types, loading, filtering and statistics.
///
/// Architecture:
/// ```text
///  .csv / .xlsx / .json / .parquet
///        │
///        ▼
///   ┌──────────┐     ┌───────┐
///   │  loader  │ ◄── │ cache │  content digest → parsed Dataset
///   └──────────┘     └───────┘
///        │
///        ▼
///   ┌──────────┐
///   │ Dataset  │  named typed columns, immutable
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter  │  classify → FilterSpec per column → apply → FilteredView
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ summary  │  describe(), missing values, column types
///   └──────────┘
/// ```

pub mod cache;
pub mod filter;
pub mod loader;
pub mod model;
pub mod sample;
pub mod summary;
