//! Re-exports the shared `BacktestError` type. It's defined in
//! `technical-analysis` (component C1 needs it for bar-ingestion validation)
//! and used here unchanged for condition/parameter-path validation and
//! worker-failure reporting, so every fallible boundary in the crate speaks
//! the same error vocabulary.

pub use technical_analysis::BacktestError;
