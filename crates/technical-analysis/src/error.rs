//! Errors raised by the bar-store / indicator-bank / backtest pipeline.
//!
//! Per-bar numeric computations never fail: they fall back to the documented
//! sentinel values (NaN during warm-up, 50/100/0 on degenerate ratios). This
//! enum only covers the boundaries where failure is meaningful: bar ingestion,
//! malformed condition parameters, and isolated worker failures during a
//! parameter sweep. Shaped after the workspace's `AnalysisError` convention —
//! short variant names, each wrapping the offending detail as a `String`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("unparseable timestamp: {0}")]
    UnparseableTimestamp(String),

    #[error("invalid bar data: {0}")]
    InvalidBarData(String),

    #[error("invalid condition {id}: {reason}")]
    InvalidCondition { id: String, reason: String },

    #[error("invalid parameter path: {0}")]
    InvalidParameterPath(String),

    #[error("worker panicked: {0}")]
    WorkerPanicked(String),
}
