pub mod config;
pub mod conditions;
pub mod engine;
pub mod error;
pub mod models;
pub mod optimizer;

pub use config::{BacktestRunConfig, OptimizationRunConfig};
pub use conditions::{evaluate_all, required_indicators, ConditionKind};
pub use engine::{simulate, summarize};
pub use error::BacktestError;
pub use models::*;
pub use optimizer::{optimize, run_backtest, top_n};
