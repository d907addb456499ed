//! Request/response value types shared by the condition evaluator, trade
//! simulator, and optimizer (components C3-C5).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Tick size in price units for the reference instrument. Fixed compile-time
/// constant, not configurable per request.
pub const TICK_SIZE: f64 = 0.25;

fn default_true() -> bool {
    true
}

fn default_tf() -> String {
    "DEF".to_string()
}

/// One entry/exit predicate: an id, its parameters, an enabled flag, and the
/// timeframe it's evaluated on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tf")]
    pub timeframe: String,
}

impl Condition {
    pub fn param_f64(&self, name: &str, default: f64) -> f64 {
        self.params.get(name).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn param_usize(&self, name: &str, default: usize) -> usize {
        self.params
            .get(name)
            .and_then(Value::as_f64)
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    pub fn param_bool(&self, name: &str, default: bool) -> bool {
        self.params.get(name).and_then(Value::as_bool).unwrap_or(default)
    }
}

/// Two ordered lists of conditions; a bar's entry (exit) signal is the AND
/// of all enabled entry (exit) conditions at that bar.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Strategy {
    #[serde(default)]
    pub entry_conditions: Vec<Condition>,
    #[serde(default)]
    pub exit_conditions: Vec<Condition>,
}

/// One closed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub entry_idx: usize,
    pub exit_idx: usize,
    pub entry_time: i64,
    pub exit_time: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub profit: f64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "Stop Loss")]
    StopLoss,
    #[serde(rename = "Stop Loss (Gap)")]
    StopLossGap,
    #[serde(rename = "Take Profit")]
    TakeProfit,
    #[serde(rename = "Take Profit (Gap)")]
    TakeProfitGap,
    #[serde(rename = "Signal")]
    Signal,
    #[serde(rename = "Session End")]
    SessionEnd,
}

/// Trade statistics plus the full trade list. An empty trade list yields
/// every numeric field zeroed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_profit: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub trades: Vec<Trade>,
}

impl BacktestResult {
    pub fn empty() -> Self {
        BacktestResult {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_profit: 0.0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            sharpe_ratio: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            trades: Vec::new(),
        }
    }
}

/// One `{min, max, step}` range for a single optimization parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// A fully resolved parameter combination: path -> native value.
pub type ParamCombination = HashMap<String, f64>;

/// One ranked optimization result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub params: ParamCombination,
    pub result: BacktestResult,
}
