//! Parameter sweep coordinator (component C5).
//!
//! Enumerates a Cartesian product of parameter overrides, runs a backtest per
//! combination on a `rayon` worker pool sharing one read-only `IndicatorBank`,
//! and returns results ranked by total profit. Mirrors the grid-search shape
//! of the teacher's walk-forward optimizer, minus the walk-forward folding —
//! here the grid is evaluated once over the whole series.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use rayon::prelude::*;
use technical_analysis::{BarStore, IndicatorBank};

use crate::conditions::{evaluate_all, required_indicators};
use crate::config::OptimizationRunConfig;
use crate::engine::simulate;
use crate::models::{BacktestResult, OptimizationResult, ParamCombination, ParamRange, Strategy};

/// A parsed parameter path: which condition list, which index, which option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamTarget {
    Entry(usize),
    Exit(usize),
}

/// Parses `entry_<i>_<name>` / `exit_<i>_<name>`. Returns `None` (skip
/// silently) for anything else, per §4.5.
fn parse_param_path(path: &str) -> Option<(ParamTarget, String)> {
    let rest = if let Some(r) = path.strip_prefix("entry_") {
        (ParamTarget::Entry(0), r)
    } else if let Some(r) = path.strip_prefix("exit_") {
        (ParamTarget::Exit(0), r)
    } else {
        return None;
    };
    let (kind, rest) = rest;
    let mut parts = rest.splitn(2, '_');
    let idx_str = parts.next()?;
    let name = parts.next()?;
    let idx: usize = idx_str.parse().ok()?;
    let target = match kind {
        ParamTarget::Entry(_) => ParamTarget::Entry(idx),
        ParamTarget::Exit(_) => ParamTarget::Exit(idx),
    };
    Some((target, name.to_string()))
}

/// Materializes `min, min+step, ..., <= max` inclusive (the final value is
/// kept if it lands on or before `max` within floating-point tolerance).
fn enumerate_range(range: &ParamRange) -> Vec<f64> {
    if range.step <= 0.0 || range.min > range.max {
        return vec![range.min];
    }
    let mut values = Vec::new();
    let mut v = range.min;
    let mut guard = 0usize;
    while v <= range.max + 1e-9 && guard < 100_000 {
        values.push(v);
        v += range.step;
        guard += 1;
    }
    if values.is_empty() {
        values.push(range.min);
    }
    values
}

/// Cartesian product over an ordered `(path, values)` list, in declaration
/// order, producing one `ParamCombination` per point.
fn cartesian_product(axes: &[(String, Vec<f64>)]) -> Vec<ParamCombination> {
    let mut combos: Vec<ParamCombination> = vec![HashMap::new()];
    for (path, values) in axes {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for &v in values {
                let mut c = combo.clone();
                c.insert(path.clone(), v);
                next.push(c);
            }
        }
        combos = next;
    }
    combos
}

/// Applies a parsed parameter combination onto a clone of the base strategy.
fn apply_params(base: &Strategy, params: &ParamCombination) -> Strategy {
    let mut strategy = base.clone();
    for (path, value) in params {
        let Some((target, name)) = parse_param_path(path) else { continue };
        let condition = match target {
            ParamTarget::Entry(i) => strategy.entry_conditions.get_mut(i),
            ParamTarget::Exit(i) => strategy.exit_conditions.get_mut(i),
        };
        if let Some(condition) = condition {
            condition.params.insert(name, serde_json::json!(value));
        }
    }
    strategy
}

/// Extracts `sl_ticks`/`tp_ticks` from the exit condition list: the
/// `stop_loss_ticks`/`take_profit_ticks` ids are consumed here rather than
/// evaluated as vector conditions (§6).
fn extract_sl_tp(exit_conditions: &[crate::models::Condition]) -> (Option<f64>, Option<f64>) {
    let mut sl = None;
    let mut tp = None;
    for c in exit_conditions.iter().filter(|c| c.enabled) {
        match c.id.as_str() {
            "stop_loss_ticks" => sl = Some(c.param_f64("ticks", 20.0)),
            "take_profit_ticks" => tp = Some(c.param_f64("ticks", 40.0)),
            _ => {}
        }
    }
    (sl, tp)
}

/// Runs one backtest: resolve required indicators, evaluate entry/exit
/// vectors, simulate, summarize.
pub fn run_backtest(store: &BarStore, bank: &IndicatorBank, strategy: &Strategy, tick_size: f64) -> BacktestResult {
    let needed = required_indicators(&strategy.entry_conditions)
        .into_iter()
        .chain(required_indicators(&strategy.exit_conditions))
        .collect();
    bank.build_required(&needed);

    let n = store.primary().len();
    let entry_signals = evaluate_all(&strategy.entry_conditions, store, bank, n);
    let exit_signals = evaluate_all(&strategy.exit_conditions, store, bank, n);
    let (sl_ticks, tp_ticks) = extract_sl_tp(&strategy.exit_conditions);

    simulate(store.primary(), &entry_signals, &exit_signals, sl_ticks, tp_ticks, tick_size)
}

/// Sweeps a Cartesian grid of parameter overrides against one bar store and
/// prebuilt indicator bank, ranking by descending `total_profit`. Returns
/// every combination's result (the external API is responsible for
/// truncating to the top 50 per §4.5).
pub fn optimize(
    store: &BarStore,
    bank: &IndicatorBank,
    base_strategy: &Strategy,
    ranges: &HashMap<String, ParamRange>,
    tick_size: f64,
    config: OptimizationRunConfig,
) -> Vec<OptimizationResult> {
    let mut axes: Vec<(String, Vec<f64>)> =
        ranges.iter().map(|(path, range)| (path.clone(), enumerate_range(range))).collect();
    axes.sort_by(|a, b| a.0.cmp(&b.0));
    let combos = cartesian_product(&axes);
    let total = combos.len();

    let sweep_span = tracing::info_span!("optimization_sweep", grid_size = total, worker_count = config.worker_count);
    let _enter = sweep_span.enter();
    tracing::info!(total, worker_count = config.worker_count, "starting optimization sweep");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count)
        .build()
        .expect("failed to build sweep thread pool");

    let completed = std::sync::atomic::AtomicUsize::new(0);
    let started = Instant::now();

    let mut results: Vec<OptimizationResult> = pool.install(|| {
        combos
            .par_iter()
            .map(|params| {
                let strategy = apply_params(base_strategy, params);
                let result = match panic::catch_unwind(AssertUnwindSafe(|| run_backtest(store, bank, &strategy, tick_size))) {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!("sweep worker panicked on a combination; recording zero result");
                        BacktestResult::empty()
                    }
                };

                let done = completed.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
                if done % config.progress_every == 0 || done == total {
                    let elapsed = started.elapsed().as_secs_f64();
                    let rate = if elapsed > 0.0 { done as f64 / elapsed } else { 0.0 };
                    let remaining = total.saturating_sub(done);
                    let eta_secs = if rate > 0.0 { remaining as f64 / rate } else { 0.0 };
                    tracing::info!(done, total, elapsed_secs = elapsed, rate, eta_secs, "optimization sweep progress");
                }

                OptimizationResult { params: params.clone(), result }
            })
            .collect()
    });

    results.sort_by(|a, b| b.result.total_profit.partial_cmp(&a.result.total_profit).unwrap_or(std::cmp::Ordering::Equal));
    results
}

/// Truncates a ranked sweep result to the external API's top-N contract.
pub fn top_n(mut results: Vec<OptimizationResult>, n: usize) -> Vec<OptimizationResult> {
    results.truncate(n);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Condition;
    use technical_analysis::{BarRow, BarSeries};

    fn store_with_trend(n: usize) -> BarStore {
        let rows: Vec<BarRow> = (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5;
                BarRow {
                    time: (i as i64) * 60,
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base + 0.2,
                    volume: 100.0,
                }
            })
            .collect();
        BarStore::new(BarSeries::from_rows(rows).unwrap())
    }

    #[test]
    fn parses_entry_and_exit_paths() {
        assert_eq!(parse_param_path("entry_0_threshold"), Some((ParamTarget::Entry(0), "threshold".to_string())));
        assert_eq!(parse_param_path("exit_2_ticks"), Some((ParamTarget::Exit(2), "ticks".to_string())));
        assert_eq!(parse_param_path("garbage"), None);
        assert_eq!(parse_param_path("entry_notanumber_x"), None);
    }

    #[test]
    fn enumerate_range_includes_inclusive_endpoint() {
        let values = enumerate_range(&ParamRange { min: 10.0, max: 30.0, step: 10.0 });
        assert_eq!(values, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn cartesian_product_size_matches_axis_product() {
        let axes = vec![
            ("a".to_string(), vec![1.0, 2.0]),
            ("b".to_string(), vec![10.0, 20.0, 30.0]),
        ];
        let combos = cartesian_product(&axes);
        assert_eq!(combos.len(), 6);
    }

    #[test]
    fn s6_determinism_across_worker_counts() {
        let store = store_with_trend(60);
        let bank = IndicatorBank::new(&store);
        let strategy = Strategy {
            entry_conditions: vec![Condition {
                id: "price_above_sma".to_string(),
                params: HashMap::from([("period".to_string(), serde_json::json!(5))]),
                enabled: true,
                timeframe: "DEF".to_string(),
            }],
            exit_conditions: vec![Condition {
                id: "stop_loss_ticks".to_string(),
                params: HashMap::from([("ticks".to_string(), serde_json::json!(20.0))]),
                enabled: true,
                timeframe: "DEF".to_string(),
            }],
        };
        let mut ranges = HashMap::new();
        ranges.insert("entry_0_period".to_string(), ParamRange { min: 3.0, max: 9.0, step: 3.0 });
        ranges.insert("exit_0_ticks".to_string(), ParamRange { min: 10.0, max: 30.0, step: 10.0 });

        let cfg1 = OptimizationRunConfig { worker_count: 1, progress_every: 100 };
        let cfg6 = OptimizationRunConfig { worker_count: 6, progress_every: 100 };

        let r1 = optimize(&store, &bank, &strategy, &ranges, 0.25, cfg1);
        let r6 = optimize(&store, &bank, &strategy, &ranges, 0.25, cfg6);

        assert_eq!(r1.len(), 9);
        assert_eq!(r1.len(), r6.len());
        for (a, b) in r1.iter().zip(r6.iter()) {
            assert_eq!(a.params, b.params);
            assert_eq!(a.result.total_profit, b.result.total_profit);
            assert_eq!(a.result.total_trades, b.result.total_trades);
        }
    }

    #[test]
    fn sl_tp_extraction_reads_ticks_param() {
        let conditions = vec![
            Condition {
                id: "stop_loss_ticks".to_string(),
                params: HashMap::from([("ticks".to_string(), serde_json::json!(12.0))]),
                enabled: true,
                timeframe: "DEF".to_string(),
            },
            Condition {
                id: "take_profit_ticks".to_string(),
                params: HashMap::from([("ticks".to_string(), serde_json::json!(24.0))]),
                enabled: true,
                timeframe: "DEF".to_string(),
            },
        ];
        let (sl, tp) = extract_sl_tp(&conditions);
        assert_eq!(sl, Some(12.0));
        assert_eq!(tp, Some(24.0));
    }

    #[test]
    fn top_n_truncates() {
        let results = vec![
            OptimizationResult { params: HashMap::new(), result: BacktestResult::empty() },
            OptimizationResult { params: HashMap::new(), result: BacktestResult::empty() },
        ];
        assert_eq!(top_n(results, 1).len(), 1);
    }
}
