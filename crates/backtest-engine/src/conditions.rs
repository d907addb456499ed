//! Condition evaluator (component C3).
//!
//! Each `Condition` (an id plus a loosely typed params map) is resolved once
//! into a `ConditionKind` — a tagged enum carrying its own numeric
//! parameters — then evaluated to a boolean vector over the primary
//! timeline. Resolving up front means the hot evaluation path never touches
//! `serde_json::Value` again, and an unknown id resolves to `Unknown`, which
//! evaluates to all-`false` rather than failing the run.

use std::collections::HashMap;

use chrono::{DateTime, Timelike, Utc};
use technical_analysis::{BarStore, IndicatorBank, PRIMARY_TF};

use crate::models::{Condition, TICK_SIZE};

/// FOMC announcement dates (UTC `YYYY-MM-DD`) during which `fomc_hours`
/// restricts trading to outside the announcement-hour window.
const FOMC_DATES: &[&str] = &[
    "2018-01-31", "2018-03-21", "2018-05-02", "2018-06-13", "2018-08-01", "2018-09-26", "2018-11-08", "2018-12-19",
    "2019-01-30", "2019-03-20", "2019-05-01", "2019-06-19", "2019-07-31", "2019-09-18", "2019-10-30", "2019-12-11",
    "2020-01-29", "2020-03-18", "2020-04-29", "2020-06-10", "2020-07-29", "2020-09-16", "2020-11-05", "2020-12-16",
    "2021-01-27", "2021-03-17", "2021-04-28", "2021-06-16", "2021-07-28", "2021-09-22", "2021-11-03", "2021-12-15",
    "2022-01-26", "2022-03-16", "2022-05-04", "2022-06-15", "2022-07-27", "2022-09-21", "2022-11-02", "2022-12-14",
    "2023-02-01", "2023-03-22", "2023-05-03", "2023-06-14", "2023-07-26", "2023-09-20", "2023-11-01", "2023-12-13",
    "2024-01-31", "2024-03-20", "2024-05-01", "2024-06-12", "2024-07-31", "2024-09-18", "2024-11-07", "2024-12-18",
    "2025-01-29", "2025-03-19", "2025-04-30", "2025-06-18", "2025-07-30", "2025-09-17", "2025-11-06", "2025-12-17",
];

/// A condition resolved to its typed variant with concrete numeric
/// parameters (defaults already applied).
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
    RsiBelow { period: usize, threshold: f64 },
    RsiAbove { period: usize, threshold: f64 },
    RsiCrossesAbove { period: usize, threshold: f64 },
    RsiCrossesBelow { period: usize, threshold: f64 },
    RsiInRange { period: usize, min: f64, max: f64 },
    RsiExitBelow { period: usize, level: f64 },
    MacdCrossAbove { fast: usize, slow: usize, signal: usize },
    MacdCrossBelow { fast: usize, slow: usize, signal: usize },
    PriceAboveSma { period: usize },
    PriceBelowSma { period: usize },
    PriceAboveEma { period: usize },
    PriceBelowEma { period: usize },
    PriceBelowEmaMultiple { period: usize, required_bars: usize },
    PriceBelowSmaMultiple { period: usize, required_bars: usize },
    SmaShortAboveLongLookback { short_period: usize, long_period: usize, lookback: usize },
    PriceBelowBbLower { period: usize },
    PriceAboveBbUpper { period: usize },
    CandleBodyMinTicks { min_ticks: f64 },
    BarRangeTicksRange { min_ticks: f64, max_ticks: f64 },
    BarRangeTicks { min_ticks: f64, max_ticks: f64 },
    MinRedCandles { min_count: usize, lookback: usize },
    MinGreenCandles { min_count: usize, lookback: usize },
    GreenRedReversalExit { min_green_ticks: f64, red_larger_percent: f64 },
    BigReverseCandleExit { min_ticks: f64 },
    GreenCandle,
    StochBelow { k_period: usize, d_period: usize, threshold: f64 },
    StochAbove { k_period: usize, d_period: usize, threshold: f64 },
    StochCrossAbove { k_period: usize, d_period: usize },
    StochCrossBelow { k_period: usize, d_period: usize },
    AdxRange { period: usize, min: f64, max: f64 },
    AdxExitRange { period: usize, min: f64, max: f64 },
    AtrInRange { period: usize, min: f64, max: f64 },
    AtrExitRange { period: usize, min: f64, max: f64 },
    MarketChangePercentRange { min_percent: f64, max_percent: f64 },
    Time { target: i64 },
    TimeRange { start: i64, end: i64 },
    MinutesBeforeSessionClose,
    VolumeAboveAvg { period: usize },
    VolumeSpike { period: usize, multiplier: f64 },
    VolumeProfileRatio { lookback: usize, min_ratio: f64 },
    VolumeSpikeExit { lookback: usize, multiplier: f64, min_body_ticks: f64 },
    FomcHours { start_time: i64, end_time: i64 },
    QuickProfitWithReversal,
    /// An id with no known handler. Evaluates to all-`false`; contributes
    /// nothing under AND-combination.
    Unknown,
}

impl ConditionKind {
    /// Resolves an id (and its aliases) plus loosely typed params into a
    /// concrete variant, applying the documented default for every
    /// parameter the caller omitted.
    pub fn resolve(condition: &Condition) -> Self {
        use ConditionKind::*;
        match condition.id.as_str() {
            "rsi_below" => RsiBelow {
                period: condition.param_usize("period", 14),
                threshold: condition.param_f64("threshold", 30.0),
            },
            "rsi_above" => RsiAbove {
                period: condition.param_usize("period", 14),
                threshold: condition.param_f64("threshold", 70.0),
            },
            "rsi_crosses_above" | "rsi_cross_above" => RsiCrossesAbove {
                period: condition.param_usize("period", 14),
                threshold: condition.param_f64("threshold", condition.param_f64("value", 30.0)),
            },
            "rsi_crosses_below" | "rsi_cross_below" => RsiCrossesBelow {
                period: condition.param_usize("period", 14),
                threshold: condition.param_f64("threshold", condition.param_f64("value", 70.0)),
            },
            "rsi_in_range" => RsiInRange {
                period: condition.param_usize("period", 14),
                min: condition.param_f64("min", 1.0),
                max: condition.param_f64("max", 84.0),
            },
            "rsi_exit_below" => RsiExitBelow {
                period: condition.param_usize("period", 14),
                level: condition.param_f64("level", 18.0),
            },
            "macd_cross_above" | "macd_cross_above_signal" => MacdCrossAbove {
                fast: condition.param_usize("fast", 12),
                slow: condition.param_usize("slow", 26),
                signal: condition.param_usize("signal", 9),
            },
            "macd_cross_below" | "macd_cross_below_signal" => MacdCrossBelow {
                fast: condition.param_usize("fast", 12),
                slow: condition.param_usize("slow", 26),
                signal: condition.param_usize("signal", 9),
            },
            "price_above_sma" => PriceAboveSma { period: condition.param_usize("period", 20) },
            "price_below_sma" => PriceBelowSma { period: condition.param_usize("period", 20) },
            "price_above_ema" => PriceAboveEma { period: condition.param_usize("period", 20) },
            "price_below_ema" => PriceBelowEma { period: condition.param_usize("period", 20) },
            "price_below_ema_multiple" => PriceBelowEmaMultiple {
                period: condition.param_usize("period", 10),
                required_bars: condition.param_usize("requiredBars", 15),
            },
            "price_below_sma_multiple" => PriceBelowSmaMultiple {
                period: condition.param_usize("period", 9),
                required_bars: condition.param_usize("requiredBars", 14),
            },
            "sma_short_above_long_lookback" => SmaShortAboveLongLookback {
                short_period: condition.param_usize("shortPeriod", 49),
                long_period: condition.param_usize("longPeriod", 98),
                lookback: condition.param_usize("lookback", 190),
            },
            "price_below_bb_lower" => PriceBelowBbLower { period: condition.param_usize("period", 20) },
            "price_above_bb_upper" => PriceAboveBbUpper { period: condition.param_usize("period", 20) },
            "candle_body_min_ticks" => CandleBodyMinTicks { min_ticks: condition.param_f64("minTicks", 34.0) },
            "bar_range_ticks_range" => BarRangeTicksRange {
                min_ticks: condition.param_f64("minTicks", 12.0),
                max_ticks: condition.param_f64("maxTicks", 300.0),
            },
            "bar_range_ticks" => BarRangeTicks {
                min_ticks: condition.param_f64("minTicks", 12.0),
                max_ticks: condition.param_f64("maxTicks", 300.0),
            },
            "min_red_candles" => MinRedCandles {
                min_count: condition.param_usize("minCount", 1),
                lookback: condition.param_usize("lookback", 10),
            },
            "min_green_candles" => MinGreenCandles {
                min_count: condition.param_usize("minCount", 6),
                lookback: condition.param_usize("lookback", 17),
            },
            "green_red_reversal_exit" => GreenRedReversalExit {
                min_green_ticks: condition.param_f64("minGreenTicks", 30.0),
                red_larger_percent: condition.param_f64("redLargerPercent", 550.0),
            },
            "big_reverse_candle_exit" => BigReverseCandleExit { min_ticks: condition.param_f64("minTicks", 90.0) },
            "green_candle" => GreenCandle,
            "stoch_below" => StochBelow {
                k_period: condition.param_usize("k_period", 14),
                d_period: condition.param_usize("d_period", 3),
                threshold: condition.param_f64("threshold", 20.0),
            },
            "stoch_above" => StochAbove {
                k_period: condition.param_usize("k_period", 14),
                d_period: condition.param_usize("d_period", 3),
                threshold: condition.param_f64("threshold", 80.0),
            },
            "stoch_cross_above" => StochCrossAbove {
                k_period: condition.param_usize("kPeriod", 14),
                d_period: condition.param_usize("dPeriod", 3),
            },
            "stoch_cross_below" => StochCrossBelow {
                k_period: condition.param_usize("kPeriod", 14),
                d_period: condition.param_usize("dPeriod", 3),
            },
            "adx_range" | "adx_in_range" => AdxRange {
                period: condition.param_usize("period", 14),
                min: condition.param_f64("min", 16.0),
                max: condition.param_f64("max", 56.0),
            },
            "adx_exit_range" => AdxExitRange {
                period: condition.param_usize("period", 6),
                min: condition.param_f64("min", 12.0),
                max: condition.param_f64("max", 93.0),
            },
            "atr_in_range" => AtrInRange {
                period: condition.param_usize("period", 30),
                min: condition.param_f64("min", 12.0),
                max: condition.param_f64("max", 55.0),
            },
            "atr_exit_range" => AtrExitRange {
                period: condition.param_usize("period", 8),
                min: condition.param_f64("min", 14.0),
                max: condition.param_f64("max", 86.0),
            },
            "market_change_percent_range" | "daily_change_percent" => MarketChangePercentRange {
                min_percent: condition.param_f64("minPercent", -2.1),
                max_percent: condition.param_f64("maxPercent", 10.0),
            },
            "time" => Time { target: condition.param_usize("time", 930) as i64 },
            "time_range" => TimeRange {
                start: condition.param_usize("startTime", condition.param_usize("start", 830)) as i64,
                end: condition.param_usize("endTime", condition.param_usize("end", 1457)) as i64,
            },
            "minutes_before_session_close" => MinutesBeforeSessionClose,
            "volume_above_avg" => VolumeAboveAvg { period: condition.param_usize("period", 20) },
            "volume_spike" => VolumeSpike {
                period: condition.param_usize("period", 16),
                multiplier: condition.param_f64("multiplier", 1.6),
            },
            "volume_profile_ratio" => VolumeProfileRatio {
                lookback: condition.param_usize("lookback", 25),
                min_ratio: condition.param_f64("minRatio", 0.7),
            },
            "volume_spike_exit" => VolumeSpikeExit {
                lookback: condition.param_usize("lookback", 1),
                multiplier: condition.param_f64("multiplier", 1.4),
                min_body_ticks: condition.param_f64("minBodyTicks", 200.0),
            },
            "fomc_hours" => FomcHours {
                start_time: condition.param_usize("startTime", 845) as i64,
                end_time: condition.param_usize("endTime", 1335) as i64,
            },
            "quick_profit_with_reversal" => QuickProfitWithReversal,
            _ => Unknown,
        }
    }

    /// The `(indicator_key, timeframe)` pairs this condition needs built in
    /// the indicator bank before `evaluate` is called, if any.
    pub fn required_indicators(&self, tf: &str) -> Vec<(String, String)> {
        use ConditionKind::*;
        let tf = tf.to_string();
        match self {
            RsiBelow { period, .. }
            | RsiAbove { period, .. }
            | RsiCrossesAbove { period, .. }
            | RsiCrossesBelow { period, .. }
            | RsiInRange { period, .. }
            | RsiExitBelow { period, .. } => vec![(format!("rsi_{period}"), tf)],
            MacdCrossAbove { fast, slow, signal } | MacdCrossBelow { fast, slow, signal } => vec![
                (format!("macd_{fast}_{slow}_{signal}"), tf.clone()),
                (format!("macd_signal_{fast}_{slow}_{signal}"), tf),
            ],
            PriceAboveSma { period } | PriceBelowSma { period } | PriceBelowSmaMultiple { period, .. } => {
                vec![(format!("sma_{period}"), tf)]
            }
            PriceAboveEma { period } | PriceBelowEma { period } | PriceBelowEmaMultiple { period, .. } => {
                vec![(format!("ema_{period}"), tf)]
            }
            SmaShortAboveLongLookback { short_period, long_period, .. } => {
                vec![(format!("sma_{short_period}"), tf.clone()), (format!("sma_{long_period}"), tf)]
            }
            PriceBelowBbLower { period } => vec![(format!("bb_lower_{period}"), tf)],
            PriceAboveBbUpper { period } => vec![(format!("bb_upper_{period}"), tf)],
            StochBelow { k_period, d_period, .. } | StochAbove { k_period, d_period, .. } => {
                vec![(format!("stoch_k_{k_period}_{d_period}"), tf)]
            }
            StochCrossAbove { k_period, d_period } | StochCrossBelow { k_period, d_period } => vec![
                (format!("stoch_k_{k_period}_{d_period}"), tf.clone()),
                (format!("stoch_d_{k_period}_{d_period}"), tf),
            ],
            AdxRange { period, .. } | AdxExitRange { period, .. } => vec![(format!("adx_{period}"), tf)],
            AtrInRange { period, .. } | AtrExitRange { period, .. } => vec![(format!("atr_{period}"), tf)],
            VolumeAboveAvg { period } | VolumeSpike { period, .. } => vec![(format!("vol_avg_{period}"), tf)],
            VolumeProfileRatio { lookback, .. } | VolumeSpikeExit { lookback, .. } => {
                vec![(format!("vol_avg_{lookback}"), tf)]
            }
            _ => Vec::new(),
        }
    }

    /// Evaluates this condition over the full primary timeline.
    pub fn evaluate(&self, store: &BarStore, bank: &IndicatorBank, tf: &str, length: usize) -> Vec<bool> {
        use ConditionKind::*;
        match self {
            RsiBelow { period, threshold } => lt_scalar(&bank.get(&format!("rsi_{period}"), tf), *threshold),
            RsiAbove { period, threshold } => gt_scalar(&bank.get(&format!("rsi_{period}"), tf), *threshold),
            RsiCrossesAbove { period, threshold } => {
                crosses_above_scalar(&bank.get(&format!("rsi_{period}"), tf), *threshold)
            }
            RsiCrossesBelow { period, threshold } => {
                crosses_below_scalar(&bank.get(&format!("rsi_{period}"), tf), *threshold)
            }
            RsiInRange { period, min, max } => in_range(&bank.get(&format!("rsi_{period}"), tf), *min, *max),
            RsiExitBelow { period, level } => lt_scalar(&bank.get(&format!("rsi_{period}"), tf), *level),
            MacdCrossAbove { fast, slow, signal } => {
                let macd = bank.get(&format!("macd_{fast}_{slow}_{signal}"), tf);
                let sig = bank.get(&format!("macd_signal_{fast}_{slow}_{signal}"), tf);
                crosses_above(&macd, &sig)
            }
            MacdCrossBelow { fast, slow, signal } => {
                let macd = bank.get(&format!("macd_{fast}_{slow}_{signal}"), tf);
                let sig = bank.get(&format!("macd_signal_{fast}_{slow}_{signal}"), tf);
                crosses_below(&macd, &sig)
            }
            PriceAboveSma { period } => gt_series(&store.primary().close, &bank.get(&format!("sma_{period}"), tf)),
            PriceBelowSma { period } => lt_series(&store.primary().close, &bank.get(&format!("sma_{period}"), tf)),
            PriceAboveEma { period } => gt_series(&store.primary().close, &bank.get(&format!("ema_{period}"), tf)),
            PriceBelowEma { period } => lt_series(&store.primary().close, &bank.get(&format!("ema_{period}"), tf)),
            PriceBelowEmaMultiple { period, required_bars } => below_for_n_bars(
                &store.primary().close,
                &bank.get(&format!("ema_{period}"), tf),
                *required_bars,
                length,
            ),
            PriceBelowSmaMultiple { period, required_bars } => below_for_n_bars(
                &store.primary().close,
                &bank.get(&format!("sma_{period}"), tf),
                *required_bars,
                length,
            ),
            SmaShortAboveLongLookback { short_period, long_period, lookback } => above_within_lookback(
                &bank.get(&format!("sma_{short_period}"), tf),
                &bank.get(&format!("sma_{long_period}"), tf),
                *lookback,
                length,
            ),
            PriceBelowBbLower { period } => {
                lt_series(&store.primary().close, &bank.get(&format!("bb_lower_{period}"), tf))
            }
            PriceAboveBbUpper { period } => {
                gt_series(&store.primary().close, &bank.get(&format!("bb_upper_{period}"), tf))
            }
            CandleBodyMinTicks { min_ticks } => candle_body_min_ticks(store, tf, *min_ticks, length),
            BarRangeTicksRange { min_ticks, max_ticks } => bar_range_ticks(store, tf, *min_ticks, *max_ticks, length),
            BarRangeTicks { min_ticks, max_ticks } => bar_range_ticks(store, PRIMARY_TF, *min_ticks, *max_ticks, length),
            MinRedCandles { min_count, lookback } => candle_count(store, tf, *min_count, *lookback, length, false),
            MinGreenCandles { min_count, lookback } => candle_count(store, tf, *min_count, *lookback, length, true),
            GreenRedReversalExit { min_green_ticks, red_larger_percent } => {
                green_red_reversal_exit(store.primary(), *min_green_ticks, *red_larger_percent, length)
            }
            BigReverseCandleExit { min_ticks } => big_reverse_candle_exit(store.primary(), *min_ticks, length),
            GreenCandle => green_candle(store, tf, length),
            StochBelow { k_period, d_period, threshold } => {
                lt_scalar(&bank.get(&format!("stoch_k_{k_period}_{d_period}"), tf), *threshold)
            }
            StochAbove { k_period, d_period, threshold } => {
                gt_scalar(&bank.get(&format!("stoch_k_{k_period}_{d_period}"), tf), *threshold)
            }
            StochCrossAbove { k_period, d_period } => crosses_above(
                &bank.get(&format!("stoch_k_{k_period}_{d_period}"), tf),
                &bank.get(&format!("stoch_d_{k_period}_{d_period}"), tf),
            ),
            StochCrossBelow { k_period, d_period } => crosses_below(
                &bank.get(&format!("stoch_k_{k_period}_{d_period}"), tf),
                &bank.get(&format!("stoch_d_{k_period}_{d_period}"), tf),
            ),
            AdxRange { period, min, max } => in_range(&bank.get(&format!("adx_{period}"), tf), *min, *max),
            AdxExitRange { period, min, max } => out_of_range(&bank.get(&format!("adx_{period}"), tf), *min, *max),
            AtrInRange { period, min, max } => in_range(&bank.get(&format!("atr_{period}"), tf), *min, *max),
            AtrExitRange { period, min, max } => out_of_range(&bank.get(&format!("atr_{period}"), tf), *min, *max),
            MarketChangePercentRange { min_percent, max_percent } => {
                market_change_percent_range(store.primary(), *min_percent, *max_percent)
            }
            Time { target } => time_equals(store.primary(), *target),
            TimeRange { start, end } => time_range(store.primary(), *start, *end),
            MinutesBeforeSessionClose => vec![true; length],
            VolumeAboveAvg { period } => gt_series(&store.primary().volume, &bank.get(&format!("vol_avg_{period}"), tf)),
            VolumeSpike { period, multiplier } => volume_spike(store.primary(), &bank.get(&format!("vol_avg_{period}"), tf), *multiplier),
            VolumeProfileRatio { lookback, min_ratio } => volume_profile_ratio(store, tf, *lookback, *min_ratio, length),
            VolumeSpikeExit { lookback, multiplier, min_body_ticks } => {
                volume_spike_exit(store.primary(), *lookback, *multiplier, *min_body_ticks, length)
            }
            FomcHours { start_time, end_time } => fomc_hours(store.primary(), *start_time, *end_time),
            QuickProfitWithReversal => vec![false; length],
            Unknown => vec![false; length],
        }
    }
}

/// Resolves and evaluates every enabled condition in a list, AND-combining
/// the results. An empty list evaluates to all-`false` (no conditions means
/// the signal never fires); a non-empty list with every condition disabled
/// evaluates to all-`true` (disabled conditions are the identity under AND).
pub fn evaluate_all(conditions: &[Condition], store: &BarStore, bank: &IndicatorBank, length: usize) -> Vec<bool> {
    if conditions.is_empty() {
        return vec![false; length];
    }
    let mut combined = vec![true; length];
    for condition in conditions.iter().filter(|c| c.enabled) {
        let kind = ConditionKind::resolve(condition);
        let result = kind.evaluate(store, bank, &condition.timeframe, length);
        for i in 0..length {
            combined[i] &= result.get(i).copied().unwrap_or(false);
        }
    }
    combined
}

/// Every `(indicator_key, timeframe)` pair required by a list of conditions,
/// used to pre-warm the indicator bank once per backtest rather than
/// discovering needs one condition at a time.
pub fn required_indicators(conditions: &[Condition]) -> std::collections::HashSet<(String, String)> {
    let mut set = std::collections::HashSet::new();
    for condition in conditions.iter().filter(|c| c.enabled) {
        let kind = ConditionKind::resolve(condition);
        set.extend(kind.required_indicators(&condition.timeframe));
    }
    set
}

fn lt_scalar(values: &[f64], threshold: f64) -> Vec<bool> {
    values.iter().map(|&v| v < threshold).collect()
}

fn gt_scalar(values: &[f64], threshold: f64) -> Vec<bool> {
    values.iter().map(|&v| v > threshold).collect()
}

fn in_range(values: &[f64], min: f64, max: f64) -> Vec<bool> {
    values.iter().map(|&v| v >= min && v <= max).collect()
}

fn out_of_range(values: &[f64], min: f64, max: f64) -> Vec<bool> {
    values.iter().map(|&v| v < min || v > max).collect()
}

fn gt_series(a: &[f64], b: &[f64]) -> Vec<bool> {
    a.iter().zip(b.iter()).map(|(&x, &y)| x > y).collect()
}

fn lt_series(a: &[f64], b: &[f64]) -> Vec<bool> {
    a.iter().zip(b.iter()).map(|(&x, &y)| x < y).collect()
}

/// `result[i]` is true the first time `a` crosses above `b` at `i` (`a[i-1]
/// <= b[i-1]` and `a[i] > b[i]`). `NaN` comparisons are false, matching the
/// teacher's warm-up semantics: a cross can never fire while either series is
/// still warming up.
fn crosses_above(a: &[f64], b: &[f64]) -> Vec<bool> {
    let n = a.len();
    let mut out = vec![false; n];
    for i in 1..n {
        out[i] = a[i - 1] <= b[i - 1] && a[i] > b[i];
    }
    out
}

fn crosses_below(a: &[f64], b: &[f64]) -> Vec<bool> {
    let n = a.len();
    let mut out = vec![false; n];
    for i in 1..n {
        out[i] = a[i - 1] >= b[i - 1] && a[i] < b[i];
    }
    out
}

fn crosses_above_scalar(values: &[f64], threshold: f64) -> Vec<bool> {
    let n = values.len();
    let mut out = vec![false; n];
    for i in 1..n {
        out[i] = values[i - 1] < threshold && values[i] >= threshold;
    }
    out
}

fn crosses_below_scalar(values: &[f64], threshold: f64) -> Vec<bool> {
    let n = values.len();
    let mut out = vec![false; n];
    for i in 1..n {
        out[i] = values[i - 1] > threshold && values[i] <= threshold;
    }
    out
}

/// True at `i` iff `close[i-j] < line[i-j]` for every `j` in `0..required_bars`.
fn below_for_n_bars(close: &[f64], line: &[f64], required_bars: usize, length: usize) -> Vec<bool> {
    let mut out = vec![false; length];
    if length < required_bars || required_bars == 0 {
        return out;
    }
    for i in (required_bars - 1)..length {
        out[i] = (0..required_bars).all(|j| close[i - j] < line[i - j]);
    }
    out
}

/// True at `i` iff `short[i-j] >= long[i-j]` for at least one `j` in
/// `0..lookback`.
fn above_within_lookback(short: &[f64], long: &[f64], lookback: usize, length: usize) -> Vec<bool> {
    let mut out = vec![false; length];
    if length < lookback || lookback == 0 {
        return out;
    }
    for i in (lookback - 1)..length {
        out[i] = (0..lookback).any(|j| short[i - j] >= long[i - j]);
    }
    out
}

fn candle_body_min_ticks(store: &BarStore, tf: &str, min_ticks: f64, length: usize) -> Vec<bool> {
    if tf == PRIMARY_TF {
        let series = store.primary();
        (0..series.len()).map(|i| (series.close[i] - series.open[i]).abs() / TICK_SIZE >= min_ticks).collect()
    } else {
        let tf_series = store.series_for(tf);
        let tf_result: Vec<bool> =
            (0..tf_series.len()).map(|i| (tf_series.close[i] - tf_series.open[i]).abs() / TICK_SIZE >= min_ticks).collect();
        align_bool_to_primary(store, &tf_result, tf, length)
    }
}

fn bar_range_ticks(store: &BarStore, tf: &str, min_ticks: f64, max_ticks: f64, length: usize) -> Vec<bool> {
    if tf == PRIMARY_TF {
        let series = store.primary();
        (0..series.len())
            .map(|i| {
                let range = (series.high[i] - series.low[i]) / TICK_SIZE;
                range >= min_ticks && range <= max_ticks
            })
            .collect()
    } else {
        let tf_series = store.series_for(tf);
        let tf_result: Vec<bool> = (0..tf_series.len())
            .map(|i| {
                let range = (tf_series.high[i] - tf_series.low[i]) / TICK_SIZE;
                range >= min_ticks && range <= max_ticks
            })
            .collect();
        align_bool_to_primary(store, &tf_result, tf, length)
    }
}

fn candle_count(store: &BarStore, tf: &str, min_count: usize, lookback: usize, length: usize, green: bool) -> Vec<bool> {
    let series = store.series_for(tf);
    let tf_len = series.len();
    if tf_len < lookback || lookback == 0 {
        return vec![false; length];
    }
    let mut tf_result = vec![false; tf_len];
    for i in (lookback - 1)..tf_len {
        let count = ((i + 1 - lookback)..=i)
            .filter(|&j| if green { series.close[j] > series.open[j] } else { series.close[j] < series.open[j] })
            .count();
        tf_result[i] = count >= min_count;
    }
    if tf == PRIMARY_TF {
        tf_result
    } else {
        align_bool_to_primary(store, &tf_result, tf, length)
    }
}

fn green_red_reversal_exit(series: &technical_analysis::BarSeries, min_green_ticks: f64, red_larger_percent: f64, length: usize) -> Vec<bool> {
    let mut out = vec![false; length];
    for i in 1..length {
        let prev_green = series.close[i - 1] > series.open[i - 1];
        let curr_red = series.close[i] < series.open[i];
        if !prev_green || !curr_red {
            continue;
        }
        let green_ticks = (series.close[i - 1] - series.open[i - 1]) / TICK_SIZE;
        if green_ticks < min_green_ticks {
            continue;
        }
        let red_ticks = (series.open[i] - series.close[i]) / TICK_SIZE;
        let red_percent = (red_ticks / green_ticks) * 100.0;
        out[i] = red_percent >= red_larger_percent;
    }
    out
}

fn big_reverse_candle_exit(series: &technical_analysis::BarSeries, min_ticks: f64, length: usize) -> Vec<bool> {
    let mut out = vec![false; length];
    for i in 1..length {
        if series.close[i] < series.open[i] {
            let body_ticks = (series.open[i] - series.close[i]) / TICK_SIZE;
            out[i] = body_ticks >= min_ticks;
        }
    }
    out
}

fn green_candle(store: &BarStore, tf: &str, length: usize) -> Vec<bool> {
    let series = store.series_for(tf);
    let tf_result: Vec<bool> = (0..series.len()).map(|i| series.close[i] > series.open[i]).collect();
    if tf == PRIMARY_TF {
        tf_result
    } else {
        align_bool_to_primary(store, &tf_result, tf, length)
    }
}

/// Projects a boolean array computed on `tf`'s own timeline back onto the
/// primary timeline with the same no-lookahead rule as
/// `IndicatorBank::align_to_primary`: a `tf` bucket is visible starting one
/// primary bar after it closes, never at the bar whose close defines it.
fn align_bool_to_primary(store: &BarStore, tf_result: &[bool], tf: &str, length: usize) -> Vec<bool> {
    let primary_close = store.close_times_for(PRIMARY_TF);
    let tf_close = store.close_times_for(tf);
    let mut out = vec![false; length];
    for (i, &t) in primary_close.iter().enumerate().take(length) {
        let idx = tf_close.partition_point(|&x| x < t);
        if idx > 0 {
            out[i] = tf_result[idx - 1];
        }
    }
    out
}

/// The prior calendar day's last close, mapped onto every bar of the
/// following day; `None` for bars on the first day present (no prior day to
/// compare against).
fn prior_day_close(series: &technical_analysis::BarSeries) -> Vec<Option<f64>> {
    let n = series.len();
    let dates: Vec<i64> = series.time.iter().map(|&t| t.div_euclid(86_400)).collect();
    let mut last_close_by_date: HashMap<i64, f64> = HashMap::new();
    for i in 0..n {
        last_close_by_date.insert(dates[i], series.close[i]);
    }
    let mut uniq: Vec<i64> = last_close_by_date.keys().copied().collect();
    uniq.sort_unstable();
    let mut prior_for_date: HashMap<i64, f64> = HashMap::new();
    for w in uniq.windows(2) {
        prior_for_date.insert(w[1], last_close_by_date[&w[0]]);
    }
    dates.iter().map(|d| prior_for_date.get(d).copied()).collect()
}

fn market_change_percent_range(series: &technical_analysis::BarSeries, min_percent: f64, max_percent: f64) -> Vec<bool> {
    let prior = prior_day_close(series);
    (0..series.len())
        .map(|i| match prior[i] {
            None => true,
            Some(p) if p == 0.0 => true,
            Some(p) => {
                let pct = (series.close[i] - p) / p * 100.0;
                pct >= min_percent && pct <= max_percent
            }
        })
        .collect()
}

fn hhmm_at(series: &technical_analysis::BarSeries, i: usize) -> i64 {
    let dt = DateTime::<Utc>::from_timestamp(series.time[i], 0).unwrap_or_default();
    dt.hour() as i64 * 100 + dt.minute() as i64
}

fn time_equals(series: &technical_analysis::BarSeries, target: i64) -> Vec<bool> {
    (0..series.len()).map(|i| hhmm_at(series, i) == target).collect()
}

fn time_range(series: &technical_analysis::BarSeries, start: i64, end: i64) -> Vec<bool> {
    (0..series.len()).map(|i| { let hhmm = hhmm_at(series, i); hhmm >= start && hhmm <= end }).collect()
}

fn volume_spike(series: &technical_analysis::BarSeries, vol_avg: &[f64], multiplier: f64) -> Vec<bool> {
    (0..series.len())
        .map(|i| !vol_avg[i].is_nan() && series.volume[i] >= vol_avg[i] * multiplier)
        .collect()
}

fn volume_profile_ratio(store: &BarStore, tf: &str, lookback: usize, min_ratio: f64, length: usize) -> Vec<bool> {
    let series = store.series_for(tf);
    let tf_len = series.len();
    if tf_len < lookback {
        return vec![false; length];
    }
    let mut tf_result = vec![false; tf_len];
    for i in lookback..tf_len {
        let avg_vol: f64 = series.volume[(i - lookback)..i].iter().sum::<f64>() / lookback as f64;
        if avg_vol > 0.0 {
            tf_result[i] = series.volume[i] / avg_vol >= min_ratio;
        }
    }
    if tf == PRIMARY_TF {
        tf_result
    } else {
        align_bool_to_primary(store, &tf_result, tf, length)
    }
}

fn volume_spike_exit(series: &technical_analysis::BarSeries, lookback: usize, multiplier: f64, min_body_ticks: f64, length: usize) -> Vec<bool> {
    let mut out = vec![false; length];
    if length < lookback + 1 || lookback == 0 {
        return out;
    }
    for i in lookback..length {
        let avg_vol: f64 = series.volume[(i - lookback)..i].iter().sum::<f64>() / lookback as f64;
        if avg_vol > 0.0 && series.volume[i] >= avg_vol * multiplier {
            let body_ticks = (series.close[i] - series.open[i]).abs() / TICK_SIZE;
            let red_candle = series.close[i] < series.open[i];
            out[i] = body_ticks >= min_body_ticks && red_candle;
        }
    }
    out
}

fn fomc_hours(series: &technical_analysis::BarSeries, start_time: i64, end_time: i64) -> Vec<bool> {
    let dates: std::collections::HashSet<&str> = FOMC_DATES.iter().copied().collect();
    (0..series.len())
        .map(|i| {
            let dt = DateTime::<Utc>::from_timestamp(series.time[i], 0).unwrap_or_default();
            let date_str = dt.format("%Y-%m-%d").to_string();
            if !dates.contains(date_str.as_str()) {
                return true;
            }
            let hhmm = dt.hour() as i64 * 100 + dt.minute() as i64;
            !(start_time <= hhmm && hhmm <= end_time)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use technical_analysis::{BarRow, BarSeries};

    fn minute_series(rows: &[(f64, f64, f64, f64, f64)]) -> BarStore {
        let bar_rows: Vec<BarRow> = rows
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close, volume))| BarRow { time: i as i64 * 60, open, high, low, close, volume })
            .collect();
        BarStore::new(BarSeries::from_rows(bar_rows).unwrap())
    }

    fn condition(id: &str, params: &[(&str, f64)]) -> Condition {
        Condition {
            id: id.to_string(),
            params: params.iter().map(|&(k, v)| (k.to_string(), serde_json::json!(v))).collect(),
            enabled: true,
            timeframe: "DEF".to_string(),
        }
    }

    #[test]
    fn rsi_below_resolves_default_threshold() {
        let c = condition("rsi_below", &[]);
        assert_eq!(ConditionKind::resolve(&c), ConditionKind::RsiBelow { period: 14, threshold: 30.0 });
    }

    #[test]
    fn unknown_id_evaluates_all_false() {
        let store = minute_series(&[(1.0, 1.1, 0.9, 1.0, 10.0); 5]);
        let bank = IndicatorBank::new(&store);
        let kind = ConditionKind::resolve(&condition("not_a_real_condition", &[]));
        assert!(kind.evaluate(&store, &bank, "DEF", 5).iter().all(|&v| !v));
    }

    #[test]
    fn green_candle_matches_close_above_open() {
        let store = minute_series(&[(1.0, 1.2, 0.9, 1.1, 10.0), (1.1, 1.1, 0.8, 0.9, 10.0)]);
        let bank = IndicatorBank::new(&store);
        let result = ConditionKind::GreenCandle.evaluate(&store, &bank, "DEF", 2);
        assert_eq!(result, vec![true, false]);
    }

    #[test]
    fn candle_body_min_ticks_uses_tick_size() {
        // body = 0.5 price units = 2 ticks at TICK_SIZE=0.25
        let store = minute_series(&[(1.0, 1.6, 0.9, 1.5, 10.0)]);
        let bank = IndicatorBank::new(&store);
        let kind = ConditionKind::CandleBodyMinTicks { min_ticks: 2.0 };
        assert_eq!(kind.evaluate(&store, &bank, "DEF", 1), vec![true]);
        let kind = ConditionKind::CandleBodyMinTicks { min_ticks: 3.0 };
        assert_eq!(kind.evaluate(&store, &bank, "DEF", 1), vec![false]);
    }

    #[test]
    fn evaluate_all_ands_enabled_conditions_and_ignores_disabled() {
        let store = minute_series(&[(1.0, 1.2, 0.9, 1.1, 10.0), (1.1, 1.1, 0.8, 0.9, 10.0)]);
        let bank = IndicatorBank::new(&store);
        let mut disabled = condition("green_candle", &[]);
        disabled.enabled = false;
        let conditions = vec![condition("green_candle", &[]), disabled];
        let result = evaluate_all(&conditions, &store, &bank, 2);
        assert_eq!(result, vec![true, false]);
    }

    #[test]
    fn market_change_percent_range_is_permissive_on_first_day() {
        let store = minute_series(&[(1.0, 1.1, 0.9, 1.0, 10.0); 3]);
        let bank = IndicatorBank::new(&store);
        let kind = ConditionKind::MarketChangePercentRange { min_percent: -1.0, max_percent: 1.0 };
        assert!(kind.evaluate(&store, &bank, "DEF", 3).iter().all(|&v| v));
    }
}
