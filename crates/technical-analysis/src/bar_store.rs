//! Primary bar series storage and timeframe aggregation (component C1).
//!
//! A `BarSeries` owns six parallel arrays (time, O, H, L, C, V) rather than a
//! `Vec<Bar>` of records, so that indicator math can slice and iterate the
//! numeric columns directly without per-bar field access.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::BacktestError;

/// Sentinel tag for the series as originally ingested.
pub const PRIMARY_TF: &str = "DEF";

/// An immutable, parallel-array OHLCV series for one timeframe.
#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    pub time: Vec<i64>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl BarSeries {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Builds a series from parsed rows, validating the OHLC/volume/time
    /// invariants documented in the data model.
    pub fn from_rows(rows: Vec<BarRow>) -> Result<Self, BacktestError> {
        let mut series = BarSeries {
            time: Vec::with_capacity(rows.len()),
            open: Vec::with_capacity(rows.len()),
            high: Vec::with_capacity(rows.len()),
            low: Vec::with_capacity(rows.len()),
            close: Vec::with_capacity(rows.len()),
            volume: Vec::with_capacity(rows.len()),
        };
        let mut prev_time: Option<i64> = None;
        for row in rows {
            if row.low > row.open || row.low > row.close || row.high < row.open || row.high < row.close {
                return Err(BacktestError::InvalidBarData(format!(
                    "bar at time {} violates low <= open,close <= high",
                    row.time
                )));
            }
            if row.volume < 0.0 {
                return Err(BacktestError::InvalidBarData(format!(
                    "bar at time {} has negative volume",
                    row.time
                )));
            }
            if let Some(prev) = prev_time {
                if row.time < prev {
                    return Err(BacktestError::InvalidBarData(format!(
                        "non-monotonic time: {} follows {}",
                        row.time, prev
                    )));
                }
            }
            prev_time = Some(row.time);
            series.time.push(row.time);
            series.open.push(row.open);
            series.high.push(row.high);
            series.low.push(row.low);
            series.close.push(row.close);
            series.volume.push(row.volume);
        }
        Ok(series)
    }

    /// Bucket each bar into a fixed-width wall-clock window of `minutes`
    /// anchored at start-of-day, emitting one aggregated bar per non-empty
    /// bucket. `minutes == 1` returns the series unchanged.
    pub fn aggregate(&self, minutes: i64) -> BarSeries {
        if minutes <= 1 || self.is_empty() {
            return self.clone();
        }
        let window = minutes * 60;
        let mut out = BarSeries::default();
        let mut bucket_key: Option<i64> = None;

        for i in 0..self.len() {
            let t = self.time[i];
            let day_start = t - t.rem_euclid(86_400);
            let bucket = day_start + ((t - day_start) / window) * window;

            if bucket_key != Some(bucket) {
                out.time.push(bucket);
                out.open.push(self.open[i]);
                out.high.push(self.high[i]);
                out.low.push(self.low[i]);
                out.close.push(self.close[i]);
                out.volume.push(self.volume[i]);
                bucket_key = Some(bucket);
            } else {
                let last = out.len() - 1;
                out.high[last] = out.high[last].max(self.high[i]);
                out.low[last] = out.low[last].min(self.low[i]);
                out.close[last] = self.close[i];
                out.volume[last] += self.volume[i];
            }
        }
        out
    }

    /// Close-time vector: the start time of the next bar, or `time[last] +
    /// step` for the final bar, where `step` is the inferred nominal period.
    pub fn close_times(&self) -> Vec<i64> {
        if self.is_empty() {
            return Vec::new();
        }
        let step = infer_step_seconds(&self.time, 60);
        let mut out = vec![0i64; self.len()];
        for i in 0..self.len() - 1 {
            out[i] = self.time[i + 1];
        }
        out[self.len() - 1] = self.time[self.len() - 1] + step;
        out
    }
}

/// One parsed input row prior to validation.
#[derive(Debug, Clone, Copy)]
pub struct BarRow {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Infers the nominal bar step in seconds as the median of positive
/// consecutive diffs; falls back to `default_step` when fewer than two bars
/// are present or all diffs are non-positive.
pub fn infer_step_seconds(times: &[i64], default_step: i64) -> i64 {
    if times.len() < 2 {
        return default_step;
    }
    let mut diffs: Vec<i64> = times.windows(2).map(|w| w[1] - w[0]).filter(|d| *d > 0).collect();
    if diffs.is_empty() {
        return default_step;
    }
    diffs.sort_unstable();
    let mid = diffs.len() / 2;
    let step = if diffs.len() % 2 == 0 {
        (diffs[mid - 1] + diffs[mid]) / 2
    } else {
        diffs[mid]
    };
    if step > 0 {
        step
    } else {
        default_step
    }
}

/// Owns the primary series and memoizes aggregated views keyed by timeframe
/// tag ("DEF" for the primary, or the string form of the minute count).
pub struct BarStore {
    primary: BarSeries,
    aggregated: RwLock<HashMap<String, BarSeries>>,
    close_times: RwLock<HashMap<String, Vec<i64>>>,
}

impl BarStore {
    pub fn new(primary: BarSeries) -> Self {
        Self {
            primary,
            aggregated: RwLock::new(HashMap::new()),
            close_times: RwLock::new(HashMap::new()),
        }
    }

    pub fn primary(&self) -> &BarSeries {
        &self.primary
    }

    /// Returns the `minutes`-aggregated series, building and caching it on
    /// first access. `minutes == 1` returns the primary series.
    pub fn aggregate(&self, minutes: i64) -> BarSeries {
        if minutes <= 1 {
            return self.primary.clone();
        }
        let tag = minutes.to_string();
        if let Some(cached) = self.aggregated.read().unwrap().get(&tag) {
            return cached.clone();
        }
        let series = self.primary.aggregate(minutes);
        self.aggregated.write().unwrap().insert(tag, series.clone());
        series
    }

    /// Returns the given timeframe's series: `"DEF"` for primary, otherwise
    /// a parsed minute count passed to `aggregate`.
    pub fn series_for(&self, tf: &str) -> BarSeries {
        if tf == PRIMARY_TF {
            self.primary.clone()
        } else {
            let minutes: i64 = tf.parse().unwrap_or(1);
            self.aggregate(minutes)
        }
    }

    /// Returns (and caches) the close-time vector for a timeframe tag.
    pub fn close_times_for(&self, tf: &str) -> Vec<i64> {
        if let Some(cached) = self.close_times.read().unwrap().get(tf) {
            return cached.clone();
        }
        let series = self.series_for(tf);
        let times = series.close_times();
        self.close_times.write().unwrap().insert(tf.to_string(), times.clone());
        times
    }
}
