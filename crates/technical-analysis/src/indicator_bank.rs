//! Indicator cache with multi-timeframe alignment (component C2, caching and
//! wiring layer on top of the pure math in `indicators.rs`).

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::bar_store::{BarStore, PRIMARY_TF};
use crate::indicators::*;

/// One cached indicator array plus the timeframe it was computed on.
#[derive(Debug, Clone)]
struct CachedIndicator {
    tf: String,
    values: Vec<f64>,
}

/// Computes and caches per-`(indicator_key, timeframe)` arrays, and projects
/// any higher-timeframe array back onto the primary timeline without
/// lookahead.
pub struct IndicatorBank<'a> {
    store: &'a BarStore,
    cache: RwLock<HashMap<String, CachedIndicator>>,
}

impl<'a> IndicatorBank<'a> {
    pub fn new(store: &'a BarStore) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn full_key(key: &str, tf: &str) -> String {
        format!("{key}_{tf}")
    }

    /// Computes (if absent) and caches the raw array for `key` on `tf`'s own
    /// timeline.
    pub fn ensure(&self, key: &str, tf: &str) {
        let full = Self::full_key(key, tf);
        if self.cache.read().unwrap().contains_key(&full) {
            return;
        }
        let series = self.store.series_for(tf);
        let parts: Vec<&str> = key.split('_').collect();
        let family = parts[0];

        let mut writes: Vec<(String, Vec<f64>)> = Vec::new();

        match family {
            "sma" if parts.len() == 2 => {
                let p: usize = parts[1].parse().unwrap_or(20);
                writes.push((full.clone(), sma(&series.close, p)));
            }
            "ema" if parts.len() == 2 => {
                let p: usize = parts[1].parse().unwrap_or(20);
                writes.push((full.clone(), ema(&series.close, p)));
            }
            "rsi" if parts.len() == 2 => {
                let p: usize = parts[1].parse().unwrap_or(14);
                writes.push((full.clone(), rsi(&series.close, p)));
            }
            "macd" => {
                let (f, s, sig) = parse_macd_periods(&parts);
                let result = macd(&series.close, f, s, sig);
                writes.push((Self::full_key(&format!("macd_{f}_{s}_{sig}"), tf), result.macd_line));
                writes.push((
                    Self::full_key(&format!("macd_signal_{f}_{s}_{sig}"), tf),
                    result.signal_line,
                ));
                writes.push((
                    Self::full_key(&format!("macd_hist_{f}_{s}_{sig}"), tf),
                    result.histogram,
                ));
            }
            "bb" => {
                let p: usize = parts.last().unwrap().parse().unwrap_or(20);
                let bands = bollinger_bands(&series.close, p, 2.0);
                writes.push((Self::full_key(&format!("bb_upper_{p}"), tf), bands.upper));
                writes.push((Self::full_key(&format!("bb_middle_{p}"), tf), bands.middle));
                writes.push((Self::full_key(&format!("bb_lower_{p}"), tf), bands.lower));
            }
            "stoch" if parts.len() == 4 => {
                let kp: usize = parts[2].parse().unwrap_or(14);
                let dp: usize = parts[3].parse().unwrap_or(3);
                let result = stochastic(&series.high, &series.low, &series.close, kp, dp);
                writes.push((Self::full_key(&format!("stoch_k_{kp}_{dp}"), tf), result.k));
                writes.push((Self::full_key(&format!("stoch_d_{kp}_{dp}"), tf), result.d));
            }
            "atr" if parts.len() == 2 => {
                let p: usize = parts[1].parse().unwrap_or(14);
                writes.push((full.clone(), atr(&series.high, &series.low, &series.close, p)));
            }
            "adx" if parts.len() == 2 => {
                let p: usize = parts[1].parse().unwrap_or(14);
                let result = adx(&series.high, &series.low, &series.close, p);
                writes.push((full.clone(), result.adx));
            }
            "cci" if parts.len() == 2 => {
                let p: usize = parts[1].parse().unwrap_or(14);
                writes.push((full.clone(), cci(&series.high, &series.low, &series.close, p)));
            }
            "williams" if parts.len() == 3 => {
                let p: usize = parts[2].parse().unwrap_or(14);
                writes.push((full.clone(), williams_r(&series.high, &series.low, &series.close, p)));
            }
            "vol" if parts.get(1) == Some(&"avg") && parts.len() == 3 => {
                let p: usize = parts[2].parse().unwrap_or(20);
                writes.push((full.clone(), vol_avg(&series.volume, p)));
            }
            "vol" if parts.get(1) == Some(&"avgexcl") && parts.len() == 3 => {
                let p: usize = parts[2].parse().unwrap_or(20);
                writes.push((full.clone(), vol_avg_excl(&series.volume, p)));
            }
            _ => {}
        }

        let mut cache = self.cache.write().unwrap();
        for (k, values) in writes {
            cache.insert(k, CachedIndicator { tf: tf.to_string(), values });
        }
    }

    /// Returns `key` on `tf`, aligned to the primary timeline without
    /// lookahead (§4.2.3). Returns an all-NaN array of primary length if the
    /// indicator was never built.
    pub fn get(&self, key: &str, tf: &str) -> Vec<f64> {
        self.ensure(key, tf);
        let full = Self::full_key(key, tf);
        let cache = self.cache.read().unwrap();
        let Some(entry) = cache.get(&full) else {
            return vec![f64::NAN; self.store.primary().len()];
        };
        if tf == PRIMARY_TF {
            return entry.values.clone();
        }
        self.align_to_primary(&entry.values, tf)
    }

    /// Projects a `tf`-timeline array onto the primary timeline using
    /// closed-bar semantics: primary bar `i` only ever sees the last
    /// higher-timeframe bar that had already closed as of `i`'s own close.
    pub fn align_to_primary(&self, values: &[f64], tf: &str) -> Vec<f64> {
        let primary_close = self.store.close_times_for(PRIMARY_TF);
        let tf_close = self.store.close_times_for(tf);
        let mut out = vec![f64::NAN; primary_close.len()];
        for (i, &t) in primary_close.iter().enumerate() {
            let j = last_strictly_before(&tf_close, t);
            if j >= 0 {
                out[i] = values[j as usize];
            }
        }
        out
    }

    /// Ensures every indicator a strategy's enabled conditions require,
    /// aggregating whichever timeframes are referenced along the way.
    pub fn build_required(&self, required: &HashSet<(String, String)>) {
        for (key, tf) in required {
            if tf != PRIMARY_TF {
                self.store.aggregate(tf.parse().unwrap_or(1));
            }
            self.ensure(key, tf);
        }
    }
}

/// Largest index `j` such that `sorted[j] < value`, or `-1` if none.
///
/// A tf bucket that closes at exactly the same instant as the primary bar
/// being evaluated is treated as not-yet-visible: the primary bar's own
/// close time is only known once the *next* primary bar exists, and at that
/// same instant the tf bucket has only just finished forming, not been
/// confirmed. Using a strict comparison here (rather than `<=`) is what
/// makes a higher-tf bar visible starting one primary bar later than the
/// instant it closes.
fn last_strictly_before(sorted: &[i64], value: i64) -> i64 {
    let idx = sorted.partition_point(|&x| x < value);
    idx as i64 - 1
}

fn parse_macd_periods(parts: &[&str]) -> (usize, usize, usize) {
    if parts.len() >= 4 {
        let n = parts.len();
        let f = parts[n - 3].parse().unwrap_or(12);
        let s = parts[n - 2].parse().unwrap_or(26);
        let sig = parts[n - 1].parse().unwrap_or(9);
        (f, s, sig)
    } else {
        (12, 26, 9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar_store::{BarRow, BarSeries};

    fn minute_rows(closes: &[f64]) -> Vec<BarRow> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| BarRow {
                time: i as i64 * 60,
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn sma_on_primary_round_trips() {
        let series = BarSeries::from_rows(minute_rows(&[1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        let store = BarStore::new(series);
        let bank = IndicatorBank::new(&store);
        let values = bank.get("sma_3", PRIMARY_TF);
        assert!(values[1].is_nan());
        assert!((values[2] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn macd_builds_three_derived_arrays() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64 * 0.1).collect();
        let series = BarSeries::from_rows(minute_rows(&closes)).unwrap();
        let store = BarStore::new(series);
        let bank = IndicatorBank::new(&store);
        let line = bank.get("macd_12_26_9", PRIMARY_TF);
        let signal = bank.get("macd_signal_12_26_9", PRIMARY_TF);
        let hist = bank.get("macd_hist_12_26_9", PRIMARY_TF);
        assert_eq!(line.len(), 40);
        assert_eq!(signal.len(), 40);
        assert_eq!(hist.len(), 40);
        assert!(line[25].is_nan());
        assert!(line[26].is_finite());
    }

    #[test]
    fn mtf_alignment_has_no_lookahead() {
        // 10 one-minute bars, aggregated to 5-minute buckets: [0..5), [5..10).
        // sma_1 on the 5-min series is just that series' own close price.
        let closes = vec![1.0, 2.0, 3.0, 4.0, 100.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let series = BarSeries::from_rows(minute_rows(&closes)).unwrap();
        let store = BarStore::new(series);
        let bank = IndicatorBank::new(&store);
        let sma_5m = bank.get("sma_1", "5");
        // The first 5-min bucket (close price 100.0, from primary bar 4)
        // must not be visible until primary bar 5 — not at bar 4, the same
        // bar whose own close defines the bucket's close.
        assert!(sma_5m[4].is_nan());
        assert!((sma_5m[5] - 100.0).abs() < 1e-9);
    }
}
