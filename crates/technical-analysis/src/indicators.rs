//! Vectorized technical indicators (component C2, numeric core).
//!
//! Every function returns an array the same length as its input, `NaN`-padded
//! over the warm-up region. Internal helpers lean on `f64::NAN` propagating
//! through ordinary arithmetic (a window sum touching a `NaN` stays `NaN`) so
//! downstream indicators built from an earlier indicator's output (e.g. %D
//! from %K, ADX from the directional-movement SMAs) inherit the correct
//! warm-up length for free.

/// Replaces a non-finite value with `default`; used at the handful of spots
/// where the formula has a documented sentinel instead of propagating NaN.
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

fn nan_vec(len: usize) -> Vec<f64> {
    vec![f64::NAN; len]
}

/// Simple moving average. `result[i] = mean(v[i-p+1..=i])` for `i >= p-1`.
pub fn sma(v: &[f64], p: usize) -> Vec<f64> {
    let n = v.len();
    let mut out = nan_vec(n);
    if p == 0 || n < p {
        return out;
    }
    for i in (p - 1)..n {
        let window = &v[i + 1 - p..=i];
        out[i] = window.iter().sum::<f64>() / p as f64;
    }
    out
}

/// Exponential moving average. Seeded with the simple mean of the first `p`
/// values, then smoothed with `alpha = 2/(p+1)`.
pub fn ema(v: &[f64], p: usize) -> Vec<f64> {
    let n = v.len();
    let mut out = nan_vec(n);
    if p == 0 || n < p {
        return out;
    }
    let alpha = 2.0 / (p as f64 + 1.0);
    let seed = v[0..p].iter().sum::<f64>() / p as f64;
    out[p - 1] = seed;
    for i in p..n {
        out[i] = out[i - 1] + alpha * (v[i] - out[i - 1]);
    }
    out
}

/// Wilder-smoothed RSI.
pub fn rsi(v: &[f64], p: usize) -> Vec<f64> {
    let n = v.len();
    let mut out = nan_vec(n);
    if p == 0 || n <= p {
        return out;
    }
    let delta: Vec<f64> = (1..n).map(|i| v[i] - v[i - 1]).collect();
    // delta[k] corresponds to v[k+1]-v[k]; delta[0..p] holds deltas 1..=p.
    let mut avg_gain = delta[0..p].iter().map(|d| d.max(0.0)).sum::<f64>() / p as f64;
    let mut avg_loss = delta[0..p].iter().map(|d| (-d).max(0.0)).sum::<f64>() / p as f64;
    out[p] = rsi_from_averages(avg_gain, avg_loss);

    for i in (p + 1)..n {
        let d = delta[i - 1];
        let gain = d.max(0.0);
        let loss = (-d).max(0.0);
        avg_gain = (avg_gain * (p as f64 - 1.0) + gain) / p as f64;
        avg_loss = (avg_loss * (p as f64 - 1.0) + loss) / p as f64;
        out[i] = rsi_from_averages(avg_gain, avg_loss);
    }
    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

#[derive(Debug, Clone)]
pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD. The signal line is the EMA of the MACD line's *fully-defined tail*
/// only (starting at the slow EMA's warm-up index), then right-aligned with
/// a NaN head — not an EMA of the whole (partially-NaN) MACD line.
pub fn macd(v: &[f64], fast: usize, slow: usize, signal: usize) -> MacdResult {
    let n = v.len();
    let fast_ema = ema(v, fast);
    let slow_ema = ema(v, slow);
    let macd_line: Vec<f64> = (0..n).map(|i| fast_ema[i] - slow_ema[i]).collect();

    let tail_start = slow.saturating_sub(1);
    let mut signal_line = nan_vec(n);
    let mut histogram = nan_vec(n);

    if tail_start < n {
        let tail = &macd_line[tail_start..];
        let tail_signal = ema(tail, signal);
        for (offset, value) in tail_signal.into_iter().enumerate() {
            let idx = tail_start + offset;
            signal_line[idx] = value;
            if value.is_finite() {
                histogram[idx] = macd_line[idx] - value;
            }
        }
    }

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger Bands with population standard deviation over the SMA window.
pub fn bollinger_bands(v: &[f64], p: usize, k: f64) -> BollingerBands {
    let n = v.len();
    let middle = sma(v, p);
    let mut upper = nan_vec(n);
    let mut lower = nan_vec(n);
    if p == 0 || n < p {
        return BollingerBands { upper, middle, lower };
    }
    for i in (p - 1)..n {
        let window = &v[i + 1 - p..=i];
        let mean = middle[i];
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / p as f64;
        let std = variance.sqrt();
        upper[i] = mean + k * std;
        lower[i] = mean - k * std;
    }
    BollingerBands { upper, middle, lower }
}

#[derive(Debug, Clone)]
pub struct StochasticResult {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

/// Stochastic oscillator. `%K` falls back to 50 on zero range; `%D` is a
/// plain SMA of `%K` (its NaN warm-up follows from `%K`'s automatically).
pub fn stochastic(high: &[f64], low: &[f64], close: &[f64], k_period: usize, d_period: usize) -> StochasticResult {
    let n = close.len();
    let mut k = nan_vec(n);
    if k_period > 0 && n >= k_period {
        for i in (k_period - 1)..n {
            let hh = high[i + 1 - k_period..=i].iter().cloned().fold(f64::MIN, f64::max);
            let ll = low[i + 1 - k_period..=i].iter().cloned().fold(f64::MAX, f64::min);
            let range = hh - ll;
            k[i] = if range == 0.0 {
                50.0
            } else {
                100.0 * (close[i] - ll) / range
            };
        }
    }
    let d = sma(&k, d_period);
    StochasticResult { k, d }
}

/// Wilder-smoothed Average True Range.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], p: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = nan_vec(n);
    if p == 0 || n <= p {
        return out;
    }
    let tr: Vec<f64> = (0..n)
        .map(|i| {
            if i == 0 {
                f64::NAN
            } else {
                (high[i] - low[i])
                    .max((high[i] - close[i - 1]).abs())
                    .max((low[i] - close[i - 1]).abs())
            }
        })
        .collect();

    let mut seed = 0.0;
    for v in &tr[1..=p] {
        seed += v;
    }
    let mut value = seed / p as f64;
    out[p] = value;
    for i in (p + 1)..n {
        value = (value * (p as f64 - 1.0) + tr[i]) / p as f64;
        out[i] = value;
    }
    out
}

#[derive(Debug, Clone)]
pub struct AdxResult {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

/// ADX/+DI/-DI via directional movement smoothed with a plain SMA, divided
/// by the Wilder-smoothed ATR, per the reference platform's formula.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], p: usize) -> AdxResult {
    let n = close.len();
    let mut plus_dm = nan_vec(n);
    let mut minus_dm = nan_vec(n);
    for i in 1..n {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];
        plus_dm[i] = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
        minus_dm[i] = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };
    }

    let atr_vals = atr(high, low, close, p);
    let plus_dm_sma = sma(&plus_dm, p);
    let minus_dm_sma = sma(&minus_dm, p);

    let plus_di: Vec<f64> = (0..n).map(|i| 100.0 * plus_dm_sma[i] / atr_vals[i]).collect();
    let minus_di: Vec<f64> = (0..n).map(|i| 100.0 * minus_dm_sma[i] / atr_vals[i]).collect();

    let dx: Vec<f64> = (0..n)
        .map(|i| {
            let sum = plus_di[i] + minus_di[i];
            if sum == 0.0 {
                if plus_di[i].is_nan() {
                    f64::NAN
                } else {
                    0.0
                }
            } else {
                100.0 * (plus_di[i] - minus_di[i]).abs() / sum
            }
        })
        .collect();

    let adx_vals = sma(&dx, p);
    AdxResult {
        adx: adx_vals,
        plus_di,
        minus_di,
    }
}

/// Commodity Channel Index.
pub fn cci(high: &[f64], low: &[f64], close: &[f64], p: usize) -> Vec<f64> {
    let n = close.len();
    let tp: Vec<f64> = (0..n).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();
    let tp_sma = sma(&tp, p);
    let mut out = nan_vec(n);
    if p == 0 || n < p {
        return out;
    }
    for i in (p - 1)..n {
        let window = &tp[i + 1 - p..=i];
        let mean_dev = window.iter().map(|x| (x - tp_sma[i]).abs()).sum::<f64>() / p as f64;
        out[i] = if mean_dev == 0.0 {
            0.0
        } else {
            (tp[i] - tp_sma[i]) / (0.015 * mean_dev)
        };
    }
    out
}

/// Williams %R. Falls back to 0 on zero range (no documented sentinel in the
/// reference platform, so the general "0 on division-by-zero" policy applies).
pub fn williams_r(high: &[f64], low: &[f64], close: &[f64], p: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = nan_vec(n);
    if p == 0 || n < p {
        return out;
    }
    for i in (p - 1)..n {
        let hh = high[i + 1 - p..=i].iter().cloned().fold(f64::MIN, f64::max);
        let ll = low[i + 1 - p..=i].iter().cloned().fold(f64::MAX, f64::min);
        let range = hh - ll;
        out[i] = if range == 0.0 {
            0.0
        } else {
            -100.0 * (hh - close[i]) / range
        };
    }
    out
}

/// Volume average including the current bar — plain SMA.
pub fn vol_avg(volume: &[f64], p: usize) -> Vec<f64> {
    sma(volume, p)
}

/// Volume average excluding the current bar — used only by exit-side
/// volume-spike conditions (see the Open Questions in the design notes).
pub fn vol_avg_excl(volume: &[f64], p: usize) -> Vec<f64> {
    let n = volume.len();
    let mut out = nan_vec(n);
    if p == 0 || n <= p {
        return out;
    }
    for i in p..n {
        out[i] = volume[i - p..i].iter().sum::<f64>() / p as f64;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_prices() -> Vec<f64> {
        vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03, 45.61, 46.28, 46.28,
            46.00, 46.03, 46.41, 46.22, 45.64,
        ]
    }

    #[test]
    fn sma_warms_up_with_nan_then_matches_hand_computation() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&data, 3);
        assert_eq!(result.len(), 5);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert!((result[2] - 2.0).abs() < 1e-9);
        assert!((result[3] - 3.0).abs() < 1e-9);
        assert!((result[4] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn ema_seed_is_sma_of_first_window() {
        let data = sample_prices();
        let result = ema(&data, 10);
        assert!(result[8].is_nan());
        let seed: f64 = data[0..10].iter().sum::<f64>() / 10.0;
        assert!((result[9] - seed).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_100_when_no_losses() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = rsi(&data, 5);
        assert!(result[4].is_nan());
        assert!((result[5] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn macd_signal_only_covers_fully_defined_tail() {
        let data = sample_prices();
        let result = macd(&data, 3, 6, 4);
        // slow warm-up index is 5 (0-based, period 6); signal needs 4 more points.
        assert!(result.macd_line[4].is_nan());
        assert!(result.macd_line[5].is_finite());
        assert!(result.signal_line[5 + 2].is_nan());
        assert!(result.signal_line[5 + 3].is_finite());
    }

    #[test]
    fn bollinger_band_width_is_symmetric_about_middle() {
        let data = sample_prices();
        let bands = bollinger_bands(&data, 5, 2.0);
        for i in 4..data.len() {
            let upper_dist = bands.upper[i] - bands.middle[i];
            let lower_dist = bands.middle[i] - bands.lower[i];
            assert!((upper_dist - lower_dist).abs() < 1e-9);
        }
    }

    #[test]
    fn stochastic_falls_back_to_50_on_zero_range() {
        let high = vec![10.0; 5];
        let low = vec![10.0; 5];
        let close = vec![10.0; 5];
        let result = stochastic(&high, &low, &close, 3, 2);
        assert_eq!(result.k[2], 50.0);
    }

    #[test]
    fn atr_seed_is_mean_of_first_p_true_ranges() {
        let high = vec![10.0, 11.0, 12.0, 11.5, 12.5];
        let low = vec![9.0, 9.5, 10.5, 10.0, 11.0];
        let close = vec![9.5, 10.5, 11.5, 10.5, 12.0];
        let result = atr(&high, &low, &close, 3);
        assert!(result[2].is_nan());
        assert!(result[3].is_finite());
    }

    #[test]
    fn vol_avg_excl_lags_vol_avg_by_one_bar_worth_of_warm_up() {
        let volume = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let incl = vol_avg(&volume, 3);
        let excl = vol_avg_excl(&volume, 3);
        assert!(incl[1].is_nan());
        assert!(incl[2].is_finite());
        assert!(excl[2].is_nan());
        assert!(excl[3].is_finite());
        assert!((excl[3] - (volume[0] + volume[1] + volume[2]) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn williams_r_within_bounds() {
        let data = sample_prices();
        let result = williams_r(&data, &data, &data, 5);
        for v in result.iter().skip(4) {
            assert!(*v <= 0.0 && *v >= -100.0);
        }
    }
}
