//! Trade simulator (component C4).
//!
//! Single long-only position, fixed unit size, next-bar-open entries, and an
//! intrabar stop-loss/take-profit state machine that emulates the reference
//! platform's gap-through fill rules. The simulator loop is strictly
//! sequential — trade state isn't vectorizable — everything upstream of it
//! (indicators, condition vectors) is array-at-a-time.

use technical_analysis::BarSeries;

use crate::models::{BacktestResult, ExitReason, Trade};

/// Runs the C4 state machine over one bar series given entry/exit signal
/// vectors and optional tick-denominated stop-loss/take-profit distances.
/// `tick_size` is the price-unit-per-tick constant (0.25 for the reference
/// instrument, see [`crate::models::TICK_SIZE`]).
pub fn simulate(
    bars: &BarSeries,
    entry_signals: &[bool],
    exit_signals: &[bool],
    sl_ticks: Option<f64>,
    tp_ticks: Option<f64>,
    tick_size: f64,
) -> BacktestResult {
    let n = bars.len();
    let mut trades: Vec<Trade> = Vec::new();

    let mut in_trade = false;
    let mut entry_idx = 0usize;
    let mut entry_price = 0.0f64;
    let mut sl_price = f64::NAN;
    let mut tp_price = f64::NAN;

    let mut i = 0usize;
    while i < n {
        if in_trade {
            // 1. Intrabar stop check — pessimistic, checked first.
            if sl_ticks.is_some() {
                if bars.low[i] <= sl_price {
                    let (price, reason) = if bars.open[i] <= sl_price {
                        (bars.open[i], ExitReason::StopLossGap)
                    } else {
                        (sl_price, ExitReason::StopLoss)
                    };
                    close_trade(&mut trades, bars, entry_idx, entry_price, i, price, reason);
                    in_trade = false;
                    i += 1;
                    continue;
                }
            }
            // 2. Intrabar target check — only if the stop didn't already fire.
            if tp_ticks.is_some() {
                if bars.high[i] > tp_price {
                    let (price, reason) = if bars.open[i] >= tp_price {
                        (bars.open[i], ExitReason::TakeProfitGap)
                    } else {
                        (tp_price, ExitReason::TakeProfit)
                    };
                    close_trade(&mut trades, bars, entry_idx, entry_price, i, price, reason);
                    in_trade = false;
                    i += 1;
                    continue;
                }
            }
            // 3. Signal exit at close.
            if exit_signals.get(i).copied().unwrap_or(false) {
                close_trade(&mut trades, bars, entry_idx, entry_price, i, bars.close[i], ExitReason::Signal);
                in_trade = false;
                i += 1;
                continue;
            }
            i += 1;
            continue;
        }

        // 4. Entry: flat, signal fires, and a next bar exists to fill at.
        if entry_signals.get(i).copied().unwrap_or(false) && i + 1 < n {
            entry_idx = i + 1;
            entry_price = bars.open[i + 1];
            sl_price = sl_ticks.map(|t| entry_price - t * tick_size).unwrap_or(f64::NAN);
            tp_price = tp_ticks.map(|t| entry_price + t * tick_size).unwrap_or(f64::NAN);
            in_trade = true;
            // The same bar that produced the entry signal can't itself fire
            // another entry; advance to entry_idx so the next iteration is
            // the first bar actually held in the position.
            i = entry_idx;
            continue;
        }
        i += 1;
    }

    if in_trade {
        let last = n - 1;
        close_trade(&mut trades, bars, entry_idx, entry_price, last, bars.close[last], ExitReason::SessionEnd);
    }

    summarize(trades)
}

fn close_trade(
    trades: &mut Vec<Trade>,
    bars: &BarSeries,
    entry_idx: usize,
    entry_price: f64,
    exit_idx: usize,
    exit_price: f64,
    reason: ExitReason,
) {
    trades.push(Trade {
        entry_idx,
        exit_idx,
        entry_time: bars.time[entry_idx],
        exit_time: bars.time[exit_idx],
        entry_price,
        exit_price,
        profit: exit_price - entry_price,
        exit_reason: reason,
    });
}

/// Rolls a closed trade list up into the statistics in §4.4. An empty list
/// returns an all-zero result.
pub fn summarize(trades: Vec<Trade>) -> BacktestResult {
    if trades.is_empty() {
        return BacktestResult::empty();
    }

    let total_trades = trades.len();
    let winners: Vec<f64> = trades.iter().map(|t| t.profit).filter(|&p| p > 0.0).collect();
    let losers: Vec<f64> = trades.iter().map(|t| t.profit).filter(|&p| p < 0.0).collect();
    let winning_trades = winners.len();
    let losing_trades = losers.len();

    let win_rate = 100.0 * winning_trades as f64 / total_trades as f64;
    let total_profit: f64 = trades.iter().map(|t| t.profit).sum();
    let gross_profit: f64 = winners.iter().sum();
    let gross_loss: f64 = losers.iter().map(|p| p.abs()).sum();
    let profit_factor = if gross_loss > 0.0 { gross_profit / gross_loss } else { 0.0 };

    let mut cum = 0.0;
    let mut running_max = f64::MIN;
    let mut max_drawdown = 0.0f64;
    for t in &trades {
        cum += t.profit;
        running_max = running_max.max(cum);
        max_drawdown = max_drawdown.max(running_max - cum);
    }

    let sharpe = if total_trades >= 2 {
        let profits: Vec<f64> = trades.iter().map(|t| t.profit).collect();
        let mean = profits.iter().sum::<f64>() / total_trades as f64;
        let variance = profits.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / total_trades as f64;
        let std_dev = variance.sqrt();
        if std_dev > 0.0 {
            mean / std_dev * 252.0_f64.sqrt()
        } else {
            0.0
        }
    } else {
        0.0
    };

    let avg_win = if winning_trades > 0 { gross_profit / winning_trades as f64 } else { 0.0 };
    let avg_loss = if losing_trades > 0 { gross_loss / losing_trades as f64 } else { 0.0 };
    let largest_win = winners.iter().cloned().fold(0.0, f64::max);
    let largest_loss = losers.iter().cloned().fold(0.0, f64::min);

    BacktestResult {
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        total_profit,
        profit_factor,
        max_drawdown,
        sharpe_ratio: sharpe,
        avg_win,
        avg_loss,
        largest_win,
        largest_loss,
        trades,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use technical_analysis::{BarRow, BarSeries};

    fn series(rows: &[(i64, f64, f64, f64, f64, f64)]) -> BarSeries {
        let rows: Vec<BarRow> = rows
            .iter()
            .map(|&(time, open, high, low, close, volume)| BarRow { time, open, high, low, close, volume })
            .collect();
        BarSeries::from_rows(rows).unwrap()
    }

    #[test]
    fn s1_empty_series_yields_empty_result() {
        let bars = series(&[]);
        let result = simulate(&bars, &[], &[], None, None, 0.25);
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.win_rate, 0.0);
        assert_eq!(result.max_drawdown, 0.0);
    }

    #[test]
    fn s2_immediate_stop_loss_exit() {
        // close = [100, 101, 99], open = [100, 100, 100], high = [101, 101, 99],
        // low = [99, 99.5, 98]. Entry fires only on bar 0; SL 4 ticks, TP 8
        // ticks, so sl_price = 99.0. Bar 1's low (99.5) stays clear of the
        // stop so the fill bar itself doesn't trip it; bar 2's low (98) does.
        let bars = series(&[
            (0, 100.0, 101.0, 99.0, 100.0, 1.0),
            (1, 100.0, 101.0, 99.5, 101.0, 1.0),
            (2, 100.0, 99.0, 98.0, 99.0, 1.0),
        ]);
        let entry = vec![true, false, false];
        let exit = vec![false, false, false];
        let result = simulate(&bars, &entry, &exit, Some(4.0), Some(8.0), 0.25);
        assert_eq!(result.total_trades, 1);
        let t = &result.trades[0];
        assert_eq!(t.entry_idx, 1);
        assert_eq!(t.exit_idx, 2);
        assert_eq!(t.entry_price, 100.0);
        assert_eq!(t.exit_price, 99.0);
        assert_eq!(t.exit_reason, ExitReason::StopLoss);
        assert_eq!(t.profit, -1.0);
    }

    #[test]
    fn s3_gap_through_stop_fills_at_open() {
        let bars = series(&[
            (0, 100.0, 101.0, 99.0, 100.0, 1.0),
            (1, 100.0, 101.0, 99.5, 101.0, 1.0),
            (2, 98.0, 99.0, 97.0, 99.0, 1.0),
        ]);
        let entry = vec![true, false, false];
        let exit = vec![false, false, false];
        let result = simulate(&bars, &entry, &exit, Some(4.0), Some(8.0), 0.25);
        assert_eq!(result.total_trades, 1);
        let t = &result.trades[0];
        assert_eq!(t.exit_price, 98.0);
        assert_eq!(t.exit_reason, ExitReason::StopLossGap);
        assert_eq!(t.profit, -2.0);
    }

    #[test]
    fn s4_take_profit_requires_strict_inequality() {
        // TP price = 100 + 8*0.25*... use sl=None, tp_ticks chosen so tp_price=108.
        let bars = series(&[
            (0, 100.0, 101.0, 99.0, 100.0, 1.0),
            (1, 100.0, 101.0, 99.0, 101.0, 1.0),
            // high == tp_price exactly: must NOT fill.
            (2, 100.0, 108.0, 99.0, 101.0, 1.0),
            // high > tp_price: fills at tp_price.
            (3, 101.0, 108.25, 100.0, 102.0, 1.0),
        ]);
        let entry = vec![true, false, false, false];
        let exit = vec![false, false, false, false];
        let result = simulate(&bars, &entry, &exit, None, Some(32.0), 0.25);
        assert_eq!(result.total_trades, 1);
        let t = &result.trades[0];
        assert_eq!(t.exit_idx, 3);
        assert_eq!(t.exit_price, 108.0);
        assert_eq!(t.exit_reason, ExitReason::TakeProfit);
    }

    #[test]
    fn entry_and_intrabar_exit_are_allowed_on_consecutive_bars_but_not_same_bar_reentry() {
        let bars = series(&[
            (0, 100.0, 100.0, 100.0, 100.0, 1.0),
            (1, 100.0, 100.0, 90.0, 95.0, 1.0), // immediately stopped out
            (2, 100.0, 101.0, 99.0, 100.0, 1.0),
        ]);
        // entry fires on bar 0 AND bar 1 (the bar that gets stopped out);
        // re-entry on the same bar the stop fired must not happen.
        let entry = vec![true, true, false];
        let exit = vec![false, false, false];
        let result = simulate(&bars, &entry, &exit, Some(4.0), None, 0.25);
        assert_eq!(result.total_trades, 1);
        assert_eq!(result.trades[0].exit_idx, 1);
    }

    #[test]
    fn session_end_closes_open_position_at_final_close() {
        let bars = series(&[
            (0, 100.0, 100.0, 100.0, 100.0, 1.0),
            (1, 100.0, 105.0, 99.0, 104.0, 1.0),
        ]);
        let entry = vec![true, false];
        let exit = vec![false, false];
        let result = simulate(&bars, &entry, &exit, None, None, 0.25);
        assert_eq!(result.total_trades, 1);
        let t = &result.trades[0];
        assert_eq!(t.exit_reason, ExitReason::SessionEnd);
        assert_eq!(t.exit_price, 104.0);
    }

    #[test]
    fn stop_wins_over_target_on_the_same_bar() {
        // Both stop and target could trigger on the same bar: stop must win.
        let bars = series(&[
            (0, 100.0, 100.0, 100.0, 100.0, 1.0),
            (1, 100.0, 108.25, 96.0, 100.0, 1.0),
        ]);
        let entry = vec![true, false];
        let exit = vec![false, false];
        let result = simulate(&bars, &entry, &exit, Some(4.0), Some(32.0), 0.25);
        assert_eq!(result.total_trades, 1);
        assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn trade_list_is_monotonic_and_profits_sum_to_total() {
        let bars = series(&[
            (0, 100.0, 100.0, 100.0, 100.0, 1.0),
            (1, 100.0, 101.0, 99.0, 100.5, 1.0),
            (2, 100.5, 100.5, 100.5, 100.5, 1.0),
            (3, 100.5, 102.0, 99.0, 101.0, 1.0),
            (4, 101.0, 101.0, 101.0, 101.0, 1.0),
        ]);
        let entry = vec![true, false, true, false, false];
        let exit = vec![false, true, false, false, false];
        let result = simulate(&bars, &entry, &exit, None, None, 0.25);
        for w in result.trades.windows(2) {
            assert!(w[0].exit_idx <= w[1].entry_idx);
        }
        for t in &result.trades {
            assert!(t.entry_idx <= t.exit_idx);
        }
        let sum: f64 = result.trades.iter().map(|t| t.profit).sum();
        assert!((sum - result.total_profit).abs() < 1e-9);
    }

    #[test]
    fn empty_entry_conditions_produce_zero_trades() {
        let bars = series(&[(0, 100.0, 100.0, 100.0, 100.0, 1.0), (1, 100.0, 100.0, 100.0, 100.0, 1.0)]);
        let entry = vec![false, false];
        let exit = vec![false, false];
        let result = simulate(&bars, &entry, &exit, None, None, 0.25);
        assert_eq!(result.total_trades, 0);
    }
}
