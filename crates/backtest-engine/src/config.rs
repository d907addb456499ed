//! Plain configuration value types passed explicitly into the simulator and
//! the optimizer. Nothing here is read from global or environment state —
//! every knob a caller might want to override is a field with a documented
//! default.

/// Per-backtest configuration. Currently a single override point: the tick
/// size, fixed at 0.25 price units for the reference instrument but kept
/// configurable for future instruments without touching the simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestRunConfig {
    pub tick_size: f64,
}

impl Default for BacktestRunConfig {
    fn default() -> Self {
        Self { tick_size: crate::models::TICK_SIZE }
    }
}

/// Per-sweep configuration: how many worker threads to use and how often to
/// emit a progress tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationRunConfig {
    /// Worker pool size. Defaults to `min(6, available_parallelism)`.
    pub worker_count: usize,
    /// Emit a progress tick every `progress_every` combinations.
    pub progress_every: usize,
}

impl OptimizationRunConfig {
    /// Builds a config for a sweep of `total` combinations: worker count
    /// defaults to `min(6, available_parallelism)`, progress cadence to
    /// `max(1, total/10)` or every 100, whichever fires first.
    pub fn for_total(total: usize) -> Self {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            worker_count: cores.min(6).max(1),
            progress_every: (total / 10).max(1).min(100),
        }
    }
}

impl Default for OptimizationRunConfig {
    fn default() -> Self {
        Self::for_total(0)
    }
}
