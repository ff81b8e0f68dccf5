pub mod consensus;
pub mod indicators;
pub mod strategies;

pub use consensus::{combine, ConsensusEvaluator};
pub use strategies::{BollingerStrategy, RsiStrategy, SmaCrossoverStrategy};

use serde::{Deserialize, Serialize};

use common::Signal;

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// Evaluate a price window (mids, oldest first) and return a signal.
    ///
    /// Insufficient history is not an error: strategies return HOLD with
    /// `insufficient_history` instead.
    fn evaluate(&self, symbol: &str, prices: &[f64]) -> Signal;
}

/// Tunables for the three strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParams {
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub bb_period: usize,
    pub bb_std: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            sma_short: 10,
            sma_long: 50,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            bb_period: 20,
            bb_std: 2.0,
        }
    }
}

impl From<&common::Config> for StrategyParams {
    fn from(cfg: &common::Config) -> Self {
        Self {
            sma_short: cfg.sma_short,
            sma_long: cfg.sma_long,
            rsi_period: cfg.rsi_period,
            rsi_overbought: cfg.rsi_overbought,
            rsi_oversold: cfg.rsi_oversold,
            bb_period: cfg.bb_period,
            bb_std: cfg.bb_std,
        }
    }
}

impl StrategyParams {
    /// Points of history the evaluation loop should fetch so every strategy
    /// has enough to work with.
    pub fn min_history(&self) -> usize {
        (self.sma_long + 1)
            .max(self.bb_period + 1)
            .max(self.rsi_period + 1)
    }
}
