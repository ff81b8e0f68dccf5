//! Majority-vote combiner over the three component strategies.

use common::{ReasonCode, Signal, SignalKind, SignalSource};
use tracing::debug;

use crate::strategies::standard_set;
use crate::{Strategy, StrategyParams};

/// Combine component signals into one consensus signal.
///
/// Pure function of its inputs: signals with zero confidence abstain, the
/// majority side wins with the mean confidence of its voters (capped at 1),
/// and ties or all-HOLD produce HOLD. The component signals are embedded in
/// the result for auditability.
pub fn combine(symbol: &str, components: Vec<Signal>) -> Signal {
    let buys: Vec<f64> = components
        .iter()
        .filter(|s| s.kind == SignalKind::Buy && s.confidence > 0.0)
        .map(|s| s.confidence)
        .collect();
    let sells: Vec<f64> = components
        .iter()
        .filter(|s| s.kind == SignalKind::Sell && s.confidence > 0.0)
        .map(|s| s.confidence)
        .collect();

    let (kind, confidence) = if buys.len() > sells.len() {
        (SignalKind::Buy, mean(&buys).min(1.0))
    } else if sells.len() > buys.len() {
        (SignalKind::Sell, mean(&sells).min(1.0))
    } else {
        (SignalKind::Hold, 0.0)
    };

    Signal {
        symbol: symbol.to_string(),
        kind,
        confidence,
        reason: ReasonCode::CombinedAnalysis,
        source: SignalSource::Combined,
        inputs: Default::default(),
        components,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// The live signal pipeline: runs the standard strategy trio over a price
/// window and combines the results.
pub struct ConsensusEvaluator {
    strategies: [Box<dyn Strategy>; 3],
    params: StrategyParams,
}

impl ConsensusEvaluator {
    pub fn new(params: StrategyParams) -> Self {
        Self {
            strategies: standard_set(&params),
            params,
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Evaluate one symbol's window (mids, oldest first).
    pub fn evaluate(&self, symbol: &str, prices: &[f64]) -> Signal {
        let components: Vec<Signal> = self
            .strategies
            .iter()
            .map(|s| s.evaluate(symbol, prices))
            .collect();
        let consensus = combine(symbol, components);
        debug!(
            %symbol,
            kind = ?consensus.kind,
            confidence = consensus.confidence,
            "consensus evaluated"
        );
        consensus
    }
}
