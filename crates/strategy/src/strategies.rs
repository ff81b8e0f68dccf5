//! The three signal generators: SMA crossover, RSI and Bollinger Bands.

use common::{IndicatorSnapshot, ReasonCode, Signal, SignalKind, SignalSource};

use crate::indicators::{bollinger, rsi, sma};
use crate::{Strategy, StrategyParams};

/// BUY on a golden cross (short SMA crossing above long), SELL on a death
/// cross. Confidence scales with the gap between the averages.
#[derive(Debug, Clone)]
pub struct SmaCrossoverStrategy {
    pub short: usize,
    pub long: usize,
}

impl SmaCrossoverStrategy {
    pub fn new(short: usize, long: usize) -> Self {
        assert!(short < long, "short SMA period must be below long");
        Self { short, long }
    }
}

impl Strategy for SmaCrossoverStrategy {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn evaluate(&self, symbol: &str, prices: &[f64]) -> Signal {
        // Crossover needs the long SMA at the current bar and one bar back.
        if prices.len() < self.long + 1 {
            return Signal::hold(symbol, SignalSource::Sma, ReasonCode::InsufficientHistory);
        }

        let prev = &prices[..prices.len() - 1];
        let (Some(s_now), Some(l_now), Some(s_prev), Some(l_prev)) = (
            sma(prices, self.short),
            sma(prices, self.long),
            sma(prev, self.short),
            sma(prev, self.long),
        ) else {
            return Signal::hold(symbol, SignalSource::Sma, ReasonCode::InsufficientHistory);
        };

        let inputs = IndicatorSnapshot {
            sma_short: Some(s_now),
            sma_long: Some(l_now),
            ..IndicatorSnapshot::default()
        };

        let (kind, confidence, reason) = if s_prev <= l_prev && s_now > l_now {
            let confidence = ((s_now - l_now) / l_now * 100.0).min(1.0);
            (SignalKind::Buy, confidence, ReasonCode::GoldenCross)
        } else if s_prev >= l_prev && s_now < l_now {
            let confidence = ((l_now - s_now) / l_now * 100.0).min(1.0);
            (SignalKind::Sell, confidence, ReasonCode::DeathCross)
        } else {
            (SignalKind::Hold, 0.0, ReasonCode::NoSignal)
        };

        Signal {
            symbol: symbol.to_string(),
            kind,
            confidence,
            reason,
            source: SignalSource::Sma,
            inputs,
            components: Vec::new(),
        }
    }
}

/// SELL when RSI is overbought, BUY when oversold. Confidence scales with
/// the distance past the threshold.
#[derive(Debug, Clone)]
pub struct RsiStrategy {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl RsiStrategy {
    pub fn new(period: usize, overbought: f64, oversold: f64) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        assert!(oversold < overbought, "RSI thresholds inverted");
        Self {
            period,
            overbought,
            oversold,
        }
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &str {
        "rsi"
    }

    fn evaluate(&self, symbol: &str, prices: &[f64]) -> Signal {
        let Some(value) = rsi(prices, self.period) else {
            return Signal::hold(symbol, SignalSource::Rsi, ReasonCode::InsufficientHistory);
        };

        let inputs = IndicatorSnapshot {
            rsi: Some(value),
            ..IndicatorSnapshot::default()
        };

        let (kind, confidence, reason) = if value > self.overbought {
            let confidence = ((value - self.overbought) / (100.0 - self.overbought)).min(1.0);
            (SignalKind::Sell, confidence, ReasonCode::Overbought)
        } else if value < self.oversold {
            let confidence = ((self.oversold - value) / self.oversold).min(1.0);
            (SignalKind::Buy, confidence, ReasonCode::Oversold)
        } else {
            (SignalKind::Hold, 0.0, ReasonCode::NoSignal)
        };

        Signal {
            symbol: symbol.to_string(),
            kind,
            confidence,
            reason,
            source: SignalSource::Rsi,
            inputs,
            components: Vec::new(),
        }
    }
}

/// SELL when price breaks above the upper band, BUY below the lower band.
/// Confidence is the overshoot relative to the half band width.
#[derive(Debug, Clone)]
pub struct BollingerStrategy {
    pub period: usize,
    pub k: f64,
}

impl BollingerStrategy {
    pub fn new(period: usize, k: f64) -> Self {
        assert!(period >= 2, "Bollinger period must be >= 2");
        Self { period, k }
    }
}

impl Strategy for BollingerStrategy {
    fn name(&self) -> &str {
        "bollinger"
    }

    fn evaluate(&self, symbol: &str, prices: &[f64]) -> Signal {
        let (Some(&price), Some(bands)) =
            (prices.last(), bollinger(prices, self.period, self.k))
        else {
            return Signal::hold(
                symbol,
                SignalSource::Bollinger,
                ReasonCode::InsufficientHistory,
            );
        };

        let inputs = IndicatorSnapshot {
            bb_middle: Some(bands.middle),
            bb_upper: Some(bands.upper),
            bb_lower: Some(bands.lower),
            ..IndicatorSnapshot::default()
        };

        let (kind, confidence, reason) = if price > bands.upper {
            let confidence = ((price - bands.upper) / (bands.upper - bands.middle)).min(1.0);
            (SignalKind::Sell, confidence, ReasonCode::AboveUpperBand)
        } else if price < bands.lower {
            let confidence = ((bands.lower - price) / (bands.middle - bands.lower)).min(1.0);
            (SignalKind::Buy, confidence, ReasonCode::BelowLowerBand)
        } else {
            (SignalKind::Hold, 0.0, ReasonCode::NoSignal)
        };

        Signal {
            symbol: symbol.to_string(),
            kind,
            confidence,
            reason,
            source: SignalSource::Bollinger,
            inputs,
            components: Vec::new(),
        }
    }
}

/// Build the standard trio from shared parameters.
pub fn standard_set(params: &StrategyParams) -> [Box<dyn Strategy>; 3] {
    [
        Box::new(SmaCrossoverStrategy::new(params.sma_short, params.sma_long)),
        Box::new(RsiStrategy::new(
            params.rsi_period,
            params.rsi_overbought,
            params.rsi_oversold,
        )),
        Box::new(BollingerStrategy::new(params.bb_period, params.bb_std)),
    ]
}
