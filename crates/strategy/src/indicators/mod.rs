//! Pure indicator functions over a price slice ordered oldest→newest.
//! All arithmetic is IEEE-754 double precision.

pub mod bollinger;
pub mod rsi;
pub mod sma;

pub use bollinger::{bollinger, BollingerBands};
pub use rsi::rsi;
pub use sma::sma;

use common::IndicatorSnapshot;

use crate::StrategyParams;

/// Compute every configured indicator for one window. Fields are `None`
/// when the window is too short.
pub fn indicator_snapshot(prices: &[f64], params: &StrategyParams) -> IndicatorSnapshot {
    let bands = bollinger(prices, params.bb_period, params.bb_std);
    IndicatorSnapshot {
        sma_short: sma(prices, params.sma_short),
        sma_long: sma(prices, params.sma_long),
        rsi: rsi(prices, params.rsi_period),
        bb_middle: bands.as_ref().map(|b| b.middle),
        bb_upper: bands.as_ref().map(|b| b.upper),
        bb_lower: bands.as_ref().map(|b| b.lower),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_fields_appear_as_history_grows() {
        let params = StrategyParams {
            sma_short: 2,
            sma_long: 4,
            rsi_period: 3,
            bb_period: 4,
            ..StrategyParams::default()
        };

        let short = vec![1.0, 2.0];
        let snap = indicator_snapshot(&short, &params);
        assert!(snap.sma_short.is_some());
        assert!(snap.sma_long.is_none());
        assert!(snap.rsi.is_none());
        assert!(snap.bb_middle.is_none());

        let full = vec![1.0, 2.0, 3.0, 4.0];
        let snap = indicator_snapshot(&full, &params);
        assert!(snap.sma_long.is_some());
        assert!(snap.rsi.is_some());
        assert!(snap.bb_upper.is_some());
        assert!(snap.bb_lower.is_some());
    }
}
