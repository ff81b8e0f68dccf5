use super::sma;

/// Bollinger band levels for the latest bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Bollinger Bands over the last `n` prices with `k` standard deviations.
/// Population variance, per the classic definition. Returns `None` if fewer
/// than `n` values are available.
pub fn bollinger(prices: &[f64], n: usize, k: f64) -> Option<BollingerBands> {
    let middle = sma(prices, n)?;
    let window = &prices[prices.len() - n..];

    let variance = window.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / n as f64;
    let sigma = variance.sqrt();

    Some(BollingerBands {
        middle,
        upper: middle + k * sigma,
        lower: middle - k * sigma,
    })
}
