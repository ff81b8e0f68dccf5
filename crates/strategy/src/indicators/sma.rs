/// Simple moving average of the last `n` prices.
/// Returns `None` if fewer than `n` values are available or `n == 0`.
pub fn sma(prices: &[f64], n: usize) -> Option<f64> {
    if n == 0 || prices.len() < n {
        return None;
    }
    let window = &prices[prices.len() - n..];
    Some(window.iter().sum::<f64>() / n as f64)
}
