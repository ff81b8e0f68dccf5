/// Relative Strength Index over the last `n + 1` prices.
///
/// Uses simple (unsmoothed) averages of gains and losses across the last
/// `n` pairwise changes. When the window has no losses, RSI is 100 by
/// convention. Returns `None` if fewer than `n + 1` values are available.
pub fn rsi(prices: &[f64], n: usize) -> Option<f64> {
    if n == 0 || prices.len() < n + 1 {
        return None;
    }

    let window = &prices[prices.len() - (n + 1)..];
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for pair in window.windows(2) {
        let diff = pair[1] - pair[0];
        if diff > 0.0 {
            gain_sum += diff;
        } else {
            loss_sum -= diff;
        }
    }

    let avg_gain = gain_sum / n as f64;
    let avg_loss = loss_sum / n as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
