//! Simple Moving Average over closing prices.
//!
//! SMA(n)[i] = sum(C[i-j] for j in 0..n) / n
//! Undefined until n bars have been observed.

use crate::domain::ohlcv::Bar;

/// SMA of the last `period` closes in `bars`, or `None` while fewer than
/// `period` bars are available (or `period` is zero).
pub fn trailing_sma(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    Some(window.iter().map(|b| b.close).sum::<f64>() / period as f64)
}
