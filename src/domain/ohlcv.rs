//! Daily OHLCV bar representation.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
}

impl Bar {
    /// Checks the price and size invariants of a single bar.
    ///
    /// Prices must be finite and strictly positive, volume and amount finite
    /// and non-negative, and `low <= {open, close} <= high`. Returns the
    /// reason for the first violation found.
    pub fn check(&self) -> Result<(), String> {
        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{name} price must be positive, got {value}"));
            }
        }

        for (name, value) in [("volume", self.volume), ("amount", self.amount)] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be non-negative, got {value}"));
            }
        }

        if self.low > self.high {
            return Err(format!("low {} above high {}", self.low, self.high));
        }
        if self.open < self.low || self.open > self.high {
            return Err(format!(
                "open {} outside [{}, {}]",
                self.open, self.low, self.high
            ));
        }
        if self.close < self.low || self.close > self.high {
            return Err(format!(
                "close {} outside [{}, {}]",
                self.close, self.low, self.high
            ));
        }

        Ok(())
    }
}
