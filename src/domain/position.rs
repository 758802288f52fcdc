//! Long position held by the broker and the log of closed round trips.

use chrono::NaiveDate;

/// Shares held and their average cost. A flat position has
/// `quantity == 0` and `average_cost == 0.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub quantity: u64,
    pub average_cost: f64,
}

impl Position {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub quantity: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    /// Net of entry and exit commissions.
    pub pnl: f64,
}

impl ClosedTrade {
    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }
}
