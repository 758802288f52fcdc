//! Portfolio state and equity tracking.

use chrono::NaiveDate;

use super::position::{ClosedTrade, Position};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Cash, the single-instrument position, closed trades and the per-bar
/// equity curve of one backtest run.
#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub position: Position,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            position: Position::flat(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn has_position(&self) -> bool {
        !self.position.is_flat()
    }

    /// Mark-to-market value at `price`.
    pub fn equity_at(&self, price: f64) -> f64 {
        self.cash + self.position.market_value(price)
    }

    pub fn record_trade(&mut self, trade: ClosedTrade) {
        self.closed_trades.push(trade);
    }

    pub fn record_equity(&mut self, date: NaiveDate, equity: f64) {
        self.equity_curve.push(EquityPoint { date, equity });
    }

    /// Last recorded equity, or the initial capital before any bar.
    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.initial_capital)
    }
}
