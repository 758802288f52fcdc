//! Market-on-close fill simulation for a single long-only instrument.
//!
//! `ENTER_LONG` while flat converts all available cash into whole shares at
//! the bar's close; `EXIT` while holding liquidates the whole position at the
//! close. Every other combination leaves the portfolio untouched. After each
//! bar one equity point `cash + quantity * close` is appended.

use chrono::NaiveDate;
use tracing::debug;

use super::ohlcv::Bar;
use super::portfolio::Portfolio;
use super::position::{ClosedTrade, Position};
use super::strategy::Intent;

/// Relative slack on the cash check, absorbing f64 rounding when cash is an
/// exact multiple of the price.
const FILL_TOLERANCE: f64 = 1e-12;

/// Flat commission policy applied to every fill.
///
/// The exit commission is capped at the sale proceeds, so a sale never
/// costs more than it returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
        }
    }
}

/// Calculate commission: flat_fee + (trade_value * pct / 100).
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoChangeReason {
    Hold,
    AlreadyPositioned,
    NoPosition,
    InsufficientCash,
}

/// What the broker did with one intent.
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Bought {
        quantity: u64,
        price: f64,
        commission: f64,
    },
    Sold {
        quantity: u64,
        price: f64,
        commission: f64,
        pnl: f64,
    },
    NoChange(NoChangeReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenEntry {
    date: NaiveDate,
    commission: f64,
}

#[derive(Debug, Clone)]
pub struct Broker {
    portfolio: Portfolio,
    config: ExecutionConfig,
    open_entry: Option<OpenEntry>,
}

impl Broker {
    pub fn new(initial_capital: f64, config: ExecutionConfig) -> Self {
        Broker {
            portfolio: Portfolio::new(initial_capital),
            config,
            open_entry: None,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn position(&self) -> &Position {
        &self.portfolio.position
    }

    pub fn into_portfolio(self) -> Portfolio {
        self.portfolio
    }

    /// Executes `intent` at `bar.close` and records the bar's equity.
    pub fn apply(&mut self, intent: Intent, bar: &Bar) -> FillOutcome {
        let outcome = match intent {
            Intent::EnterLong if self.portfolio.has_position() => {
                FillOutcome::NoChange(NoChangeReason::AlreadyPositioned)
            }
            Intent::EnterLong => self.enter_long(bar),
            Intent::Exit if !self.portfolio.has_position() => {
                FillOutcome::NoChange(NoChangeReason::NoPosition)
            }
            Intent::Exit => self.exit_long(bar),
            Intent::Hold => FillOutcome::NoChange(NoChangeReason::Hold),
        };

        let equity = self.portfolio.equity_at(bar.close);
        self.portfolio.record_equity(bar.trade_date, equity);
        outcome
    }

    /// Steps:
    /// 1. start one share above floor((cash - flat fee) / (close * (1 + pct / 100)))
    /// 2. step quantity down until cost + commission fits in cash
    /// 3. if quantity == 0, nothing happens
    /// 4. deduct cost + commission, open the position at close
    fn enter_long(&mut self, bar: &Bar) -> FillOutcome {
        let price = bar.close;
        let cash = self.portfolio.cash;
        let unit_cost = price * (1.0 + self.config.commission_pct / 100.0);
        let budget = cash - self.config.commission_per_trade;

        // The quotient can land just under an integer (0.3 / 0.1), so the
        // candidate above the floor is tried first.
        let mut quantity = if budget > 0.0 {
            ((budget / unit_cost).floor() as u64).saturating_add(1)
        } else {
            0
        };
        let limit = cash + cash.abs() * FILL_TOLERANCE;

        let (cost, commission) = loop {
            if quantity == 0 {
                return FillOutcome::NoChange(NoChangeReason::InsufficientCash);
            }
            let cost = quantity as f64 * price;
            let commission = calculate_commission(cost, &self.config);
            if cost + commission <= limit {
                break (cost, commission);
            }
            quantity -= 1;
        };

        self.portfolio.cash = (cash - (cost + commission)).max(0.0);
        self.portfolio.position = Position {
            quantity,
            average_cost: price,
        };
        self.open_entry = Some(OpenEntry {
            date: bar.trade_date,
            commission,
        });

        debug!(
            date = %bar.trade_date,
            quantity,
            price,
            commission,
            cash = self.portfolio.cash,
            "entered long"
        );

        FillOutcome::Bought {
            quantity,
            price,
            commission,
        }
    }

    fn exit_long(&mut self, bar: &Bar) -> FillOutcome {
        let position = std::mem::take(&mut self.portfolio.position);
        let entry = self.open_entry.take();
        let price = bar.close;

        let proceeds = position.market_value(price);
        let commission = calculate_commission(proceeds, &self.config).min(proceeds);
        let entry_commission = entry.map(|e| e.commission).unwrap_or(0.0);
        let pnl = position.quantity as f64 * (price - position.average_cost)
            - entry_commission
            - commission;

        self.portfolio.cash += proceeds - commission;

        self.portfolio.record_trade(ClosedTrade {
            quantity: position.quantity,
            entry_price: position.average_cost,
            exit_price: price,
            entry_date: entry.map(|e| e.date).unwrap_or(bar.trade_date),
            exit_date: bar.trade_date,
            pnl,
        });

        debug!(
            date = %bar.trade_date,
            quantity = position.quantity,
            price,
            pnl,
            cash = self.portfolio.cash,
            "exited long"
        );

        FillOutcome::Sold {
            quantity: position.quantity,
            price,
            commission,
            pnl,
        }
    }
}
