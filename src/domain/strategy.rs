//! Trading strategies and the name registry.
//!
//! A strategy sees the bars observed so far (the last one is the current
//! bar) together with the broker's current position, and answers with one
//! [`Intent`]. Strategies never see future bars and never mutate the
//! portfolio; the engine owns both.

use std::fmt;

use super::error::{StockbtError, StrategyError};
use super::indicator::trailing_sma;
use super::ohlcv::Bar;
use super::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    EnterLong,
    Exit,
    Hold,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::EnterLong => write!(f, "ENTER_LONG"),
            Intent::Exit => write!(f, "EXIT"),
            Intent::Hold => write!(f, "HOLD"),
        }
    }
}

/// Read-only view handed to [`Strategy::decide`] for one bar.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    /// Bars up to and including the current one, oldest first.
    pub history: &'a [Bar],
    pub position: &'a Position,
}

impl<'a> MarketView<'a> {
    /// The bar being decided on; `None` only for a hand-built empty view.
    pub fn current(&self) -> Option<&'a Bar> {
        self.history.last()
    }
}

pub trait Strategy: Send {
    fn name(&self) -> &str;

    fn decide(&self, view: &MarketView<'_>) -> Result<Intent, StrategyError>;
}

/// Tunable parameters shared by the registered strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    pub ma_period: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams { ma_period: 20 }
    }
}

/// Compares the trailing SMA of closes with the current close.
///
/// Enters when the average is above the close while flat, exits when the
/// average is below the close while holding. Holds during warmup.
#[derive(Debug, Clone)]
pub struct MovingAverageCrossStrategy {
    ma_period: usize,
}

impl MovingAverageCrossStrategy {
    pub fn new(ma_period: usize) -> Result<Self, StockbtError> {
        if ma_period == 0 {
            return Err(StockbtError::ConfigInvalid {
                section: "strategy".into(),
                key: "ma_period".into(),
                reason: "ma_period must be at least 1".into(),
            });
        }
        Ok(Self { ma_period })
    }

    pub fn ma_period(&self) -> usize {
        self.ma_period
    }
}

impl Default for MovingAverageCrossStrategy {
    fn default() -> Self {
        Self {
            ma_period: StrategyParams::default().ma_period,
        }
    }
}

impl Strategy for MovingAverageCrossStrategy {
    fn name(&self) -> &str {
        "MovingAverageCross"
    }

    fn decide(&self, view: &MarketView<'_>) -> Result<Intent, StrategyError> {
        let (Some(sma), Some(bar)) = (trailing_sma(view.history, self.ma_period), view.current())
        else {
            return Ok(Intent::Hold);
        };
        let close = bar.close;

        if sma > close && view.position.is_flat() {
            Ok(Intent::EnterLong)
        } else if sma < close && !view.position.is_flat() {
            Ok(Intent::Exit)
        } else {
            Ok(Intent::Hold)
        }
    }
}

/// Buys on the first bar and holds to the end.
#[derive(Debug, Clone, Default)]
pub struct BuyAndHoldStrategy;

impl Strategy for BuyAndHoldStrategy {
    fn name(&self) -> &str {
        "BuyAndHold"
    }

    fn decide(&self, view: &MarketView<'_>) -> Result<Intent, StrategyError> {
        if view.position.is_flat() {
            Ok(Intent::EnterLong)
        } else {
            Ok(Intent::Hold)
        }
    }
}

/// Names accepted by [`build_strategy`].
pub const STRATEGY_NAMES: &[&str] = &["moving_average_cross", "buy_and_hold"];

/// Instantiates a registered strategy by name (case-insensitive).
pub fn build_strategy(
    name: &str,
    params: &StrategyParams,
) -> Result<Box<dyn Strategy>, StockbtError> {
    match name.trim().to_lowercase().as_str() {
        "moving_average_cross" | "ma_cross" => {
            Ok(Box::new(MovingAverageCrossStrategy::new(params.ma_period)?))
        }
        "buy_and_hold" => Ok(Box::new(BuyAndHoldStrategy)),
        _ => Err(StockbtError::UnknownStrategy {
            name: name.to_string(),
        }),
    }
}
