//! Core domain types and simulation logic.

pub mod backtest;
pub mod broker;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod indicator;
pub mod metrics;
pub mod ohlcv;
pub mod portfolio;
pub mod position;
pub mod price_series;
pub mod strategy;
