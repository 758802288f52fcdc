//! Technical indicators computed from price history.

pub mod sma;

pub use sma::trailing_sma;
