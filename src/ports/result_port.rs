//! Backtest result persistence port.

use crate::domain::backtest::BacktestRecord;
use crate::domain::error::StockbtError;

/// Receives records of finished runs only.
///
/// Records are keyed by (strategy_name, instrument_id, start_date,
/// end_date). Saving a record whose key already exists replaces it.
pub trait ResultSink {
    fn save_result(&self, record: &BacktestRecord) -> Result<(), StockbtError>;

    /// Stored records for an instrument, newest end date first.
    fn list_results(&self, instrument_id: &str) -> Result<Vec<BacktestRecord>, StockbtError>;
}
