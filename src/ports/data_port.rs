//! Price data provider port.

use crate::domain::error::StockbtError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;

/// Source of daily bars for one instrument.
///
/// Implementations return whatever they hold for the range; ordering,
/// range filtering and bar sanity are enforced by
/// [`crate::domain::price_series::validate`], not here.
pub trait PriceDataPort {
    fn fetch_bars(
        &self,
        instrument_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, StockbtError>;

    fn list_instruments(&self) -> Result<Vec<String>, StockbtError>;

    /// First date, last date and bar count, or `None` when nothing is stored.
    fn get_data_range(
        &self,
        instrument_id: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StockbtError>;
}
