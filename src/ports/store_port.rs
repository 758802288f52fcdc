//! A database backend that stores both price data and results.

use crate::domain::error::StockbtError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::PriceDataPort;
use crate::ports::result_port::ResultSink;

pub trait StorePort: PriceDataPort + ResultSink {
    /// Creates `stock_daily` and `backtest_results` if missing.
    fn initialize_schema(&self) -> Result<(), StockbtError>;

    /// Inserts only the bars dated after the latest stored bar for
    /// `instrument_id`. Returns the number of rows inserted.
    fn append_bars(&self, instrument_id: &str, bars: &[Bar]) -> Result<usize, StockbtError>;
}
