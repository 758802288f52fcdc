#![allow(dead_code)]

use chrono::NaiveDate;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use stockbt::domain::backtest::BacktestRecord;
use stockbt::domain::error::{StockbtError, StrategyError};
pub use stockbt::domain::ohlcv::Bar;
use stockbt::domain::strategy::{Intent, MarketView, Strategy};
use stockbt::ports::data_port::PriceDataPort;
use stockbt::ports::result_port::ResultSink;

/// In-memory price source that counts how often it is asked for bars.
pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
    pub fetches: Cell<usize>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            fetches: Cell::new(0),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }
}

impl PriceDataPort for MockDataPort {
    fn fetch_bars(
        &self,
        instrument_id: &str,
        _start_date: NaiveDate,
        _end_date: NaiveDate,
    ) -> Result<Vec<Bar>, StockbtError> {
        self.fetches.set(self.fetches.get() + 1);
        if let Some(reason) = self.errors.get(instrument_id) {
            return Err(StockbtError::DataSource {
                reason: reason.clone(),
            });
        }
        // Unfiltered: range filtering happens in the validator.
        Ok(self.data.get(instrument_id).cloned().unwrap_or_default())
    }

    fn list_instruments(&self) -> Result<Vec<String>, StockbtError> {
        let mut codes: Vec<String> = self.data.keys().cloned().collect();
        codes.sort();
        Ok(codes)
    }

    fn get_data_range(
        &self,
        instrument_id: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StockbtError> {
        match self.data.get(instrument_id) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.trade_date).min().unwrap();
                let max = bars.iter().map(|b| b.trade_date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

/// Result sink that keeps records in memory.
#[derive(Default)]
pub struct MemorySink {
    pub records: RefCell<Vec<BacktestRecord>>,
}

impl ResultSink for MemorySink {
    fn save_result(&self, record: &BacktestRecord) -> Result<(), StockbtError> {
        self.records.borrow_mut().push(record.clone());
        Ok(())
    }

    fn list_results(&self, instrument_id: &str) -> Result<Vec<BacktestRecord>, StockbtError> {
        Ok(self
            .records
            .borrow()
            .iter()
            .filter(|r| r.instrument_id == instrument_id)
            .cloned()
            .collect())
    }
}

/// Emits a fixed intent per bar index, `Hold` past the end of the script.
pub struct ScriptedStrategy {
    pub script: Vec<Intent>,
}

impl ScriptedStrategy {
    pub fn new(script: Vec<Intent>) -> Self {
        Self { script }
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn decide(&self, view: &MarketView<'_>) -> Result<Intent, StrategyError> {
        Ok(self
            .script
            .get(view.history.len() - 1)
            .copied()
            .unwrap_or(Intent::Hold))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date_str: &str, close: f64) -> Bar {
    Bar {
        trade_date: NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap(),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000.0,
        amount: close * 1000.0,
    }
}

/// Consecutive calendar-day bars starting at `start_date` with the given closes.
pub fn bars_from_closes(start_date: &str, closes: &[f64]) -> Vec<Bar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            trade_date: start + chrono::Duration::days(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
            amount: close * 1000.0,
        })
        .collect()
}

/// Deterministic zig-zag series that crosses its own moving average often.
pub fn generate_bars(start_date: &str, count: usize, start_price: f64) -> Vec<Bar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| {
            let wave = ((i % 10) as f64 - 5.0).abs();
            start_price + wave + i as f64 * 0.1
        })
        .collect();
    bars_from_closes(start_date, &closes)
}
