//! Validated price series for a single instrument.
//!
//! Raw bars coming from a data port are checked here once; everything
//! downstream (engine, broker, metrics) assumes the invariants hold.

use chrono::NaiveDate;

use super::error::StockbtError;
use super::ohlcv::Bar;

/// Ordered, de-duplicated daily bars for one instrument within
/// `[start_date, end_date]`. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    instrument_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.bars[0].trade_date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.bars[self.bars.len() - 1].trade_date
    }
}

/// Rejects a run request whose start date lies after its end date.
pub fn validate_range(start_date: NaiveDate, end_date: NaiveDate) -> Result<(), StockbtError> {
    if start_date > end_date {
        return Err(StockbtError::InvalidRange {
            start: start_date,
            end: end_date,
        });
    }
    Ok(())
}

/// Builds a [`PriceSeries`] from raw provider bars.
///
/// Bars dated outside the requested range are dropped. The remaining bars
/// must each be well formed and strictly increasing by date; the first
/// violation aborts with `MalformedBar`. An empty result is `EmptySeries`.
pub fn validate(
    instrument_id: &str,
    raw: Vec<Bar>,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<PriceSeries, StockbtError> {
    validate_range(start_date, end_date)?;

    let mut bars: Vec<Bar> = Vec::with_capacity(raw.len());
    for bar in raw {
        if bar.trade_date < start_date || bar.trade_date > end_date {
            continue;
        }

        bar.check().map_err(|reason| StockbtError::MalformedBar {
            date: bar.trade_date,
            reason,
        })?;

        if let Some(prev) = bars.last() {
            if bar.trade_date == prev.trade_date {
                return Err(StockbtError::MalformedBar {
                    date: bar.trade_date,
                    reason: "duplicate trade date".into(),
                });
            }
            if bar.trade_date < prev.trade_date {
                return Err(StockbtError::MalformedBar {
                    date: bar.trade_date,
                    reason: format!("out of order after {}", prev.trade_date),
                });
            }
        }

        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(StockbtError::EmptySeries {
            instrument: instrument_id.to_string(),
            start: start_date,
            end: end_date,
        });
    }

    Ok(PriceSeries {
        instrument_id: instrument_id.to_string(),
        start_date,
        end_date,
        bars,
    })
}
