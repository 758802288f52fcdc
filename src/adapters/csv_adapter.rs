//! CSV price file adapter.
//!
//! One file per instrument, `{base_path}/{instrument_id}.csv`. Columns are
//! located by header name, so both plain English exports and the market
//! data provider's native export (日期, 开盘, 收盘, 最高, 最低, 成交量,
//! 成交额, ...) load without conversion. Extra columns are ignored.

use crate::domain::error::StockbtError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::PriceDataPort;
use chrono::NaiveDate;
use csv::StringRecord;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const DATE_HEADERS: &[&str] = &["date", "trade_date", "日期"];
const OPEN_HEADERS: &[&str] = &["open", "open_price", "开盘"];
const HIGH_HEADERS: &[&str] = &["high", "high_price", "最高"];
const LOW_HEADERS: &[&str] = &["low", "low_price", "最低"];
const CLOSE_HEADERS: &[&str] = &["close", "close_price", "收盘"];
const VOLUME_HEADERS: &[&str] = &["volume", "vol", "成交量"];
const AMOUNT_HEADERS: &[&str] = &["amount", "turnover", "成交额"];
// Any other column is ignored, including the provider's derived 涨跌额
// (change) and 涨跌幅 (change ratio); both follow from consecutive closes.

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", instrument_id))
    }
}

/// Column positions resolved from a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    amount: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self, StockbtError> {
        let find = |aliases: &[&str]| {
            headers.iter().position(|h| {
                let h = h.trim().trim_start_matches('\u{feff}').to_lowercase();
                aliases.iter().any(|a| *a == h)
            })
        };
        let require = |aliases: &[&str]| {
            find(aliases).ok_or_else(|| StockbtError::DataSource {
                reason: format!("missing '{}' column", aliases[0]),
            })
        };

        Ok(ColumnMap {
            date: require(DATE_HEADERS)?,
            open: require(OPEN_HEADERS)?,
            high: require(HIGH_HEADERS)?,
            low: require(LOW_HEADERS)?,
            close: require(CLOSE_HEADERS)?,
            volume: require(VOLUME_HEADERS)?,
            amount: find(AMOUNT_HEADERS),
        })
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    // Some exports carry a time part: "2024-01-02 00:00:00".
    let day = value.split_whitespace().next().unwrap_or(value);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
}

fn parse_field(record: &StringRecord, idx: usize, name: &str, line: u64) -> Result<f64, StockbtError> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.replace(',', "")
        .parse::<f64>()
        .map_err(|_| StockbtError::DataSource {
            reason: format!("line {line}: invalid {name} value '{raw}'"),
        })
}

/// Reads every bar in a CSV file, in file order.
///
/// Rows with an empty close (suspended sessions in provider exports) are
/// skipped with a warning. Bar sanity is not checked here.
pub fn read_bars_from_path(path: &Path) -> Result<Vec<Bar>, StockbtError> {
    let content = fs::read_to_string(path).map_err(|e| StockbtError::DataSource {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| StockbtError::DataSource {
            reason: format!("CSV header error in {}: {}", path.display(), e),
        })?
        .clone();
    let cols = ColumnMap::from_headers(&headers)?;

    let mut bars = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| StockbtError::DataSource {
            reason: format!("CSV parse error: {}", e),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let date_str = record.get(cols.date).unwrap_or("");
        let trade_date = parse_date(date_str).ok_or_else(|| StockbtError::DataSource {
            reason: format!("line {line}: invalid date '{date_str}'"),
        })?;

        if record.get(cols.close).is_none_or(|c| c.trim().is_empty()) {
            warn!(line, date = %trade_date, "skipping row without close price");
            continue;
        }

        let amount = match cols.amount {
            Some(idx) if !record.get(idx).unwrap_or("").trim().is_empty() => {
                parse_field(&record, idx, "amount", line)?
            }
            _ => 0.0,
        };

        bars.push(Bar {
            trade_date,
            open: parse_field(&record, cols.open, "open", line)?,
            high: parse_field(&record, cols.high, "high", line)?,
            low: parse_field(&record, cols.low, "low", line)?,
            close: parse_field(&record, cols.close, "close", line)?,
            volume: parse_field(&record, cols.volume, "volume", line)?,
            amount,
        });
    }

    Ok(bars)
}

impl PriceDataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        instrument_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, StockbtError> {
        let mut bars = read_bars_from_path(&self.csv_path(instrument_id))?;
        bars.retain(|b| b.trade_date >= start_date && b.trade_date <= end_date);
        bars.sort_by_key(|b| b.trade_date);
        Ok(bars)
    }

    fn list_instruments(&self) -> Result<Vec<String>, StockbtError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| StockbtError::DataSource {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut instruments = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StockbtError::DataSource {
                reason: format!("directory entry error: {}", e),
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    instruments.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        instruments.sort();
        Ok(instruments)
    }

    fn get_data_range(
        &self,
        instrument_id: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StockbtError> {
        let path = self.csv_path(instrument_id);
        if !path.exists() {
            return Ok(None);
        }
        let bars = read_bars_from_path(&path)?;
        let first = bars.iter().map(|b| b.trade_date).min();
        let last = bars.iter().map(|b| b.trade_date).max();
        Ok(first.zip(last).map(|(f, l)| (f, l, bars.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "date,open,high,low,close,volume,amount\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000,6325000\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000,5250000\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000,6600000\n";
        fs::write(path.join("000001.csv"), csv_content).unwrap();

        let native = "日期,股票代码,开盘,收盘,最高,最低,成交量,成交额,振幅\n\
            2024-01-02,600519,1700.0,1710.5,1720.0,1690.0,21000,35900000.0,1.76\n\
            2024-01-03,600519,1710.0,1705.0,1715.0,1698.0,18000,30700000.0,0.99\n";
        fs::write(path.join("600519.csv"), native).unwrap();

        fs::write(path.join("notes.txt"), "ignored").unwrap();

        (dir, path)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fetch_bars_returns_sorted_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter
            .fetch_bars("000001", date(2024, 1, 15), date(2024, 1, 17))
            .unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].trade_date, date(2024, 1, 15));
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].high, 110.0);
        assert_eq!(bars[0].low, 90.0);
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[0].volume, 50000.0);
        assert_eq!(bars[0].amount, 5250000.0);
        assert_eq!(bars[2].trade_date, date(2024, 1, 17));
    }

    #[test]
    fn fetch_bars_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter
            .fetch_bars("000001", date(2024, 1, 16), date(2024, 1, 16))
            .unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].trade_date, date(2024, 1, 16));
    }

    #[test]
    fn native_headers_map_by_name() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter
            .fetch_bars("600519", date(2024, 1, 1), date(2024, 1, 31))
            .unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, 1700.0);
        assert_eq!(bars[0].close, 1710.5);
        assert_eq!(bars[0].high, 1720.0);
        assert_eq!(bars[0].low, 1690.0);
        assert_eq!(bars[0].volume, 21000.0);
        assert_eq!(bars[0].amount, 35900000.0);
    }

    #[test]
    fn derived_change_columns_are_ignored() {
        let dir = TempDir::new().unwrap();
        let content = "日期,开盘,收盘,最高,最低,成交量,成交额,涨跌幅,涨跌额,换手率\n\
            2024-01-02,10.0,10.5,10.8,9.9,1000,10500,5.00,0.50,1.2\n\
            2024-01-03,10.5,10.2,10.6,10.1,900,9180,-2.86,-0.30,0.9\n";
        let file = dir.path().join("000002.csv");
        fs::write(&file, content).unwrap();

        let bars = read_bars_from_path(&file).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 10.2);
        assert_eq!(bars[1].amount, 9180.0);
    }

    #[test]
    fn missing_file_is_data_source_error() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let result = adapter.fetch_bars("999999", date(2024, 1, 1), date(2024, 1, 31));
        assert!(matches!(result, Err(StockbtError::DataSource { .. })));
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bad.csv");
        fs::write(&file, "date,open,high,low,volume\n2024-01-02,1,1,1,1\n").unwrap();

        let err = read_bars_from_path(&file).unwrap_err();
        assert!(matches!(err, StockbtError::DataSource { reason } if reason.contains("close")));
    }

    #[test]
    fn invalid_number_reports_line() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bad.csv");
        fs::write(
            &file,
            "date,open,high,low,close,volume\n2024-01-02,1,1,1,1,1\n2024-01-03,x,1,1,1,1\n",
        )
        .unwrap();

        let err = read_bars_from_path(&file).unwrap_err();
        assert!(matches!(err, StockbtError::DataSource { reason } if reason.contains("line 3")));
    }

    #[test]
    fn empty_close_rows_are_skipped_and_amount_defaults() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("s.csv");
        fs::write(
            &file,
            "date,open,high,low,close,volume\n2024/01/02,1,1,1,,0\n20240103,2,2,2,2,10\n",
        )
        .unwrap();

        let bars = read_bars_from_path(&file).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].trade_date, date(2024, 1, 3));
        assert_eq!(bars[0].amount, 0.0);
    }

    #[test]
    fn list_instruments_returns_csv_stems() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        assert_eq!(adapter.list_instruments().unwrap(), vec!["000001", "600519"]);
    }

    #[test]
    fn data_range_reports_bounds_and_count() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let (first, last, count) = adapter.get_data_range("000001").unwrap().unwrap();
        assert_eq!(first, date(2024, 1, 15));
        assert_eq!(last, date(2024, 1, 17));
        assert_eq!(count, 3);
        assert!(adapter.get_data_range("999999").unwrap().is_none());
    }
}
