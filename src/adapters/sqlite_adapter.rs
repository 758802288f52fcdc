//! SQLite store for daily bars and backtest results.
//!
//! Every statement is parameterized. Connections come from an `r2d2` pool
//! and go back to it when the guard drops, on success and error alike.

use crate::domain::backtest::BacktestRecord;
use crate::domain::error::StockbtError;
use crate::domain::ohlcv::Bar;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceDataPort;
use crate::ports::result_port::ResultSink;
use crate::ports::store_port::StorePort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

const DATE_FMT: &str = "%Y-%m-%d";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS stock_daily (
        stock_code TEXT NOT NULL,
        trade_date TEXT NOT NULL,
        open_price REAL NOT NULL,
        high_price REAL NOT NULL,
        low_price REAL NOT NULL,
        close_price REAL NOT NULL,
        volume REAL NOT NULL,
        amount REAL NOT NULL DEFAULT 0,
        PRIMARY KEY (stock_code, trade_date)
    );
    CREATE INDEX IF NOT EXISTS idx_stock_daily_date ON stock_daily(trade_date);
    CREATE TABLE IF NOT EXISTS backtest_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        strategy_name TEXT NOT NULL,
        stock_code TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        initial_capital REAL NOT NULL,
        final_value REAL NOT NULL,
        total_return REAL NOT NULL,
        sharpe_ratio REAL,
        max_drawdown REAL NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (strategy_name, stock_code, start_date, end_date)
    );";

type ResultRow = (String, String, String, String, f64, f64, f64, Option<f64>, f64);

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> StockbtError {
    StockbtError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> StockbtError {
    StockbtError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_stored_date(value: &str) -> Result<NaiveDate, StockbtError> {
    NaiveDate::parse_from_str(value, DATE_FMT).map_err(|e: chrono::ParseError| {
        StockbtError::Database {
            reason: format!("bad stored date '{value}': {e}"),
        }
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StockbtError> {
        let db_path =
            config
                .get_string("database", "path")
                .ok_or_else(|| StockbtError::ConfigMissing {
                    section: "database".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("database", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        debug!(path = %db_path, pool_size, "sqlite pool ready");
        Ok(Self { pool })
    }

    /// Single-connection pool over a private in-memory database.
    pub fn in_memory() -> Result<Self, StockbtError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StockbtError> {
        self.pool.get().map_err(pool_error)
    }
}

impl PriceDataPort for SqliteAdapter {
    fn fetch_bars(
        &self,
        instrument_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, StockbtError> {
        let conn = self.conn()?;

        let start_str = start_date.format(DATE_FMT).to_string();
        let end_str = end_date.format(DATE_FMT).to_string();

        let query = "SELECT trade_date, open_price, high_price, low_price, close_price, volume, amount
                     FROM stock_daily
                     WHERE stock_code = ?1 AND trade_date >= ?2 AND trade_date <= ?3
                     ORDER BY trade_date ASC";

        let mut stmt = conn.prepare(query).map_err(query_error)?;

        let rows = stmt
            .query_map(params![instrument_id, start_str, end_str], |row| {
                let date_str: String = row.get(0)?;
                let trade_date = NaiveDate::parse_from_str(&date_str, DATE_FMT).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(Bar {
                    trade_date,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                    amount: row.get(6)?,
                })
            })
            .map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn list_instruments(&self) -> Result<Vec<String>, StockbtError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT DISTINCT stock_code FROM stock_daily ORDER BY stock_code")
            .map_err(query_error)?;

        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(query_error)?;

        rows.collect::<Result<Vec<String>, _>>().map_err(query_error)
    }

    fn get_data_range(
        &self,
        instrument_id: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StockbtError> {
        let conn = self.conn()?;

        let query =
            "SELECT MIN(trade_date), MAX(trade_date), COUNT(*) FROM stock_daily WHERE stock_code = ?1";

        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(query, params![instrument_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(query_error)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => Ok(Some((
                parse_stored_date(&min_str)?,
                parse_stored_date(&max_str)?,
                count as usize,
            ))),
            _ => Ok(None),
        }
    }
}

impl ResultSink for SqliteAdapter {
    fn save_result(&self, record: &BacktestRecord) -> Result<(), StockbtError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO backtest_results (strategy_name, stock_code, start_date, end_date,
                                           initial_capital, final_value, total_return,
                                           sharpe_ratio, max_drawdown)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (strategy_name, stock_code, start_date, end_date) DO UPDATE SET
                 initial_capital = excluded.initial_capital,
                 final_value = excluded.final_value,
                 total_return = excluded.total_return,
                 sharpe_ratio = excluded.sharpe_ratio,
                 max_drawdown = excluded.max_drawdown,
                 created_at = CURRENT_TIMESTAMP",
            params![
                record.strategy_name,
                record.instrument_id,
                record.start_date.format(DATE_FMT).to_string(),
                record.end_date.format(DATE_FMT).to_string(),
                record.initial_capital,
                record.final_value,
                record.total_return_pct,
                record.sharpe_ratio,
                record.max_drawdown_pct,
            ],
        )
        .map_err(query_error)?;

        info!(
            strategy = %record.strategy_name,
            instrument = %record.instrument_id,
            "backtest result saved"
        );
        Ok(())
    }

    fn list_results(&self, instrument_id: &str) -> Result<Vec<BacktestRecord>, StockbtError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT strategy_name, stock_code, start_date, end_date, initial_capital,
                        final_value, total_return, sharpe_ratio, max_drawdown
                 FROM backtest_results
                 WHERE stock_code = ?1
                 ORDER BY end_date DESC, start_date DESC, strategy_name ASC",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![instrument_id], |row| -> rusqlite::Result<ResultRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })
            .map_err(query_error)?;

        let mut records = Vec::new();
        for row in rows {
            let (strategy_name, code, start, end, initial, final_value, ret, sharpe, dd) =
                row.map_err(query_error)?;
            records.push(BacktestRecord {
                strategy_name,
                instrument_id: code,
                start_date: parse_stored_date(&start)?,
                end_date: parse_stored_date(&end)?,
                initial_capital: initial,
                final_value,
                total_return_pct: ret,
                sharpe_ratio: sharpe,
                max_drawdown_pct: dd,
            });
        }
        Ok(records)
    }
}

impl StorePort for SqliteAdapter {
    fn initialize_schema(&self) -> Result<(), StockbtError> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA).map_err(query_error)?;
        Ok(())
    }

    fn append_bars(&self, instrument_id: &str, bars: &[Bar]) -> Result<usize, StockbtError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        let latest: Option<String> = tx
            .query_row(
                "SELECT MAX(trade_date) FROM stock_daily WHERE stock_code = ?1",
                params![instrument_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_error)?
            .flatten();
        let latest = latest.as_deref().map(parse_stored_date).transpose()?;

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO stock_daily (stock_code, trade_date, open_price, high_price,
                                              low_price, close_price, volume, amount)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(query_error)?;

            for bar in bars
                .iter()
                .filter(|b| latest.is_none_or(|l| b.trade_date > l))
            {
                stmt.execute(params![
                    instrument_id,
                    bar.trade_date.format(DATE_FMT).to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.amount,
                ])
                .map_err(query_error)?;
                inserted += 1;
            }
        }

        tx.commit().map_err(query_error)?;

        info!(
            instrument = instrument_id,
            inserted,
            skipped = bars.len() - inserted,
            "bars appended"
        );
        Ok(inserted)
    }
}
