//! PostgreSQL store for daily bars and backtest results.

use crate::domain::backtest::BacktestRecord;
use crate::domain::error::StockbtError;
use crate::domain::ohlcv::Bar;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceDataPort;
use crate::ports::result_port::ResultSink;
use crate::ports::store_port::StorePort;
use chrono::NaiveDate;
use postgres::NoTls;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use tracing::info;

type Manager = PostgresConnectionManager<NoTls>;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS stock_daily (
        stock_code VARCHAR(16) NOT NULL,
        trade_date DATE NOT NULL,
        open_price DOUBLE PRECISION NOT NULL,
        high_price DOUBLE PRECISION NOT NULL,
        low_price DOUBLE PRECISION NOT NULL,
        close_price DOUBLE PRECISION NOT NULL,
        volume DOUBLE PRECISION NOT NULL,
        amount DOUBLE PRECISION NOT NULL DEFAULT 0,
        PRIMARY KEY (stock_code, trade_date)
    );
    CREATE INDEX IF NOT EXISTS idx_stock_daily_date ON stock_daily(trade_date);
    CREATE TABLE IF NOT EXISTS backtest_results (
        id BIGSERIAL PRIMARY KEY,
        strategy_name VARCHAR(64) NOT NULL,
        stock_code VARCHAR(16) NOT NULL,
        start_date DATE NOT NULL,
        end_date DATE NOT NULL,
        initial_capital DOUBLE PRECISION NOT NULL,
        final_value DOUBLE PRECISION NOT NULL,
        total_return DOUBLE PRECISION NOT NULL,
        sharpe_ratio DOUBLE PRECISION,
        max_drawdown DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (strategy_name, stock_code, start_date, end_date)
    );";

pub struct PostgresAdapter {
    pool: Pool<Manager>,
}

fn pool_error(e: r2d2::Error) -> StockbtError {
    StockbtError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: postgres::Error) -> StockbtError {
    StockbtError::DatabaseQuery {
        reason: e.to_string(),
    }
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StockbtError> {
        let conninfo =
            config
                .get_string("database", "conninfo")
                .ok_or_else(|| StockbtError::ConfigMissing {
                    section: "database".into(),
                    key: "conninfo".into(),
                })?;
        let pool_size = config.get_int("database", "pool_size", 4).max(1) as u32;
        Self::connect(&conninfo, pool_size)
    }

    pub fn connect(conninfo: &str, pool_size: u32) -> Result<Self, StockbtError> {
        let pg_config = conninfo
            .parse::<postgres::Config>()
            .map_err(|e| StockbtError::ConfigInvalid {
                section: "database".into(),
                key: "conninfo".into(),
                reason: e.to_string(),
            })?;

        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<Manager>, StockbtError> {
        self.pool.get().map_err(pool_error)
    }
}

impl PriceDataPort for PostgresAdapter {
    fn fetch_bars(
        &self,
        instrument_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, StockbtError> {
        let mut conn = self.conn()?;

        let rows = conn
            .query(
                "SELECT trade_date, open_price, high_price, low_price, close_price, volume, amount
                 FROM stock_daily
                 WHERE stock_code = $1 AND trade_date >= $2 AND trade_date <= $3
                 ORDER BY trade_date ASC",
                &[&instrument_id, &start_date, &end_date],
            )
            .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|row| Bar {
                trade_date: row.get(0),
                open: row.get(1),
                high: row.get(2),
                low: row.get(3),
                close: row.get(4),
                volume: row.get(5),
                amount: row.get(6),
            })
            .collect())
    }

    fn list_instruments(&self) -> Result<Vec<String>, StockbtError> {
        let mut conn = self.conn()?;
        let rows = conn
            .query(
                "SELECT DISTINCT stock_code FROM stock_daily ORDER BY stock_code",
                &[],
            )
            .map_err(query_error)?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    fn get_data_range(
        &self,
        instrument_id: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StockbtError> {
        let mut conn = self.conn()?;
        let row = conn
            .query_one(
                "SELECT MIN(trade_date), MAX(trade_date), COUNT(*) FROM stock_daily WHERE stock_code = $1",
                &[&instrument_id],
            )
            .map_err(query_error)?;

        let min: Option<NaiveDate> = row.get(0);
        let max: Option<NaiveDate> = row.get(1);
        let count: i64 = row.get(2);

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => Ok(Some((min, max, count as usize))),
            _ => Ok(None),
        }
    }
}

impl ResultSink for PostgresAdapter {
    fn save_result(&self, record: &BacktestRecord) -> Result<(), StockbtError> {
        let mut conn = self.conn()?;
        conn.execute(
            "INSERT INTO backtest_results (strategy_name, stock_code, start_date, end_date,
                                           initial_capital, final_value, total_return,
                                           sharpe_ratio, max_drawdown)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (strategy_name, stock_code, start_date, end_date) DO UPDATE SET
                 initial_capital = EXCLUDED.initial_capital,
                 final_value = EXCLUDED.final_value,
                 total_return = EXCLUDED.total_return,
                 sharpe_ratio = EXCLUDED.sharpe_ratio,
                 max_drawdown = EXCLUDED.max_drawdown,
                 created_at = now()",
            &[
                &record.strategy_name,
                &record.instrument_id,
                &record.start_date,
                &record.end_date,
                &record.initial_capital,
                &record.final_value,
                &record.total_return_pct,
                &record.sharpe_ratio,
                &record.max_drawdown_pct,
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
        let mut conn = self.conn()?;
        let rows = conn
            .query(
                "SELECT strategy_name, stock_code, start_date, end_date, initial_capital,
                        final_value, total_return, sharpe_ratio, max_drawdown
                 FROM backtest_results
                 WHERE stock_code = $1
                 ORDER BY end_date DESC, start_date DESC, strategy_name ASC",
                &[&instrument_id],
            )
            .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|row| BacktestRecord {
                strategy_name: row.get(0),
                instrument_id: row.get(1),
                start_date: row.get(2),
                end_date: row.get(3),
                initial_capital: row.get(4),
                final_value: row.get(5),
                total_return_pct: row.get(6),
                sharpe_ratio: row.get(7),
                max_drawdown_pct: row.get(8),
            })
            .collect())
    }
}

impl StorePort for PostgresAdapter {
    fn initialize_schema(&self) -> Result<(), StockbtError> {
        let mut conn = self.conn()?;
        conn.batch_execute(SCHEMA).map_err(query_error)
    }

    fn append_bars(&self, instrument_id: &str, bars: &[Bar]) -> Result<usize, StockbtError> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_error)?;

        let latest: Option<NaiveDate> = tx
            .query_one(
                "SELECT MAX(trade_date) FROM stock_daily WHERE stock_code = $1",
                &[&instrument_id],
            )
            .map_err(query_error)?
            .get(0);

        let stmt = tx
            .prepare(
                "INSERT INTO stock_daily (stock_code, trade_date, open_price, high_price,
                                          low_price, close_price, volume, amount)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .map_err(query_error)?;

        let mut inserted = 0;
        for bar in bars
            .iter()
            .filter(|b| latest.is_none_or(|l| b.trade_date > l))
        {
            tx.execute(
                &stmt,
                &[
                    &instrument_id,
                    &bar.trade_date,
                    &bar.open,
                    &bar.high,
                    &bar.low,
                    &bar.close,
                    &bar.volume,
                    &bar.amount,
                ],
            )
            .map_err(query_error)?;
            inserted += 1;
        }

        tx.commit().map_err(query_error)?;

        info!(instrument = instrument_id, inserted, "bars appended");
        Ok(inserted)
    }
}
