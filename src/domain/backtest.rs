//! Backtest configuration, run request, and the single-run pipeline.
//!
//! Pipeline: check range -> fetch bars -> validate series -> run engine ->
//! build record. Any failure aborts before metrics exist, so a
//! [`BacktestRecord`] is only ever produced from a finished run.

use chrono::NaiveDate;
use tracing::info;

use super::broker::ExecutionConfig;
use super::engine::{CancelToken, Engine};
use super::error::StockbtError;
use super::metrics::{Metrics, MetricsConfig};
use super::portfolio::Portfolio;
use super::price_series;
use super::strategy::Strategy;
use crate::ports::data_port::PriceDataPort;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub execution: ExecutionConfig,
    pub metrics: MetricsConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            execution: ExecutionConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// What to backtest: one instrument over an inclusive date range.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRequest {
    pub instrument_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub final_value: f64,
    pub metrics: Metrics,
}

impl BacktestResult {
    pub fn total_return_pct(&self) -> f64 {
        self.metrics.total_return_pct
    }

    pub fn sharpe_ratio(&self) -> Option<f64> {
        self.metrics.sharpe_ratio
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        self.metrics.max_drawdown_pct
    }
}

/// Row handed to a result sink, keyed by
/// (strategy_name, instrument_id, start_date, end_date).
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRecord {
    pub strategy_name: String,
    pub instrument_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub final_value: f64,
    pub total_return_pct: f64,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown_pct: f64,
}

impl BacktestRecord {
    pub fn new(
        strategy_name: &str,
        request: &BacktestRequest,
        initial_capital: f64,
        result: &BacktestResult,
    ) -> Self {
        BacktestRecord {
            strategy_name: strategy_name.to_string(),
            instrument_id: request.instrument_id.clone(),
            start_date: request.start_date,
            end_date: request.end_date,
            initial_capital,
            final_value: result.final_value,
            total_return_pct: result.total_return_pct(),
            sharpe_ratio: result.sharpe_ratio(),
            max_drawdown_pct: result.max_drawdown_pct(),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct BacktestOutcome {
    pub record: BacktestRecord,
    pub result: BacktestResult,
    pub portfolio: Portfolio,
}

/// A run that failed after the engine started; carries the partial
/// portfolio for diagnostics alongside the cause.
#[derive(Debug)]
pub struct FailedRun {
    pub error: StockbtError,
    pub partial: Option<Portfolio>,
}

impl From<StockbtError> for FailedRun {
    fn from(error: StockbtError) -> Self {
        FailedRun {
            error,
            partial: None,
        }
    }
}

/// Runs one backtest end to end.
///
/// The range is checked before the data port is touched. Bars are fetched
/// once and validated, then a fresh [`Engine`] runs them through `strategy`.
pub fn run_backtest<P: PriceDataPort + ?Sized>(
    data_port: &P,
    request: &BacktestRequest,
    strategy: Box<dyn Strategy>,
    config: &BacktestConfig,
    cancel: Option<CancelToken>,
) -> Result<BacktestOutcome, FailedRun> {
    price_series::validate_range(request.start_date, request.end_date)?;

    let raw = data_port.fetch_bars(&request.instrument_id, request.start_date, request.end_date)?;
    info!(
        instrument = %request.instrument_id,
        fetched = raw.len(),
        "price data loaded"
    );

    let series = price_series::validate(
        &request.instrument_id,
        raw,
        request.start_date,
        request.end_date,
    )?;

    let mut engine = Engine::new(series, strategy, config.clone());
    if let Some(token) = cancel {
        engine = engine.with_cancel(token);
    }

    match engine.run() {
        Ok(result) => {
            let record = BacktestRecord::new(
                engine.strategy_name(),
                request,
                config.initial_capital,
                &result,
            );
            Ok(BacktestOutcome {
                record,
                result,
                portfolio: engine.into_portfolio(),
            })
        }
        Err(error) => Err(FailedRun {
            error,
            partial: Some(engine.into_portfolio()),
        }),
    }
}
