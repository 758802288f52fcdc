//! Bar-by-bar simulation loop.
//!
//! READY -> RUNNING -> FINISHED | FAILED. An engine runs exactly once; any
//! further `run` call is rejected with `EngineNotReady`. On failure the
//! partial portfolio (equity curve up to the failing bar) stays readable
//! through [`Engine::portfolio`] but no metrics are produced.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use super::backtest::{BacktestConfig, BacktestResult};
use super::broker::{Broker, FillOutcome};
use super::error::StockbtError;
use super::metrics::Metrics;
use super::portfolio::Portfolio;
use super::price_series::PriceSeries;
use super::strategy::{MarketView, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Ready,
    Running,
    Finished,
    Failed,
}

/// Cooperative cancellation flag, checked between bars.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Engine {
    series: PriceSeries,
    strategy: Box<dyn Strategy>,
    broker: Broker,
    config: BacktestConfig,
    state: EngineState,
    cancel: Option<CancelToken>,
}

impl Engine {
    pub fn new(series: PriceSeries, strategy: Box<dyn Strategy>, config: BacktestConfig) -> Self {
        let broker = Broker::new(config.initial_capital, config.execution.clone());
        Engine {
            series,
            strategy,
            broker,
            config,
            state: EngineState::Ready,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Portfolio as of the last processed bar. After a failed run this
    /// holds the partial equity curve for diagnostics.
    pub fn portfolio(&self) -> &Portfolio {
        self.broker.portfolio()
    }

    pub fn into_portfolio(self) -> Portfolio {
        self.broker.into_portfolio()
    }

    pub fn run(&mut self) -> Result<BacktestResult, StockbtError> {
        if self.state != EngineState::Ready {
            return Err(StockbtError::EngineNotReady { state: self.state });
        }
        self.state = EngineState::Running;

        info!(
            strategy = self.strategy.name(),
            instrument = self.series.instrument_id(),
            bars = self.series.len(),
            initial_capital = self.config.initial_capital,
            "backtest started"
        );

        let bars = self.series.bars();
        let mut fills = 0usize;

        for i in 0..bars.len() {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                self.state = EngineState::Failed;
                warn!(processed = i, "backtest cancelled");
                return Err(StockbtError::Cancelled { processed: i });
            }

            let bar = &bars[i];
            let view = MarketView {
                history: &bars[..=i],
                position: self.broker.position(),
            };

            let intent = match self.strategy.decide(&view) {
                Ok(intent) => intent,
                Err(source) => {
                    self.state = EngineState::Failed;
                    warn!(date = %bar.trade_date, error = %source, "strategy failed");
                    return Err(StockbtError::Strategy {
                        date: bar.trade_date,
                        source,
                    });
                }
            };

            if !matches!(self.broker.apply(intent, bar), FillOutcome::NoChange(_)) {
                fills += 1;
            }
        }

        self.state = EngineState::Finished;

        let portfolio = self.broker.portfolio();
        let metrics = Metrics::compute(portfolio, &self.config.metrics);
        let result = BacktestResult {
            final_value: portfolio.final_equity(),
            metrics,
        };

        info!(
            fills,
            final_value = result.final_value,
            total_return_pct = result.metrics.total_return_pct,
            "backtest finished"
        );

        Ok(result)
    }
}
