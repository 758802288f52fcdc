//! Configuration validation and loading.
//!
//! Every key is checked before a run starts. Loaders assume the matching
//! `validate_*` call already passed, but still fall back to defaults rather
//! than panic.

use crate::domain::backtest::{BacktestConfig, BacktestRequest};
use crate::domain::broker::ExecutionConfig;
use crate::domain::error::StockbtError;
use crate::domain::metrics::{DEFAULT_TRADING_DAYS_PER_YEAR, MetricsConfig};
use crate::domain::price_series::validate_range;
use crate::domain::strategy::StrategyParams;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const DEFAULT_STRATEGY: &str = "moving_average_cross";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), StockbtError> {
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_risk_free_rate(config)?;
    validate_trading_days(config)?;
    validate_annualize_flag(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), StockbtError> {
    validate_ma_period(config)?;
    Ok(())
}

/// Builds the engine configuration from the `[backtest]` section.
pub fn load_backtest_config(config: &dyn ConfigPort) -> BacktestConfig {
    let defaults = BacktestConfig::default();
    BacktestConfig {
        initial_capital: config.get_double("backtest", "initial_capital", defaults.initial_capital),
        execution: ExecutionConfig {
            commission_per_trade: config.get_double("backtest", "commission_per_trade", 0.0),
            commission_pct: config.get_double("backtest", "commission_pct", 0.0),
        },
        metrics: MetricsConfig {
            trading_days_per_year: config.get_int(
                "backtest",
                "trading_days_per_year",
                i64::from(DEFAULT_TRADING_DAYS_PER_YEAR),
            ) as u32,
            annualize_sharpe: config.get_bool("backtest", "annualize_sharpe", true),
            risk_free_rate: config.get_double("backtest", "risk_free_rate", 0.0),
        },
    }
}

pub fn load_strategy_params(config: &dyn ConfigPort) -> StrategyParams {
    let defaults = StrategyParams::default();
    StrategyParams {
        ma_period: config.get_int("strategy", "ma_period", defaults.ma_period as i64) as usize,
    }
}

/// Strategy name from `override_name`, else `[strategy] name`, else the default.
pub fn load_strategy_name(config: &dyn ConfigPort, override_name: Option<&str>) -> String {
    override_name
        .map(str::to_string)
        .or_else(|| config.get_string("strategy", "name"))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_STRATEGY.to_string())
}

/// Resolves instrument and date range, preferring explicit overrides over
/// `[backtest] code / start_date / end_date`.
pub fn load_backtest_request(
    config: &dyn ConfigPort,
    code: Option<&str>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Result<BacktestRequest, StockbtError> {
    let instrument_id = match code {
        Some(c) if !c.trim().is_empty() => c.trim().to_string(),
        _ => match config.get_string("backtest", "code") {
            Some(c) if !c.trim().is_empty() => c.trim().to_string(),
            _ => {
                return Err(StockbtError::ConfigMissing {
                    section: "backtest".to_string(),
                    key: "code".to_string(),
                });
            }
        },
    };

    let start_date = match start_date {
        Some(d) => d,
        None => parse_date(config.get_string("backtest", "start_date").as_deref(), "start_date")?,
    };
    let end_date = match end_date {
        Some(d) => d,
        None => parse_date(config.get_string("backtest", "end_date").as_deref(), "end_date")?,
    };
    validate_range(start_date, end_date)?;

    Ok(BacktestRequest {
        instrument_id,
        start_date,
        end_date,
    })
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), StockbtError> {
    let value = parse_present_double(config, "backtest", "initial_capital")?.unwrap_or(100_000.0);
    if !value.is_finite() || value <= 0.0 {
        return Err(StockbtError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "initial_capital".to_string(),
            reason: "initial_capital must be positive".to_string(),
        });
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), StockbtError> {
    for key in ["commission_per_trade", "commission_pct"] {
        let value = parse_present_double(config, "backtest", key)?.unwrap_or(0.0);
        if !value.is_finite() || value < 0.0 {
            return Err(StockbtError::ConfigInvalid {
                section: "backtest".to_string(),
                key: key.to_string(),
                reason: format!("{key} must be non-negative"),
            });
        }
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), StockbtError> {
    let value = parse_present_double(config, "backtest", "risk_free_rate")?.unwrap_or(0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(StockbtError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "risk_free_rate".to_string(),
            reason: "risk_free_rate must be between 0 and 1".to_string(),
        });
    }
    Ok(())
}

fn validate_trading_days(config: &dyn ConfigPort) -> Result<(), StockbtError> {
    let value = parse_present_int(config, "backtest", "trading_days_per_year")?
        .unwrap_or(i64::from(DEFAULT_TRADING_DAYS_PER_YEAR));
    if !(1..=366).contains(&value) {
        return Err(StockbtError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "trading_days_per_year".to_string(),
            reason: "trading_days_per_year must be between 1 and 366".to_string(),
        });
    }
    Ok(())
}

fn validate_annualize_flag(config: &dyn ConfigPort) -> Result<(), StockbtError> {
    if let Some(raw) = config.get_string("backtest", "annualize_sharpe") {
        let ok = matches!(
            raw.trim().to_lowercase().as_str(),
            "true" | "yes" | "1" | "false" | "no" | "0"
        );
        if !ok {
            return Err(StockbtError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "annualize_sharpe".to_string(),
                reason: format!("expected a boolean, got '{raw}'"),
            });
        }
    }
    Ok(())
}

/// Dates may come from the command line instead, so absence is not an
/// error here; a present date must parse and the pair must be ordered.
fn validate_dates(config: &dyn ConfigPort) -> Result<(), StockbtError> {
    let start = config.get_string("backtest", "start_date");
    let end = config.get_string("backtest", "end_date");

    let start_date = start
        .as_deref()
        .map(|s| parse_date(Some(s), "start_date"))
        .transpose()?;
    let end_date = end
        .as_deref()
        .map(|s| parse_date(Some(s), "end_date"))
        .transpose()?;

    if let (Some(s), Some(e)) = (start_date, end_date) {
        validate_range(s, e)?;
    }
    Ok(())
}

fn validate_ma_period(config: &dyn ConfigPort) -> Result<(), StockbtError> {
    let value = parse_present_int(config, "strategy", "ma_period")?
        .unwrap_or(StrategyParams::default().ma_period as i64);
    if value < 1 {
        return Err(StockbtError::ConfigInvalid {
            section: "strategy".to_string(),
            key: "ma_period".to_string(),
            reason: "ma_period must be at least 1".to_string(),
        });
    }
    Ok(())
}

pub fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, StockbtError> {
    match value {
        None => Err(StockbtError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            StockbtError::ConfigInvalid {
                section: "backtest".to_string(),
                key: field.to_string(),
                reason: format!("invalid {} format, expected YYYY-MM-DD", field),
            }
        }),
    }
}

// `get_double`/`get_int` silently fall back on garbage; reject it instead.
fn parse_present_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, StockbtError> {
    config
        .get_string(section, key)
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .map_err(|_| StockbtError::ConfigInvalid {
                    section: section.to_string(),
                    key: key.to_string(),
                    reason: format!("expected a number, got '{raw}'"),
                })
        })
        .transpose()
}

fn parse_present_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<i64>, StockbtError> {
    config
        .get_string(section, key)
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| StockbtError::ConfigInvalid {
                    section: section.to_string(),
                    key: key.to_string(),
                    reason: format!("expected an integer, got '{raw}'"),
                })
        })
        .transpose()
}
