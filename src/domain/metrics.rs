//! Performance metrics derived from a finished run's equity curve and
//! trade log.
//!
//! Percent-valued fields are expressed in percent (`-20.0` means -20%).
//! The Sharpe ratio uses the sample standard deviation of per-bar simple
//! returns and is `None` whenever it is mathematically undefined.

use super::portfolio::{EquityPoint, Portfolio};

pub const DEFAULT_TRADING_DAYS_PER_YEAR: u32 = 252;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub trading_days_per_year: u32,
    /// Multiply the per-bar Sharpe ratio by sqrt(trading_days_per_year).
    pub annualize_sharpe: bool,
    /// Annual rate, converted to a per-bar rate for the Sharpe numerator.
    pub risk_free_rate: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            trading_days_per_year: DEFAULT_TRADING_DAYS_PER_YEAR,
            annualize_sharpe: true,
            risk_free_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown_pct: f64,
    /// Longest run of consecutive bars spent below a prior equity peak.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate_pct: f64,
    pub avg_holding_days: f64,
}

impl Metrics {
    pub fn compute(portfolio: &Portfolio, config: &MetricsConfig) -> Self {
        let equity_curve = &portfolio.equity_curve;
        let initial_capital = portfolio.initial_capital;
        let final_equity = portfolio.final_equity();

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let trading_days = equity_curve.len() as f64;
        let years = trading_days / config.trading_days_per_year.max(1) as f64;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let sharpe_ratio = compute_sharpe(equity_curve, config);

        let trades = &portfolio.closed_trades;
        let trades_won = trades.iter().filter(|t| t.pnl > 0.0).count();
        let trades_lost = trades.iter().filter(|t| t.pnl < 0.0).count();
        let total_trades = trades.len();
        let trades_breakeven = total_trades - trades_won - trades_lost;

        let win_rate_pct = if total_trades > 0 {
            trades_won as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let avg_holding_days = if total_trades > 0 {
            trades.iter().map(|t| t.holding_days()).sum::<i64>() as f64 / total_trades as f64
        } else {
            0.0
        };

        Metrics {
            total_return_pct: total_return * 100.0,
            annualized_return_pct: annualized_return * 100.0,
            sharpe_ratio,
            max_drawdown_pct: max_drawdown * 100.0,
            max_drawdown_duration,
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate_pct,
            avg_holding_days,
        }
    }
}

/// Per-bar simple returns `equity[i] / equity[i-1] - 1`.
pub fn simple_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 { w[1].equity / prev - 1.0 } else { 0.0 }
        })
        .collect()
}

/// Maximum peak-to-trough decline as a fraction of the peak, and the
/// longest stretch of bars spent under water.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut current_duration = 0usize;
    let mut max_duration = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            current_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_duration += 1;
            max_duration = max_duration.max(current_duration);
        }
    }

    (max_dd, max_duration)
}

fn compute_sharpe(equity_curve: &[EquityPoint], config: &MetricsConfig) -> Option<f64> {
    let returns = simple_returns(equity_curve);
    // Sample standard deviation needs at least two observations.
    if returns.len() < 2 {
        return None;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();

    // Treat rounding noise on a constant return series as zero variance.
    if stddev.is_nan() || stddev < 1e-12 {
        return None;
    }

    let periods = config.trading_days_per_year.max(1) as f64;
    let per_bar_rf = config.risk_free_rate / periods;
    let mut sharpe = (mean - per_bar_rf) / stddev;
    if config.annualize_sharpe {
        sharpe *= periods.sqrt();
    }

    sharpe.is_finite().then_some(sharpe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::ClosedTrade;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                equity: v,
            })
            .collect()
    }

    fn make_portfolio(initial: f64, equity: &[f64], trades: Vec<ClosedTrade>) -> Portfolio {
        let mut portfolio = Portfolio::new(initial);
        for trade in trades {
            portfolio.record_trade(trade);
        }
        for point in make_equity_curve(equity) {
            portfolio.record_equity(point.date, point.equity);
        }
        portfolio
    }

    fn make_trade(pnl: f64, days: i64) -> ClosedTrade {
        let entry_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ClosedTrade {
            quantity: 100,
            entry_price: 100.0,
            exit_price: 100.0 + pnl / 100.0,
            entry_date,
            exit_date: entry_date + chrono::Duration::days(days),
            pnl,
        }
    }

    fn per_bar() -> MetricsConfig {
        MetricsConfig {
            annualize_sharpe: false,
            ..MetricsConfig::default()
        }
    }

    #[test]
    fn total_return_pct_negative() {
        let portfolio = make_portfolio(100_000.0, &[100_000.0, 120_000.0, 80_000.0], vec![]);
        let metrics = Metrics::compute(&portfolio, &MetricsConfig::default());
        assert_relative_eq!(metrics.total_return_pct, -20.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_curve_has_zero_return_and_no_sharpe() {
        let portfolio = Portfolio::new(100_000.0);
        let metrics = Metrics::compute(&portfolio, &MetricsConfig::default());
        assert_eq!(metrics.total_return_pct, 0.0);
        assert_eq!(metrics.max_drawdown_pct, 0.0);
        assert_eq!(metrics.sharpe_ratio, None);
    }

    #[test]
    fn single_point_sharpe_undefined() {
        let portfolio = make_portfolio(100.0, &[110.0], vec![]);
        let metrics = Metrics::compute(&portfolio, &MetricsConfig::default());
        assert_eq!(metrics.sharpe_ratio, None);
    }

    #[test]
    fn single_return_sharpe_undefined() {
        let portfolio = make_portfolio(100.0, &[100.0, 110.0], vec![]);
        let metrics = Metrics::compute(&portfolio, &MetricsConfig::default());
        assert_eq!(metrics.sharpe_ratio, None);
    }

    #[test]
    fn constant_returns_sharpe_undefined() {
        // Flat curve: every return is exactly zero.
        let portfolio = make_portfolio(100.0, &[100.0, 100.0, 100.0, 100.0], vec![]);
        let metrics = Metrics::compute(&portfolio, &MetricsConfig::default());
        assert_eq!(metrics.sharpe_ratio, None);
    }

    #[test]
    fn sharpe_uses_sample_stddev() {
        // returns: +10%, -10%, +10%
        let curve = [100.0, 110.0, 99.0, 108.9];
        let portfolio = make_portfolio(100.0, &curve, vec![]);
        let metrics = Metrics::compute(&portfolio, &per_bar());

        let returns = [0.1, -0.1, 0.1];
        let mean = returns.iter().sum::<f64>() / 3.0;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 2.0;
        assert_relative_eq!(
            metrics.sharpe_ratio.unwrap(),
            mean / var.sqrt(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn sharpe_annualization_scales_by_sqrt_days() {
        let curve = [100.0, 101.0, 100.5, 102.0, 101.0];
        let portfolio = make_portfolio(100.0, &curve, vec![]);
        let raw = Metrics::compute(&portfolio, &per_bar()).sharpe_ratio.unwrap();
        let annual = Metrics::compute(&portfolio, &MetricsConfig::default())
            .sharpe_ratio
            .unwrap();
        assert_relative_eq!(annual, raw * 252f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn sharpe_custom_trading_days() {
        let curve = [100.0, 101.0, 100.5, 102.0];
        let portfolio = make_portfolio(100.0, &curve, vec![]);
        let raw = Metrics::compute(&portfolio, &per_bar()).sharpe_ratio.unwrap();
        let config = MetricsConfig {
            trading_days_per_year: 244,
            ..MetricsConfig::default()
        };
        let annual = Metrics::compute(&portfolio, &config).sharpe_ratio.unwrap();
        assert_relative_eq!(annual, raw * 244f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn risk_free_rate_lowers_sharpe() {
        let curve = [100.0, 101.0, 100.5, 102.0, 103.0];
        let portfolio = make_portfolio(100.0, &curve, vec![]);
        let base = Metrics::compute(&portfolio, &MetricsConfig::default())
            .sharpe_ratio
            .unwrap();
        let with_rf = Metrics::compute(
            &portfolio,
            &MetricsConfig {
                risk_free_rate: 0.05,
                ..MetricsConfig::default()
            },
        )
        .sharpe_ratio
        .unwrap();
        assert!(with_rf < base);
    }

    #[test]
    fn max_drawdown_zero_for_non_decreasing_curve() {
        let curve = make_equity_curve(&[100.0, 100.0, 105.0, 110.0]);
        let (dd, duration) = compute_drawdown(&curve);
        assert_eq!(dd, 0.0);
        assert_eq!(duration, 0);
    }

    #[test]
    fn max_drawdown_single_peak_single_trough() {
        let curve = make_equity_curve(&[100_000.0, 120_000.0, 80_000.0]);
        let (dd, _) = compute_drawdown(&curve);
        assert_relative_eq!(dd * 100.0, 100.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn max_drawdown_picks_deepest() {
        let curve = make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        let (dd, _) = compute_drawdown(&curve);
        assert_relative_eq!(dd, (110.0 - 80.0) / 110.0, epsilon = 1e-9);
    }

    #[test]
    fn max_drawdown_duration_counts_bars_under_water() {
        let curve = make_equity_curve(&[100.0, 110.0, 100.0, 90.0, 85.0, 95.0, 111.0]);
        let (_, duration) = compute_drawdown(&curve);
        assert_eq!(duration, 4);
    }

    #[test]
    fn annualized_return_flat_is_zero() {
        let values = vec![100_000.0; 252];
        let portfolio = make_portfolio(100_000.0, &values, vec![]);
        let metrics = Metrics::compute(&portfolio, &MetricsConfig::default());
        assert_relative_eq!(metrics.annualized_return_pct, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn annualized_return_one_year() {
        let mut values = vec![100_000.0; 251];
        values.push(110_000.0);
        let portfolio = make_portfolio(100_000.0, &values, vec![]);
        let metrics = Metrics::compute(&portfolio, &MetricsConfig::default());
        assert_relative_eq!(metrics.annualized_return_pct, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn trade_stats() {
        let trades = vec![
            make_trade(100.0, 5),
            make_trade(-50.0, 3),
            make_trade(200.0, 10),
            make_trade(0.0, 2),
        ];
        let portfolio = make_portfolio(100_000.0, &[100_000.0, 100_250.0], trades);
        let metrics = Metrics::compute(&portfolio, &MetricsConfig::default());

        assert_eq!(metrics.total_trades, 4);
        assert_eq!(metrics.trades_won, 2);
        assert_eq!(metrics.trades_lost, 1);
        assert_eq!(metrics.trades_breakeven, 1);
        assert_relative_eq!(metrics.win_rate_pct, 50.0);
        assert_relative_eq!(metrics.avg_holding_days, 5.0);
    }

    #[test]
    fn no_trades_stats_are_zero() {
        let portfolio = make_portfolio(100_000.0, &[100_000.0, 110_000.0], vec![]);
        let metrics = Metrics::compute(&portfolio, &MetricsConfig::default());
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate_pct, 0.0);
        assert_eq!(metrics.avg_holding_days, 0.0);
    }

    #[test]
    fn simple_returns_length_is_n_minus_one() {
        let curve = make_equity_curve(&[100.0, 110.0, 99.0]);
        let returns = simple_returns(&curve);
        assert_eq!(returns.len(), 2);
        assert_relative_eq!(returns[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(returns[1], -0.1, epsilon = 1e-12);
    }
}
