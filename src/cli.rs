//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::{CsvAdapter, read_bars_from_path};
use crate::adapters::equity_csv::write_equity_curve;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestOutcome, FailedRun, run_backtest};
use crate::domain::config_validation::{
    load_backtest_config, load_backtest_request, load_strategy_name, load_strategy_params,
    validate_backtest_config, validate_strategy_config,
};
use crate::domain::error::StockbtError;
use crate::domain::strategy::{STRATEGY_NAMES, build_strategy};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceDataPort;
use crate::ports::result_port::ResultSink;
use crate::ports::store_port::StorePort;

#[derive(Parser, Debug)]
#[command(name = "stockbt", about = "Daily single-stock strategy backtester")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the price and result tables
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Import a CSV price export into the database
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        code: String,
    },
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        code: Option<String>,
        #[arg(long, value_parser = parse_cli_date)]
        start: Option<NaiveDate>,
        #[arg(long, value_parser = parse_cli_date)]
        end: Option<NaiveDate>,
        #[arg(short, long)]
        strategy: Option<String>,
        /// Read prices from `{code}.csv` files in this directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Write the equity curve as CSV
        #[arg(long)]
        equity_out: Option<PathBuf>,
        /// Do not persist the result
        #[arg(long)]
        no_save: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Show stored data range for an instrument
    Info {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        code: String,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// List saved backtest results for an instrument
    Results {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
    },
    /// List registered strategy names
    Strategies,
}

/// Everything `backtest` needs besides the config file.
#[derive(Debug, Default)]
pub struct BacktestArgs {
    pub code: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub strategy: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub equity_out: Option<PathBuf>,
    pub no_save: bool,
    pub dry_run: bool,
}

fn parse_cli_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{value}', expected YYYY-MM-DD"))
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::InitDb { config } => run_init_db(&config),
        Command::Import { config, file, code } => run_import(&config, &file, &code),
        Command::Backtest {
            config,
            code,
            start,
            end,
            strategy,
            data_dir,
            equity_out,
            no_save,
            dry_run,
        } => run_backtest_command(
            config.as_deref(),
            BacktestArgs {
                code,
                start,
                end,
                strategy,
                data_dir,
                equity_out,
                no_save,
                dry_run,
            },
        ),
        Command::Info {
            config,
            code,
            data_dir,
        } => run_info(config.as_deref(), &code, data_dir.as_deref()),
        Command::Results { config, code } => run_results(&config, &code),
        Command::Strategies => {
            for name in STRATEGY_NAMES {
                println!("{name}");
            }
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, StockbtError> {
    match path {
        Some(p) => {
            eprintln!("Loading config from {}", p.display());
            FileConfigAdapter::from_file(p)
        }
        None => Ok(FileConfigAdapter::empty()),
    }
}

fn has_database(config: &dyn ConfigPort) -> bool {
    config.get_string("database", "path").is_some()
        || config.get_string("database", "conninfo").is_some()
}

/// Opens the backend named by `[database] backend` (default `sqlite`).
pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn StorePort>, StockbtError> {
    let backend = config
        .get_string("database", "backend")
        .unwrap_or_else(|| "sqlite".to_string())
        .to_lowercase();

    match backend.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            use crate::adapters::sqlite_adapter::SqliteAdapter;
            Ok(Box::new(SqliteAdapter::from_config(config)?))
        }
        #[cfg(feature = "postgres")]
        "postgres" | "postgresql" => {
            use crate::adapters::postgres_adapter::PostgresAdapter;
            Ok(Box::new(PostgresAdapter::from_config(config)?))
        }
        other => Err(StockbtError::ConfigInvalid {
            section: "database".into(),
            key: "backend".into(),
            reason: format!("backend '{other}' is unknown or not compiled in"),
        }),
    }
}

fn run_init_db(config_path: &Path) -> Result<(), StockbtError> {
    let config = load_config(Some(config_path))?;
    let store = open_store(&config)?;
    store.initialize_schema()?;
    eprintln!("Schema ready");
    Ok(())
}

fn run_import(config_path: &Path, file: &Path, code: &str) -> Result<(), StockbtError> {
    let config = load_config(Some(config_path))?;

    let mut bars = read_bars_from_path(file)?;
    bars.sort_by_key(|b| b.trade_date);
    for pair in bars.windows(2) {
        if pair[0].trade_date == pair[1].trade_date {
            return Err(StockbtError::MalformedBar {
                date: pair[1].trade_date,
                reason: "duplicate trade date".into(),
            });
        }
    }
    for bar in &bars {
        bar.check().map_err(|reason| StockbtError::MalformedBar {
            date: bar.trade_date,
            reason,
        })?;
    }

    let store = open_store(&config)?;
    store.initialize_schema()?;
    let inserted = store.append_bars(code, &bars)?;
    println!(
        "{code}: {inserted} new bars imported ({} already stored)",
        bars.len() - inserted
    );
    Ok(())
}

pub fn run_backtest_command(
    config_path: Option<&Path>,
    args: BacktestArgs,
) -> Result<(), StockbtError> {
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;
    validate_strategy_config(&config)?;

    let strategy_name = load_strategy_name(&config, args.strategy.as_deref());
    let strategy = build_strategy(&strategy_name, &load_strategy_params(&config))?;
    let request = load_backtest_request(&config, args.code.as_deref(), args.start, args.end)?;
    let bt_config = load_backtest_config(&config);

    if args.dry_run {
        println!(
            "Dry run OK: {} on {} from {} to {}, initial capital {:.2}",
            strategy.name(),
            request.instrument_id,
            request.start_date,
            request.end_date,
            bt_config.initial_capital
        );
        return Ok(());
    }

    let store = if args.data_dir.is_none() || (!args.no_save && has_database(&config)) {
        Some(open_store(&config)?)
    } else {
        None
    };

    let outcome = match (&args.data_dir, &store) {
        (Some(dir), _) => run_backtest(
            &CsvAdapter::new(dir.clone()),
            &request,
            strategy,
            &bt_config,
            None,
        ),
        (None, Some(s)) => run_backtest(s.as_ref(), &request, strategy, &bt_config, None),
        (None, None) => {
            return Err(StockbtError::ConfigMissing {
                section: "database".into(),
                key: "path".into(),
            });
        }
    };

    let outcome = match outcome {
        Ok(o) => o,
        Err(failed) => return Err(handle_failed_run(failed, args.equity_out.as_deref())),
    };

    print_summary(&outcome);

    if let Some(path) = &args.equity_out {
        write_equity_curve(path, &outcome.portfolio.equity_curve)?;
        eprintln!("Equity curve written to: {}", path.display());
    }

    match (&store, args.no_save) {
        (Some(sink), false) => {
            // A CSV-fed run may be the first thing to touch this database.
            sink.initialize_schema()?;
            sink.save_result(&outcome.record)?;
        }
        (_, true) => info!("result not saved (--no-save)"),
        (None, false) => info!("no [database] configured; result not saved"),
    }

    Ok(())
}

fn handle_failed_run(failed: FailedRun, equity_out: Option<&Path>) -> StockbtError {
    if let (Some(path), Some(partial)) = (equity_out, failed.partial.as_ref()) {
        match write_equity_curve(path, &partial.equity_curve) {
            Ok(()) => warn!(
                path = %path.display(),
                points = partial.equity_curve.len(),
                "partial equity curve written for diagnostics; no result recorded"
            ),
            Err(e) => warn!(error = %e, "could not write partial equity curve"),
        }
    }
    failed.error
}

fn format_sharpe(sharpe: Option<f64>) -> String {
    sharpe.map_or_else(|| "n/a".to_string(), |s| format!("{s:.4}"))
}

fn print_summary(outcome: &BacktestOutcome) {
    let record = &outcome.record;
    let m = &outcome.result.metrics;

    println!("=== Backtest Results ===");
    println!("Strategy:         {}", record.strategy_name);
    println!("Instrument:       {}", record.instrument_id);
    println!("Period:           {} to {}", record.start_date, record.end_date);
    println!("Initial Capital:  {:.2}", record.initial_capital);
    println!("Final Value:      {:.2}", record.final_value);
    println!("Total Return:     {:.2}%", record.total_return_pct);
    println!("Annualized:       {:.2}%", m.annualized_return_pct);
    println!("Sharpe Ratio:     {}", format_sharpe(record.sharpe_ratio));
    println!("Max Drawdown:     {:.2}%", record.max_drawdown_pct);
    println!("Total Trades:     {}", m.total_trades);
    println!("Win Rate:         {:.1}%", m.win_rate_pct);
}

fn run_info(
    config_path: Option<&Path>,
    code: &str,
    data_dir: Option<&Path>,
) -> Result<(), StockbtError> {
    let range = match data_dir {
        Some(dir) => CsvAdapter::new(dir.to_path_buf()).get_data_range(code)?,
        None => {
            let config = load_config(config_path)?;
            open_store(&config)?.get_data_range(code)?
        }
    };

    match range {
        Some((first, last, count)) => println!("{code}: {first} to {last} ({count} bars)"),
        None => println!("{code}: no data"),
    }
    Ok(())
}

fn run_results(config_path: &Path, code: &str) -> Result<(), StockbtError> {
    let config = load_config(Some(config_path))?;
    let store = open_store(&config)?;
    let records = store.list_results(code)?;

    if records.is_empty() {
        println!("{code}: no saved results");
        return Ok(());
    }

    println!(
        "{:<20} {:<10} {:<10} {:>14} {:>10} {:>8} {:>10}",
        "strategy", "start", "end", "final_value", "return%", "sharpe", "max_dd%"
    );
    for r in &records {
        println!(
            "{:<20} {:<10} {:<10} {:>14.2} {:>10.2} {:>8} {:>10.2}",
            r.strategy_name,
            r.start_date,
            r.end_date,
            r.final_value,
            r.total_return_pct,
            format_sharpe(r.sharpe_ratio),
            r.max_drawdown_pct
        );
    }
    Ok(())
}
