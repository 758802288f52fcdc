//! Domain error types.

use chrono::NaiveDate;

use super::engine::EngineState;

/// Failure reported by a strategy's decision function.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct StrategyError {
    pub message: String,
}

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Top-level error type for stockbt.
#[derive(Debug, thiserror::Error)]
pub enum StockbtError {
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("no bars for {instrument} between {start} and {end}")]
    EmptySeries {
        instrument: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("malformed bar on {date}: {reason}")]
    MalformedBar { date: NaiveDate, reason: String },

    #[error("strategy failed on {date}: {source}")]
    Strategy {
        date: NaiveDate,
        #[source]
        source: StrategyError,
    },

    #[error("run cancelled after {processed} bars")]
    Cancelled { processed: usize },

    #[error("engine cannot run from state {state:?}")]
    EngineNotReady { state: EngineState },

    #[error("unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&StockbtError> for std::process::ExitCode {
    fn from(err: &StockbtError) -> Self {
        let code: u8 = match err {
            StockbtError::Io(_) => 1,
            StockbtError::ConfigParse { .. }
            | StockbtError::ConfigMissing { .. }
            | StockbtError::ConfigInvalid { .. } => 2,
            StockbtError::Database { .. }
            | StockbtError::DatabaseQuery { .. }
            | StockbtError::DataSource { .. } => 3,
            StockbtError::Strategy { .. }
            | StockbtError::UnknownStrategy { .. }
            | StockbtError::Cancelled { .. }
            | StockbtError::EngineNotReady { .. } => 4,
            StockbtError::InvalidRange { .. }
            | StockbtError::EmptySeries { .. }
            | StockbtError::MalformedBar { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn invalid_range_message_names_both_dates() {
        let err = StockbtError::InvalidRange {
            start: date(2024, 2, 1),
            end: date(2024, 1, 1),
        };
        assert_eq!(
            err.to_string(),
            "invalid date range: start 2024-02-01 is after end 2024-01-01"
        );
    }

    #[test]
    fn malformed_bar_identifies_date() {
        let err = StockbtError::MalformedBar {
            date: date(2024, 3, 5),
            reason: "low above close".into(),
        };
        assert!(err.to_string().contains("2024-03-05"));
    }

    #[test]
    fn strategy_error_keeps_source() {
        let err = StockbtError::Strategy {
            date: date(2024, 1, 2),
            source: StrategyError::new("indicator exploded"),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "indicator exploded");
    }

    #[test]
    fn exit_codes_group_by_category() {
        let cases: Vec<(StockbtError, std::process::ExitCode)> = vec![
            (
                StockbtError::ConfigMissing {
                    section: "backtest".into(),
                    key: "code".into(),
                },
                std::process::ExitCode::from(2),
            ),
            (
                StockbtError::Database {
                    reason: "down".into(),
                },
                std::process::ExitCode::from(3),
            ),
            (
                StockbtError::UnknownStrategy {
                    name: "nope".into(),
                },
                std::process::ExitCode::from(4),
            ),
            (
                StockbtError::EmptySeries {
                    instrument: "000001".into(),
                    start: date(2024, 1, 1),
                    end: date(2024, 1, 31),
                },
                std::process::ExitCode::from(5),
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(
                format!("{:?}", std::process::ExitCode::from(&err)),
                format!("{:?}", expected)
            );
        }
    }
}
