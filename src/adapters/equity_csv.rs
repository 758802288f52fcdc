//! Equity curve export as `date,equity` CSV.

use crate::domain::error::StockbtError;
use crate::domain::portfolio::EquityPoint;
use std::path::Path;

pub fn write_equity_curve(path: &Path, curve: &[EquityPoint]) -> Result<(), StockbtError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| StockbtError::DataSource {
        reason: format!("failed to create {}: {}", path.display(), e),
    })?;

    writer
        .write_record(["date", "equity"])
        .map_err(|e| StockbtError::DataSource {
            reason: e.to_string(),
        })?;
    for point in curve {
        writer
            .write_record([
                point.date.format("%Y-%m-%d").to_string(),
                format!("{:.4}", point.equity),
            ])
            .map_err(|e| StockbtError::DataSource {
                reason: e.to_string(),
            })?;
    }

    writer.flush()?;
    Ok(())
}
