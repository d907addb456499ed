//! Bar ingestion (ambient utility around C1).
//!
//! Parses a tabular CSV source into a validated [`BarSeries`]. This is the
//! only place in the crate that deals with loosely typed external input —
//! everything downstream of a successfully constructed `BarSeries` is
//! infallible, per the error taxonomy in the design notes.

use std::io::Read;

use chrono::DateTime;

use crate::bar_store::{BarRow, BarSeries};
use crate::error::BacktestError;

const REQUIRED_COLUMNS: &[&str] = &["open", "high", "low", "close", "volume"];

/// Parses CSV bytes into a `BarSeries`. Column names are matched
/// case-insensitively; the time column may be named `time` or `datetime`.
/// `time` values are accepted either as integer epoch seconds or as a
/// timestamp string parseable by `chrono` (RFC 3339, falling back to
/// `%Y-%m-%d %H:%M:%S`).
pub fn bar_series_from_csv<R: Read>(reader: R) -> Result<BarSeries, BacktestError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers = rdr.headers().map_err(|e| BacktestError::MissingColumn(e.to_string()))?.clone();
    let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    let time_col = lower
        .iter()
        .position(|h| h == "time" || h == "datetime")
        .ok_or_else(|| BacktestError::MissingColumn("time".to_string()))?;

    let mut column_idx = std::collections::HashMap::new();
    for name in REQUIRED_COLUMNS {
        let idx = lower
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| BacktestError::MissingColumn((*name).to_string()))?;
        column_idx.insert(*name, idx);
    }

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| BacktestError::InvalidBarData(e.to_string()))?;
        let time = parse_time(&record[time_col])?;
        let field = |name: &str| -> Result<f64, BacktestError> {
            let idx = column_idx[name];
            record[idx]
                .trim()
                .parse::<f64>()
                .map_err(|_| BacktestError::InvalidBarData(format!("non-numeric {name}: {}", &record[idx])))
        };
        rows.push(BarRow {
            time,
            open: field("open")?,
            high: field("high")?,
            low: field("low")?,
            close: field("close")?,
            volume: field("volume")?,
        });
    }

    BarSeries::from_rows(rows)
}

/// Epoch seconds, an integer string, or an RFC 3339 / `%Y-%m-%d %H:%M:%S` timestamp.
fn parse_time(raw: &str) -> Result<i64, BacktestError> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return Ok(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp());
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc().timestamp());
    }
    Err(BacktestError::UnparseableTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epoch_seconds_header_case_insensitive() {
        let csv = "Time,Open,High,Low,Close,Volume\n0,1.0,1.5,0.5,1.2,100\n60,1.2,1.8,1.0,1.5,120\n";
        let series = bar_series_from_csv(csv.as_bytes()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.time, vec![0, 60]);
        assert_eq!(series.close, vec![1.2, 1.5]);
    }

    #[test]
    fn accepts_datetime_column_and_rfc3339_timestamps() {
        let csv = "datetime,open,high,low,close,volume\n1970-01-01T00:00:00Z,1.0,1.0,1.0,1.0,1.0\n";
        let series = bar_series_from_csv(csv.as_bytes()).unwrap();
        assert_eq!(series.time, vec![0]);
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let csv = "time,open,high,low,close\n0,1.0,1.0,1.0,1.0\n";
        let err = bar_series_from_csv(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, BacktestError::MissingColumn(ref c) if c == "volume"));
    }

    #[test]
    fn unparseable_timestamp_is_reported() {
        let csv = "time,open,high,low,close,volume\nnot-a-time,1.0,1.0,1.0,1.0,1.0\n";
        let err = bar_series_from_csv(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, BacktestError::UnparseableTimestamp(_)));
    }
}
