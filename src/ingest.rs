//! Delimited-text loader for OHLC series.
//!
//! Rows are `Time, Open, High, Low, Close` (further columns are ignored), with Time
//! formatted as `day.month.year hour:minute` by default. Rows that cannot be parsed
//! are dropped and counted, never raised. Only failing to open or read the source
//! is an error.

use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::series::{from_datetime, Bar, Series};

/// Errors that prevent a source from being read at all
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid option: {0}")]
    InvalidOption(&'static str),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Loader options
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Field delimiter, must be ASCII
    pub delimiter: char,
    /// Skip the first row
    pub has_header: bool,
    /// chrono format string for the Time column
    pub time_format: String,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ';',
            has_header: true,
            time_format: "%d.%m.%Y %H:%M".to_string(),
        }
    }
}

impl CsvOptions {
    fn delimiter_byte(&self) -> Result<u8, LoadError> {
        if !self.delimiter.is_ascii() {
            return Err(LoadError::InvalidOption("delimiter must be ASCII"));
        }
        Ok(self.delimiter as u8)
    }

    fn reader_builder(&self) -> Result<csv::ReaderBuilder, LoadError> {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.delimiter_byte()?)
            .has_headers(self.has_header)
            .flexible(true)
            .trim(csv::Trim::All);
        Ok(builder)
    }
}

/// What a load kept and dropped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Data rows read (header excluded)
    pub rows: usize,
    /// Rows that failed to parse
    pub malformed: usize,
    /// Parsed rows removed while building the series (duplicate timestamps)
    pub rejected: usize,
    /// Bars in the resulting series
    pub kept: usize,
}

/// Parse a timestamp with a chrono format string into epoch seconds.
pub fn parse_timestamp(s: &str, format: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(s, format)
        .ok()
        .map(from_datetime)
}

fn parse_price(field: Option<&str>) -> Option<f64> {
    let value: f64 = field?.parse().ok()?;
    value.is_finite().then_some(value)
}

fn parse_row(record: &csv::StringRecord, time_format: &str) -> Option<Bar> {
    let timestamp = parse_timestamp(record.get(0)?, time_format)?;
    Some(Bar::new(
        timestamp,
        parse_price(record.get(1))?,
        parse_price(record.get(2))?,
        parse_price(record.get(3))?,
        parse_price(record.get(4))?,
    ))
}

fn collect<R: io::Read>(
    mut reader: csv::Reader<R>,
    options: &CsvOptions,
) -> Result<(Series, LoadReport), LoadError> {
    let mut report = LoadReport::default();
    let mut bars = Vec::new();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => return Err(err.into()),
            Err(_) => {
                report.rows += 1;
                report.malformed += 1;
                continue;
            }
        };
        report.rows += 1;
        match parse_row(&record, &options.time_format) {
            Some(bar) => bars.push(bar),
            None => report.malformed += 1,
        }
    }

    let parsed = bars.len();
    let series = Series::new(bars);
    report.rejected = parsed - series.len();
    report.kept = series.len();

    if report.malformed > 0 || report.rejected > 0 {
        tracing::warn!(
            rows = report.rows,
            malformed = report.malformed,
            rejected = report.rejected,
            "dropped rows while loading series"
        );
    }
    tracing::debug!(kept = report.kept, "loaded series");

    Ok((series, report))
}

/// Read a series from any byte source.
pub fn read_csv<R: io::Read>(
    source: R,
    options: &CsvOptions,
) -> Result<(Series, LoadReport), LoadError> {
    let reader = options.reader_builder()?.from_reader(source);
    collect(reader, options)
}

/// Read a series from a file.
pub fn load_csv<P: AsRef<Path>>(
    path: P,
    options: &CsvOptions,
) -> Result<(Series, LoadReport), LoadError> {
    let path = path.as_ref();
    let reader = options
        .reader_builder()?
        .from_path(path)
        .map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    collect(reader, options)
}

// ============================================================
// TESTS
// ============================================================
