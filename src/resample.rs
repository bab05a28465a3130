//! Fixed-width OHLC aggregation for charting.
//!
//! Buckets are aligned to the Unix epoch and labelled by their start. Within a
//! bucket: open of the first bar, highest high, lowest low, close of the last bar.
//! Buckets without bars are omitted.

use std::fmt;
use std::str::FromStr;

use crate::series::{Bar, Series};

/// Supported chart resolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Granularity {
    #[serde(rename = "5min")]
    Min5,
    #[serde(rename = "15min")]
    Min15,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Granularity {
    /// Bucket width in seconds
    pub fn seconds(self) -> i64 {
        match self {
            Granularity::Min5 => 5 * 60,
            Granularity::Min15 => 15 * 60,
            Granularity::Hour1 => 60 * 60,
            Granularity::Hour4 => 4 * 60 * 60,
            Granularity::Day1 => 24 * 60 * 60,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Granularity::Min5 => "5min",
            Granularity::Min15 => "15min",
            Granularity::Hour1 => "1h",
            Granularity::Hour4 => "4h",
            Granularity::Day1 => "1d",
        }
    }

    /// All granularities, finest first
    pub fn all() -> &'static [Granularity] {
        &[
            Granularity::Min5,
            Granularity::Min15,
            Granularity::Hour1,
            Granularity::Hour4,
            Granularity::Day1,
        ]
    }

    /// Start of the bucket containing `timestamp`
    #[inline]
    pub fn bucket_start(self, timestamp: i64) -> i64 {
        let width = self.seconds();
        timestamp.div_euclid(width) * width
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown granularity: {0}")]
pub struct UnknownGranularity(pub String);

impl FromStr for Granularity {
    type Err = UnknownGranularity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Granularity::all()
            .iter()
            .copied()
            .find(|g| g.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownGranularity(s.to_string()))
    }
}

/// Aggregate time-ordered bars into `granularity` buckets.
pub fn resample(bars: &[Bar], granularity: Granularity) -> Vec<Bar> {
    let mut aggregated = Vec::new();
    let mut current: Option<Bar> = None;

    for bar in bars {
        let bucket = granularity.bucket_start(bar.timestamp);

        if let Some(agg) = current.as_mut().filter(|agg| agg.timestamp == bucket) {
            // Same bucket - extend high/low, roll close forward
            agg.high = agg.high.max(bar.high);
            agg.low = agg.low.min(bar.low);
            agg.close = bar.close;
            continue;
        }

        let next = Bar::new(bucket, bar.open, bar.high, bar.low, bar.close);
        if let Some(done) = current.replace(next) {
            aggregated.push(done);
        }
    }

    if let Some(done) = current {
        aggregated.push(done);
    }

    tracing::debug!(
        granularity = %granularity,
        bars_in = bars.len(),
        bars_out = aggregated.len(),
        "resampled bars"
    );
    aggregated
}

/// Aggregate the bars with `from <= timestamp < to`.
pub fn resample_between(
    series: &Series,
    from: i64,
    to: i64,
    granularity: Granularity,
) -> Vec<Bar> {
    resample(series.between(from, to), granularity)
}

// ============================================================
// TESTS
// ============================================================
