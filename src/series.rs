//! In-memory OHLC series store and positional windowing.
//!
//! A [`Series`] is sorted by timestamp, free of duplicate timestamps and of bars
//! with non-finite prices. It never changes after construction, so every search,
//! comparison and resample shares one instance by reference.

use chrono::{DateTime, NaiveDateTime};

use crate::{OHLCExt, Result, SearchError, OHLC};

// ============================================================
// BAR
// ============================================================

/// One OHLC observation
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    /// Seconds since the Unix epoch (naive, no timezone)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// Flat bar where every price equals `close`
    pub fn flat(timestamp: i64, close: f64) -> Self {
        Self::new(timestamp, close, close, close, close)
    }

    /// Timestamp as a calendar date-time, `None` if out of chrono's range
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        to_datetime(self.timestamp)
    }
}

impl OHLC for Bar {
    #[inline]
    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[inline]
    fn open(&self) -> f64 {
        self.open
    }

    #[inline]
    fn high(&self) -> f64 {
        self.high
    }

    #[inline]
    fn low(&self) -> f64 {
        self.low
    }

    #[inline]
    fn close(&self) -> f64 {
        self.close
    }
}

/// Convert epoch seconds to a naive date-time.
pub fn to_datetime(timestamp: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(timestamp, 0).map(|dt| dt.naive_utc())
}

/// Convert a naive date-time to epoch seconds.
pub fn from_datetime(datetime: NaiveDateTime) -> i64 {
    datetime.and_utc().timestamp()
}

// ============================================================
// WINDOW
// ============================================================

/// Contiguous run of bars identified by position.
///
/// A window is only a pair of bounds; the bars themselves are borrowed from the
/// series on demand via [`Series::window`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Window {
    pub start: usize,
    pub len: usize,
}

impl Window {
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// One past the last index, `None` if it does not fit in `usize`
    #[inline]
    pub fn end(self) -> Option<usize> {
        self.start.checked_add(self.len)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn range(self) -> Option<std::ops::Range<usize>> {
        self.end().map(|end| self.start..end)
    }
}

// ============================================================
// SERIES
// ============================================================

/// Time-ordered, immutable OHLC series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    bars: Vec<Bar>,
}

impl Series {
    /// Build a series, sorting by timestamp and dropping bars with non-finite
    /// prices and duplicate timestamps (the first bar seen for a timestamp wins).
    ///
    /// Inverted bars (`high < low`) are kept as they are.
    pub fn new(mut bars: Vec<Bar>) -> Self {
        let received = bars.len();

        bars.retain(|bar| bar.has_finite_prices());
        let invalid = received - bars.len();

        // Stable, so dedup keeps the earliest-arriving bar per timestamp
        bars.sort_by_key(|bar| bar.timestamp);
        let valid = bars.len();
        bars.dedup_by_key(|bar| bar.timestamp);
        let duplicates = valid - bars.len();

        if invalid > 0 || duplicates > 0 {
            tracing::debug!(
                received,
                kept = bars.len(),
                invalid,
                duplicates,
                "cleaned series bars"
            );
        }

        Self { bars }
    }

    /// Build a series from any OHLC source.
    pub fn from_ohlc<T: OHLC>(items: impl IntoIterator<Item = T>) -> Self {
        Self::new(
            items
                .into_iter()
                .map(|b| Bar::new(b.timestamp(), b.open(), b.high(), b.low(), b.close()))
                .collect(),
        )
    }

    /// Build a series of flat bars from closing prices, `step` seconds apart.
    pub fn from_closes(start: i64, step: i64, closes: &[f64]) -> Self {
        Self::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| Bar::flat(start + step * i as i64, c))
                .collect(),
        )
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    /// Timestamp of the bar at `index`
    #[inline]
    pub fn timestamp_at(&self, index: usize) -> Option<i64> {
        self.bars.get(index).map(|b| b.timestamp)
    }

    /// Index of the first bar at or after `timestamp` (`len()` if none)
    pub fn position_at_or_after(&self, timestamp: i64) -> usize {
        self.bars.partition_point(|b| b.timestamp < timestamp)
    }

    /// Bars with `from <= timestamp < to`
    pub fn between(&self, from: i64, to: i64) -> &[Bar] {
        let start = self.position_at_or_after(from);
        let end = self.position_at_or_after(to).max(start);
        &self.bars[start..end]
    }

    /// Window covering bars with `start <= timestamp <= end`.
    ///
    /// The window is empty when no bar falls inside the bounds.
    pub fn window_between(&self, start: i64, end: i64) -> Window {
        let first = self.position_at_or_after(start);
        let last = self.bars.partition_point(|b| b.timestamp <= end).max(first);
        Window::new(first, last - first)
    }

    /// Window of the first `len` bars at or after `start`.
    pub fn window_from(&self, start: i64, len: usize) -> Result<Window> {
        let first = self.position_at_or_after(start);
        let remaining = self.len() - first;
        if remaining < len {
            return Err(SearchError::InsufficientData {
                need: len,
                got: remaining,
            });
        }
        Ok(Window::new(first, len))
    }

    /// Bars covered by `window`.
    pub fn window(&self, window: Window) -> Result<&[Bar]> {
        window
            .range()
            .and_then(|range| self.bars.get(range))
            .ok_or(SearchError::WindowOutOfBounds {
                start: window.start,
                len: window.len,
                available: self.len(),
            })
    }

    /// Closing prices covered by `window`.
    pub fn closes(&self, window: Window) -> Result<Vec<f64>> {
        Ok(self.window(window)?.iter().map(|b| b.close).collect())
    }

    /// Closing prices of the whole series.
    pub fn all_closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

impl FromIterator<Bar> for Series {
    fn from_iter<I: IntoIterator<Item = Bar>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ============================================================
// TESTS
// ============================================================
