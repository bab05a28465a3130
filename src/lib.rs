//! # YACSM - Yet Another Candlestick Sequence Matcher
//!
//! Similarity search over OHLC price series: find every window of a series whose
//! closing prices resemble a chosen pattern window, compare two windows bar by bar,
//! and resample a series into coarser candles for charting.
//!
//! ## Quick Start
//!
//! ```rust
//! use yacsm::prelude::*;
//!
//! // One bar per minute, repeating 1-2-3 shape
//! let closes = [1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0];
//! let series = Series::from_closes(0, 60, &closes);
//!
//! let request = SearchRequest::builder(Window::new(0, 3))
//!     .metric(SimilarityMetric::ShapeCorrelation)
//!     .threshold(99.0)
//!     .top_n(10)
//!     .build()
//!     .unwrap();
//!
//! let ranked = search(&series, &request).unwrap();
//! assert_eq!(ranked.len(), 2);
//! assert_eq!(ranked.matches()[0].score, 100.0);
//! ```

pub mod compare;
pub mod ingest;
pub mod metric;
pub mod resample;
pub mod search;
pub mod series;

pub mod prelude {
    pub use crate::{
        // Comparator
        compare::{compare, compare_between, compare_closes},
        // Ingestion
        ingest::{load_csv, read_csv, CsvOptions, LoadError, LoadReport},
        // Similarity engine
        metric::{evaluate, PreparedQuery, ScoreDirection, ScoreUnit, SimilarityMetric},
        // Resampling
        resample::{resample, resample_between, Granularity},
        // Search driver
        search::{
            candidates, search, search_parallel, Candidates, MatchResult, RankedMatches,
            ScoredCandidate, SearchBuilder, SearchFailure, SearchOutcome, SearchRequest,
        },
        // Series store
        series::{Bar, Series, Window},
        // Core traits
        OHLCExt,
        // Errors
        Result,
        SearchError,
        // Types
        Threshold,
        TopN,
        OHLC,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors returned by window extraction, comparison and search
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    #[error("{role} window contains no bars")]
    EmptyWindow { role: &'static str },

    #[error("window lengths differ: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("window of {len} bars at {start} exceeds series of {available} bars")]
    WindowOutOfBounds {
        start: usize,
        len: usize,
        available: usize,
    },

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Number of ranked results to keep (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TopN(usize);

impl TopN {
    /// Create a new TopN, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(SearchError::InvalidValue("TopN must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for TopN {
    fn default() -> Self {
        Self(10)
    }
}

impl serde::Serialize for TopN {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for TopN {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        TopN::new(value).map_err(serde::de::Error::custom)
    }
}

/// Match threshold (finite). Unit depends on the metric: percent for
/// shape correlation, price units for absolute deviation.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    /// Create a new Threshold, rejecting NaN and infinities
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(SearchError::InvalidValue(
                "Threshold cannot be NaN or infinite",
            ));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Threshold {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Threshold {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Threshold::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLC TRAITS
// ============================================================

/// Core OHLC data trait. Anything implementing it can be loaded into a
/// [`Series`](series::Series).
pub trait OHLC {
    /// Seconds since the Unix epoch
    fn timestamp(&self) -> i64;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
}

impl<T: OHLC + ?Sized> OHLC for &T {
    fn timestamp(&self) -> i64 {
        (**self).timestamp()
    }

    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }
}

/// Extension trait with computed properties for OHLC data
pub trait OHLCExt: OHLC {
    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// True when every price is a finite number
    #[inline]
    fn has_finite_prices(&self) -> bool {
        [self.open(), self.high(), self.low(), self.close()]
            .iter()
            .all(|p| p.is_finite())
    }

    /// Validate OHLC data consistency
    fn validate(&self) -> std::result::Result<(), &'static str> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err("NaN in OHLC");
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err("Infinite value in OHLC");
        }
        if self.high() < self.low() {
            return Err("high < low");
        }
        Ok(())
    }
}

impl<T: OHLC + ?Sized> OHLCExt for T {}

// ============================================================
// TESTS
// ============================================================
