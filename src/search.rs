//! Sliding-window pattern search.
//!
//! [`search`] slides a window of the query's length over every admissible start
//! index of the series, scores each candidate's closes against the query's closes,
//! keeps the ones passing the threshold, ranks them best first and keeps the top N.
//!
//! The only window excluded is the one starting at the query's own start timestamp.
//! Overlapping windows next to it are still candidates.
//!
//! The scan is O(N·L): every candidate is normalized from scratch. Rolling
//! mean/variance would bring correlation down to O(N) but is not implemented.

use chrono::NaiveDateTime;
use rayon::prelude::*;

use crate::metric::{PreparedQuery, ScoreDirection, ScoreUnit, SimilarityMetric};
use crate::series::{to_datetime, Series, Window};
use crate::{Result, SearchError, Threshold, TopN};

// ============================================================
// REQUEST
// ============================================================

/// Everything needed to run one search over a series
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SearchRequest {
    pub query: Window,
    #[serde(default)]
    pub metric: SimilarityMetric,
    pub threshold: Threshold,
    #[serde(default)]
    pub top_n: TopN,
}

impl SearchRequest {
    pub fn builder(query: Window) -> SearchBuilder {
        SearchBuilder::new(query)
    }

    /// Check the threshold against the metric's admissible range.
    pub fn validate(&self) -> Result<()> {
        let (min, max) = self.metric.threshold_bounds();
        let value = self.threshold.get();
        if !(min..=max).contains(&value) {
            return Err(SearchError::OutOfRange {
                field: "threshold",
                value,
                min,
                max,
            });
        }
        Ok(())
    }
}

/// Builder for [`SearchRequest`]
#[derive(Debug, Clone)]
pub struct SearchBuilder {
    query: Window,
    metric: SimilarityMetric,
    threshold: Option<f64>,
    top_n: usize,
}

impl SearchBuilder {
    pub fn new(query: Window) -> Self {
        Self {
            query,
            metric: SimilarityMetric::default(),
            threshold: None,
            top_n: TopN::default().get(),
        }
    }

    pub fn metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Percent for shape correlation, price units for absolute deviation.
    /// Defaults to 60% and 5.0 respectively.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Build the request
    pub fn build(self) -> Result<SearchRequest> {
        let threshold = self.threshold.unwrap_or(match self.metric {
            SimilarityMetric::ShapeCorrelation => 60.0,
            SimilarityMetric::AbsoluteDeviation => 5.0,
        });
        let request = SearchRequest {
            query: self.query,
            metric: self.metric,
            threshold: Threshold::new(threshold)?,
            top_n: TopN::new(self.top_n)?,
        };
        request.validate()?;
        Ok(request)
    }
}

// ============================================================
// RESULTS
// ============================================================

/// One accepted candidate window
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchResult {
    pub start_index: usize,
    pub len: usize,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    /// Percent for shape correlation (higher is better), price units for
    /// absolute deviation (lower is better)
    pub score: f64,
}

impl MatchResult {
    #[inline]
    pub fn window(&self) -> Window {
        Window::new(self.start_index, self.len)
    }

    pub fn start_datetime(&self) -> Option<NaiveDateTime> {
        to_datetime(self.start_timestamp)
    }

    pub fn end_datetime(&self) -> Option<NaiveDateTime> {
        to_datetime(self.end_timestamp)
    }
}

/// Matches of one search, best first, truncated to the requested top N
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RankedMatches {
    metric: SimilarityMetric,
    total_matches: usize,
    matches: Vec<MatchResult>,
}

impl RankedMatches {
    #[inline]
    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    #[inline]
    pub fn direction(&self) -> ScoreDirection {
        self.metric.direction()
    }

    #[inline]
    pub fn unit(&self) -> ScoreUnit {
        self.metric.unit()
    }

    /// Number of accepted candidates before truncation
    #[inline]
    pub fn total_matches(&self) -> usize {
        self.total_matches
    }

    #[inline]
    pub fn matches(&self) -> &[MatchResult] {
        &self.matches
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchResult> {
        self.matches.iter()
    }

    pub fn into_vec(self) -> Vec<MatchResult> {
        self.matches
    }
}

impl<'a> IntoIterator for &'a RankedMatches {
    type Item = &'a MatchResult;
    type IntoIter = std::slice::Iter<'a, MatchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.matches.iter()
    }
}

// ============================================================
// CANDIDATE ITERATOR
// ============================================================

/// A scored candidate window, matching or not
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub window: Window,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    /// NaN when the score is undefined (constant window under shape correlation)
    pub score: f64,
    pub is_match: bool,
}

impl ScoredCandidate {
    pub fn to_match(&self) -> MatchResult {
        MatchResult {
            start_index: self.window.start,
            len: self.window.len,
            start_timestamp: self.start_timestamp,
            end_timestamp: self.end_timestamp,
            score: self.score,
        }
    }
}

/// Iterator over every candidate window in scan order, self-window excluded
pub struct Candidates<'a> {
    series: &'a Series,
    query: PreparedQuery,
    query_window: Window,
    query_timestamp: i64,
    threshold: f64,
    current: usize,
    end: usize,
    buf: Vec<f64>,
}

impl<'a> Candidates<'a> {
    fn new(
        series: &'a Series,
        query_window: Window,
        metric: SimilarityMetric,
        threshold: Threshold,
    ) -> Result<Self> {
        if query_window.is_empty() {
            return Err(SearchError::EmptyWindow { role: "query" });
        }
        let available = series.len().checked_sub(query_window.start).ok_or(
            SearchError::WindowOutOfBounds {
                start: query_window.start,
                len: query_window.len,
                available: series.len(),
            },
        )?;
        if available < query_window.len {
            return Err(SearchError::InsufficientData {
                need: query_window.len,
                got: available,
            });
        }
        let query_bars = series.window(query_window)?;
        let query_closes: Vec<f64> = query_bars.iter().map(|b| b.close).collect();

        Ok(Self {
            series,
            query: metric.prepare(&query_closes),
            query_window,
            query_timestamp: query_bars[0].timestamp,
            threshold: threshold.get(),
            current: 0,
            end: series.len() - query_window.len + 1,
            buf: Vec::with_capacity(query_window.len),
        })
    }
}

impl<'a> Iterator for Candidates<'a> {
    type Item = ScoredCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.query_window.len;
        let bars = self.series.bars();

        while self.current < self.end {
            let start = self.current;
            self.current += 1;

            let window = &bars[start..start + len];
            if window[0].timestamp == self.query_timestamp {
                continue;
            }

            self.buf.clear();
            self.buf.extend(window.iter().map(|b| b.close));
            let score = self.query.score(&self.buf);

            return Some(ScoredCandidate {
                window: Window::new(start, len),
                start_timestamp: window[0].timestamp,
                end_timestamp: window[len - 1].timestamp,
                score,
                is_match: self.query.metric().is_match(score, self.threshold),
            });
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let mut remaining = self.end.saturating_sub(self.current);
        // Timestamps are unique, so only the query's own index is skipped
        if (self.current..self.end).contains(&self.query_window.start) {
            remaining -= 1;
        }
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for Candidates<'a> {}

/// Score every candidate window of `query`'s length against it.
pub fn candidates(
    series: &Series,
    query: Window,
    metric: SimilarityMetric,
    threshold: Threshold,
) -> Result<Candidates<'_>> {
    Candidates::new(series, query, metric, threshold)
}

// ============================================================
// SEARCH
// ============================================================

/// Run one search and return the ranked, truncated matches.
///
/// No match is not an error: the result is simply empty.
pub fn search(series: &Series, request: &SearchRequest) -> Result<RankedMatches> {
    request.validate()?;

    let metric = request.metric;
    let scan = candidates(series, request.query, metric, request.threshold)?;
    let scanned = scan.len();

    let mut matches: Vec<MatchResult> = scan
        .filter(|c| c.is_match)
        .map(|c| c.to_match())
        .collect();
    let total_matches = matches.len();

    // Stable: equal scores keep scan order
    matches.sort_by(|a, b| metric.compare_scores(a.score, b.score));
    matches.truncate(request.top_n.get());

    tracing::debug!(
        metric = %metric,
        query_start = request.query.start,
        query_len = request.query.len,
        scanned,
        accepted = total_matches,
        returned = matches.len(),
        "pattern search finished"
    );

    Ok(RankedMatches {
        metric,
        total_matches,
        matches,
    })
}

// ============================================================
// PARALLEL SEARCH
// ============================================================

/// Result of one request in a batch
#[derive(Debug)]
pub struct SearchOutcome {
    /// Position of the request in the batch
    pub index: usize,
    pub matches: RankedMatches,
}

/// Error from one request in a batch
#[derive(Debug)]
pub struct SearchFailure {
    pub index: usize,
    pub error: SearchError,
}

/// Run independent searches over one shared series in parallel.
///
/// Each search is itself sequential; requests never share mutable state.
pub fn search_parallel(
    series: &Series,
    requests: &[SearchRequest],
) -> (Vec<SearchOutcome>, Vec<SearchFailure>) {
    let results: Vec<_> = requests
        .par_iter()
        .enumerate()
        .map(|(index, request)| {
            search(series, request)
                .map(|matches| SearchOutcome { index, matches })
                .map_err(|error| SearchFailure { index, error })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn repeating_series() -> Series {
        Series::from_closes(0, 60, &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0])
    }

    #[test]
    fn test_builder_defaults() {
        let request = SearchRequest::builder(Window::new(0, 3)).build().unwrap();
        assert_eq!(request.metric, SimilarityMetric::ShapeCorrelation);
        assert_eq!(request.threshold.get(), 60.0);
        assert_eq!(request.top_n.get(), 10);

        let request = SearchRequest::builder(Window::new(0, 3))
            .metric(SimilarityMetric::AbsoluteDeviation)
            .build()
            .unwrap();
        assert_eq!(request.threshold.get(), 5.0);
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(SearchRequest::builder(Window::new(0, 3))
            .top_n(0)
            .build()
            .is_err());
        assert!(SearchRequest::builder(Window::new(0, 3))
            .threshold(f64::NAN)
            .build()
            .is_err());
        assert!(matches!(
            SearchRequest::builder(Window::new(0, 3))
                .threshold(150.0)
                .build(),
            Err(SearchError::OutOfRange { .. })
        ));
        assert!(SearchRequest::builder(Window::new(0, 3))
            .metric(SimilarityMetric::AbsoluteDeviation)
            .threshold(-1.0)
            .build()
            .is_err());
    }

    #[test]
    fn test_candidates_skip_self_window() {
        let series = repeating_series();
        let scan = candidates(
            &series,
            Window::new(3, 3),
            SimilarityMetric::ShapeCorrelation,
            Threshold::new_const(99.0),
        )
        .unwrap();

        // 10 admissible starts, minus the query itself
        assert_eq!(scan.len(), 9);
        let starts: Vec<usize> = scan.map(|c| c.window.start).collect();
        assert_eq!(starts, vec![0, 1, 2, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_candidates_include_last_window() {
        let series = repeating_series();
        let last = candidates(
            &series,
            Window::new(0, 3),
            SimilarityMetric::AbsoluteDeviation,
            Threshold::new_const(0.0),
        )
        .unwrap()
        .last()
        .unwrap();
        assert_eq!(last.window, Window::new(9, 3));
        assert!(last.is_match);
    }

    #[test]
    fn test_search_ranks_and_truncates() {
        let series = repeating_series();
        let request = SearchRequest::builder(Window::new(0, 3))
            .metric(SimilarityMetric::ShapeCorrelation)
            .threshold(-100.0)
            .top_n(4)
            .build()
            .unwrap();

        let ranked = search(&series, &request).unwrap();
        assert_eq!(ranked.total_matches(), 9);
        assert_eq!(ranked.len(), 4);

        let scores: Vec<f64> = ranked.iter().map(|m| m.score).collect();
        assert_eq!(scores, vec![100.0, 100.0, 100.0, -50.0]);
        // Ties in scan order
        let starts: Vec<usize> = ranked.iter().map(|m| m.start_index).collect();
        assert_eq!(starts, vec![3, 6, 9, 1]);
    }

    #[test]
    fn test_search_empty_query() {
        let series = repeating_series();
        let request = SearchRequest::builder(Window::new(0, 0)).build().unwrap();
        assert_eq!(
            search(&series, &request).unwrap_err(),
            SearchError::EmptyWindow { role: "query" }
        );
    }

    #[test]
    fn test_search_query_past_end_is_insufficient_data() {
        let series = repeating_series();
        let request = SearchRequest::builder(Window::new(10, 3)).build().unwrap();
        assert_eq!(
            search(&series, &request).unwrap_err(),
            SearchError::InsufficientData { need: 3, got: 2 }
        );

        let request = SearchRequest::builder(Window::new(6, 10)).build().unwrap();
        assert_eq!(
            search(&series, &request).unwrap_err(),
            SearchError::InsufficientData { need: 10, got: 6 }
        );
    }

    #[test]
    fn test_search_query_start_beyond_series() {
        let series = repeating_series();
        let request = SearchRequest::builder(Window::new(13, 3)).build().unwrap();
        assert_eq!(
            search(&series, &request).unwrap_err(),
            SearchError::WindowOutOfBounds {
                start: 13,
                len: 3,
                available: 12
            }
        );
    }

    #[test]
    fn test_search_overflowing_query_does_not_panic() {
        let series = repeating_series();
        let request: SearchRequest = serde_json::from_str(
            r#"{"query":{"start":18446744073709551615,"len":2},"threshold":60.0}"#,
        )
        .unwrap();
        assert!(matches!(
            search(&series, &request),
            Err(SearchError::WindowOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_match_result_datetimes() {
        let series = Series::from_closes(1_705_069_200, 60, &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
        let request = SearchRequest::builder(Window::new(0, 3))
            .threshold(99.0)
            .build()
            .unwrap();
        let ranked = search(&series, &request).unwrap();
        let m = ranked.matches()[0];
        assert_eq!(m.window(), Window::new(3, 3));
        assert_eq!(m.start_datetime().unwrap().to_string(), "2024-01-12 14:23:00");
        assert_eq!(m.end_datetime().unwrap().to_string(), "2024-01-12 14:25:00");
    }

    #[test]
    fn test_request_from_json() {
        let request: SearchRequest = serde_json::from_str(
            r#"{"query":{"start":0,"len":3},"metric":"absolute_deviation","threshold":2.5}"#,
        )
        .unwrap();
        assert_eq!(request.metric, SimilarityMetric::AbsoluteDeviation);
        assert_eq!(request.top_n.get(), 10);

        assert!(serde_json::from_str::<SearchRequest>(
            r#"{"query":{"start":0,"len":3},"threshold":2.5,"top_n":0}"#,
        )
        .is_err());
    }

    #[test]
    fn test_parallel_search() {
        let series = repeating_series();
        let good = SearchRequest::builder(Window::new(0, 3))
            .threshold(99.0)
            .build()
            .unwrap();
        let bad = SearchRequest::builder(Window::new(11, 3)).build().unwrap();

        let (results, errors) = search_parallel(&series, &[good, bad, good]);
        assert_eq!(results.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, 1);
        assert_eq!(errors[0].error, SearchError::InsufficientData { need: 3, got: 1 });
        assert!(results.iter().all(|r| r.matches.len() == 3));
    }
}
