//! Similarity metrics between two equal-length price vectors.
//!
//! - **ShapeCorrelation**: z-score both vectors, then Pearson correlation as a
//!   percentage. Insensitive to price level and scale. Higher is better.
//! - **AbsoluteDeviation**: mean absolute difference of the raw values, in price
//!   units. Sensitive to price level. Lower is better.
//!
//! Scores are rounded to 2 decimals before they are compared with a threshold.

use std::cmp::Ordering;

// ============================================================
// METRIC
// ============================================================

/// Which way a score improves
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScoreDirection {
    HigherIsBetter,
    LowerIsBetter,
}

/// Unit of a score, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScoreUnit {
    /// Correlation in percent, -100..=100
    Percent,
    /// Same unit as the prices, >= 0
    Price,
}

/// Closed set of similarity metrics
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Pearson correlation of z-scored values, in percent
    #[default]
    ShapeCorrelation,
    /// Mean absolute difference of raw values
    AbsoluteDeviation,
}

impl SimilarityMetric {
    pub fn label(self) -> &'static str {
        match self {
            SimilarityMetric::ShapeCorrelation => "shape_correlation",
            SimilarityMetric::AbsoluteDeviation => "absolute_deviation",
        }
    }

    #[inline]
    pub fn direction(self) -> ScoreDirection {
        match self {
            SimilarityMetric::ShapeCorrelation => ScoreDirection::HigherIsBetter,
            SimilarityMetric::AbsoluteDeviation => ScoreDirection::LowerIsBetter,
        }
    }

    #[inline]
    pub fn unit(self) -> ScoreUnit {
        match self {
            SimilarityMetric::ShapeCorrelation => ScoreUnit::Percent,
            SimilarityMetric::AbsoluteDeviation => ScoreUnit::Price,
        }
    }

    /// Admissible threshold bounds (inclusive)
    pub fn threshold_bounds(self) -> (f64, f64) {
        match self {
            SimilarityMetric::ShapeCorrelation => (-100.0, 100.0),
            SimilarityMetric::AbsoluteDeviation => (0.0, f64::MAX),
        }
    }

    /// Score `candidate` against `query`.
    pub fn score(self, query: &[f64], candidate: &[f64]) -> f64 {
        self.prepare(query).score(candidate)
    }

    /// Whether `score` passes `threshold`. NaN never matches.
    #[inline]
    pub fn is_match(self, score: f64, threshold: f64) -> bool {
        if score.is_nan() {
            return false;
        }
        match self.direction() {
            ScoreDirection::HigherIsBetter => score >= threshold,
            ScoreDirection::LowerIsBetter => score <= threshold,
        }
    }

    /// Ordering that puts the better score first.
    #[inline]
    pub fn compare_scores(self, a: f64, b: f64) -> Ordering {
        match self.direction() {
            ScoreDirection::HigherIsBetter => b.total_cmp(&a),
            ScoreDirection::LowerIsBetter => a.total_cmp(&b),
        }
    }

    /// Precompute the query side once so a scan only normalizes candidates.
    pub fn prepare(self, query: &[f64]) -> PreparedQuery {
        let values = match self {
            SimilarityMetric::ShapeCorrelation => zscore(query),
            SimilarityMetric::AbsoluteDeviation => query.to_vec(),
        };
        PreparedQuery {
            metric: self,
            values,
        }
    }
}

impl std::fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Query vector ready to be scored against many candidates
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    metric: SimilarityMetric,
    values: Vec<f64>,
}

impl PreparedQuery {
    #[inline]
    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Score a candidate of the same length as the query.
    pub fn score(&self, candidate: &[f64]) -> f64 {
        debug_assert_eq!(
            self.values.len(),
            candidate.len(),
            "query and candidate lengths differ"
        );
        match self.metric {
            SimilarityMetric::ShapeCorrelation => {
                round2(pearson(&self.values, &zscore(candidate)) * 100.0)
            }
            SimilarityMetric::AbsoluteDeviation => {
                round2(mean_abs_deviation(&self.values, candidate))
            }
        }
    }
}

/// Score `candidate` against `query` under `metric`.
#[inline]
pub fn evaluate(query: &[f64], candidate: &[f64], metric: SimilarityMetric) -> f64 {
    metric.score(query, candidate)
}

// ============================================================
// NUMERIC HELPERS
// ============================================================

/// Round to 2 decimal places, ties to even.
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// True when every value is identical (empty counts as constant).
#[inline]
pub fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

#[inline]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Z-score normalization with population std.
///
/// A constant vector is returned unchanged; its correlation with anything is
/// then undefined and scores NaN.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    if is_constant(values) {
        tracing::trace!(len = values.len(), "degenerate variance, skipping z-score");
        return values.to_vec();
    }
    let m = mean(values);
    let sd = std_dev(values);
    values.iter().map(|v| (v - m) / sd).collect()
}

/// Pearson correlation in -1..=1, NaN when either side has zero variance.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || is_constant(a) || is_constant(b) {
        return f64::NAN;
    }
    let (ma, mb) = (mean(a), mean(b));
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - ma, y - mb);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

/// Mean absolute difference, NaN for empty input.
pub fn mean_abs_deviation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return f64::NAN;
    }
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f64>() / n as f64
}

// ============================================================
// TESTS
// ============================================================
