//! Exact bar-by-bar comparison of two windows.
//!
//! Closes are rounded to 2 decimals and compared for exact equality at each
//! aligned position. There is no tolerance band: 1.004 and 1.001 are equal
//! (both round to 1.00), 1.004 and 1.006 are not.

use crate::metric::round2;
use crate::series::{Series, Window};
use crate::{Result, SearchError};

/// Percentage (0..=100, 2 decimals) of aligned positions whose rounded
/// closes are equal.
pub fn compare_closes(left: &[f64], right: &[f64]) -> Result<f64> {
    if left.is_empty() {
        return Err(SearchError::EmptyWindow { role: "left" });
    }
    if right.is_empty() {
        return Err(SearchError::EmptyWindow { role: "right" });
    }
    if left.len() != right.len() {
        return Err(SearchError::LengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }

    let equal = left
        .iter()
        .zip(right)
        .filter(|(a, b)| round2(**a) == round2(**b))
        .count();

    Ok(round2(equal as f64 / left.len() as f64 * 100.0))
}

/// Compare two positional windows of `series`.
pub fn compare(series: &Series, left: Window, right: Window) -> Result<f64> {
    if left.is_empty() {
        return Err(SearchError::EmptyWindow { role: "left" });
    }
    if right.is_empty() {
        return Err(SearchError::EmptyWindow { role: "right" });
    }
    if left.len != right.len {
        return Err(SearchError::LengthMismatch {
            left: left.len,
            right: right.len,
        });
    }

    let similarity = compare_closes(&series.closes(left)?, &series.closes(right)?)?;
    tracing::debug!(
        left_start = left.start,
        right_start = right.start,
        len = left.len,
        similarity,
        "compared windows"
    );
    Ok(similarity)
}

/// Compare two windows selected by inclusive timestamp bounds.
pub fn compare_between(series: &Series, left: (i64, i64), right: (i64, i64)) -> Result<f64> {
    compare(
        series,
        series.window_between(left.0, left.1),
        series.window_between(right.0, right.1),
    )
}

// ============================================================
// TESTS
// ============================================================
