//! Integration tests for the pattern search driver.

use yacsm::prelude::*;

/// 2024-01-12 14:20 UTC
const START: i64 = 1_705_069_200;

/// One-minute flat bars with the given closes
fn minute_series(closes: &[f64]) -> Series {
    Series::from_closes(START, 60, closes)
}

/// Deterministic wavy series with a repeated motif planted at 10, 40 and 70
fn wavy_series(n: usize) -> Series {
    let motif = [5.0, 7.0, 6.0, 9.0, 8.0];
    let mut closes: Vec<f64> = (0..n)
        .map(|i| 50.0 + ((i * 7 + 13) % 17) as f64 / 4.0)
        .collect();
    for at in [10, 40, 70] {
        for (k, v) in motif.iter().enumerate() {
            if at + k < n {
                closes[at + k] = 40.0 + v;
            }
        }
    }
    minute_series(&closes)
}

fn request(
    query: Window,
    metric: SimilarityMetric,
    threshold: f64,
    top_n: usize,
) -> SearchRequest {
    SearchRequest::builder(query)
        .metric(metric)
        .threshold(threshold)
        .top_n(top_n)
        .build()
        .unwrap()
}

// ============================================================
// END-TO-END SCENARIOS
// ============================================================

#[test]
fn test_ascending_series_has_no_exact_value_match() {
    let closes: Vec<f64> = (100..120).map(f64::from).collect();
    let series = minute_series(&closes);

    let req = request(
        Window::new(0, 5),
        SimilarityMetric::AbsoluteDeviation,
        0.0,
        10,
    );
    let ranked = search(&series, &req).unwrap();

    assert!(ranked.is_empty(), "only the excluded self-window matches exactly");
    assert_eq!(ranked.total_matches(), 0);
}

#[test]
fn test_repeating_shape_found_at_every_period() {
    let series = minute_series(&[1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);

    let req = request(
        Window::new(0, 3),
        SimilarityMetric::ShapeCorrelation,
        99.0,
        10,
    );
    let ranked = search(&series, &req).unwrap();

    let starts: Vec<usize> = ranked.iter().map(|m| m.start_index).collect();
    assert_eq!(starts, vec![3, 6, 9]);
    assert!(ranked.iter().all(|m| m.score == 100.0));
    assert_eq!(ranked.matches()[0].start_timestamp, START + 180);
    assert_eq!(ranked.matches()[0].end_timestamp, START + 300);
}

#[test]
fn test_pattern_longer_than_remaining_bars() {
    let series = minute_series(&[1.0; 20]);

    // 6 bars remain from index 14
    let err = series.window_from(START + 14 * 60, 10).unwrap_err();
    assert_eq!(err, SearchError::InsufficientData { need: 10, got: 6 });
}

#[test]
fn test_query_from_timestamp() {
    let series = wavy_series(100);
    let query = series.window_from(START + 10 * 60, 5).unwrap();
    assert_eq!(query, Window::new(10, 5));

    let ranked = search(
        &series,
        &request(query, SimilarityMetric::ShapeCorrelation, 99.5, 10),
    )
    .unwrap();
    let starts: Vec<usize> = ranked.iter().map(|m| m.start_index).collect();
    assert_eq!(starts, vec![40, 70]);
}

// ============================================================
// PROPERTIES ON FIXED DATA
// ============================================================

#[test]
fn test_self_window_never_returned() {
    let series = wavy_series(100);
    for start in [0, 10, 37, 95] {
        let query = Window::new(start, 5);
        let query_ts = series.timestamp_at(start).unwrap();
        for (metric, threshold) in [
            (SimilarityMetric::ShapeCorrelation, -100.0),
            (SimilarityMetric::AbsoluteDeviation, 1000.0),
        ] {
            let ranked = search(&series, &request(query, metric, threshold, 1000)).unwrap();
            assert!(ranked.iter().all(|m| m.start_timestamp != query_ts));
        }
    }
}

#[test]
fn test_overlapping_windows_not_suppressed() {
    let series = minute_series(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    let ranked = search(
        &series,
        &request(Window::new(2, 4), SimilarityMetric::ShapeCorrelation, 99.0, 10),
    )
    .unwrap();

    // Every other window is a straight line too, including ones overlapping 2..6
    let starts: Vec<usize> = ranked.iter().map(|m| m.start_index).collect();
    assert_eq!(starts, vec![0, 1, 3, 4]);
}

#[test]
fn test_match_windows_have_query_length() {
    let series = wavy_series(100);
    let ranked = search(
        &series,
        &request(Window::new(10, 5), SimilarityMetric::ShapeCorrelation, 0.0, 50),
    )
    .unwrap();

    assert!(!ranked.is_empty());
    for m in &ranked {
        assert_eq!(m.len, 5);
        let bars = series.window(m.window()).unwrap();
        assert_eq!(bars.len(), 5);
        assert_eq!(bars[0].timestamp, m.start_timestamp);
        assert_eq!(bars[4].timestamp, m.end_timestamp);
    }
}

#[test]
fn test_deviation_ranked_ascending() {
    let series = wavy_series(100);
    let ranked = search(
        &series,
        &request(Window::new(0, 5), SimilarityMetric::AbsoluteDeviation, 2.0, 5),
    )
    .unwrap();

    assert_eq!(ranked.direction(), ScoreDirection::LowerIsBetter);
    assert_eq!(ranked.unit(), ScoreUnit::Price);
    assert!(ranked.len() <= 5);
    assert!(ranked.matches().windows(2).all(|w| w[0].score <= w[1].score));
    assert!(ranked.iter().all(|m| m.score <= 2.0));
}

#[test]
fn test_constant_windows_never_match_shape() {
    let mut closes = vec![10.0; 10];
    closes.extend([1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    let series = minute_series(&closes);

    let ranked = search(
        &series,
        &request(Window::new(10, 3), SimilarityMetric::ShapeCorrelation, -100.0, 100),
    )
    .unwrap();

    // Windows fully inside the flat run score NaN and are dropped
    assert!(ranked.iter().all(|m| m.start_index >= 8));
    assert!(ranked.iter().all(|m| !m.score.is_nan()));
}

#[test]
fn test_constant_query_matches_nothing_by_shape() {
    let series = minute_series(&[5.0, 5.0, 5.0, 1.0, 2.0, 3.0, 5.0, 5.0, 5.0]);
    let ranked = search(
        &series,
        &request(Window::new(0, 3), SimilarityMetric::ShapeCorrelation, -100.0, 10),
    )
    .unwrap();
    assert!(ranked.is_empty());
}

#[test]
fn test_ranked_matches_serialize() {
    let series = minute_series(&[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    let ranked = search(
        &series,
        &request(Window::new(0, 3), SimilarityMetric::ShapeCorrelation, 99.0, 10),
    )
    .unwrap();

    let json = serde_json::to_value(&ranked).unwrap();
    assert_eq!(json["metric"], "shape_correlation");
    assert_eq!(json["total_matches"], 1);
    assert_eq!(json["matches"][0]["start_index"], 3);
    assert_eq!(json["matches"][0]["score"], 100.0);
}

#[test]
fn test_parallel_batch_matches_sequential() {
    let series = wavy_series(200);
    let requests: Vec<SearchRequest> = (0..8)
        .map(|i| request(Window::new(i * 10, 5), SimilarityMetric::ShapeCorrelation, 80.0, 5))
        .collect();

    let (results, errors) = search_parallel(&series, &requests);
    assert!(errors.is_empty());
    assert_eq!(results.len(), requests.len());

    for outcome in results {
        let sequential = search(&series, &requests[outcome.index]).unwrap();
        assert_eq!(outcome.matches, sequential);
    }
}
