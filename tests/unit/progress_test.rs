//! Tests for progress reports

use workq_engine::core::Progress;

#[test]
fn test_percent_is_clamped() {
    assert_eq!(Progress::percent(150.0).get_percent(), Some(100.0));
    assert_eq!(Progress::percent(-3.0).get_percent(), Some(0.0));
    assert!(Progress::percent(42.0).is_with_percent());
}

#[test]
fn test_count_progress() {
    let progress = Progress::count(3, 10);
    assert!(progress.is_with_current_and_total());
    assert_eq!(progress.current(), Some(3));
    assert_eq!(progress.total(), 10);
    assert_eq!(progress.get_percent(), None);
}

#[test]
fn test_progress_serde_round_trip() {
    for progress in [
        Progress::INDETERMINATE,
        Progress::percent(12.5),
        Progress::count(7, 9),
    ] {
        let json = serde_json::to_string(&progress).unwrap();
        let back: Progress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, progress);
    }
}
