use std::time::{Duration, Instant};
use sessiond_stress_tests::history::{History, LockInterval};

fn interval(session_id: &str, acquired_offset_ms: u64, released_offset_ms: u64, base: Instant) -> LockInterval {
    LockInterval {
        session_id: session_id.to_string(),
        acquired_ts: base + Duration::from_millis(acquired_offset_ms),
        released_ts: base + Duration::from_millis(released_offset_ms),
    }
}

#[test]
fn non_overlapping_leases_are_clean() {
    let base = Instant::now();
    let history = History(vec![
        interval("s1", 0, 10, base),
        interval("s1", 10, 20, base),
        interval("s1", 20, 30, base),
    ]);
    assert!(history.check_correctness().is_empty());
}

#[test]
fn overlapping_leases_on_the_same_session_are_flagged() {
    let base = Instant::now();
    let history = History(vec![interval("s1", 0, 20, base), interval("s1", 10, 30, base)]);
    let violations = history.check_correctness();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].session_id, "s1");
}

#[test]
fn overlapping_leases_on_different_sessions_are_independent() {
    let base = Instant::now();
    let history = History(vec![interval("s1", 0, 20, base), interval("s2", 5, 25, base)]);
    assert!(history.check_correctness().is_empty());
}

#[test]
fn touching_but_not_overlapping_is_not_a_violation() {
    let base = Instant::now();
    let history = History(vec![interval("s1", 0, 10, base), interval("s1", 10, 20, base)]);
    assert!(history.check_correctness().is_empty());
}

#[test]
fn three_way_overlap_reports_each_conflicting_pair() {
    let base = Instant::now();
    // All three leases overlap pairwise: [0,30), [5,35), [10,40).
    let history = History(vec![
        interval("s1", 0, 30, base),
        interval("s1", 5, 35, base),
        interval("s1", 10, 40, base),
    ]);
    let violations = history.check_correctness();
    assert_eq!(violations.len(), 2, "adjacent sorted pairs must each be flagged");
}
