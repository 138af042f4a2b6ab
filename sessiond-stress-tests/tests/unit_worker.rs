use rand::{rngs::StdRng, SeedableRng};
use sessiond_stress_tests::worker::{generate_value, is_error};

// `worker::run` drives a live tokio task pool against a shared facade and is
// inherently integration-level. The pure helpers exposed by worker.rs cover
// all of the deterministically-testable logic.

#[test]
fn test_generate_value_stays_within_bounds_and_varies() {
    let mut rng = StdRng::seed_from_u64(42);

    let mut all_same = true;
    let mut prev: Option<Vec<u8>> = None;
    for _ in 0..50 {
        let value = generate_value(&mut rng, 20);
        assert_eq!(value.timeout_minutes, 20);
        let bytes = value.session_items.expect("payload dictionary must be present").0[0].1.clone();
        assert!(bytes.len() >= 8, "payload too short: {}", bytes.len());
        assert!(bytes.len() <= 64, "payload too long: {}", bytes.len());
        if let Some(ref p) = prev {
            if p != &bytes {
                all_same = false;
            }
        }
        prev = Some(bytes);
    }
    assert!(!all_same, "generate_value returned identical payloads every time");
}

#[test]
fn test_is_error_reflects_the_result_variant() {
    let ok: Result<(), sessiond_common::SessionStoreError> = Ok(());
    let not_found: Result<(), sessiond_common::SessionStoreError> =
        Err(sessiond_common::SessionStoreError::NotFound("s1".to_string()));
    let conflict: Result<(), sessiond_common::SessionStoreError> =
        Err(sessiond_common::SessionStoreError::Conflict("s1".to_string()));

    assert!(!is_error(&ok));
    assert!(is_error(&not_found));
    assert!(is_error(&conflict));
}
