//! Drives many concurrent tasks through the provider facade's full request
//! path (spec.md §4.5) against a shared backend, recording latency, error,
//! and exclusive-lock-lease data for post-run reporting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use sessiond_core::{Dictionary, SessionValue};
use sessiond_provider::{ExclusiveGet, ProviderFacade};

use crate::history::{History, LockInterval};
use crate::metrics::Metrics;
use crate::workload::{Op, WorkloadProfile};

struct TaskOutcome {
    requests: u64,
    errors: u64,
    latency_ns: Vec<u64>,
    intervals: Vec<LockInterval>,
}

/// Spawn `concurrency` tasks, each sampling `profile` and issuing operations
/// against a session drawn uniformly from `key_space` distinct ids, until
/// `duration` has elapsed. Returns the merged metrics and lock-lease history.
pub async fn run(
    facade: Arc<ProviderFacade>,
    profile: WorkloadProfile,
    key_space: usize,
    concurrency: usize,
    duration: Duration,
) -> (Metrics, History) {
    let run_start = Instant::now();
    let deadline = run_start + duration;

    let mut handles = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let facade = facade.clone();
        handles.push(tokio::spawn(async move { run_one_task(facade, profile, key_space, deadline).await }));
    }

    let mut requests_total = 0u64;
    let mut errors = 0u64;
    let mut latency_ns = Vec::new();
    let mut intervals = Vec::new();
    for handle in handles {
        let outcome = handle.await.expect("worker task panicked");
        requests_total += outcome.requests;
        errors += outcome.errors;
        latency_ns.extend(outcome.latency_ns);
        intervals.extend(outcome.intervals);
    }

    let elapsed_secs = run_start.elapsed().as_secs_f64();
    let metrics = Metrics { requests_total, errors, latency_ns, elapsed_secs };
    (metrics, History(intervals))
}

async fn run_one_task(
    facade: Arc<ProviderFacade>,
    profile: WorkloadProfile,
    key_space: usize,
    deadline: Instant,
) -> TaskOutcome {
    let mut rng = rand::thread_rng();
    let mut requests = 0u64;
    let mut errors = 0u64;
    let mut latency_ns = Vec::new();
    let mut intervals = Vec::new();

    while Instant::now() < deadline {
        let op = profile.sample(&mut rng);
        let key_idx = rng.gen_range(0..key_space);
        let session_id = format!("session_{key_idx}");

        let op_start = Instant::now();
        let failed = execute_op(&facade, op, &session_id, &mut rng, &mut intervals).await;
        let op_end = Instant::now();

        if failed {
            errors += 1;
        }
        requests += 1;
        latency_ns.push((op_end - op_start).as_nanos() as u64);
    }

    TaskOutcome { requests, errors, latency_ns, intervals }
}

/// Execute one sampled operation. Returns `true` if it failed.
async fn execute_op(
    facade: &ProviderFacade,
    op: Op,
    session_id: &str,
    rng: &mut impl Rng,
    intervals: &mut Vec<LockInterval>,
) -> bool {
    match op {
        Op::SharedRead => match facade.get_shared(session_id).await {
            Ok(read) => {
                if read.value.is_none() {
                    return facade.create_uninitialized(session_id, 20).await.is_err();
                }
                if let Some(stashed) = read.stashed {
                    facade.extend_lifetime(session_id, &stashed).await;
                }
                false
            }
            Err(_) => true,
        },
        Op::ExclusiveWrite => {
            let acquired_ts = Instant::now();
            match facade.get_exclusive(session_id).await {
                Ok(ExclusiveGet::Found { lock_id, .. }) => {
                    let value = generate_value(rng, 20);
                    let failed = facade
                        .set_and_release_exclusive(session_id, &value, &lock_id, false)
                        .await
                        .is_err();
                    intervals.push(LockInterval {
                        session_id: session_id.to_string(),
                        acquired_ts,
                        released_ts: Instant::now(),
                    });
                    failed
                }
                Ok(ExclusiveGet::NotFound) => facade.create_uninitialized(session_id, 20).await.is_err(),
                // Another task is already holding the lock: not an error,
                // just contention the caller backs off from.
                Ok(ExclusiveGet::Contended { .. }) => false,
                Err(_) => true,
            }
        }
        Op::Remove => facade.remove(session_id).await.is_err(),
    }
}

/// Build a session value carrying a small random payload, for use in
/// `ExclusiveWrite` operations.
pub fn generate_value(rng: &mut impl Rng, timeout_minutes: i32) -> SessionValue {
    let len: usize = rng.gen_range(8..=64);
    let bytes: Vec<u8> = (0..len).map(|_| rng.gen::<u8>()).collect();
    let mut items = Dictionary::new();
    items.insert("payload", bytes);
    SessionValue { timeout_minutes, session_items: Some(items), static_objects: None }
}

/// Returns `true` if `result` represents a failed operation. Exposed for
/// deterministic unit testing alongside [`generate_value`].
pub fn is_error<T>(result: &Result<T, sessiond_common::SessionStoreError>) -> bool {
    result.is_err()
}
