//! Mutual-exclusion checking for the lock protocol (C4, spec.md §4.3): every
//! worker that observes an exclusive lock as `Found` holds a lease from that
//! instant until it issues the matching release call. Two leases on the same
//! session id must never overlap — if they do, the two-phase acquire let two
//! callers believe they both held the lock at once.

use std::collections::HashMap;
use std::time::Instant;

/// One observed exclusive-lock lease, as seen by a single worker.
#[derive(Clone)]
pub struct LockInterval {
    pub session_id: String,
    /// When `get_exclusive` returned `Found`.
    pub acquired_ts: Instant,
    /// When the matching release call was issued.
    pub released_ts: Instant,
}

pub struct History(pub Vec<LockInterval>);

pub struct Violation {
    pub session_id: String,
    pub first: (Instant, Instant),
    pub second: (Instant, Instant),
}

impl History {
    /// Group leases by session id, sort each group by acquisition time, and
    /// flag any pair whose windows overlap.
    pub fn check_correctness(&self) -> Vec<Violation> {
        let mut by_session: HashMap<&str, Vec<&LockInterval>> = HashMap::new();
        for interval in &self.0 {
            by_session.entry(interval.session_id.as_str()).or_default().push(interval);
        }

        let mut violations = Vec::new();
        for intervals in by_session.values_mut() {
            intervals.sort_by_key(|i| i.acquired_ts);
            for pair in intervals.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                if b.acquired_ts < a.released_ts {
                    violations.push(Violation {
                        session_id: a.session_id.clone(),
                        first: (a.acquired_ts, a.released_ts),
                        second: (b.acquired_ts, b.released_ts),
                    });
                }
            }
        }
        violations
    }
}
