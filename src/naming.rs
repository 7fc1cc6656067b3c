//! Unique names for temporary provider resources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix shared by every temporary server name.
pub const SERVER_NAME_PREFIX: &str = "hcloud-imager-";

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Returns a server name derived from the current time in nanoseconds.
///
/// Stamps are strictly increasing within a process, so concurrent builds
/// never collide even when the clock does not advance between calls.
#[must_use]
pub fn server_name() -> String {
    format!("{SERVER_NAME_PREFIX}{}", next_stamp(now_nanos()))
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
        })
}

fn next_stamp(now: u64) -> u64 {
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last.saturating_add(1));
        match LAST_STAMP.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return candidate,
            Err(observed) => last = observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    #[test]
    fn names_are_distinct_within_a_process() {
        let first = server_name();
        let second = server_name();
        assert_ne!(first, second);
        assert!(first.starts_with(SERVER_NAME_PREFIX));
    }

    #[test]
    fn frozen_clock_still_yields_increasing_stamps() {
        let a = next_stamp(1);
        let b = next_stamp(1);
        assert!(b > a);
    }

    #[test]
    fn concurrent_callers_never_collide() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| (0..64).map(|_| server_name()).collect::<Vec<_>>()))
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for name in handle.join().expect("thread joins") {
                assert!(seen.insert(name), "duplicate server name generated");
            }
        }
    }
}
