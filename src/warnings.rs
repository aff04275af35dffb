//! Deduplicated warning sink.
//!
//! Non-fatal conditions (automatic strategy downgrades, exclusive-jet
//! queries on measures without monotonic merge scales) are surfaced once
//! per distinct message for the lifetime of the process; repeats only
//! bump a counter.

use rustc_hash::FxHashMap;
use std::sync::{Mutex, OnceLock};

static REGISTRY: OnceLock<Mutex<FxHashMap<String, u64>>> = OnceLock::new();

/// Emit `msg` through `tracing::warn!` unless an identical message has
/// already been emitted by this process.
pub(crate) fn warn_once(msg: &str) {
    let registry = REGISTRY.get_or_init(|| Mutex::new(FxHashMap::default()));
    let mut seen = registry.lock().unwrap_or_else(|e| e.into_inner());
    let count = seen.entry(msg.to_owned()).or_insert(0);
    *count += 1;
    if *count == 1 {
        tracing::warn!("{}", msg);
    }
}

/// Number of times a given message has been registered so far. Mainly for
/// tests.
#[allow(dead_code)]
pub(crate) fn times_warned(msg: &str) -> u64 {
    REGISTRY
        .get()
        .and_then(|r| {
            r.lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(msg)
                .copied()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_once_counts_repeats() {
        let msg = "test-only warning: please ignore";
        warn_once(msg);
        warn_once(msg);
        warn_once(msg);
        assert_eq!(times_warned(msg), 3);
        assert_eq!(times_warned("never issued"), 0);
    }
}
