//! PPT Invariant System: non-RT invariant enforcement with contract tracking.

// IMPORTANT: never call into this module from `process`; the log takes a lock.

#[cfg(feature = "ppt")]
use lazy_static::lazy_static;
#[cfg(feature = "ppt")]
use std::collections::HashSet;
#[cfg(feature = "ppt")]
use std::sync::Mutex;

// Invariant constants for contract tracking
pub const CONFIG_VALIDATED: u32 = 1;
pub const PORT_CAPACITY: u32 = 2;
pub const POOL_CAPACITY: u32 = 3;
pub const POOL_ALL_FREE_AFTER_USE: u32 = 4;
pub const POOL_MEMBERSHIP_EXCLUSIVE: u32 = 5;
pub const FORMAT_COMPLETE: u32 = 6;
pub const BUFFERS_GATED_BY_FORMAT: u32 = 7;
pub const SERIAL_EDGE_TRIGGERED: u32 = 8;
pub const LISTENER_ISOLATED: u32 = 9;
pub const UNSUPPORTED_REJECTED: u32 = 10;

#[cfg(feature = "ppt")]
lazy_static! {
    static ref INVARIANT_LOG: Mutex<HashSet<u32>> = Mutex::new(HashSet::new());
}

#[cfg(feature = "ppt")]
fn with_log<R>(f: impl FnOnce(&mut HashSet<u32>) -> R) -> R {
    // A panicking invariant poisons the lock; the set itself stays usable.
    let mut log = INVARIANT_LOG.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut log)
}

#[cfg(feature = "ppt")]
/// Assert an invariant: logs it and panics on failure.
pub(crate) fn assert_invariant(id: u32, condition: bool, message: &str, context: Option<&str>) {
    if !condition {
        let full_message = if let Some(ctx) = context {
            format!("Invariant {} failed: {} (context: {})", id, message, ctx)
        } else {
            format!("Invariant {} failed: {}", id, message)
        };
        tracing::error!("{}", full_message);
        panic!("{}", full_message);
    }
    with_log(|log| log.insert(id));
}

#[cfg(not(feature = "ppt"))]
/// Assert an invariant: checks condition and panics on failure.
pub(crate) fn assert_invariant(_id: u32, condition: bool, message: &str, _context: Option<&str>) {
    if !condition {
        panic!("Invariant failed: {}", message);
    }
}

#[cfg(feature = "ppt")]
/// Contract test: checks that specified invariants were asserted.
pub fn contract_test(test_name: &str, required_invariants: &[u32]) {
    let missing: Vec<u32> = with_log(|log| {
        required_invariants
            .iter()
            .copied()
            .filter(|inv| !log.contains(inv))
            .collect()
    });
    if !missing.is_empty() {
        panic!(
            "Contract test '{}' failed: invariants not enforced: {:?}",
            test_name, missing
        );
    }
}

#[cfg(not(feature = "ppt"))]
/// Contract test: no-op when PPT feature is disabled.
pub fn contract_test(_test_name: &str, _required_invariants: &[u32]) {}

#[cfg(feature = "ppt")]
/// Clear invariant log (for between test runs).
pub fn clear_invariant_log() {
    with_log(|log| log.clear());
}

#[cfg(not(feature = "ppt"))]
/// Clear invariant log: no-op when PPT feature is disabled.
pub fn clear_invariant_log() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_invariant_pass() {
        assert_invariant(CONFIG_VALIDATED, 1 + 1 == 2, "Math works", Some("basic"));
    }

    #[test]
    #[should_panic(expected = "Invariant")]
    fn test_assert_invariant_fail() {
        assert_invariant(0, 1 + 1 == 3, "Math broken", None);
    }

    #[test]
    fn test_contract_test() {
        assert_invariant(LISTENER_ISOLATED, true, "seeded", None);
        contract_test("example", &[LISTENER_ISOLATED]);
    }
}
