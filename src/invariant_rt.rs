//! RT-safe signaling for the produce callback.
//!
//! RT code **signals facts**. Non-RT code **judges correctness**.
//!
//! `process` never allocates, locks, logs or panics. Whatever it observes
//! that the host should hear about (a delivered buffer, a recycle of a
//! buffer that was already free, starvation) is pushed as a small `Copy`
//! record onto a lock-free SPSC queue. The control thread drains the queue
//! and logs or asserts on it.

use rtrb::{Consumer, Producer, RingBuffer};

/// Capacity for the signal queue.
/// Large enough to hold signals of many cycles between drains.
pub const SIGNAL_QUEUE_CAPACITY: usize = 256;

/// What the RT path observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// A filled buffer was published to the host.
    BufferDelivered,
    /// The buffer handed back by the host returned to the free queue.
    BufferRecycled,
    /// The host handed back a buffer that was already free.
    DuplicateRecycle,
    /// No free buffer was available.
    Starvation,
    /// A buffer was taken while no format was committed.
    NoFormat,
    /// The notify area was too small for the control sequence.
    NotifyOverflow,
}

impl SignalKind {
    /// Whether the control thread should warn about it.
    pub fn is_anomaly(self) -> bool {
        matches!(
            self,
            SignalKind::DuplicateRecycle | SignalKind::Starvation | SignalKind::NotifyOverflow
        )
    }

    /// Human-readable name (for diagnostics only).
    pub const fn name(self) -> &'static str {
        match self {
            SignalKind::BufferDelivered => "BUFFER_DELIVERED",
            SignalKind::BufferRecycled => "BUFFER_RECYCLED",
            SignalKind::DuplicateRecycle => "DUPLICATE_RECYCLE",
            SignalKind::Starvation => "STARVATION",
            SignalKind::NoFormat => "NO_FORMAT",
            SignalKind::NotifyOverflow => "NOTIFY_OVERFLOW",
        }
    }
}

/// One fact from the RT path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtSignal {
    pub kind: SignalKind,
    pub port_id: u32,
    pub buffer_id: u32,
}

/// Creates a new signal queue pair.
///
/// Returns (producer for RT, consumer for the control thread).
pub fn new_signal_queue() -> (Producer<RtSignal>, Consumer<RtSignal>) {
    RingBuffer::new(SIGNAL_QUEUE_CAPACITY)
}

/// Signals a fact from the RT path.
///
/// # RT Safety
/// - No allocation
/// - No locking
/// - No panics
/// - If queue is full, signal is dropped (preferable to blocking)
#[inline]
pub fn signal(tx: &mut Producer<RtSignal>, kind: SignalKind, port_id: u32, buffer_id: u32) {
    let _ = tx.push(RtSignal {
        kind,
        port_id,
        buffer_id,
    });
}

/// Drains all pending signals from the queue.
pub fn drain_signals(rx: &mut Consumer<RtSignal>) -> Vec<RtSignal> {
    let mut signals = Vec::with_capacity(rx.slots());
    while let Ok(s) = rx.pop() {
        signals.push(s);
    }
    signals
}

/// Counts signals of one kind.
pub fn count_signals(signals: &[RtSignal], kind: SignalKind) -> usize {
    signals.iter().filter(|s| s.kind == kind).count()
}

/// Contract verification: asserts that required kinds were signaled.
///
/// # Panics
/// Panics if any required kind was not signaled at least once.
#[cfg(any(test, feature = "ppt"))]
pub fn contract_test_rt(contract_name: &str, signals: &[RtSignal], required: &[SignalKind]) {
    let missing: Vec<&str> = required
        .iter()
        .filter(|&&kind| count_signals(signals, kind) == 0)
        .map(|kind| kind.name())
        .collect();

    if !missing.is_empty() {
        let present: Vec<&str> = signals
            .iter()
            .map(|s| s.kind.name())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        panic!(
            "RT Contract '{}' missing signals: {:?}. Present: {:?}",
            contract_name, missing, present
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_queue_roundtrip() {
        let (mut tx, mut rx) = new_signal_queue();

        signal(&mut tx, SignalKind::BufferDelivered, 0, 1);
        signal(&mut tx, SignalKind::BufferRecycled, 1, 0);

        let signals = drain_signals(&mut rx);
        assert_eq!(
            signals,
            vec![
                RtSignal {
                    kind: SignalKind::BufferDelivered,
                    port_id: 0,
                    buffer_id: 1
                },
                RtSignal {
                    kind: SignalKind::BufferRecycled,
                    port_id: 1,
                    buffer_id: 0
                },
            ]
        );
    }

    #[test]
    #[should_panic(expected = "missing signals")]
    fn test_contract_fails_when_signals_missing() {
        let (mut tx, mut rx) = new_signal_queue();
        signal(&mut tx, SignalKind::BufferDelivered, 0, 0);
        let signals = drain_signals(&mut rx);
        contract_test_rt(
            "incomplete contract",
            &signals,
            &[SignalKind::BufferDelivered, SignalKind::Starvation],
        );
    }

    #[test]
    fn test_queue_handles_overflow_gracefully() {
        let (mut tx, mut rx) = new_signal_queue();

        for i in 0..SIGNAL_QUEUE_CAPACITY + 100 {
            signal(&mut tx, SignalKind::BufferDelivered, 0, i as u32);
        }

        let signals = drain_signals(&mut rx);
        assert_eq!(signals.len(), SIGNAL_QUEUE_CAPACITY);
        assert_eq!(signals[0].buffer_id, 0);
    }

    #[test]
    fn test_anomalies() {
        assert!(SignalKind::DuplicateRecycle.is_anomaly());
        assert!(!SignalKind::BufferDelivered.is_anomaly());
        assert_eq!(SignalKind::Starvation.name(), "STARVATION");
    }
}
