//! Contract tests for RT invariant signaling.
//!
//! Drive deterministic host behavior, then verify that the produce callback
//! reported the expected facts through the signal queue.

use livemix::harness::SimulatedHost;
use livemix::invariant_rt::{contract_test_rt, count_signals, SignalKind};
use livemix::io::{INVALID_ID, STATUS_NEED_DATA};
use livemix::{AudioFormat, NodeConfig, NodeInterface, SampleFormat};

fn one_port_host() -> SimulatedHost {
    SimulatedHost::new(NodeConfig {
        ports: 1,
        ..NodeConfig::default()
    })
    .unwrap()
}

fn negotiated(buffers: usize) -> SimulatedHost {
    let mut host = one_port_host();
    host.negotiate(0, &AudioFormat::new(SampleFormat::F32, 2, 48000), buffers)
        .unwrap();
    host
}

#[test]
fn contract_delivery_and_recycle_on_steady_cycles() {
    let mut host = negotiated(2);
    for _ in 0..4 {
        host.cycle().unwrap();
    }
    let signals = host.node.drain_rt_signals();
    contract_test_rt(
        "steady_cycles",
        &signals,
        &[SignalKind::BufferDelivered, SignalKind::BufferRecycled],
    );
    assert_eq!(count_signals(&signals, SignalKind::BufferDelivered), 4);
    assert_eq!(count_signals(&signals, SignalKind::BufferRecycled), 3);
    assert!(signals.iter().all(|s| !s.kind.is_anomaly()));
}

#[test]
fn contract_no_format_when_unnegotiated() {
    let mut host = one_port_host();
    host.allocate_buffers(0, 2, 256).unwrap();
    host.bind_io(0).unwrap();
    host.node.process().unwrap();
    let signals = host.node.drain_rt_signals();
    contract_test_rt("no_format", &signals, &[SignalKind::NoFormat]);
    assert_eq!(count_signals(&signals, SignalKind::BufferDelivered), 0);
}

#[test]
fn contract_starvation_is_signaled() {
    let mut host = negotiated(1);
    host.node.process().unwrap();
    host.io(0).unwrap().store(STATUS_NEED_DATA, INVALID_ID);
    assert!(host.node.process().is_err());
    let signals = host.node.drain_rt_signals();
    contract_test_rt(
        "starvation",
        &signals,
        &[SignalKind::BufferDelivered, SignalKind::Starvation],
    );
    let starved = signals
        .iter()
        .find(|s| s.kind == SignalKind::Starvation)
        .unwrap();
    assert_eq!((starved.port_id, starved.buffer_id), (0, INVALID_ID));
}

#[test]
fn contract_duplicate_recycle_is_an_anomaly() {
    let mut host = negotiated(2);
    host.node.process().unwrap();
    // The host returns buffer 0 out of band and then again through the mailbox.
    host.node.port_reuse_buffer(0, 0).unwrap();
    host.io(0).unwrap().store(STATUS_NEED_DATA, 0);
    host.node.process().unwrap();
    let signals = host.node.drain_rt_signals();
    contract_test_rt("duplicate_recycle", &signals, &[SignalKind::DuplicateRecycle]);
    assert!(SignalKind::DuplicateRecycle.is_anomaly());
}

#[test]
fn contract_notify_overflow_on_small_area() {
    let mut host = negotiated(2);
    host.bind_notify(0, 16).unwrap();
    host.cycle().unwrap();
    let signals = host.node.drain_rt_signals();
    contract_test_rt("notify_overflow", &signals, &[SignalKind::NotifyOverflow]);
}

#[test]
fn drained_queue_is_empty() {
    let mut host = negotiated(2);
    host.cycle().unwrap();
    assert!(!host.node.drain_rt_signals().is_empty());
    assert!(host.node.drain_rt_signals().is_empty());
}
