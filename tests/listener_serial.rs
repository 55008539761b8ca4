//! Change notifications: listener isolation, partial emissions and the
//! serial bit of re-enumerable parameters.

use livemix::pod::{Key, ObjectType, Value};
use livemix::{
    AudioFormat, ChangeNotifier, Direction, Node, NodeChangeMask, NodeConfig, NodeEvents, NodeInfo,
    NodeInterface, Object, ParamKind, PortChangeMask, PortInfo, SampleFormat,
};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Event {
    Node(NodeChangeMask),
    Port {
        port_id: u32,
        mask: PortChangeMask,
        format_serial: bool,
        buffers_serial: bool,
    },
}

#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<Event>>>);

impl Log {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl NodeEvents for Log {
    fn info(&mut self, info: &NodeInfo) {
        self.0.lock().unwrap().push(Event::Node(info.change_mask));
    }

    fn port_info(&mut self, direction: Direction, port_id: u32, info: &PortInfo) {
        assert_eq!(direction, Direction::Output);
        let serial = |kind| info.params.get(kind).unwrap().serial();
        self.0.lock().unwrap().push(Event::Port {
            port_id,
            mask: info.change_mask,
            format_serial: serial(ParamKind::Format),
            buffers_serial: serial(ParamKind::Buffers),
        });
    }
}

fn commit(node: &mut Node, port_id: u32) {
    let format = AudioFormat::new(SampleFormat::F32, 2, 48000);
    node.port_set_param(
        Direction::Output,
        port_id,
        ParamKind::Format,
        Some(&format.to_object(ParamKind::Format)),
    )
    .unwrap();
}

fn port_events(events: &[Event]) -> Vec<(u32, PortChangeMask, bool, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Port {
                port_id,
                mask,
                format_serial,
                buffers_serial,
            } => Some((*port_id, *mask, *format_serial, *buffers_serial)),
            Event::Node(_) => None,
        })
        .collect()
}

/// Node with one listener attached and its initial replay consumed.
fn settled() -> (Node, Log) {
    let mut node = Node::new(NodeConfig::default()).unwrap();
    let log = Log::default();
    node.add_listener(Box::new(log.clone()));
    log.take();
    // Drain the construction-time pending bits.
    node.set_param(ParamKind::Props, None).unwrap();
    log.take();
    (node, log)
}

#[test]
fn second_listener_gets_replay_alone() {
    let mut node = Node::new(NodeConfig::default()).unwrap();
    let first = Log::default();
    let second = Log::default();
    node.add_listener(Box::new(first.clone()));
    assert_eq!(first.take().len(), 1 + node.n_ports());

    node.add_listener(Box::new(second.clone()));
    assert!(first.take().is_empty(), "existing listener saw the replay");
    let replay = second.take();
    assert!(matches!(replay[0], Event::Node(mask) if mask == NodeChangeMask::all()));
    assert_eq!(port_events(&replay).len(), node.n_ports());
    assert_eq!(node.listener_count(), 2);
}

#[test]
fn removed_listener_hears_nothing() {
    let mut node = Node::new(NodeConfig::default()).unwrap();
    let log = Log::default();
    let id = node.add_listener(Box::new(log.clone()));
    log.take();
    assert!(node.remove_listener(id));
    assert!(!node.remove_listener(id));
    commit(&mut node, 0);
    assert!(log.take().is_empty());
}

#[test]
fn format_commit_announces_only_the_changed_port() {
    let (mut node, log) = settled();
    commit(&mut node, 1);
    let ports = port_events(&log.take());
    assert_eq!(ports, vec![(1, PortChangeMask::PARAMS, true, true)]);
}

#[test]
fn serial_toggles_once_per_mutation_batch() {
    let (mut node, log) = settled();
    commit(&mut node, 0);
    commit(&mut node, 0);
    let ports = port_events(&log.take());
    assert_eq!(
        ports,
        vec![
            (0, PortChangeMask::PARAMS, true, true),
            (0, PortChangeMask::PARAMS, false, false),
        ]
    );
}

#[test]
fn partial_emission_consumes_pending_bits() {
    let (mut node, log) = settled();
    commit(&mut node, 0);
    log.take();
    // Nothing is pending now, so a no-op props reset only announces the node.
    node.set_param(ParamKind::Props, None).unwrap();
    let events = log.take();
    assert!(port_events(&events).is_empty());
    assert!(matches!(events.as_slice(), [Event::Node(mask)] if *mask == NodeChangeMask::PARAMS));
}

#[test]
fn full_replay_does_not_toggle_clean_serials() {
    let (mut node, log) = settled();
    commit(&mut node, 0);
    let after_commit = port_events(&log.take());
    let late = Log::default();
    node.add_listener(Box::new(late.clone()));
    let replay = port_events(&late.take());
    // Port 0 keeps the serial it had after the commit.
    assert_eq!(replay[0].2, after_commit[0].2);
    assert_eq!(replay[0].1, PortInfo::ALL);
}

#[test]
fn props_change_marks_props_dirty() {
    let (mut node, log) = settled();
    let serial_before = node.info().params.get(ParamKind::Props).unwrap().serial();
    let props =
        Object::new(ObjectType::Props, ParamKind::Props).with(Key::Volume, Value::Float(1.5));
    node.set_param(ParamKind::Props, Some(&props)).unwrap();
    let serial_after = node.info().params.get(ParamKind::Props).unwrap().serial();
    assert_ne!(serial_before, serial_after);
    assert!(log.take().iter().any(|e| matches!(e, Event::Node(_))));
}

#[test]
fn suspend_clears_formats_and_announces() {
    let (mut node, log) = settled();
    commit(&mut node, 0);
    log.take();
    node.send_command(livemix::Command::Suspend).unwrap();
    assert!(node.port(0).unwrap().format.is_none());
    let ports = port_events(&log.take());
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].0, 0);
}
