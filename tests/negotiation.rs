//! Parameter enumeration and commit through the host interface.

use livemix::format::{enum_format_candidate, MEDIA_SUBTYPE_RAW, MEDIA_TYPE_AUDIO};
use livemix::pod::{Key, ObjectType, Predicate, Value};
use livemix::{
    AudioFormat, Direction, Node, NodeConfig, NodeError, NodeInterface, Object, ParamFlags,
    ParamKind, SampleFormat,
};

fn node() -> Node {
    Node::new(NodeConfig::default()).unwrap()
}

fn port_flags(node: &Node, kind: ParamKind) -> ParamFlags {
    node.port(0).unwrap().info.params.get(kind).unwrap().flags - ParamFlags::SERIAL
}

#[test]
fn enum_format_is_available_before_any_commit() {
    let node = node();
    let results = node
        .port_enum_params(Direction::Output, 0, ParamKind::EnumFormat, 0, 8, None)
        .unwrap();
    assert_eq!(results.len(), 1);
    let candidate = &results[0].param;
    assert_eq!(candidate, &enum_format_candidate());
    assert_eq!(candidate.get(Key::MediaType), Some(&Value::Id(MEDIA_TYPE_AUDIO)));
    assert_eq!(candidate.get(Key::MediaSubtype), Some(&Value::Id(MEDIA_SUBTYPE_RAW)));
    assert_eq!(
        candidate.get(Key::AudioChannels),
        Some(&Value::int_range(2, 1, i32::MAX))
    );
}

#[test]
fn host_filter_fixates_the_format() {
    let node = node();
    let filter = Object::new(ObjectType::Format, ParamKind::EnumFormat)
        .with(Key::AudioFormat, Value::Id(SampleFormat::F32.raw()))
        .with(Key::AudioChannels, Value::Int(2))
        .with(Key::AudioRate, Value::Int(48000));
    let results = node
        .port_enum_params(Direction::Output, 0, ParamKind::EnumFormat, 0, 1, Some(&filter))
        .unwrap();
    let fixated = AudioFormat::parse(&results[0].param).unwrap();
    assert_eq!(fixated, AudioFormat::new(SampleFormat::F32, 2, 48000));
}

#[test]
fn incompatible_filter_yields_nothing() {
    let node = node();
    let filter = Object::new(ObjectType::Format, ParamKind::EnumFormat)
        .with(Key::AudioFormat, Value::Id(0x999));
    let results = node
        .port_enum_params(Direction::Output, 0, ParamKind::EnumFormat, 0, 1, Some(&filter))
        .unwrap();
    assert!(results.is_empty());
}

#[test]
fn format_commit_flips_flags() {
    let mut node = node();
    assert_eq!(port_flags(&node, ParamKind::Format), ParamFlags::WRITE);
    assert_eq!(port_flags(&node, ParamKind::Buffers), ParamFlags::empty());

    let format = AudioFormat::new(SampleFormat::S16, 2, 44100);
    node.port_set_param(
        Direction::Output,
        0,
        ParamKind::Format,
        Some(&format.to_object(ParamKind::Format)),
    )
    .unwrap();
    assert_eq!(port_flags(&node, ParamKind::Format), ParamFlags::READWRITE);
    assert_eq!(port_flags(&node, ParamKind::Buffers), ParamFlags::READ);
    assert_eq!(node.port(0).unwrap().format, Some(format));

    node.port_set_param(Direction::Output, 0, ParamKind::Format, None)
        .unwrap();
    assert_eq!(port_flags(&node, ParamKind::Format), ParamFlags::WRITE);
    assert_eq!(port_flags(&node, ParamKind::Buffers), ParamFlags::empty());
    assert!(node.port(0).unwrap().format.is_none());
}

#[test]
fn buffers_only_enumerate_with_a_format() {
    let mut node = node();
    let before = node
        .port_enum_params(Direction::Output, 0, ParamKind::Buffers, 0, 1, None)
        .unwrap();
    assert!(before.is_empty());

    let format = AudioFormat::new(SampleFormat::F32P, 4, 48000);
    node.port_set_param(
        Direction::Output,
        0,
        ParamKind::Format,
        Some(&format.to_object(ParamKind::Format)),
    )
    .unwrap();
    let after = node
        .port_enum_params(Direction::Output, 0, ParamKind::Buffers, 0, 1, None)
        .unwrap();
    let param = &after[0].param;
    assert_eq!(param.get(Key::BuffersBlocks), Some(&Value::Int(1)));
    assert_eq!(param.get(Key::BuffersStride), Some(&Value::Int(4)));
    assert_eq!(
        param.get(Key::BuffersSize),
        Some(&Value::int_range(128 * 4, 32, i32::MAX))
    );
    assert_eq!(
        param.get(Key::BuffersCount),
        Some(&Value::int_range(1, 1, livemix::MAX_BUFFERS as i32))
    );
}

#[test]
fn malformed_format_is_rejected_without_mutation() {
    let mut node = node();
    let mut object = AudioFormat::new(SampleFormat::F32, 2, 48000).to_object(ParamKind::Format);
    object.set(Key::AudioRate, Value::Int(0));
    let err = node
        .port_set_param(Direction::Output, 0, ParamKind::Format, Some(&object))
        .unwrap_err();
    assert!(matches!(err, NodeError::MalformedParam { .. }));
    assert!(node.port(0).unwrap().format.is_none());
    assert_eq!(port_flags(&node, ParamKind::Format), ParamFlags::WRITE);
}

#[test]
fn only_format_is_settable_on_ports() {
    let mut node = node();
    let err = node
        .port_set_param(Direction::Output, 0, ParamKind::Buffers, None)
        .unwrap_err();
    assert!(matches!(err, NodeError::UnsupportedParam(ParamKind::Buffers)));
    assert_eq!(err.errno(), -libc::ENOENT);
}

#[test]
fn unknown_kind_fails_but_unreadable_kind_is_empty() {
    let node = node();
    assert!(matches!(
        node.port_enum_params(Direction::Output, 0, ParamKind::Latency, 0, 1, None),
        Err(NodeError::UnsupportedParam(ParamKind::Latency))
    ));
    assert!(node
        .port_enum_params(Direction::Output, 0, ParamKind::Format, 0, 1, None)
        .unwrap()
        .is_empty());
    assert!(node
        .enum_params(ParamKind::Format, 0, 1, None)
        .unwrap()
        .is_empty());
}

#[test]
fn meta_and_io_candidates() {
    let node = node();
    let meta = node
        .port_enum_params(Direction::Output, 0, ParamKind::Meta, 0, 4, None)
        .unwrap();
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].param.get(Key::MetaSize), Some(&Value::Int(32)));

    let io = node
        .port_enum_params(Direction::Output, 0, ParamKind::Io, 0, 4, None)
        .unwrap();
    let sizes: Vec<_> = io
        .iter()
        .map(|r| r.param.get(Key::IoSize).and_then(Value::as_int))
        .collect();
    assert_eq!(sizes, vec![Some(8), Some(1040)]);
}

#[test]
fn predicate_filters_skip_rejected_candidates() {
    let node = node();
    let big_only = Predicate(|o: &Object| o.get(Key::IoSize).and_then(Value::as_int) > Some(8));
    let io = node
        .port_enum_params(Direction::Output, 0, ParamKind::Io, 0, 1, Some(&big_only))
        .unwrap();
    assert_eq!(io.len(), 1);
    assert_eq!((io[0].index, io[0].next), (1, 2));
}

#[test]
fn node_volume_roundtrip() {
    let mut node = node();
    let props = Object::new(ObjectType::Props, ParamKind::Props).with(Key::Volume, Value::Float(0.8));
    node.set_param(ParamKind::Props, Some(&props)).unwrap();
    assert_eq!(node.props().volume, 0.8);
    let current = node.enum_params(ParamKind::Props, 0, 1, None).unwrap();
    assert_eq!(current[0].param.get(Key::Volume), Some(&Value::Float(0.8)));

    node.set_param(ParamKind::Props, None).unwrap();
    assert_eq!(node.props().volume, NodeConfig::default().volume);

    assert!(matches!(
        node.set_param(ParamKind::Route, None),
        Err(NodeError::UnsupportedParam(ParamKind::Route))
    ));
}

#[test]
fn node_format_applies_to_every_port() {
    let mut node = node();
    let format = AudioFormat::new(SampleFormat::S16P, 1, 22050);
    node.set_param(ParamKind::Format, Some(&format.to_object(ParamKind::Format)))
        .unwrap();
    for id in 0..node.n_ports() as u32 {
        assert_eq!(node.port(id).unwrap().format, Some(format));
    }
}
