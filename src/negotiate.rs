//! Parameter negotiation: enumerating candidates and committing values.
//!
//! Enumeration is index based. Each entity produces its candidates for a
//! kind one index at a time; the host's filter narrows or rejects each one,
//! and a rejection only skips that index.

#![forbid(unsafe_code)]

use crate::error::{NodeError, Result};
use crate::format::{enum_format_candidate, AudioFormat};
use crate::invariant_ppt::{
    assert_invariant, BUFFERS_GATED_BY_FORMAT, FORMAT_COMPLETE, UNSUPPORTED_REJECTED,
};
use crate::io::{IoId, NOTIFY_AREA_SIZE};
use crate::param::{ParamKind, ParamTable};
use crate::pod::{Key, Object, ObjectType, ParamFilter, Value};
use crate::port::PortState;
use crate::MAX_BUFFERS;
use std::mem::size_of;

/// Meta type of the buffer header.
pub const META_HEADER: u32 = 1;
/// Size of the buffer header meta.
pub const META_HEADER_SIZE: i32 = 32;
/// Smallest buffer the node accepts.
pub const MIN_BUFFER_SIZE: i32 = 32;
/// Upper bound of the volume property.
pub const MAX_VOLUME: f32 = 10.0;

/// One enumerated parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamResult {
    pub id: ParamKind,
    /// Index this result was produced from.
    pub index: u32,
    /// Index to resume enumeration from.
    pub next: u32,
    pub param: Object,
}

/// Walk candidates of `kind` from `start`, keeping at most `max_count`
/// that pass `filter`.
///
/// A kind the entity does not handle is an error; a handled kind that is
/// not readable right now simply has nothing to enumerate.
pub fn enumerate(
    table: &ParamTable,
    kind: ParamKind,
    start: u32,
    max_count: u32,
    filter: Option<&dyn ParamFilter>,
    mut candidate: impl FnMut(u32) -> Option<Object>,
) -> Result<Vec<ParamResult>> {
    let Some(info) = table.get(kind) else {
        assert_invariant(
            UNSUPPORTED_REJECTED,
            candidate(start).is_none(),
            "a kind missing from the table has no candidates",
            Some("enumerate"),
        );
        return Err(NodeError::UnsupportedParam(kind));
    };
    let mut results = Vec::new();
    if !info.is_readable() || max_count == 0 {
        return Ok(results);
    }
    let mut index = start;
    while let Some(object) = candidate(index) {
        let next = index.saturating_add(1);
        let accepted = match filter {
            Some(filter) => filter.apply(object),
            None => Some(object),
        };
        if let Some(param) = accepted {
            results.push(ParamResult {
                id: kind,
                index,
                next,
                param,
            });
            if results.len() as u32 >= max_count {
                break;
            }
        }
        if next == index {
            break;
        }
        index = next;
    }
    Ok(results)
}

fn io_candidate(id: IoId, size: usize) -> Object {
    Object::new(ObjectType::ParamIo, ParamKind::Io)
        .with(Key::IoId, Value::Id(id.raw()))
        .with(Key::IoSize, Value::Int(size as i32))
}

/// Buffer layout requirement for a committed format.
pub fn buffers_candidate(format: &AudioFormat, period_samples: u32) -> Object {
    let stride = format.stride();
    let size = period_samples.saturating_mul(stride).min(i32::MAX as u32) as i32;
    Object::new(ObjectType::ParamBuffers, ParamKind::Buffers)
        .with(Key::BuffersCount, Value::int_range(1, 1, MAX_BUFFERS as i32))
        .with(Key::BuffersBlocks, Value::Int(1))
        .with(
            Key::BuffersSize,
            Value::int_range(size.max(MIN_BUFFER_SIZE), MIN_BUFFER_SIZE, i32::MAX),
        )
        .with(Key::BuffersStride, Value::Int(stride as i32))
}

/// Candidate `index` of `kind` on a port.
pub fn port_candidate(port: &PortState, kind: ParamKind, index: u32) -> Option<Object> {
    match (kind, index) {
        (ParamKind::EnumFormat, 0) => Some(enum_format_candidate()),
        (ParamKind::Format, 0) => port.format.map(|f| f.to_object(ParamKind::Format)),
        (ParamKind::Buffers, 0) => port
            .format
            .map(|f| buffers_candidate(&f, port.period_samples)),
        (ParamKind::Meta, 0) => Some(
            Object::new(ObjectType::ParamMeta, ParamKind::Meta)
                .with(Key::MetaType, Value::Id(META_HEADER))
                .with(Key::MetaSize, Value::Int(META_HEADER_SIZE)),
        ),
        (ParamKind::Io, 0) => Some(io_candidate(
            IoId::Buffers,
            size_of::<crate::io::IoBuffers>(),
        )),
        (ParamKind::Io, 1) => Some(io_candidate(IoId::Notify, NOTIFY_AREA_SIZE)),
        _ => None,
    }
}

/// Candidate `index` of `kind` on the node.
pub fn node_candidate(
    kind: ParamKind,
    index: u32,
    volume: f32,
    default_volume: f32,
) -> Option<Object> {
    match (kind, index) {
        (ParamKind::PropInfo, 0) => Some(
            Object::new(ObjectType::PropInfo, ParamKind::PropInfo)
                .with(Key::PropInfoName, Value::String("volume".to_string()))
                .with(
                    Key::PropInfoType,
                    Value::float_range(default_volume, 0.0, MAX_VOLUME),
                ),
        ),
        (ParamKind::Props, 0) => Some(
            Object::new(ObjectType::Props, ParamKind::Props).with(Key::Volume, Value::Float(volume)),
        ),
        (ParamKind::EnumFormat, 0) => Some(enum_format_candidate()),
        _ => None,
    }
}

/// Commit or clear the format of one port.
///
/// A malformed payload is rejected before anything changes.
pub fn commit_port_format(port: &mut PortState, param: Option<&Object>) -> Result<()> {
    let format = param.map(AudioFormat::parse).transpose()?;
    port.apply_format(format);
    assert_invariant(
        FORMAT_COMPLETE,
        port.format.map_or(true, |f| f.rate > 0 && f.channels > 0),
        "a committed format is complete",
        Some("commit_port_format"),
    );
    assert_invariant(
        BUFFERS_GATED_BY_FORMAT,
        port.is_buffers_readable() == port.format.is_some()
            && port.is_format_readable() == port.format.is_some(),
        "buffers and format are readable exactly when a format is committed",
        Some("commit_port_format"),
    );
    Ok(())
}

/// Volume carried by a Props payload, if it names one.
pub fn parse_volume(param: &Object) -> Result<Option<f32>> {
    let malformed = |reason| NodeError::MalformedParam {
        kind: ParamKind::Props,
        reason,
    };
    if param.object_type != ObjectType::Props {
        return Err(malformed("not a props object"));
    }
    match param.get(Key::Volume) {
        None => Ok(None),
        Some(value) => match value.as_float() {
            Some(v) if v.is_finite() && (0.0..=MAX_VOLUME).contains(&v) => Ok(Some(v)),
            Some(_) => Err(malformed("volume out of range")),
            None => Err(malformed("volume is not a float")),
        },
    }
}
