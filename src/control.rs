//! Control sequences written into a port's notify area.
//!
//! Each produced cycle the node rewrites the notify area with a sequence
//! holding one Properties control that carries the current volume
//! automation value. The host reads it after the cycle.
//!
//! # Layout
//!
//! Native endian, 8-byte aligned:
//! - sequence header: body size, type, unit, padding
//! - per control: offset, control type, then an object carrying one
//!   float property
//!
//! Writing never allocates; [`decode_controls`] is for hosts and tests and
//! does.

pub const TYPE_FLOAT: u32 = 6;
pub const TYPE_OBJECT: u32 = 15;
pub const TYPE_SEQUENCE: u32 = 16;
pub const OBJECT_TYPE_PROPS: u32 = 0x40002;
pub const CONTROL_PROPERTIES: u32 = 1;

/// Property key of the volume automation value.
pub const PROP_VOLUME: u32 = 0x10003;

const SEQUENCE_HEADER: usize = 16;
/// Control header plus an object with one float property.
const PROPERTY_CONTROL: usize = 8 + 8 + 32;

/// Bytes needed for a sequence holding `n` property controls.
pub const fn sequence_size(n: usize) -> usize {
    SEQUENCE_HEADER + n * PROPERTY_CONTROL
}

/// One decoded property control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyControl {
    pub offset: u32,
    pub key: u32,
    pub value: f32,
}

/// Builds a sequence in place.
pub struct SequenceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SequenceWriter<'a> {
    /// Start a sequence at the beginning of `buf`; `None` if it cannot even
    /// hold the header.
    pub fn begin(buf: &'a mut [u8]) -> Option<Self> {
        if buf.len() < SEQUENCE_HEADER {
            return None;
        }
        let mut writer = Self { buf, pos: 0 };
        writer.put_u32(0);
        writer.put_u32(TYPE_SEQUENCE);
        writer.put_u32(0);
        writer.put_u32(0);
        Some(writer)
    }

    /// Append a Properties control with one float property. Returns false
    /// and writes nothing when the area is full.
    pub fn push_float_property(&mut self, offset: u32, key: u32, value: f32) -> bool {
        if self.buf.len() - self.pos < PROPERTY_CONTROL {
            return false;
        }
        self.put_u32(offset);
        self.put_u32(CONTROL_PROPERTIES);
        self.put_u32(32);
        self.put_u32(TYPE_OBJECT);
        self.put_u32(OBJECT_TYPE_PROPS);
        self.put_u32(0);
        self.put_u32(key);
        self.put_u32(0);
        self.put_u32(4);
        self.put_u32(TYPE_FLOAT);
        self.buf[self.pos..self.pos + 4].copy_from_slice(&value.to_ne_bytes());
        self.pos += 4;
        self.put_u32(0);
        true
    }

    /// Close the sequence; returns the bytes written.
    pub fn finish(self) -> usize {
        let body = (self.pos - 8) as u32;
        self.buf[0..4].copy_from_slice(&body.to_ne_bytes());
        self.pos
    }

    fn put_u32(&mut self, v: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_ne_bytes());
        self.pos += 4;
    }
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Decode every float property control of a sequence. Returns `None` for
/// anything that is not a well-formed sequence.
pub fn decode_controls(bytes: &[u8]) -> Option<Vec<PropertyControl>> {
    let body = read_u32(bytes, 0)? as usize;
    if read_u32(bytes, 4)? != TYPE_SEQUENCE {
        return None;
    }
    let end = 8usize.checked_add(body)?;
    if end > bytes.len() {
        return None;
    }
    let mut out = Vec::new();
    let mut pos = SEQUENCE_HEADER;
    while pos + 16 <= end {
        let offset = read_u32(bytes, pos)?;
        let control_type = read_u32(bytes, pos + 4)?;
        let size = read_u32(bytes, pos + 8)? as usize;
        let value_type = read_u32(bytes, pos + 12)?;
        let body_at = pos + 16;
        if control_type == CONTROL_PROPERTIES && value_type == TYPE_OBJECT {
            // object type and id, then key/flags/pod per property
            let mut prop = body_at + 8;
            while prop + 16 <= body_at + size {
                let key = read_u32(bytes, prop)?;
                let value_size = read_u32(bytes, prop + 8)? as usize;
                if read_u32(bytes, prop + 12)? == TYPE_FLOAT {
                    let value = f32::from_bits(read_u32(bytes, prop + 16)?);
                    out.push(PropertyControl { offset, key, value });
                }
                prop += 16 + value_size.next_multiple_of(8);
            }
        }
        pos = body_at + size.next_multiple_of(8);
    }
    Some(out)
}
