//! Raw audio formats: the capability candidate, parsing a committed format
//! and building it back for enumeration.

#![forbid(unsafe_code)]

use crate::error::{NodeError, Result};
use crate::param::ParamKind;
use crate::pod::{Key, Object, ObjectType, Value};

pub const MEDIA_TYPE_AUDIO: u32 = 1;
pub const MEDIA_SUBTYPE_RAW: u32 = 1;

pub const DEFAULT_CHANNELS: i32 = 2;
pub const DEFAULT_RATE: i32 = 44100;

/// Sample encodings the node can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Interleaved signed 16 bit.
    S16,
    /// Planar signed 16 bit.
    S16P,
    /// Interleaved 32 bit float.
    F32,
    /// Planar 32 bit float.
    F32P,
}

impl SampleFormat {
    /// Advertised order; the first entry is the preferred one.
    pub const SUPPORTED: [SampleFormat; 4] = [
        SampleFormat::S16,
        SampleFormat::S16P,
        SampleFormat::F32P,
        SampleFormat::F32,
    ];

    pub fn raw(self) -> u32 {
        match self {
            SampleFormat::S16 => 0x103,
            SampleFormat::F32 => 0x11b,
            SampleFormat::S16P => 0x202,
            SampleFormat::F32P => 0x206,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::SUPPORTED.into_iter().find(|f| f.raw() == raw)
    }

    pub fn bytes_per_sample(self) -> u32 {
        match self {
            SampleFormat::S16 | SampleFormat::S16P => 2,
            SampleFormat::F32 | SampleFormat::F32P => 4,
        }
    }

    pub fn is_planar(self) -> bool {
        matches!(self, SampleFormat::S16P | SampleFormat::F32P)
    }
}

/// A fully negotiated raw audio format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub channels: u32,
    pub rate: u32,
}

impl AudioFormat {
    pub fn new(sample_format: SampleFormat, channels: u32, rate: u32) -> Self {
        Self {
            sample_format,
            channels,
            rate,
        }
    }

    /// Bytes per frame inside one data block.
    ///
    /// Planar layouts carry one channel per block.
    pub fn stride(&self) -> u32 {
        let per_block = if self.sample_format.is_planar() {
            1
        } else {
            self.channels
        };
        self.sample_format.bytes_per_sample() * per_block
    }

    /// Parse a committed format object. Choices are rejected: a committed
    /// format must be fixated.
    pub fn parse(object: &Object) -> Result<Self> {
        let malformed = |reason| NodeError::MalformedParam {
            kind: ParamKind::Format,
            reason,
        };
        if object.object_type != ObjectType::Format {
            return Err(malformed("not a format object"));
        }
        let fixed = |key| match object.get(key) {
            None => Err(malformed("missing property")),
            Some(v) if v.is_choice() => Err(malformed("value not fixated")),
            Some(v) => Ok(v),
        };
        if fixed(Key::MediaType)?.as_id() != Some(MEDIA_TYPE_AUDIO) {
            return Err(malformed("media type is not audio"));
        }
        if fixed(Key::MediaSubtype)?.as_id() != Some(MEDIA_SUBTYPE_RAW) {
            return Err(malformed("media subtype is not raw"));
        }
        let sample_format = fixed(Key::AudioFormat)?
            .as_id()
            .and_then(SampleFormat::from_raw)
            .ok_or_else(|| malformed("unsupported sample format"))?;
        let channels = fixed(Key::AudioChannels)?
            .as_int()
            .filter(|&c| c > 0)
            .ok_or_else(|| malformed("channel count must be positive"))?;
        let rate = fixed(Key::AudioRate)?
            .as_int()
            .filter(|&r| r > 0)
            .ok_or_else(|| malformed("rate must be positive"))?;
        Ok(Self::new(sample_format, channels as u32, rate as u32))
    }

    /// Build the object announcing this format under `id`.
    pub fn to_object(&self, id: ParamKind) -> Object {
        Object::new(ObjectType::Format, id)
            .with(Key::MediaType, Value::Id(MEDIA_TYPE_AUDIO))
            .with(Key::MediaSubtype, Value::Id(MEDIA_SUBTYPE_RAW))
            .with(Key::AudioFormat, Value::Id(self.sample_format.raw()))
            .with(Key::AudioChannels, Value::Int(self.channels as i32))
            .with(Key::AudioRate, Value::Int(self.rate as i32))
    }
}

/// The single capability candidate: every supported sample format, any
/// channel count, any rate.
pub fn enum_format_candidate() -> Object {
    let alternatives: Vec<u32> = SampleFormat::SUPPORTED.iter().map(|f| f.raw()).collect();
    Object::new(ObjectType::Format, ParamKind::EnumFormat)
        .with(Key::MediaType, Value::Id(MEDIA_TYPE_AUDIO))
        .with(Key::MediaSubtype, Value::Id(MEDIA_SUBTYPE_RAW))
        .with(
            Key::AudioFormat,
            Value::id_enum(SampleFormat::SUPPORTED[0].raw(), &alternatives),
        )
        .with(
            Key::AudioChannels,
            Value::int_range(DEFAULT_CHANNELS, 1, i32::MAX),
        )
        .with(Key::AudioRate, Value::int_range(DEFAULT_RATE, 1, i32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_a_built_format() {
        let format = AudioFormat::new(SampleFormat::F32, 2, 48000);
        let parsed = AudioFormat::parse(&format.to_object(ParamKind::Format)).unwrap();
        assert_eq!(parsed, format);
    }

    #[test]
    fn stride_depends_on_layout() {
        assert_eq!(AudioFormat::new(SampleFormat::F32, 2, 48000).stride(), 8);
        assert_eq!(AudioFormat::new(SampleFormat::F32P, 2, 48000).stride(), 4);
        assert_eq!(AudioFormat::new(SampleFormat::S16, 6, 48000).stride(), 12);
    }

    #[test]
    fn zero_channels_is_malformed() {
        let mut object = AudioFormat::new(SampleFormat::S16, 2, 44100).to_object(ParamKind::Format);
        object.set(Key::AudioChannels, Value::Int(0));
        assert!(matches!(
            AudioFormat::parse(&object),
            Err(NodeError::MalformedParam {
                kind: ParamKind::Format,
                ..
            })
        ));
    }

    #[test]
    fn unfixated_candidate_is_malformed() {
        assert!(AudioFormat::parse(&enum_format_candidate()).is_err());
    }

    #[test]
    fn unknown_sample_format_is_malformed() {
        let mut object = AudioFormat::new(SampleFormat::S16, 2, 44100).to_object(ParamKind::Format);
        object.set(Key::AudioFormat, Value::Id(0x999));
        assert!(AudioFormat::parse(&object).is_err());
        object.properties.retain(|p| p.key != Key::AudioRate);
        assert!(AudioFormat::parse(&object).is_err());
    }
}
