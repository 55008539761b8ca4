//! Error taxonomy returned to the host.
//!
//! Every host-visible operation returns synchronously; nothing is retried
//! inside the node.

use crate::io::IoId;
use crate::param::ParamKind;
use crate::port::Direction;
use thiserror::Error;

/// Errors raised by node operations.
#[derive(Error, Debug)]
pub enum NodeError {
    /// More ports were requested than the node can hold.
    #[error("port capacity of {capacity} exceeded")]
    PortCapacity { capacity: usize },

    /// More buffers were offered than the pool can hold.
    #[error("{requested} buffers exceed pool capacity of {capacity}")]
    BufferCapacity { requested: usize, capacity: usize },

    /// The parameter kind is not handled by this entity.
    #[error("parameter {0:?} is not supported")]
    UnsupportedParam(ParamKind),

    /// The IO area id is not handled by this entity.
    #[error("io area {0:?} is not supported")]
    UnsupportedIo(IoId),

    /// No such port in the given direction.
    #[error("invalid {direction:?} port {port_id}")]
    InvalidPort { direction: Direction, port_id: u32 },

    /// The host handed over an IO area smaller than its layout.
    #[error("io area {id:?} needs {required} bytes, got {size}")]
    IoTooSmall {
        id: IoId,
        size: usize,
        required: usize,
    },

    /// The host handed over an IO area that is not aligned for its layout.
    #[error("io area {0:?} is misaligned")]
    MisalignedIo(IoId),

    /// A buffer descriptor carries neither a pointer nor a mappable handle.
    #[error("buffer {index} has no usable memory")]
    InvalidBufferMemory { index: usize },

    /// Mapping shared buffer memory failed; carries the OS error as-is.
    #[error(transparent)]
    Map(#[from] std::io::Error),

    /// The buffer id is outside the current pool.
    #[error("buffer {buffer_id} is unknown on port {port_id}")]
    UnknownBuffer { port_id: u32, buffer_id: u32 },

    /// The buffer is already free; recycling it again is rejected.
    #[error("buffer {buffer_id} on port {port_id} is already free")]
    BufferAlreadyFree { port_id: u32, buffer_id: u32 },

    /// No free buffer at produce time.
    #[error("port {port_id} ran out of buffers")]
    Starvation { port_id: u32 },

    /// A committed payload could not be parsed.
    #[error("malformed {kind:?} parameter: {reason}")]
    MalformedParam {
        kind: ParamKind,
        reason: &'static str,
    },

    /// The node configuration is unusable.
    #[error("invalid node configuration: {0}")]
    InvalidConfig(&'static str),
}

impl NodeError {
    /// Negative errno as a C host would expect it.
    pub fn errno(&self) -> i32 {
        match self {
            NodeError::PortCapacity { .. } | NodeError::BufferCapacity { .. } => -libc::ENOSPC,
            NodeError::UnsupportedParam(_) | NodeError::UnsupportedIo(_) => -libc::ENOENT,
            NodeError::Map(err) => -err.raw_os_error().unwrap_or(libc::EIO),
            NodeError::Starvation { .. } => -libc::EPIPE,
            NodeError::InvalidPort { .. }
            | NodeError::IoTooSmall { .. }
            | NodeError::MisalignedIo(_)
            | NodeError::InvalidBufferMemory { .. }
            | NodeError::UnknownBuffer { .. }
            | NodeError::BufferAlreadyFree { .. }
            | NodeError::MalformedParam { .. }
            | NodeError::InvalidConfig(_) => -libc::EINVAL,
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, NodeError>;
