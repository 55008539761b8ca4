//! Pull-model audio source node for real-time media-graph hosts.
//!
//! The host negotiates a format and buffer layout per output port, hands
//! over its own buffers and IO areas, and then calls
//! [`NodeInterface::process`] once per cycle. The node fills one buffer per
//! port with a test tone, publishes its id in the port's mailbox and writes
//! a volume automation value into the notify area.

pub mod buffer;
pub mod change;
pub mod config;
pub mod control;
pub mod error;
pub mod format;
#[doc(hidden)]
pub mod harness;
pub mod invariant_rt;
#[doc(hidden)]
pub mod invariant_ppt;
pub mod io;
pub mod memory;
pub mod negotiate;
pub mod node;
pub mod param;
pub mod pod;
pub mod port;
pub mod rt;
pub mod states;

/// Output ports a node can hold.
pub const MAX_PORTS: usize = 16;
/// Buffers a port pool can hold.
pub const MAX_BUFFERS: usize = 32;

pub use buffer::{BufferDescriptor, BufferPool, Chunk, DataDescriptor, DataType};
pub use change::{ChangeNotifier, NodeChangeMask, NodeInfo, PortChangeMask, PortInfo};
pub use config::{NodeConfig, Properties};
pub use error::{NodeError, Result};
pub use format::{AudioFormat, SampleFormat};
pub use io::{IoBuffers, IoId};
pub use negotiate::ParamResult;
pub use node::{Command, ListenerId, Node, NodeEvents, NodeInterface, NodeProps};
pub use param::{ParamFlags, ParamKind};
pub use pod::{Object, ParamFilter};
pub use port::Direction;
pub use rt::ProcessStatus;
