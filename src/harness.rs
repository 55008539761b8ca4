//! Simulated host: owns every host-side allocation and drives a node the
//! way a graph runtime would.

use crate::buffer::{BufferDescriptor, Chunk, DataDescriptor};
use crate::config::NodeConfig;
use crate::control::{decode_controls, PropertyControl};
use crate::error::{NodeError, Result};
use crate::format::AudioFormat;
use crate::io::{IoBuffers, IoId, NOTIFY_AREA_SIZE, STATUS_HAVE_DATA, STATUS_NEED_DATA};
use crate::node::{Node, NodeInterface};
use crate::param::ParamKind;
use crate::pod::{Key, Value};
use crate::port::Direction;
use crate::rt::ProcessStatus;
use std::mem::size_of;
use std::ptr::NonNull;

#[derive(Default)]
struct HostPool {
    memory: Vec<Vec<u8>>,
    chunks: Vec<Box<Chunk>>,
}

#[derive(Default)]
struct HostPort {
    io: Option<Box<IoBuffers>>,
    notify: Option<Vec<u8>>,
    pool: HostPool,
}

/// Host memory plus the node that borrows it.
///
/// The node is declared first so it is dropped before the memory it
/// borrows.
pub struct SimulatedHost {
    pub node: Node,
    ports: Vec<HostPort>,
}

impl SimulatedHost {
    pub fn new(config: NodeConfig) -> Result<Self> {
        Ok(Self {
            node: Node::new(config)?,
            ports: Vec::new(),
        })
    }

    fn host_port(&mut self, port_id: u32) -> &mut HostPort {
        let index = port_id as usize;
        if self.ports.len() <= index {
            self.ports.resize_with(index + 1, HostPort::default);
        }
        &mut self.ports[index]
    }

    /// Bind a fresh data mailbox to the port.
    pub fn bind_io(&mut self, port_id: u32) -> Result<()> {
        let mut io = Box::new(IoBuffers::new());
        let ptr = NonNull::from(io.as_mut()).cast::<u8>();
        // SAFETY: the box lives in `self.ports` until replaced, and the node
        // is rebound before that happens.
        unsafe {
            self.node.port_set_io(
                Direction::Output,
                port_id,
                IoId::Buffers,
                Some((ptr, size_of::<IoBuffers>())),
            )?
        };
        self.host_port(port_id).io = Some(io);
        Ok(())
    }

    /// Bind a fresh notify area of `size` bytes.
    pub fn bind_notify(&mut self, port_id: u32, size: usize) -> Result<()> {
        let mut area = vec![0u8; size];
        let ptr = NonNull::new(area.as_mut_ptr()).ok_or(NodeError::IoTooSmall {
            id: IoId::Notify,
            size,
            required: 1,
        })?;
        // SAFETY: the vector's heap block is kept in `self.ports` and never
        // resized.
        unsafe {
            self.node
                .port_set_io(Direction::Output, port_id, IoId::Notify, Some((ptr, size)))?
        };
        self.host_port(port_id).notify = Some(area);
        Ok(())
    }

    pub fn commit_format(&mut self, port_id: u32, format: &AudioFormat) -> Result<()> {
        self.node.port_set_param(
            Direction::Output,
            port_id,
            ParamKind::Format,
            Some(&format.to_object(ParamKind::Format)),
        )
    }

    /// Hand `count` buffers of `size` bytes to the port. The previous host
    /// memory is released only once the node accepted the new set.
    pub fn allocate_buffers(&mut self, port_id: u32, count: usize, size: usize) -> Result<()> {
        let mut pool = HostPool {
            memory: (0..count).map(|_| vec![0u8; size]).collect(),
            chunks: (0..count).map(|_| Box::new(Chunk::new())).collect(),
        };
        let mut descriptors = Vec::with_capacity(count);
        for (block, chunk) in pool.memory.iter_mut().zip(pool.chunks.iter_mut()) {
            let data = NonNull::new(block.as_mut_ptr())
                .ok_or(NodeError::InvalidBufferMemory { index: descriptors.len() })?;
            descriptors.push(BufferDescriptor {
                data: DataDescriptor::from_ptr(data, size as u32),
                chunk: NonNull::from(chunk.as_mut()),
            });
        }
        // SAFETY: the blocks and chunks move into `self.ports` below and stay
        // there until the next successful allocation.
        unsafe {
            self.node
                .port_use_buffers(Direction::Output, port_id, &descriptors)?
        };
        self.host_port(port_id).pool = pool;
        Ok(())
    }

    /// Buffer size the port asks for under its committed format.
    pub fn required_buffer_size(&self, port_id: u32) -> Result<usize> {
        let results =
            self.node
                .port_enum_params(Direction::Output, port_id, ParamKind::Buffers, 0, 1, None)?;
        let size = results
            .first()
            .and_then(|r| match r.param.get(Key::BuffersSize) {
                Some(Value::Choice(choice)) => choice.default_value().and_then(Value::as_int),
                Some(v) => v.as_int(),
                None => None,
            })
            .ok_or(NodeError::UnsupportedParam(ParamKind::Buffers))?;
        Ok(size as usize)
    }

    /// Full negotiation of one port: format, buffers, mailbox and notify.
    pub fn negotiate(&mut self, port_id: u32, format: &AudioFormat, buffers: usize) -> Result<()> {
        self.commit_format(port_id, format)?;
        let size = self.required_buffer_size(port_id)?;
        self.allocate_buffers(port_id, buffers, size)?;
        self.bind_io(port_id)?;
        self.bind_notify(port_id, NOTIFY_AREA_SIZE)
    }

    /// One host cycle: consume what the node published last cycle, hand the
    /// buffer back through the mailbox, then pull the next one.
    pub fn cycle(&mut self) -> Result<ProcessStatus> {
        for port in &self.ports {
            if let Some(io) = &port.io {
                if io.status() == STATUS_HAVE_DATA {
                    io.store(STATUS_NEED_DATA, io.buffer_id());
                }
            }
        }
        self.node.process()
    }

    pub fn io(&self, port_id: u32) -> Option<&IoBuffers> {
        self.ports.get(port_id as usize)?.io.as_deref()
    }

    pub fn chunk(&self, port_id: u32, buffer_id: u32) -> Option<&Chunk> {
        self.ports
            .get(port_id as usize)?
            .pool
            .chunks
            .get(buffer_id as usize)
            .map(|c| c.as_ref())
    }

    pub fn buffer_bytes(&self, port_id: u32, buffer_id: u32) -> Option<&[u8]> {
        self.ports
            .get(port_id as usize)?
            .pool
            .memory
            .get(buffer_id as usize)
            .map(Vec::as_slice)
    }

    pub fn notify_controls(&self, port_id: u32) -> Option<Vec<PropertyControl>> {
        decode_controls(self.ports.get(port_id as usize)?.notify.as_deref()?)
    }
}
