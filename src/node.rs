//! The source node and the host-facing interface.
//!
//! A host drives the node through [`NodeInterface`]: it registers listeners,
//! negotiates formats and buffers per port, binds IO areas and then calls
//! [`NodeInterface::process`] once per cycle. Everything except `process`
//! runs on the host's control context and logs through `tracing`.

use crate::buffer::{BufferDescriptor, Recycle};
use crate::change::{ChangeNotifier, NodeChangeMask, NodeInfo, PortInfo};
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::invariant_ppt::{
    assert_invariant, CONFIG_VALIDATED, LISTENER_ISOLATED, PORT_CAPACITY,
    POOL_MEMBERSHIP_EXCLUSIVE,
};
use crate::invariant_rt::{drain_signals, new_signal_queue, RtSignal};
use crate::io::{IoArea, IoBuffers, IoId};
use crate::negotiate::{
    commit_port_format, enumerate, node_candidate, parse_volume, port_candidate, ParamResult,
};
use crate::param::{ParamFlags, ParamKind, ParamTable};
use crate::pod::{Object, ParamFilter};
use crate::port::{Direction, PortState};
use crate::rt::{process_ports, ProcessStatus};
use crate::MAX_PORTS;
use rtrb::{Consumer, Producer};
use std::mem::{align_of, size_of};
use std::ptr::NonNull;
use tracing::{debug, info, warn};

/// Node-level properties that can be changed at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeProps {
    pub volume: f32,
}

/// Handle returned by [`NodeInterface::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Receiver of info announcements.
pub trait NodeEvents: Send {
    fn info(&mut self, _info: &NodeInfo) {}

    fn port_info(&mut self, _direction: Direction, _port_id: u32, _info: &PortInfo) {}
}

/// Commands a host may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    /// Pause and forget every negotiated format.
    Suspend,
    /// Return every in-flight buffer to its free queue.
    Flush,
}

/// One method per host operation.
pub trait NodeInterface {
    /// Register a listener. It alone immediately receives the full node
    /// info and the full info of every port.
    fn add_listener(&mut self, listener: Box<dyn NodeEvents>) -> ListenerId;

    fn remove_listener(&mut self, id: ListenerId) -> bool;

    fn send_command(&mut self, command: Command) -> Result<()>;

    fn enum_params(
        &self,
        kind: ParamKind,
        start: u32,
        max_count: u32,
        filter: Option<&dyn ParamFilter>,
    ) -> Result<Vec<ParamResult>>;

    fn set_param(&mut self, kind: ParamKind, param: Option<&Object>) -> Result<()>;

    /// Bind (or unbind with `None`) a node-level IO area.
    ///
    /// # Safety
    ///
    /// The area must stay valid for reads and writes of `size` bytes until
    /// it is unbound, rebound or the node is dropped.
    unsafe fn set_io(&mut self, id: IoId, area: Option<(NonNull<u8>, usize)>) -> Result<()>;

    fn port_enum_params(
        &self,
        direction: Direction,
        port_id: u32,
        kind: ParamKind,
        start: u32,
        max_count: u32,
        filter: Option<&dyn ParamFilter>,
    ) -> Result<Vec<ParamResult>>;

    fn port_set_param(
        &mut self,
        direction: Direction,
        port_id: u32,
        kind: ParamKind,
        param: Option<&Object>,
    ) -> Result<()>;

    /// Bind (or unbind with `None`) a port IO area.
    ///
    /// # Safety
    ///
    /// The area must stay valid for reads and writes of `size` bytes until
    /// it is unbound, rebound or the node is dropped, and the host may only
    /// touch it between cycles.
    unsafe fn port_set_io(
        &mut self,
        direction: Direction,
        port_id: u32,
        id: IoId,
        area: Option<(NonNull<u8>, usize)>,
    ) -> Result<()>;

    /// Replace the buffers of a port.
    ///
    /// # Safety
    ///
    /// See [`BufferPool::use_buffers`](crate::buffer::BufferPool::use_buffers).
    unsafe fn port_use_buffers(
        &mut self,
        direction: Direction,
        port_id: u32,
        buffers: &[BufferDescriptor],
    ) -> Result<()>;

    fn port_reuse_buffer(&mut self, port_id: u32, buffer_id: u32) -> Result<()>;

    /// Produce one cycle. Real-time safe.
    fn process(&mut self) -> Result<ProcessStatus>;
}

type Listeners = Vec<(ListenerId, Box<dyn NodeEvents>)>;

/// The tone source node.
pub struct Node {
    config: NodeConfig,
    info: NodeInfo,
    props: NodeProps,
    ports: Vec<PortState>,
    listeners: Listeners,
    next_listener: u64,
    started: bool,
    clock: Option<IoArea>,
    position: Option<IoArea>,
    signal_tx: Producer<RtSignal>,
    signal_rx: Consumer<RtSignal>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.config.name)
            .field("ports", &self.ports.len())
            .field("listeners", &self.listeners.len())
            .field("started", &self.started)
            .finish()
    }
}

fn emit_node(info: &mut NodeInfo, listeners: &mut Listeners, full: bool) {
    info.emit(full, |info| {
        for (_, listener) in listeners.iter_mut() {
            listener.info(info);
        }
    });
}

fn emit_port(port: &mut PortState, listeners: &mut Listeners, full: bool) {
    let port_id = port.id;
    port.info.emit(full, |info| {
        for (_, listener) in listeners.iter_mut() {
            listener.port_info(Direction::Output, port_id, info);
        }
    });
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        assert_invariant(
            CONFIG_VALIDATED,
            config.ports <= MAX_PORTS,
            "node is built from a validated configuration",
            Some("Node::new"),
        );
        let params = ParamTable::new(&[
            (ParamKind::PropInfo, ParamFlags::READ),
            (ParamKind::Props, ParamFlags::READWRITE),
            (ParamKind::EnumFormat, ParamFlags::READ),
            (ParamKind::Format, ParamFlags::WRITE),
        ]);
        let info = NodeInfo {
            max_input_ports: 0,
            max_output_ports: MAX_PORTS as u32,
            change_mask: NodeInfo::ALL,
            flags: 0,
            props: config.properties(),
            params,
        };
        let (signal_tx, signal_rx) = new_signal_queue();
        let mut node = Self {
            props: NodeProps {
                volume: config.volume,
            },
            info,
            ports: Vec::with_capacity(MAX_PORTS),
            listeners: Vec::new(),
            next_listener: 0,
            started: false,
            clock: None,
            position: None,
            signal_tx,
            signal_rx,
            config,
        };
        for _ in 0..node.config.ports {
            node.push_port();
        }
        info!(name = %node.config.name, ports = node.ports.len(), "node created");
        Ok(node)
    }

    fn push_port(&mut self) -> u32 {
        let id = self.ports.len() as u32;
        let mut port = PortState::new(
            id,
            self.config.port_properties(id),
            self.config.buffer_samples,
        );
        port.info.change_mask = PortInfo::ALL;
        self.ports.push(port);
        id
    }

    /// Append an output port and announce it.
    pub fn add_port(&mut self) -> Result<u32> {
        if self.ports.len() >= MAX_PORTS {
            warn!(capacity = MAX_PORTS, "port capacity reached");
            return Err(NodeError::PortCapacity {
                capacity: MAX_PORTS,
            });
        }
        let id = self.push_port();
        assert_invariant(
            PORT_CAPACITY,
            self.ports.len() <= MAX_PORTS,
            "port count stays within capacity",
            Some("add_port"),
        );
        info!(port_id = id, "port added");
        if let Some(port) = self.ports.get_mut(id as usize) {
            emit_port(port, &mut self.listeners, true);
        }
        Ok(id)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn props(&self) -> NodeProps {
        self.props
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn n_ports(&self) -> usize {
        self.ports.len()
    }

    pub fn port(&self, port_id: u32) -> Option<&PortState> {
        self.ports.get(port_id as usize)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// A bound node-level area (Clock or Position).
    pub fn bound_io(&self, id: IoId) -> Option<&IoArea> {
        match id {
            IoId::Clock => self.clock.as_ref(),
            IoId::Position => self.position.as_ref(),
            _ => None,
        }
    }

    /// Collect what the RT path signalled since the last drain and log the
    /// anomalies.
    pub fn drain_rt_signals(&mut self) -> Vec<RtSignal> {
        let signals = drain_signals(&mut self.signal_rx);
        for s in signals.iter().filter(|s| s.kind.is_anomaly()) {
            warn!(
                kind = s.kind.name(),
                port_id = s.port_id,
                buffer_id = s.buffer_id,
                "rt anomaly"
            );
        }
        signals
    }

    fn output_port(&self, direction: Direction, port_id: u32) -> Result<&PortState> {
        match direction {
            Direction::Output => self.ports.get(port_id as usize),
            Direction::Input => None,
        }
        .ok_or(NodeError::InvalidPort { direction, port_id })
    }

    fn output_port_index(&self, direction: Direction, port_id: u32) -> Result<usize> {
        self.output_port(direction, port_id).map(|_| port_id as usize)
    }

    fn emit_all_partial(&mut self) {
        emit_node(&mut self.info, &mut self.listeners, false);
        for port in self.ports.iter_mut() {
            emit_port(port, &mut self.listeners, false);
        }
    }

    fn check_pool(&self, index: usize, context: &str) {
        if let Some(port) = self.ports.get(index) {
            assert_invariant(
                POOL_MEMBERSHIP_EXCLUSIVE,
                port.pool.is_consistent(),
                "every free buffer is queued exactly once",
                Some(context),
            );
        }
    }
}

impl NodeInterface for Node {
    fn add_listener(&mut self, listener: Box<dyn NodeEvents>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;

        let saved = std::mem::take(&mut self.listeners);
        self.listeners.push((id, listener));
        emit_node(&mut self.info, &mut self.listeners, true);
        for port in self.ports.iter_mut() {
            emit_port(port, &mut self.listeners, true);
        }
        assert_invariant(
            LISTENER_ISOLATED,
            self.listeners.len() == 1,
            "initial announcement reaches only the new listener",
            Some("add_listener"),
        );
        let fresh = std::mem::replace(&mut self.listeners, saved);
        self.listeners.extend(fresh);

        debug!(listener = id.0, total = self.listeners.len(), "listener added");
        id
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        let removed = self.listeners.len() != before;
        debug!(listener = id.0, removed, "listener removed");
        removed
    }

    fn send_command(&mut self, command: Command) -> Result<()> {
        info!(?command, "send_command");
        match command {
            Command::Start => self.started = true,
            Command::Pause => self.started = false,
            Command::Suspend => {
                self.started = false;
                for port in self.ports.iter_mut().filter(|p| p.format.is_some()) {
                    commit_port_format(port, None)?;
                }
                self.emit_all_partial();
            }
            Command::Flush => {
                for index in 0..self.ports.len() {
                    if let Some(port) = self.ports.get_mut(index) {
                        let moved = port.pool.recycle_all_in_flight();
                        // The mailbox may still name a buffer that is free again.
                        if let Some(io) = port.io() {
                            io.invalidate();
                        }
                        debug!(port_id = port.id, moved, "flushed in-flight buffers");
                    }
                    self.check_pool(index, "flush");
                }
            }
        }
        Ok(())
    }

    fn enum_params(
        &self,
        kind: ParamKind,
        start: u32,
        max_count: u32,
        filter: Option<&dyn ParamFilter>,
    ) -> Result<Vec<ParamResult>> {
        debug!(?kind, start, max_count, filtered = filter.is_some(), "enum_params");
        let volume = self.props.volume;
        let default_volume = self.config.volume;
        enumerate(&self.info.params, kind, start, max_count, filter, |index| {
            node_candidate(kind, index, volume, default_volume)
        })
    }

    fn set_param(&mut self, kind: ParamKind, param: Option<&Object>) -> Result<()> {
        info!(?kind, present = param.is_some(), "set_param");
        match kind {
            ParamKind::Props => {
                let volume = match param {
                    Some(object) => parse_volume(object)?,
                    None => Some(self.config.volume),
                };
                if let Some(volume) = volume {
                    self.props.volume = volume;
                }
                self.info.params.mark_dirty(ParamKind::Props);
                self.info.change_mask |= NodeChangeMask::PARAMS;
            }
            ParamKind::Format => {
                let format = param.map(crate::format::AudioFormat::parse).transpose()?;
                let object = format.map(|f| f.to_object(ParamKind::Format));
                for port in self.ports.iter_mut() {
                    commit_port_format(port, object.as_ref())?;
                }
            }
            other => {
                warn!(kind = ?other, "unsupported node param");
                return Err(NodeError::UnsupportedParam(other));
            }
        }
        self.emit_all_partial();
        Ok(())
    }

    unsafe fn set_io(&mut self, id: IoId, area: Option<(NonNull<u8>, usize)>) -> Result<()> {
        info!(?id, size = area.map_or(0, |(_, s)| s), "set_io");
        // SAFETY: forwarded from this method's contract.
        let area = area.map(|(ptr, size)| unsafe { IoArea::new(ptr, size) });
        match id {
            IoId::Clock => self.clock = area,
            IoId::Position => self.position = area,
            other => return Err(NodeError::UnsupportedIo(other)),
        }
        Ok(())
    }

    fn port_enum_params(
        &self,
        direction: Direction,
        port_id: u32,
        kind: ParamKind,
        start: u32,
        max_count: u32,
        filter: Option<&dyn ParamFilter>,
    ) -> Result<Vec<ParamResult>> {
        let port = self.output_port(direction, port_id)?;
        debug!(port_id, ?kind, start, max_count, filtered = filter.is_some(), "port_enum_params");
        enumerate(&port.info.params, kind, start, max_count, filter, |index| {
            port_candidate(port, kind, index)
        })
    }

    fn port_set_param(
        &mut self,
        direction: Direction,
        port_id: u32,
        kind: ParamKind,
        param: Option<&Object>,
    ) -> Result<()> {
        let index = self.output_port_index(direction, port_id)?;
        info!(port_id, ?kind, present = param.is_some(), "port_set_param");
        if kind != ParamKind::Format {
            warn!(port_id, ?kind, "unsupported port param");
            return Err(NodeError::UnsupportedParam(kind));
        }
        if let Some(port) = self.ports.get_mut(index) {
            if let Err(err) = commit_port_format(port, param) {
                warn!(port_id, %err, "format rejected");
                return Err(err);
            }
            debug!(port_id, format = ?port.format, "format committed");
        }
        self.emit_all_partial();
        Ok(())
    }

    unsafe fn port_set_io(
        &mut self,
        direction: Direction,
        port_id: u32,
        id: IoId,
        area: Option<(NonNull<u8>, usize)>,
    ) -> Result<()> {
        let index = self.output_port_index(direction, port_id)?;
        info!(port_id, ?id, size = area.map_or(0, |(_, s)| s), "port_set_io");
        let Some(port) = self.ports.get_mut(index) else {
            return Err(NodeError::InvalidPort { direction, port_id });
        };
        match id {
            IoId::Buffers => {
                port.io = match area {
                    None => None,
                    Some((ptr, size)) => {
                        let required = size_of::<IoBuffers>();
                        if size < required {
                            return Err(NodeError::IoTooSmall { id, size, required });
                        }
                        if ptr.as_ptr() as usize % align_of::<IoBuffers>() != 0 {
                            return Err(NodeError::MisalignedIo(id));
                        }
                        Some(ptr.cast::<IoBuffers>())
                    }
                };
            }
            IoId::Notify => {
                // SAFETY: forwarded from this method's contract.
                port.notify = area.map(|(ptr, size)| unsafe { IoArea::new(ptr, size) });
            }
            other => {
                warn!(port_id, io = ?other, "unsupported port io");
                return Err(NodeError::UnsupportedIo(other));
            }
        }
        Ok(())
    }

    unsafe fn port_use_buffers(
        &mut self,
        direction: Direction,
        port_id: u32,
        buffers: &[BufferDescriptor],
    ) -> Result<()> {
        let index = self.output_port_index(direction, port_id)?;
        info!(port_id, n_buffers = buffers.len(), "port_use_buffers");
        let Some(port) = self.ports.get_mut(index) else {
            return Err(NodeError::InvalidPort { direction, port_id });
        };
        // SAFETY: forwarded from this method's contract.
        if let Err(err) = unsafe { port.pool.use_buffers(buffers) } {
            warn!(port_id, %err, "use_buffers failed");
            return Err(err);
        }
        if let Some(io) = port.io() {
            io.invalidate();
        }
        for (i, b) in buffers.iter().enumerate() {
            debug!(port_id, buffer = i, size = b.data.max_size, "got buffer");
        }
        self.check_pool(index, "port_use_buffers");
        Ok(())
    }

    fn port_reuse_buffer(&mut self, port_id: u32, buffer_id: u32) -> Result<()> {
        let index = self.output_port_index(Direction::Output, port_id)?;
        let outcome = match self.ports.get_mut(index) {
            Some(port) => port.pool.recycle(buffer_id),
            None => Recycle::Unknown,
        };
        let result = match outcome {
            Recycle::Recycled => {
                debug!(port_id, buffer_id, "buffer recycled");
                Ok(())
            }
            Recycle::AlreadyFree => {
                warn!(port_id, buffer_id, "buffer is already free");
                Err(NodeError::BufferAlreadyFree { port_id, buffer_id })
            }
            Recycle::Unknown => {
                warn!(port_id, buffer_id, "unknown buffer");
                Err(NodeError::UnknownBuffer { port_id, buffer_id })
            }
        };
        self.check_pool(index, "port_reuse_buffer");
        result
    }

    fn process(&mut self) -> Result<ProcessStatus> {
        process_ports(
            &mut self.ports,
            self.props.volume,
            self.config.tone_frequency,
            &mut self.signal_tx,
        )
    }
}
