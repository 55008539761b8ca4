//! Output port state.

use crate::buffer::BufferPool;
use crate::change::{PortChangeMask, PortInfo};
use crate::config::Properties;
use crate::format::AudioFormat;
use crate::io::{IoArea, IoBuffers};
use crate::param::{ParamFlags, ParamKind, ParamTable};
use crate::states::PortGenerator;
use std::ptr::NonNull;

/// Port direction. The node only has outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// Everything the node keeps per output port.
#[derive(Debug)]
pub struct PortState {
    pub id: u32,
    pub info: PortInfo,
    /// `None` while unset; a committed format is always complete.
    pub format: Option<AudioFormat>,
    pub pool: BufferPool,
    pub(crate) io: Option<NonNull<IoBuffers>>,
    pub(crate) notify: Option<IoArea>,
    pub(crate) generator: PortGenerator,
    /// Samples per period, used for the buffer size requirement.
    pub period_samples: u32,
}

// SAFETY: the borrowed IO pointers are only dereferenced by the thread that
// currently owns the node; the host serializes access.
unsafe impl Send for PortState {}

impl PortState {
    pub fn new(id: u32, props: Properties, period_samples: u32) -> Self {
        let params = ParamTable::new(&[
            (ParamKind::EnumFormat, ParamFlags::READ),
            (ParamKind::Meta, ParamFlags::READ),
            (ParamKind::Io, ParamFlags::READ),
            (ParamKind::Format, ParamFlags::WRITE),
            (ParamKind::Buffers, ParamFlags::empty()),
        ]);
        Self {
            id,
            info: PortInfo {
                change_mask: PortChangeMask::empty(),
                flags: 0,
                rate: (0, 1),
                props,
                params,
            },
            format: None,
            pool: BufferPool::new(),
            io: None,
            notify: None,
            generator: PortGenerator::new(),
            period_samples,
        }
    }

    /// The bound data mailbox, if any.
    pub fn io(&self) -> Option<&IoBuffers> {
        // SAFETY: validity while bound is the contract of port_set_io.
        self.io.map(|p| unsafe { p.as_ref() })
    }

    pub fn has_notify(&self) -> bool {
        self.notify.is_some()
    }

    /// Set or clear the format and update the descriptors that depend on
    /// it. Marks Format and Buffers dirty and flags PARAMS pending.
    pub(crate) fn apply_format(&mut self, format: Option<AudioFormat>) {
        let params = &mut self.info.params;
        match format {
            Some(_) => {
                params.set_flags(ParamKind::Format, ParamFlags::READWRITE);
                params.set_flags(ParamKind::Buffers, ParamFlags::READ);
            }
            None => {
                params.set_flags(ParamKind::Format, ParamFlags::WRITE);
                params.set_flags(ParamKind::Buffers, ParamFlags::empty());
            }
        }
        params.mark_dirty(ParamKind::Format);
        params.mark_dirty(ParamKind::Buffers);
        self.info.change_mask |= PortChangeMask::PARAMS;
        if format != self.format {
            self.generator.reset();
        }
        self.format = format;
    }

    pub fn is_format_readable(&self) -> bool {
        self.info
            .params
            .get(ParamKind::Format)
            .is_some_and(|p| p.is_readable())
    }

    pub fn is_buffers_readable(&self) -> bool {
        self.info
            .params
            .get(ParamKind::Buffers)
            .is_some_and(|p| p.is_readable())
    }
}
