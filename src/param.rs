//! Parameter descriptors and the per-entity parameter table.

#![forbid(unsafe_code)]

use crate::invariant_ppt::{assert_invariant, SERIAL_EDGE_TRIGGERED};
use bitflags::bitflags;

/// Parameter kinds a host may ask about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKind {
    Invalid,
    PropInfo,
    Props,
    EnumFormat,
    Format,
    Buffers,
    Meta,
    Io,
    EnumProfile,
    Profile,
    EnumPortConfig,
    PortConfig,
    EnumRoute,
    Route,
    Control,
    Latency,
    ProcessLatency,
    Tag,
}

impl ParamKind {
    const ALL: [ParamKind; 18] = [
        ParamKind::Invalid,
        ParamKind::PropInfo,
        ParamKind::Props,
        ParamKind::EnumFormat,
        ParamKind::Format,
        ParamKind::Buffers,
        ParamKind::Meta,
        ParamKind::Io,
        ParamKind::EnumProfile,
        ParamKind::Profile,
        ParamKind::EnumPortConfig,
        ParamKind::PortConfig,
        ParamKind::EnumRoute,
        ParamKind::Route,
        ParamKind::Control,
        ParamKind::Latency,
        ParamKind::ProcessLatency,
        ParamKind::Tag,
    ];

    /// Wire id of this kind.
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Parse a wire id.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }
}

bitflags! {
    /// Capability flags of a parameter descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ParamFlags: u32 {
        /// Toggled whenever the parameter's enumeration changes.
        const SERIAL = 1 << 0;
        const READ = 1 << 1;
        const WRITE = 1 << 2;
        const READWRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// One parameter descriptor as announced to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub id: ParamKind,
    pub flags: ParamFlags,
    /// Mutations observed since the last drain.
    user: u32,
}

impl ParamInfo {
    pub fn new(id: ParamKind, flags: ParamFlags) -> Self {
        Self { id, flags, user: 0 }
    }

    pub fn is_readable(&self) -> bool {
        self.flags.contains(ParamFlags::READ)
    }

    pub fn is_writable(&self) -> bool {
        self.flags.contains(ParamFlags::WRITE)
    }

    pub fn serial(&self) -> bool {
        self.flags.contains(ParamFlags::SERIAL)
    }

    /// Pending mutations not yet drained.
    pub fn pending(&self) -> u32 {
        self.user
    }
}

/// Ordered table of parameter descriptors for a node or a port.
///
/// The set of ids is fixed at construction; only flags and dirty counters
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamTable {
    entries: Vec<ParamInfo>,
}

impl ParamTable {
    pub fn new(entries: &[(ParamKind, ParamFlags)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|&(id, flags)| ParamInfo::new(id, flags))
                .collect(),
        }
    }

    pub fn get(&self, id: ParamKind) -> Option<&ParamInfo> {
        self.entries.iter().find(|p| p.id == id)
    }

    fn get_mut(&mut self, id: ParamKind) -> Option<&mut ParamInfo> {
        self.entries.iter_mut().find(|p| p.id == id)
    }

    pub fn contains(&self, id: ParamKind) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace capability flags; the serial bit is preserved.
    pub fn set_flags(&mut self, id: ParamKind, flags: ParamFlags) -> bool {
        match self.get_mut(id) {
            Some(info) => {
                let serial = info.flags & ParamFlags::SERIAL;
                info.flags = (flags - ParamFlags::SERIAL) | serial;
                true
            }
            None => false,
        }
    }

    /// Record one mutation of the parameter's contents.
    pub fn mark_dirty(&mut self, id: ParamKind) -> bool {
        match self.get_mut(id) {
            Some(info) => {
                info.user = info.user.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Toggle the serial bit of every dirty descriptor exactly once and
    /// reset its counter. Returns how many descriptors toggled.
    pub fn drain_serials(&mut self) -> usize {
        let mut toggled = 0;
        for info in self.entries.iter_mut().filter(|p| p.user > 0) {
            info.flags.toggle(ParamFlags::SERIAL);
            info.user = 0;
            toggled += 1;
        }
        assert_invariant(
            SERIAL_EDGE_TRIGGERED,
            self.entries.iter().all(|p| p.user == 0),
            "serial drain leaves no pending mutation",
            Some("drain_serials"),
        );
        toggled
    }
}
