//! Change masks, info snapshots and the emission protocol.
//!
//! Hosts cache what they learn from info events. Each snapshot carries a
//! change mask naming the facets that changed; when PARAMS is among them the
//! serial bit of every dirty parameter is toggled exactly once so the host
//! knows to re-enumerate it.

#![forbid(unsafe_code)]

use crate::config::Properties;
use crate::param::ParamTable;
use bitflags::{bitflags, Flags};

bitflags! {
    /// Node facets that may change.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeChangeMask: u64 {
        const FLAGS = 1 << 0;
        const PROPS = 1 << 1;
        const PARAMS = 1 << 2;
    }
}

bitflags! {
    /// Port facets that may change.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PortChangeMask: u64 {
        const FLAGS = 1 << 0;
        const RATE = 1 << 1;
        const PROPS = 1 << 2;
        const PARAMS = 1 << 3;
    }
}

/// Node snapshot delivered to listeners.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub max_input_ports: u32,
    pub max_output_ports: u32,
    pub change_mask: NodeChangeMask,
    pub flags: u64,
    pub props: Properties,
    pub params: ParamTable,
}

/// Port snapshot delivered to listeners.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub change_mask: PortChangeMask,
    pub flags: u64,
    /// Rate as `(num, denom)`; `(0, 1)` when unknown.
    pub rate: (u32, u32),
    pub props: Properties,
    pub params: ParamTable,
}

/// Incremental announcement of an info snapshot.
pub trait ChangeNotifier {
    type Mask: Flags + Copy;

    /// Facets announced by a full emission.
    const ALL: Self::Mask;

    /// The facet whose emission drains parameter serials.
    const PARAMS: Self::Mask;

    fn change_mask_mut(&mut self) -> &mut Self::Mask;

    fn params_mut(&mut self) -> &mut ParamTable;

    /// Announce the snapshot through `notify`.
    ///
    /// A full emission announces every facet and afterwards leaves the
    /// pending mask as it was; a partial emission announces only pending
    /// facets and consumes them. Nothing is announced when the effective
    /// mask is empty. Returns whether `notify` ran.
    fn emit(&mut self, full: bool, notify: impl FnOnce(&Self)) -> bool
    where
        Self: Sized,
    {
        let old = if full {
            *self.change_mask_mut()
        } else {
            Self::Mask::empty()
        };
        if full {
            *self.change_mask_mut() = Self::ALL;
        }
        let mask = *self.change_mask_mut();
        let emitted = !mask.is_empty();
        if emitted {
            if mask.contains(Self::PARAMS) {
                self.params_mut().drain_serials();
            }
            notify(self);
        }
        *self.change_mask_mut() = old;
        emitted
    }
}

impl ChangeNotifier for NodeInfo {
    type Mask = NodeChangeMask;
    const ALL: NodeChangeMask = NodeChangeMask::all();
    const PARAMS: NodeChangeMask = NodeChangeMask::PARAMS;

    fn change_mask_mut(&mut self) -> &mut NodeChangeMask {
        &mut self.change_mask
    }

    fn params_mut(&mut self) -> &mut ParamTable {
        &mut self.params
    }
}

impl ChangeNotifier for PortInfo {
    type Mask = PortChangeMask;
    // RATE is only announced when it changes.
    const ALL: PortChangeMask = PortChangeMask::FLAGS
        .union(PortChangeMask::PROPS)
        .union(PortChangeMask::PARAMS);
    const PARAMS: PortChangeMask = PortChangeMask::PARAMS;

    fn change_mask_mut(&mut self) -> &mut PortChangeMask {
        &mut self.change_mask
    }

    fn params_mut(&mut self) -> &mut ParamTable {
        &mut self.params
    }
}
