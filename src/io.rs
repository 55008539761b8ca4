//! IO areas shared between the host and the node.
//!
//! The host owns every area; the node only borrows them between the bind
//! call and the next rebind (or its own drop).

use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

/// Sentinel buffer id meaning "no buffer".
pub const INVALID_ID: u32 = u32::MAX;

pub const STATUS_OK: i32 = 0;
pub const STATUS_NEED_DATA: i32 = 1 << 0;
pub const STATUS_HAVE_DATA: i32 = 1 << 1;

/// Room reserved for control sequences in the notify area.
pub const NOTIFY_RESERVE: usize = 1024;
/// Size the node asks for when announcing the notify area.
pub const NOTIFY_AREA_SIZE: usize = 16 + NOTIFY_RESERVE;

/// Kinds of IO areas a host may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoId {
    Invalid,
    Buffers,
    Range,
    Clock,
    Latency,
    Control,
    Notify,
    Position,
    RateMatch,
    Memory,
}

impl IoId {
    pub fn raw(self) -> u32 {
        self as u32
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => IoId::Invalid,
            1 => IoId::Buffers,
            2 => IoId::Range,
            3 => IoId::Clock,
            4 => IoId::Latency,
            5 => IoId::Control,
            6 => IoId::Notify,
            7 => IoId::Position,
            8 => IoId::RateMatch,
            9 => IoId::Memory,
            _ => return None,
        })
    }
}

/// Data-exchange mailbox of one port.
///
/// The node publishes the id of a filled buffer here; the host writes back
/// the id of the buffer it is done with.
#[repr(C)]
#[derive(Debug)]
pub struct IoBuffers {
    status: AtomicI32,
    buffer_id: AtomicU32,
}

impl IoBuffers {
    pub const fn new() -> Self {
        Self {
            status: AtomicI32::new(STATUS_OK),
            buffer_id: AtomicU32::new(INVALID_ID),
        }
    }

    pub fn status(&self) -> i32 {
        self.status.load(Ordering::Acquire)
    }

    pub fn buffer_id(&self) -> u32 {
        self.buffer_id.load(Ordering::Acquire)
    }

    /// Host side: hand a buffer back (or set any state).
    pub fn store(&self, status: i32, buffer_id: u32) {
        self.buffer_id.store(buffer_id, Ordering::Release);
        self.status.store(status, Ordering::Release);
    }

    /// Take the id the host handed back, leaving the sentinel.
    pub(crate) fn take_buffer_id(&self) -> u32 {
        self.buffer_id.swap(INVALID_ID, Ordering::AcqRel)
    }

    pub(crate) fn invalidate(&self) {
        self.buffer_id.store(INVALID_ID, Ordering::Release);
    }

    pub(crate) fn publish(&self, buffer_id: u32) {
        self.store(STATUS_HAVE_DATA, buffer_id);
    }
}

impl Default for IoBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// A raw byte area bound by the host.
#[derive(Debug)]
pub struct IoArea {
    ptr: NonNull<u8>,
    size: usize,
}

// SAFETY: the area is only touched by whichever thread owns the node.
unsafe impl Send for IoArea {}

impl IoArea {
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `size` bytes for as long
    /// as the area stays bound, and nothing else may write it while the node
    /// does.
    pub unsafe fn new(ptr: NonNull<u8>, size: usize) -> Self {
        Self { ptr, size }
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: validity for `size` bytes is the contract of `IoArea::new`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }
}
