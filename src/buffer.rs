//! Host-supplied buffers and the per-port pool.
//!
//! The pool is an arena indexed by buffer id plus a FIFO of free ids. Every
//! buffer is either [`Membership::Free`] (queued exactly once) or
//! [`Membership::InFlight`] (handed to the host, not queued).

use crate::error::{NodeError, Result};
use crate::invariant_ppt::{assert_invariant, POOL_ALL_FREE_AFTER_USE, POOL_CAPACITY};
use crate::memory::MappedRegion;
use crate::MAX_BUFFERS;
use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

/// How the memory of a data block is handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// A pointer already valid in this process.
    MemPtr,
    /// A shareable memory fd to be mapped.
    MemFd,
    /// A dma-buf fd to be mapped.
    DmaBuf,
}

/// The single data block of a buffer.
#[derive(Debug, Clone, Copy)]
pub struct DataDescriptor {
    pub data_type: DataType,
    pub data: Option<NonNull<u8>>,
    pub fd: RawFd,
    pub map_offset: u32,
    pub max_size: u32,
}

impl DataDescriptor {
    pub fn from_ptr(data: NonNull<u8>, max_size: u32) -> Self {
        Self {
            data_type: DataType::MemPtr,
            data: Some(data),
            fd: -1,
            map_offset: 0,
            max_size,
        }
    }

    pub fn from_fd(data_type: DataType, fd: RawFd, map_offset: u32, max_size: u32) -> Self {
        Self {
            data_type,
            data: None,
            fd,
            map_offset,
            max_size,
        }
    }
}

/// Valid-region header of a data block, written by the producer.
#[repr(C)]
#[derive(Debug, Default)]
pub struct Chunk {
    offset: AtomicU32,
    size: AtomicU32,
    stride: AtomicI32,
    flags: AtomicI32,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> u32 {
        self.offset.load(Ordering::Acquire)
    }

    pub fn size(&self) -> u32 {
        self.size.load(Ordering::Acquire)
    }

    pub fn stride(&self) -> i32 {
        self.stride.load(Ordering::Acquire)
    }

    pub fn flags(&self) -> i32 {
        self.flags.load(Ordering::Acquire)
    }

    pub(crate) fn stamp(&self, offset: u32, size: u32, stride: i32) {
        self.offset.store(offset, Ordering::Relaxed);
        self.stride.store(stride, Ordering::Relaxed);
        self.flags.store(0, Ordering::Relaxed);
        self.size.store(size, Ordering::Release);
    }
}

/// One buffer as offered by the host.
#[derive(Debug, Clone, Copy)]
pub struct BufferDescriptor {
    pub data: DataDescriptor,
    pub chunk: NonNull<Chunk>,
}

/// Where a buffer's bytes live for the node.
#[derive(Debug)]
enum Binding {
    Borrowed(NonNull<u8>),
    Mapped(MappedRegion),
}

impl Binding {
    fn ptr(&self) -> NonNull<u8> {
        match self {
            Binding::Borrowed(ptr) => *ptr,
            Binding::Mapped(region) => region.as_ptr(),
        }
    }
}

/// Ownership state of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Free,
    InFlight,
}

/// Outcome of returning a buffer to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recycle {
    Recycled,
    AlreadyFree,
    Unknown,
}

#[derive(Debug)]
struct BufferSlot {
    binding: Binding,
    max_size: u32,
    chunk: NonNull<Chunk>,
    membership: Membership,
}

/// Buffers bound to one port.
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<BufferSlot>,
    free: VecDeque<u32>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(MAX_BUFFERS),
            free: VecDeque::with_capacity(MAX_BUFFERS),
        }
    }

    /// Replace the pool with `buffers`.
    ///
    /// The new set is bound completely before the old one is released; on
    /// error the current pool is unchanged and mappings made so far are
    /// undone. On success every buffer is free, queued in descriptor order.
    ///
    /// # Safety
    ///
    /// Every borrowed data pointer must be valid for writes of `max_size`
    /// bytes, and every chunk pointer valid for reads and writes, until the
    /// pool is cleared, replaced or dropped.
    pub unsafe fn use_buffers(&mut self, buffers: &[BufferDescriptor]) -> Result<()> {
        if buffers.len() > MAX_BUFFERS {
            return Err(NodeError::BufferCapacity {
                requested: buffers.len(),
                capacity: MAX_BUFFERS,
            });
        }
        let mut slots = Vec::with_capacity(MAX_BUFFERS);
        for (index, desc) in buffers.iter().enumerate() {
            let data = &desc.data;
            let binding = match (data.data, data.data_type) {
                (Some(ptr), _) => Binding::Borrowed(ptr),
                (None, DataType::MemFd | DataType::DmaBuf) => Binding::Mapped(MappedRegion::map(
                    data.fd,
                    data.map_offset,
                    data.max_size as usize,
                )?),
                (None, DataType::MemPtr) => return Err(NodeError::InvalidBufferMemory { index }),
            };
            slots.push(BufferSlot {
                binding,
                max_size: data.max_size,
                chunk: desc.chunk,
                membership: Membership::Free,
            });
        }
        self.slots = slots;
        self.free.clear();
        self.free.extend(0..self.slots.len() as u32);
        assert_invariant(
            POOL_CAPACITY,
            self.slots.len() <= MAX_BUFFERS,
            "pool holds at most MAX_BUFFERS buffers",
            Some("use_buffers"),
        );
        assert_invariant(
            POOL_ALL_FREE_AFTER_USE,
            self.free.len() == self.slots.len(),
            "a fresh pool is entirely free",
            Some("use_buffers"),
        );
        Ok(())
    }

    /// Drop every buffer binding.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    /// Take the oldest free buffer and mark it in flight.
    pub fn acquire(&mut self) -> Option<u32> {
        let id = self.free.pop_front()?;
        if let Some(slot) = self.slots.get_mut(id as usize) {
            slot.membership = Membership::InFlight;
        }
        Some(id)
    }

    /// Return an in-flight buffer to the tail of the free queue.
    pub fn recycle(&mut self, id: u32) -> Recycle {
        match self.slots.get_mut(id as usize) {
            None => Recycle::Unknown,
            Some(slot) if slot.membership == Membership::Free => Recycle::AlreadyFree,
            Some(slot) => {
                slot.membership = Membership::Free;
                self.free.push_back(id);
                Recycle::Recycled
            }
        }
    }

    /// Return every in-flight buffer; returns how many moved.
    pub fn recycle_all_in_flight(&mut self) -> usize {
        let mut moved = 0;
        for id in 0..self.slots.len() as u32 {
            if self.recycle(id) == Recycle::Recycled {
                moved += 1;
            }
        }
        moved
    }

    pub fn membership(&self, id: u32) -> Option<Membership> {
        self.slots.get(id as usize).map(|s| s.membership)
    }

    /// Free ids, head first.
    pub fn free_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.free.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn max_size(&self, id: u32) -> Option<u32> {
        self.slots.get(id as usize).map(|s| s.max_size)
    }

    /// Every free buffer is queued once and nothing else is queued.
    pub fn is_consistent(&self) -> bool {
        let queued_free = self
            .free
            .iter()
            .all(|&id| self.membership(id) == Some(Membership::Free));
        let free_count = self
            .slots
            .iter()
            .filter(|s| s.membership == Membership::Free)
            .count();
        queued_free && free_count == self.free.len()
    }

    pub(crate) fn data_mut(&mut self, id: u32) -> Option<&mut [u8]> {
        let slot = self.slots.get(id as usize)?;
        let ptr = slot.binding.ptr();
        // SAFETY: validity for max_size bytes is the contract of use_buffers.
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), slot.max_size as usize) })
    }

    pub(crate) fn chunk(&self, id: u32) -> Option<&Chunk> {
        let slot = self.slots.get(id as usize)?;
        // SAFETY: validity of the chunk header is the contract of use_buffers.
        Some(unsafe { slot.chunk.as_ref() })
    }
}
