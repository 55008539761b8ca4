//! Shared mappings of fd-backed buffer memory.

use std::io;
use std::os::fd::RawFd;
use std::ptr::NonNull;
use tracing::warn;

/// A writable shared mapping, unmapped when dropped.
#[derive(Debug)]
pub struct MappedRegion {
    base: NonNull<libc::c_void>,
    mapped_len: usize,
    data: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is plain shared memory owned by this value alone.
unsafe impl Send for MappedRegion {}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

impl MappedRegion {
    /// Map `len` bytes of `fd` starting at `offset`. The offset need not be
    /// page aligned.
    pub fn map(fd: RawFd, offset: u32, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let page = page_size();
        let offset = offset as usize;
        let delta = offset % page;
        let mapped_len = len + delta;
        // SAFETY: a fresh mapping is requested; the kernel validates the fd.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                mapped_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                (offset - delta) as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = NonNull::new(ptr).ok_or_else(|| io::Error::from_raw_os_error(libc::ENOMEM))?;
        // SAFETY: delta < page <= mapped_len, so the pointer stays in the mapping.
        let data = unsafe { NonNull::new_unchecked(ptr.cast::<u8>().add(delta)) };
        Ok(Self {
            base,
            mapped_len,
            data,
            len,
        })
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: base/mapped_len describe a mapping created in `map` and
        // unmapped only here.
        let rc = unsafe { libc::munmap(self.base.as_ptr(), self.mapped_len) };
        if rc != 0 {
            warn!(error = %io::Error::last_os_error(), len = self.mapped_len, "munmap failed");
        }
    }
}
