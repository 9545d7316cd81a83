//! Scoped shared-memory mapping.
//!
//! Mirrors the source's `SharedMemoryHandle`: the constructor maps the region or fails outright,
//! there is no separate `open()` step, and the descriptor is owned by the handle from that point
//! on — `Drop` unmaps and closes it together.

use std::os::raw::c_void;

use crate::error::{RialtoError, RialtoResult};

/// An acquired mapping of the server's shared-memory region.
///
/// Valid for exactly as long as the handle is alive. The bytes are produced and laid out by the
/// server; this type neither writes nor interprets them.
#[derive(Debug)]
pub struct SharedMemoryHandle {
    ptr: *mut u8,
    len: usize,
    fd: i32,
}

// The mapped region outlives any single thread's ownership of the handle by construction, and
// concurrent reads of server-produced bytes are part of the shared-memory contract (see SPEC_FULL
// §5); we never mutate through `ptr` ourselves.
unsafe impl Send for SharedMemoryHandle {}
unsafe impl Sync for SharedMemoryHandle {}

impl SharedMemoryHandle {
    /// Map `fd` read-write, shared, for `len` bytes. Takes ownership of `fd` on success *and* on
    /// a mapping failure (the descriptor is closed either way); on an invalid-resource rejection
    /// the descriptor is left untouched since it may not be ours to close.
    pub fn map(fd: i32, len: u32) -> RialtoResult<Self> {
        if fd < 0 || len == 0 {
            return Err(RialtoError::InvalidResource { fd, size: len });
        }
        let len = len as usize;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            let os_err = std::io::Error::last_os_error();
            unsafe {
                libc::close(fd);
            }
            return Err(RialtoError::MappingFailure(os_err.to_string()));
        }

        Ok(Self { ptr: ptr as *mut u8, len, fd })
    }

    /// Base address of the mapping. Valid for the lifetime of this handle.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for SharedMemoryHandle {
    fn drop(&mut self) {
        unsafe {
            if !self.ptr.is_null() {
                libc::munmap(self.ptr as *mut c_void, self.len);
            }
            if self.fd >= 0 {
                libc::close(self.fd);
            }
        }
    }
}
