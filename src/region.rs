// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Backing memory for transport rings: process-local heap or named shm.

use std::alloc::{self, Layout};
use std::io;

#[cfg(unix)]
use crate::{ShmHandle, ShmOpenMode};

/// Alignment of every region; keeps ring cursors on separate cache lines.
pub const REGION_ALIGN: usize = 64;

/// A fixed block of zero-initialised memory a ring can be laid over.
///
/// Implementations must keep the block mapped and its address stable for
/// their whole lifetime.
pub trait Region: Send + Sync {
    fn as_mut_ptr(&self) -> *mut u8;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local region, for in-process channels and tests.
pub struct HeapRegion {
    ptr: *mut u8,
    layout: Layout,
}

// The allocation is owned and never moved; access is arbitrated by the ring.
unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl HeapRegion {
    pub fn new(len: usize) -> io::Result<Self> {
        let layout = Layout::from_size_align(len.max(1), REGION_ALIGN)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "heap region allocation failed"));
        }
        Ok(Self { ptr, layout })
    }
}

impl Region for HeapRegion {
    fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }

    fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr, self.layout) };
    }
}

/// Region backed by a named POSIX shared memory segment.
#[cfg(unix)]
pub struct ShmRegion {
    shm: ShmHandle,
}

#[cfg(unix)]
impl ShmRegion {
    pub fn acquire(name: &str, len: usize, mode: ShmOpenMode) -> io::Result<Self> {
        let shm = ShmHandle::acquire(name, len, mode)?;
        if (shm.as_ptr() as usize) % REGION_ALIGN != 0 {
            return Err(io::Error::other("shm mapping is not cache-line aligned"));
        }
        Ok(Self { shm })
    }

    pub fn handle(&self) -> &ShmHandle {
        &self.shm
    }
}

#[cfg(unix)]
impl Region for ShmRegion {
    fn as_mut_ptr(&self) -> *mut u8 {
        self.shm.as_mut_ptr()
    }

    fn len(&self) -> usize {
        self.shm.user_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_region_is_zeroed_and_aligned() {
        let r = HeapRegion::new(256).expect("alloc");
        assert_eq!(r.len(), 256);
        assert_eq!(r.as_mut_ptr() as usize % REGION_ALIGN, 0);
        let bytes = unsafe { std::slice::from_raw_parts(r.as_mut_ptr(), r.len()) };
        assert!(bytes.iter().all(|&b| b == 0));
    }
}
