// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named inter-process shared memory handle.

use std::io;

use crate::platform::{PlatformShm, ShmMode};

/// Open mode for shared memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOpenMode {
    /// Create exclusively; fail if the segment exists.
    Create,
    /// Open an existing segment; fail if it does not exist.
    Open,
    /// Create if missing, open otherwise.
    CreateOrOpen,
}

/// A named shared memory region.
///
/// The mapping carries a trailing reference counter shared by every process
/// that maps the segment; the last handle to drop unlinks it.
pub struct ShmHandle {
    inner: PlatformShm,
}

impl ShmHandle {
    /// Acquire a segment of `size` usable bytes.
    pub fn acquire(name: &str, size: usize, mode: ShmOpenMode) -> io::Result<Self> {
        let mode = match mode {
            ShmOpenMode::Create => ShmMode::Create,
            ShmOpenMode::Open => ShmMode::Open,
            ShmOpenMode::CreateOrOpen => ShmMode::CreateOrOpen,
        };
        Ok(Self {
            inner: PlatformShm::acquire(name, size, mode)?,
        })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_mut_ptr()
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    /// Usable size requested at acquire time.
    pub fn user_size(&self) -> usize {
        self.inner.user_size()
    }

    /// Total mapped size, including the reference counter.
    pub fn mapped_size(&self) -> usize {
        self.inner.mapped_size()
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Number of live mappings across all processes.
    pub fn ref_count(&self) -> i32 {
        self.inner.ref_count()
    }

    /// Remove a segment by name without holding a handle.
    pub fn clear_storage(name: &str) {
        PlatformShm::unlink_by_name(name);
    }
}
