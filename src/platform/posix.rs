// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX shared memory backing for transport segments: shm_open + mmap with a
// trailing process-shared reference counter.

use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::shm_name;

/// Open mode flags for [`PlatformShm::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    Create,
    Open,
    CreateOrOpen,
}

const COUNTER_SIZE: usize = std::mem::size_of::<AtomicI32>();

/// Round the user size up to the counter alignment and append the counter.
pub(crate) fn calc_size(user_size: usize) -> usize {
    let align = std::mem::align_of::<AtomicI32>();
    user_size.div_ceil(align) * align + COUNTER_SIZE
}

/// The reference counter lives in the last bytes of the mapping.
///
/// # Safety
/// `mem` must point to a live mapping of `total_size` bytes.
unsafe fn ref_counter<'a>(mem: *mut u8, total_size: usize) -> &'a AtomicI32 {
    &*(mem.add(total_size - COUNTER_SIZE) as *const AtomicI32)
}

pub struct PlatformShm {
    mem: *mut u8,
    size: usize,
    user_size: usize,
    name: String,
}

// The mapping is process-shared; synchronisation is the user's concern.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    pub fn acquire(name: &str, user_size: usize, mode: ShmMode) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "shm name is empty"));
        }
        if user_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "shm size is 0"));
        }

        let posix_name = shm_name::make_shm_name(name);
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let total_size = calc_size(user_size);

        let (fd, created) = match mode {
            ShmMode::Create => (open_fd(&c_name, true)?, true),
            ShmMode::Open => (open_fd(&c_name, false)?, false),
            // Exclusive create first: ftruncate only runs on an object we own.
            ShmMode::CreateOrOpen => match open_fd(&c_name, true) {
                Ok(fd) => (fd, true),
                Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                    (open_fd(&c_name, false)?, false)
                }
                Err(e) => return Err(e),
            },
        };

        if created && unsafe { libc::ftruncate(fd, total_size as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return Err(err);
        }
        if !created {
            // The trailing counter sits at a size-dependent offset; mapping an
            // existing segment with a different size would touch foreign bytes.
            let mut st: libc::stat = unsafe { std::mem::zeroed() };
            if unsafe { libc::fstat(fd, &mut st) } != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }
            if st.st_size as usize != stored_size(total_size) {
                unsafe { libc::close(fd) };
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("segment {posix_name} is {} bytes, expected {total_size}", st.st_size),
                ));
            }
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let mem = mem as *mut u8;
        unsafe { ref_counter(mem, total_size).fetch_add(1, Ordering::AcqRel) };

        Ok(Self {
            mem,
            size: total_size,
            user_size,
            name: posix_name,
        })
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    pub fn mapped_size(&self) -> usize {
        self.size
    }

    pub fn user_size(&self) -> usize {
        self.user_size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ref_count(&self) -> i32 {
        unsafe { ref_counter(self.mem, self.size).load(Ordering::Acquire) }
    }

    pub fn unlink_by_name(name: &str) {
        if let Ok(c_name) = CString::new(shm_name::make_shm_name(name)) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }

    fn unlink(&self) {
        if let Ok(c_name) = CString::new(self.name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        let prev = unsafe { ref_counter(self.mem, self.size).fetch_sub(1, Ordering::AcqRel) };
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
        if prev <= 1 {
            self.unlink();
        }
    }
}

/// Whether `pid` names a live process. `EPERM` still means it exists.
pub fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

/// Size the kernel reports for a segment truncated to `total_size`.
fn stored_size(total_size: usize) -> usize {
    if cfg!(target_os = "macos") {
        // macOS rounds shm objects up to whole pages.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) }.max(1) as usize;
        total_size.div_ceil(page) * page
    } else {
        total_size
    }
}

fn open_fd(c_name: &CString, exclusive: bool) -> io::Result<libc::c_int> {
    let flags = if exclusive {
        libc::O_RDWR | libc::O_CREAT | libc::O_EXCL
    } else {
        libc::O_RDWR
    };
    let perms: libc::mode_t = 0o660;
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, perms as libc::c_uint) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }
    // shm_open honours the umask; force the group bits so LCM and HM can
    // run under different users of the same group.
    unsafe { libc::fchmod(fd, perms) };
    Ok(fd)
}
