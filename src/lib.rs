// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Process-supervision transport between a launch manager (LCM) and its health
// monitor (HM): lock-free SPSC rings over heap or POSIX shared memory, the
// recovery request/response protocol and cyclic state distribution.

pub mod shm_name;

#[cfg(unix)]
mod platform;

#[cfg(unix)]
mod shm;
#[cfg(unix)]
pub use shm::{ShmHandle, ShmOpenMode};

mod spin_lock;
pub use spin_lock::{SpinGuard, SpinLock};

pub mod clock;
pub mod config;
pub mod error;
pub use error::{ChannelError, ExecError, WireError};

mod identifier;
pub use identifier::{fnv1a_64, IdentifierHash, ProcessId};

pub mod region;
pub mod ring;
pub use ring::{ByteChannel, Endpoint, RingBuffer, TypedRing};

pub mod wire;
pub use wire::{PosixProcess, ProcessStateId, RecoveryRequest, WireRecord};

pub mod hm;
pub mod process_state;
pub mod recovery;
