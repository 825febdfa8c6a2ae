// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

//! Process state transport (LCM → HM).
//!
//! The launch manager queues one [`PosixProcess`] record per observed state
//! transition; the health monitor drains them once per cycle.

mod notifier;
mod receiver;

pub use notifier::RingProcessStateNotifier;
pub use receiver::RingProcessStateReceiver;

use crate::error::ExecError;
use crate::wire::PosixProcess;

/// Producer side of the process state transport.
pub trait ProcessStateNotifier: Send {
    /// Queue one state change. Returns `false` when the channel is full; the
    /// caller decides whether to log, retry or drop.
    fn queue_posix_process(&mut self, process: &PosixProcess) -> bool;

    /// Build the consumer side over the same channel. `None` when a consumer
    /// is already attached.
    fn construct_receiver(&self) -> Option<Box<dyn ProcessStateReceiver>>;
}

/// Consumer side of the process state transport.
pub trait ProcessStateReceiver: Send {
    /// Next state change, if any.
    ///
    /// `Ok(None)` means the channel is drained. An overflowed channel or a
    /// malformed record is `Err(ExecError::Communication)`; the two must never
    /// be confused, since an overflowed channel may also look empty.
    fn get_next_changed_posix_process(&mut self) -> Result<Option<PosixProcess>, ExecError>;
}
