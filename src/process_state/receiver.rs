// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use std::sync::Arc;

use tracing::error;

use super::ProcessStateReceiver;
use crate::error::{ChannelError, ExecError};
use crate::ring::{ByteChannel, Endpoint, RingBuffer, TypedRing};
use crate::wire::PosixProcess;

#[cfg(unix)]
use crate::config::PROCESS_STATE_PAYLOAD;

/// Receiver over a [`RingBuffer`], attached as its single consumer.
pub struct RingProcessStateReceiver {
    ring: TypedRing<PosixProcess>,
    overflow_reported: bool,
}

impl RingProcessStateReceiver {
    pub(super) fn attach(chan: Arc<RingBuffer>) -> Result<Self, ChannelError> {
        let ring = TypedRing::new(chan)?;
        if !ring.channel().try_attach(Endpoint::Consumer) {
            return Err(ChannelError::EndpointInUse("consumer"));
        }
        Ok(Self {
            ring,
            overflow_reported: false,
        })
    }

    /// Attach to a shared ring created by a notifier in another process.
    #[cfg(unix)]
    pub fn open_shared(name: &str, capacity: usize) -> Result<Self, ChannelError> {
        let ring = RingBuffer::open_shared(name, capacity, PROCESS_STATE_PAYLOAD)?;
        Self::attach(Arc::new(ring))
    }
}

impl ProcessStateReceiver for RingProcessStateReceiver {
    fn get_next_changed_posix_process(&mut self) -> Result<Option<PosixProcess>, ExecError> {
        let chan = self.ring.channel();
        if chan.overflow_flag() {
            if !self.overflow_reported {
                error!("process state channel overflowed; state changes were lost");
                self.overflow_reported = true;
            }
            return Err(ExecError::Communication);
        }
        self.overflow_reported = false;
        if chan.empty() {
            return Ok(None);
        }
        match self.ring.try_dequeue() {
            Ok(Some(process)) => Ok(Some(process)),
            // Non-empty a moment ago, yet nothing to read.
            Ok(None) => Err(ExecError::General),
            Err(e) => {
                error!(error = %e, "malformed process state record");
                Err(e.into())
            }
        }
    }
}

impl Drop for RingProcessStateReceiver {
    fn drop(&mut self) {
        self.ring.channel().detach(Endpoint::Consumer);
    }
}
