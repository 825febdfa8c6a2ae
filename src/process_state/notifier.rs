// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::receiver::RingProcessStateReceiver;
use super::{ProcessStateNotifier, ProcessStateReceiver};
use crate::config::{PROCESS_STATE_PAYLOAD, PROCESS_STATE_QUEUE_SIZE};
use crate::error::ChannelError;
use crate::ring::{ByteChannel, Endpoint, RingBuffer, TypedRing};
use crate::wire::PosixProcess;

/// Notifier over a [`RingBuffer`], attached as its producer.
///
/// The ring is shared with the receiver it constructs; it lives as long as
/// either end does. Dropping the notifier detaches the producer.
pub struct RingProcessStateNotifier {
    ring: TypedRing<PosixProcess>,
}

impl RingProcessStateNotifier {
    /// Notifier over a process-local ring of [`PROCESS_STATE_QUEUE_SIZE`] slots.
    pub fn new() -> Result<Self, ChannelError> {
        Self::with_capacity(PROCESS_STATE_QUEUE_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Result<Self, ChannelError> {
        let ring = RingBuffer::new(capacity, PROCESS_STATE_PAYLOAD)?;
        Self::attach(Arc::new(ring))
    }

    /// Notifier over the named shared ring, creating it if needed. The
    /// receiver may live in another process
    /// ([`RingProcessStateReceiver::open_shared`]).
    #[cfg(unix)]
    pub fn create_shared(name: &str, capacity: usize) -> Result<Self, ChannelError> {
        let ring = RingBuffer::create_shared(name, capacity, PROCESS_STATE_PAYLOAD)?;
        Self::attach(Arc::new(ring))
    }

    fn attach(chan: Arc<RingBuffer>) -> Result<Self, ChannelError> {
        let ring = TypedRing::new(chan)?;
        if !ring.channel().try_attach(Endpoint::Producer) {
            return Err(ChannelError::EndpointInUse("producer"));
        }
        Ok(Self { ring })
    }

    pub fn channel(&self) -> &Arc<RingBuffer> {
        self.ring.channel()
    }

    /// Clear cursors and the overflow flag. Only while the receiver is idle.
    pub fn reinitialize(&self) {
        self.ring.channel().initialize();
        debug!("process state channel reinitialized");
    }
}

impl ProcessStateNotifier for RingProcessStateNotifier {
    fn queue_posix_process(&mut self, process: &PosixProcess) -> bool {
        let queued = self.ring.try_enqueue(process);
        if !queued {
            warn!(process = ?process.id, "failed to queue posix process; channel full");
        }
        queued
    }

    fn construct_receiver(&self) -> Option<Box<dyn ProcessStateReceiver>> {
        match RingProcessStateReceiver::attach(Arc::clone(self.ring.channel())) {
            Ok(rx) => Some(Box::new(rx)),
            Err(e) => {
                error!(error = %e, "cannot construct process state receiver");
                None
            }
        }
    }
}

impl Drop for RingProcessStateNotifier {
    fn drop(&mut self) {
        self.ring.channel().detach(Endpoint::Producer);
    }
}
