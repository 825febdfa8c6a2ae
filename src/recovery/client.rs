// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Recovery requests from the health monitor to the launch manager.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::completion::RecoveryFuture;
use super::correlation::{CorrelationTable, SlotId};
use crate::config::{RECOVERY_PAYLOAD, RECOVERY_QUEUE_SIZE};
use crate::error::{ChannelError, ExecError};
use crate::identifier::IdentifierHash;
use crate::ring::{ByteChannel, RingBuffer, TypedRing};
use crate::spin_lock::SpinLock;
use crate::wire::RecoveryRequest;

/// Sending side of the recovery protocol, as seen by a monitor.
pub trait RecoveryClient: Send + Sync {
    /// Ask the launch manager to switch `pg_name` into `pg_state_name`.
    ///
    /// Never blocks. Failures to even send the request come back as an
    /// already-resolved future.
    fn send_recovery_request(
        &self,
        pg_name: IdentifierHash,
        pg_state_name: IdentifierHash,
    ) -> RecoveryFuture;
}

impl<T: RecoveryClient + ?Sized> RecoveryClient for Arc<T> {
    fn send_recovery_request(
        &self,
        pg_name: IdentifierHash,
        pg_state_name: IdentifierHash,
    ) -> RecoveryFuture {
        (**self).send_recovery_request(pg_name, pg_state_name)
    }
}

/// Recovery client over a request ring and a correlation table.
///
/// Any number of monitor threads may send; they take turns on the ring's
/// producer side. The launch manager drains with
/// [`get_next_request`](Self::get_next_request) and answers every request
/// exactly once with [`set_response_success`](Self::set_response_success) or
/// [`set_response_error`](Self::set_response_error).
pub struct RingRecoveryClient<C: ByteChannel = RingBuffer> {
    requests: TypedRing<RecoveryRequest, C>,
    table: CorrelationTable,
    send_lock: SpinLock,
    recv_lock: SpinLock,
}

impl RingRecoveryClient<RingBuffer> {
    /// Client over a process-local ring of [`RECOVERY_QUEUE_SIZE`] slots.
    pub fn new() -> Result<Self, ChannelError> {
        let ring = RingBuffer::new(RECOVERY_QUEUE_SIZE, RECOVERY_PAYLOAD)?;
        Self::with_channel(Arc::new(ring))
    }
}

impl<C: ByteChannel> RingRecoveryClient<C> {
    /// Client over an existing channel. The correlation table gets one slot
    /// per channel slot.
    pub fn with_channel(chan: Arc<C>) -> Result<Self, ChannelError> {
        let table = CorrelationTable::new(chan.capacity());
        Ok(Self {
            requests: TypedRing::new(chan)?,
            table,
            send_lock: SpinLock::new(),
            recv_lock: SpinLock::new(),
        })
    }

    pub fn correlation_table(&self) -> &CorrelationTable {
        &self.table
    }

    /// Requests queued and not yet taken by the launch manager.
    pub fn pending_requests(&self) -> usize {
        self.requests.channel().len()
    }

    /// Oldest queued request, if any.
    pub fn get_next_request(&self) -> Option<RecoveryRequest> {
        let _guard = self.recv_lock.lock();
        match self.requests.try_dequeue() {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "malformed recovery request dropped");
                None
            }
        }
    }

    pub fn set_response_success(&self, promise_id: SlotId) -> bool {
        self.table.resolve_success(promise_id)
    }

    pub fn set_response_error(&self, promise_id: SlotId, error: ExecError) -> bool {
        self.table.resolve_error(promise_id, error)
    }
}

impl<C: ByteChannel> RecoveryClient for RingRecoveryClient<C> {
    fn send_recovery_request(
        &self,
        pg_name: IdentifierHash,
        pg_state_name: IdentifierHash,
    ) -> RecoveryFuture {
        let Some((promise_id, future)) = self.table.claim_slot() else {
            warn!(%pg_name, %pg_state_name, "no free slot for recovery request");
            return RecoveryFuture::ready(Err(ExecError::ResourceExhausted));
        };

        let req = RecoveryRequest {
            pg_name,
            pg_state_name,
            promise_id,
        };
        let sent = {
            let _guard = self.send_lock.lock();
            self.requests.try_enqueue(&req)
        };
        if sent {
            debug!(%pg_name, %pg_state_name, promise_id, "recovery request sent");
        } else {
            warn!(%pg_name, %pg_state_name, "recovery channel full");
            self.table.resolve_error(promise_id, ExecError::Communication);
        }
        future
    }
}
