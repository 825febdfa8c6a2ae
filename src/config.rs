// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Channel shapes and daemon tuning.

use std::time::Duration;

use crate::wire::{PosixProcess, RecoveryRequest, WireRecord};

/// Slots in the LCM → HM process-state ring.
pub const PROCESS_STATE_QUEUE_SIZE: usize = 512;

/// Bytes per process-state slot.
pub const PROCESS_STATE_PAYLOAD: usize = PosixProcess::SIZE;

/// Slots in the recovery request ring; also the size of the correlation pool.
pub const RECOVERY_QUEUE_SIZE: usize = 1024;

/// Bytes per recovery request slot.
pub const RECOVERY_PAYLOAD: usize = RecoveryRequest::SIZE;

pub const DEFAULT_CYCLE_PERIOD: Duration = Duration::from_millis(50);

/// Poll interval of the polling startup handshake.
pub const INIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How often a blocked completion wait re-checks its stop token.
pub const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How [`HealthMonitor::start`](crate::hm::HealthMonitor::start) waits for
/// the daemon thread to report its initialization result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupHandshake {
    /// Block on a condition variable until notified.
    Notify,
    /// Re-read the status flag every `interval`.
    Poll(Duration),
}

impl StartupHandshake {
    /// Polling at [`INIT_POLL_INTERVAL`].
    pub const fn polling() -> Self {
        StartupHandshake::Poll(INIT_POLL_INTERVAL)
    }
}

/// Configuration of the health monitor daemon thread.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Name given to the spawned thread.
    pub thread_name: String,
    /// Period of the cyclic loop; one `distribute_changes` per period.
    pub cycle_period: Duration,
    pub handshake: StartupHandshake,
}

impl DaemonConfig {
    pub fn new() -> Self {
        Self {
            thread_name: "health_monitor".to_owned(),
            cycle_period: DEFAULT_CYCLE_PERIOD,
            handshake: StartupHandshake::Notify,
        }
    }

    pub fn with_cycle_period(mut self, period: Duration) -> Self {
        self.cycle_period = period;
        self
    }

    pub fn with_handshake(mut self, handshake: StartupHandshake) -> Self {
        self.handshake = handshake;
        self
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::new()
    }
}
