// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Health monitor daemon thread: one-time init handshake, then a fixed-period
// cycle until stopped.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::process_state::ProcessStateStore;
use super::reader::ProcessStateReader;
use crate::clock::monotonic_ns;
use crate::config::{DaemonConfig, StartupHandshake};
use crate::recovery::{RecoveryClient, StopToken};

/// Outcome of daemon initialization.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotInitialized = 0,
    NoError = 1,
    GeneralError = 2,
    CommunicationError = 3,
}

impl InitStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => InitStatus::NoError,
            2 => InitStatus::GeneralError,
            3 => InitStatus::CommunicationError,
            _ => InitStatus::NotInitialized,
        }
    }
}

// ---------------------------------------------------------------------------
// InitSignal
// ---------------------------------------------------------------------------

/// One-shot rendezvous carrying the [`InitStatus`] from the daemon thread to
/// whoever started it.
pub struct InitSignal {
    status: AtomicU8,
    lock: Mutex<()>,
    cv: Condvar,
}

impl InitSignal {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(InitStatus::NotInitialized as u8),
            lock: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    pub fn status(&self) -> InitStatus {
        InitStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    /// Publish `status`. Only the first report counts.
    pub fn report(&self, status: InitStatus) -> bool {
        let status = match status {
            InitStatus::NotInitialized => InitStatus::GeneralError,
            s => s,
        };
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = self
            .status
            .compare_exchange(
                InitStatus::NotInitialized as u8,
                status as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if stored {
            self.cv.notify_all();
        }
        stored
    }

    /// Block until a status is reported.
    pub fn wait(&self, handshake: StartupHandshake) -> InitStatus {
        match handshake {
            StartupHandshake::Notify => {
                let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
                loop {
                    let st = self.status();
                    if st != InitStatus::NotInitialized {
                        return st;
                    }
                    guard = self.cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
                }
            }
            StartupHandshake::Poll(interval) => loop {
                let st = self.status();
                if st != InitStatus::NotInitialized {
                    return st;
                }
                thread::sleep(interval);
            },
        }
    }
}

impl Default for InitSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// MonitorDaemon + run loop
// ---------------------------------------------------------------------------

/// Work executed by the health monitor thread.
pub trait MonitorDaemon: Send + 'static {
    /// Called once on the daemon thread before the first cycle.
    fn init(&mut self, client: Arc<dyn RecoveryClient>) -> InitStatus;

    /// One cycle. `sync_ts` is the monotonic time the cycle started at.
    fn run_cycle(&mut self, sync_ts: u64);
}

/// Initialize `daemon`, report through `signal`, then cycle every `period`
/// until `stop` fires. Returns the init status.
pub fn run<D: MonitorDaemon + ?Sized>(
    daemon: &mut D,
    client: Arc<dyn RecoveryClient>,
    signal: &InitSignal,
    stop: &StopToken,
    period: Duration,
) -> InitStatus {
    let status = daemon.init(client);
    signal.report(status);
    if status != InitStatus::NoError {
        error!(?status, "health monitor initialization failed");
        return status;
    }
    info!(period_ms = period.as_millis() as u64, "health monitor running");

    let mut deadline = Instant::now();
    while !stop.stop_requested() {
        daemon.run_cycle(monotonic_ns());

        deadline += period;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            debug!(overrun_us = (now - deadline).as_micros() as u64, "cycle overran its period");
            deadline = now;
        }
    }
    info!("health monitor stopped");
    status
}

/// Reports `GeneralError` if the daemon thread exits before reporting, so a
/// panicking `init` cannot leave the starter waiting forever.
struct ReportOnExit(Arc<InitSignal>);

impl Drop for ReportOnExit {
    fn drop(&mut self) {
        self.0.report(InitStatus::GeneralError);
    }
}

// ---------------------------------------------------------------------------
// HealthMonitor
// ---------------------------------------------------------------------------

/// Owns the daemon thread.
pub struct HealthMonitor {
    config: DaemonConfig,
    stop: StopToken,
    signal: Arc<InitSignal>,
    thread: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            stop: StopToken::new(),
            signal: Arc::new(InitSignal::new()),
            thread: None,
        }
    }

    /// Spawn the daemon thread and wait for its init result. Returns `true`
    /// only if initialization succeeded; on failure the thread has exited.
    pub fn start<D: MonitorDaemon>(&mut self, daemon: D, client: Arc<dyn RecoveryClient>) -> bool {
        if self.thread.is_some() {
            warn!("health monitor already started");
            return false;
        }
        self.stop = StopToken::new();
        self.signal = Arc::new(InitSignal::new());

        let signal = Arc::clone(&self.signal);
        let stop = self.stop.clone();
        let period = self.config.cycle_period;
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                let _exit = ReportOnExit(Arc::clone(&signal));
                let mut daemon = daemon;
                run(&mut daemon, client, &signal, &stop, period);
            });
        let handle = match spawned {
            Ok(h) => h,
            Err(e) => {
                error!(error = %e, "cannot spawn health monitor thread");
                return false;
            }
        };

        let status = self.signal.wait(self.config.handshake);
        if status != InitStatus::NoError {
            if handle.join().is_err() {
                error!(?status, "health monitor thread panicked during init");
            }
            return false;
        }
        self.thread = Some(handle);
        true
    }

    pub fn init_status(&self) -> InitStatus {
        self.signal.status()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Request stop and join the daemon thread. No-op if not running.
    pub fn stop(&mut self) {
        self.stop.request_stop();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("health monitor thread panicked");
            }
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// DistributionDaemon
// ---------------------------------------------------------------------------

/// Daemon that runs one process state distribution per cycle.
pub struct DistributionDaemon<S> {
    reader: ProcessStateReader,
    store: S,
    client: Option<Arc<dyn RecoveryClient>>,
}

impl<S: ProcessStateStore + Send + 'static> DistributionDaemon<S> {
    pub fn new(reader: ProcessStateReader, store: S) -> Self {
        Self {
            reader,
            store,
            client: None,
        }
    }

    pub fn reader_mut(&mut self) -> &mut ProcessStateReader {
        &mut self.reader
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Client handed over by `init`, for checks that request recovery.
    pub fn recovery_client(&self) -> Option<&Arc<dyn RecoveryClient>> {
        self.client.as_ref()
    }
}

impl<S: ProcessStateStore + Send + 'static> MonitorDaemon for DistributionDaemon<S> {
    fn init(&mut self, client: Arc<dyn RecoveryClient>) -> InitStatus {
        self.client = Some(client);
        debug!(processes = self.reader.registered_count(), "distribution daemon initialized");
        InitStatus::NoError
    }

    fn run_cycle(&mut self, sync_ts: u64) {
        if !self.reader.distribute_changes(&mut self.store, sync_ts) {
            warn!(sync_ts, "distribution cycle ended early");
        }
    }
}
