// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Health monitor daemon: init handshake, cyclic loop and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing_test::traced_test;

use lcmipc::clock::monotonic_ns;
use lcmipc::config::{DaemonConfig, StartupHandshake};
use lcmipc::hm::{
    run, DistributionDaemon, HealthMonitor, HmProcessState, InitSignal, InitStatus,
    MonitorDaemon, ProcessState, ProcessStateArena, ProcessStateReader,
};
use lcmipc::process_state::{ProcessStateNotifier, RingProcessStateNotifier};
use lcmipc::recovery::{RecoveryClient, RingRecoveryClient, StopToken};
use lcmipc::{IdentifierHash, PosixProcess, ProcessStateId};

fn client() -> Arc<dyn RecoveryClient> {
    Arc::new(RingRecoveryClient::new().expect("client"))
}

fn fast_config() -> DaemonConfig {
    DaemonConfig::new().with_cycle_period(Duration::from_millis(2))
}

struct Counter {
    name: &'static str,
    pushed: Arc<Mutex<Vec<HmProcessState>>>,
    state: HmProcessState,
}

impl ProcessState for Counter {
    fn set_state(&mut self, state: HmProcessState) {
        self.state = state;
    }
    fn set_process_group_state(&mut self, _: IdentifierHash) {}
    fn set_timestamp(&mut self, _: u64) {}
    fn push_data(&mut self) {
        self.pushed.lock().unwrap().push(self.state);
    }
    fn config_name(&self) -> &str {
        self.name
    }
}

/// Daemon with a scripted init result that counts its cycles.
struct Scripted {
    init: InitStatus,
    cycles: Arc<AtomicUsize>,
    stop_after: Option<(usize, StopToken)>,
}

impl MonitorDaemon for Scripted {
    fn init(&mut self, _client: Arc<dyn RecoveryClient>) -> InitStatus {
        self.init
    }

    fn run_cycle(&mut self, _sync_ts: u64) {
        let n = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some((limit, stop)) = &self.stop_after {
            if n >= *limit {
                stop.request_stop();
            }
        }
    }
}

struct PanicsInInit;

impl MonitorDaemon for PanicsInInit {
    fn init(&mut self, _client: Arc<dyn RecoveryClient>) -> InitStatus {
        panic!("init exploded");
    }

    fn run_cycle(&mut self, _sync_ts: u64) {}
}

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn distribution_daemon_pushes_queued_changes() {
    let mut notifier = RingProcessStateNotifier::with_capacity(16).unwrap();
    let mut reader = ProcessStateReader::new(notifier.construct_receiver().unwrap());
    let mut store = ProcessStateArena::new();
    let pushed = Arc::new(Mutex::new(Vec::new()));
    let h = store.insert(Counter {
        name: "worker",
        pushed: Arc::clone(&pushed),
        state: HmProcessState::Idle,
    });
    assert!(reader.register_process_state(h, IdentifierHash::new("worker")));

    let mut monitor = HealthMonitor::new(fast_config());
    assert!(monitor.start(DistributionDaemon::new(reader, store), client()));
    assert_eq!(monitor.init_status(), InitStatus::NoError);
    assert!(monitor.is_running());

    for state in [ProcessStateId::Starting, ProcessStateId::Running, ProcessStateId::Terminated] {
        assert!(notifier.queue_posix_process(&PosixProcess {
            id: IdentifierHash::new("worker"),
            process_group_state_id: IdentifierHash::new("MainPG/Running"),
            process_state_id: state,
            system_clock_timestamp: monotonic_ns(),
        }));
    }

    assert!(wait_for(|| pushed.lock().unwrap().len() == 3));
    monitor.stop();
    assert!(!monitor.is_running());
    assert_eq!(
        *pushed.lock().unwrap(),
        vec![HmProcessState::Starting, HmProcessState::Running, HmProcessState::Off]
    );
}

#[test]
fn failed_init_is_reported_once_and_thread_exits() {
    let cycles = Arc::new(AtomicUsize::new(0));
    let mut monitor = HealthMonitor::new(fast_config());
    let started = monitor.start(
        Scripted {
            init: InitStatus::CommunicationError,
            cycles: Arc::clone(&cycles),
            stop_after: None,
        },
        client(),
    );
    assert!(!started);
    assert_eq!(monitor.init_status(), InitStatus::CommunicationError);
    assert!(!monitor.is_running());
    assert_eq!(cycles.load(Ordering::Relaxed), 0);
}

#[test]
fn polling_handshake_starts_daemon() {
    let cycles = Arc::new(AtomicUsize::new(0));
    let config = fast_config().with_handshake(StartupHandshake::polling());
    let mut monitor = HealthMonitor::new(config);
    assert!(monitor.start(
        Scripted {
            init: InitStatus::NoError,
            cycles: Arc::clone(&cycles),
            stop_after: None,
        },
        client(),
    ));
    assert!(wait_for(|| cycles.load(Ordering::Relaxed) >= 3));
    monitor.stop();

    let after_stop = cycles.load(Ordering::Relaxed);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(cycles.load(Ordering::Relaxed), after_stop);
}

#[test]
#[traced_test]
fn panicking_init_does_not_hang_start() {
    let mut monitor = HealthMonitor::new(fast_config());
    assert!(!monitor.start(PanicsInInit, client()));
    assert_eq!(monitor.init_status(), InitStatus::GeneralError);
    assert!(logs_contain("health monitor thread panicked during init"));
}

#[test]
fn second_start_is_refused() {
    let mut monitor = HealthMonitor::new(fast_config());
    let daemon = || Scripted {
        init: InitStatus::NoError,
        cycles: Arc::new(AtomicUsize::new(0)),
        stop_after: None,
    };
    assert!(monitor.start(daemon(), client()));
    assert!(!monitor.start(daemon(), client()));
    monitor.stop();
}

#[test]
fn run_loop_checks_stop_at_each_cycle_boundary() {
    let stop = StopToken::new();
    let cycles = Arc::new(AtomicUsize::new(0));
    let mut daemon = Scripted {
        init: InitStatus::NoError,
        cycles: Arc::clone(&cycles),
        stop_after: Some((3, stop.clone())),
    };
    let signal = InitSignal::new();
    let status = run(&mut daemon, client(), &signal, &stop, Duration::from_millis(1));
    assert_eq!(status, InitStatus::NoError);
    assert_eq!(signal.status(), InitStatus::NoError);
    assert_eq!(cycles.load(Ordering::Relaxed), 3);
}

#[test]
fn init_signal_keeps_first_report() {
    let signal = InitSignal::new();
    assert_eq!(signal.status(), InitStatus::NotInitialized);
    assert!(signal.report(InitStatus::NoError));
    assert!(!signal.report(InitStatus::GeneralError));
    assert_eq!(signal.wait(StartupHandshake::Notify), InitStatus::NoError);
}

#[test]
fn distribution_daemon_keeps_recovery_client() {
    let notifier = RingProcessStateNotifier::with_capacity(4).unwrap();
    let reader = ProcessStateReader::new(notifier.construct_receiver().unwrap());
    let mut daemon = DistributionDaemon::new(reader, ProcessStateArena::<Counter>::new());
    assert!(daemon.recovery_client().is_none());
    assert_eq!(daemon.init(client()), InitStatus::NoError);
    assert!(daemon.recovery_client().is_some());
}
