// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   demo_supervision lcm <interval_ms>
//   demo_supervision hm <cycle_ms>
//
// The two processes share the process state ring "process_state". The LCM
// side walks a few synthetic processes through their lifecycle, one
// transition every <interval_ms>. The HM side distributes the transitions
// every <cycle_ms> and logs each pushed state. Set RUST_LOG=debug to see the
// transport's own events.

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lcmipc::clock::monotonic_ns;
use lcmipc::config::{DaemonConfig, PROCESS_STATE_QUEUE_SIZE};
use lcmipc::hm::{
    DistributionDaemon, HealthMonitor, HmProcessState, ProcessState, ProcessStateArena,
    ProcessStateReader,
};
use lcmipc::process_state::{
    ProcessStateNotifier, RingProcessStateNotifier, RingProcessStateReceiver,
};
use lcmipc::recovery::{RecoveryClient, RingRecoveryClient};
use lcmipc::{IdentifierHash, PosixProcess, ProcessStateId};

const CHANNEL: &str = "process_state";
const PROCESSES: &[&str] = &["camera_driver", "perception", "planner"];
const PG_STATE: &str = "MainPG/Running";

const LIFECYCLE: &[ProcessStateId] = &[
    ProcessStateId::Idle,
    ProcessStateId::Starting,
    ProcessStateId::Running,
    ProcessStateId::Terminating,
    ProcessStateId::Terminated,
];

fn do_lcm(interval_ms: u64, quit: Arc<AtomicBool>) -> Result<(), Box<dyn Error>> {
    let mut notifier = RingProcessStateNotifier::create_shared(CHANNEL, PROCESS_STATE_QUEUE_SIZE)?;
    let pg_state = IdentifierHash::new(PG_STATE);
    let mut step = 0usize;
    while !quit.load(Ordering::Acquire) {
        let name = PROCESSES[step % PROCESSES.len()];
        let state = LIFECYCLE[(step / PROCESSES.len()) % LIFECYCLE.len()];
        let record = PosixProcess {
            id: IdentifierHash::new(name),
            process_group_state_id: pg_state,
            process_state_id: state,
            system_clock_timestamp: monotonic_ns(),
        };
        if notifier.queue_posix_process(&record) {
            info!(process = name, ?state, "queued");
        } else {
            warn!(process = name, ?state, "process state channel full");
        }
        step += 1;
        thread::sleep(Duration::from_millis(interval_ms));
    }
    Ok(())
}

struct DemoProcess {
    name: String,
    state: HmProcessState,
    pg_state: IdentifierHash,
    timestamp: u64,
}

impl ProcessState for DemoProcess {
    fn set_state(&mut self, state: HmProcessState) {
        self.state = state;
    }

    fn set_process_group_state(&mut self, pg_state: IdentifierHash) {
        self.pg_state = pg_state;
    }

    fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    fn push_data(&mut self) {
        info!(
            process = %self.name,
            state = ?self.state,
            pg_state = %self.pg_state,
            timestamp = self.timestamp,
            "pushed"
        );
    }

    fn config_name(&self) -> &str {
        &self.name
    }
}

fn do_hm(cycle_ms: u64, quit: Arc<AtomicBool>) -> Result<(), Box<dyn Error>> {
    let receiver = RingProcessStateReceiver::open_shared(CHANNEL, PROCESS_STATE_QUEUE_SIZE)?;
    let mut reader = ProcessStateReader::new(Box::new(receiver));
    let mut store = ProcessStateArena::new();
    for &name in PROCESSES {
        let handle = store.insert(DemoProcess {
            name: name.to_owned(),
            state: HmProcessState::Idle,
            pg_state: IdentifierHash::default(),
            timestamp: 0,
        });
        reader.register_process_state(handle, IdentifierHash::new(name));
    }

    // The recovery consumer normally lives in the LCM; answer in-process here.
    let client = Arc::new(RingRecoveryClient::new()?);
    let responder = {
        let client = Arc::clone(&client);
        let quit = Arc::clone(&quit);
        thread::spawn(move || {
            while !quit.load(Ordering::Acquire) {
                match client.get_next_request() {
                    Some(req) => {
                        info!(pg = %req.pg_name, state = %req.pg_state_name, "recovery requested");
                        client.set_response_success(req.promise_id);
                    }
                    None => thread::sleep(Duration::from_millis(5)),
                }
            }
        })
    };

    let config = DaemonConfig::new().with_cycle_period(Duration::from_millis(cycle_ms));
    let mut monitor = HealthMonitor::new(config);
    let recovery: Arc<dyn RecoveryClient> = client.clone();
    if !monitor.start(DistributionDaemon::new(reader, store), recovery) {
        return Err("health monitor failed to start".into());
    }

    let outcome = client
        .send_recovery_request(IdentifierHash::new("MainPG"), IdentifierHash::new("MainPG/Recovery"))
        .wait_timeout(Duration::from_secs(1));
    info!(?outcome, "recovery round trip");

    while !quit.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(50));
    }
    monitor.stop();
    let _ = responder.join();
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: demo_supervision lcm <interval_ms>");
        eprintln!("       demo_supervision hm <cycle_ms>");
        std::process::exit(1);
    }
    let period: u64 = args[2].parse()?;

    let quit = Arc::new(AtomicBool::new(false));
    {
        let q = Arc::clone(&quit);
        on_sigint_or_sigterm(move || q.store(true, Ordering::Release));
    }

    match args[1].as_str() {
        "lcm" => do_lcm(period, quit),
        "hm" => do_hm(period, quit),
        other => {
            eprintln!("unknown mode: {other}");
            std::process::exit(1);
        }
    }
}

// Sets the flag on SIGINT / SIGTERM / SIGHUP.
fn on_sigint_or_sigterm(f: impl Fn() + Send + 'static) {
    use std::sync::{Mutex, OnceLock};
    static CB: OnceLock<Mutex<Box<dyn Fn() + Send>>> = OnceLock::new();
    CB.get_or_init(|| Mutex::new(Box::new(f)));
    extern "C" fn handler(_: libc::c_int) {
        if let Some(cb) = CB.get() {
            if let Ok(g) = cb.lock() {
                g();
            }
        }
    }
    unsafe {
        libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
        libc::signal(libc::SIGHUP, handler as *const () as libc::sighandler_t);
    }
}
