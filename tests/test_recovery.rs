// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Recovery requests: correlation slots, responses, exhaustion and
// cancellation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing_test::traced_test;

use lcmipc::config::{RECOVERY_PAYLOAD, RECOVERY_QUEUE_SIZE};
use lcmipc::recovery::{CorrelationTable, RecoveryClient, RingRecoveryClient, StopToken};
use lcmipc::{ExecError, IdentifierHash, RingBuffer};

fn pg() -> IdentifierHash {
    IdentifierHash::new("MainPG")
}

fn recovery_state() -> IdentifierHash {
    IdentifierHash::new("MainPG/Recovery")
}

fn small_client(capacity: usize) -> RingRecoveryClient {
    let ring = RingBuffer::new(capacity, RECOVERY_PAYLOAD).expect("ring");
    RingRecoveryClient::with_channel(Arc::new(ring)).expect("client")
}

#[test]
fn default_client_has_one_slot_per_channel_slot() {
    let client = RingRecoveryClient::new().expect("client");
    assert_eq!(client.correlation_table().capacity(), RECOVERY_QUEUE_SIZE);
}

#[test]
fn success_response_resolves_future() {
    let client = small_client(4);
    let future = client.send_recovery_request(pg(), recovery_state());
    assert!(!future.is_ready());

    let req = client.get_next_request().expect("queued request");
    assert_eq!(req.pg_name, pg());
    assert_eq!(req.pg_state_name, recovery_state());
    assert!(client.set_response_success(req.promise_id));
    assert_eq!(future.wait(), Ok(()));
    assert_eq!(client.correlation_table().in_use_count(), 0);
}

#[test]
fn error_response_carries_kind() {
    let client = small_client(4);
    let future = client.send_recovery_request(pg(), recovery_state());
    let req = client.get_next_request().unwrap();
    assert!(client.set_response_error(req.promise_id, ExecError::Failed));
    assert_eq!(future.wait_timeout(Duration::from_secs(1)), Some(Err(ExecError::Failed)));
}

#[test]
fn requests_are_fifo() {
    let client = small_client(8);
    let names = ["a", "b", "c"];
    let _futures: Vec<_> = names
        .iter()
        .map(|n| client.send_recovery_request(IdentifierHash::new(n), recovery_state()))
        .collect();
    for n in names {
        assert_eq!(client.get_next_request().unwrap().pg_name, IdentifierHash::new(n));
    }
    assert!(client.get_next_request().is_none());
}

#[test]
#[traced_test]
fn exhausted_pool_fails_immediately_and_recovers() {
    let client = small_client(2);
    let f1 = client.send_recovery_request(pg(), recovery_state());
    let _f2 = client.send_recovery_request(pg(), recovery_state());

    let f3 = client.send_recovery_request(pg(), recovery_state());
    assert_eq!(f3.try_result(), Some(Err(ExecError::ResourceExhausted)));
    assert!(logs_contain("no free slot for recovery request"));
    // The refused request never reached the channel.
    assert_eq!(client.pending_requests(), 2);

    let req = client.get_next_request().unwrap();
    client.set_response_success(req.promise_id);
    assert_eq!(f1.wait(), Ok(()));

    let f4 = client.send_recovery_request(pg(), recovery_state());
    assert!(!f4.is_ready());
}

#[test]
fn full_channel_fails_with_communication_and_releases_slot() {
    // Two clients on one channel: the first fills it, the second still has
    // free slots but nowhere to send.
    let ring = Arc::new(RingBuffer::new(2, RECOVERY_PAYLOAD).unwrap());
    let filler = RingRecoveryClient::with_channel(Arc::clone(&ring)).unwrap();
    let sender = RingRecoveryClient::with_channel(ring).unwrap();

    let _a = filler.send_recovery_request(pg(), recovery_state());
    let _b = filler.send_recovery_request(pg(), recovery_state());

    let f = sender.send_recovery_request(pg(), recovery_state());
    assert_eq!(f.try_result(), Some(Err(ExecError::Communication)));
    assert_eq!(sender.correlation_table().in_use_count(), 0);
}

#[test]
fn unclaimed_response_is_rejected() {
    let client = small_client(4);
    assert!(!client.set_response_success(0));
    assert!(!client.set_response_error(99, ExecError::Failed));
}

#[test]
fn cancelled_wait_keeps_slot_until_answered() {
    let client = small_client(4);
    let future = client.send_recovery_request(pg(), recovery_state());

    let stop = StopToken::new();
    stop.request_stop();
    assert_eq!(future.wait_until(&stop), Err(ExecError::Cancelled));
    drop(future);
    assert_eq!(client.correlation_table().in_use_count(), 1);

    let req = client.get_next_request().unwrap();
    assert!(client.set_response_success(req.promise_id));
    assert_eq!(client.correlation_table().in_use_count(), 0);
}

#[test]
fn timed_out_wait_still_releases_on_response() {
    let client = small_client(1);
    let future = client.send_recovery_request(pg(), recovery_state());
    assert_eq!(future.wait_timeout(Duration::from_millis(5)), None);

    let req = client.get_next_request().unwrap();
    client.set_response_error(req.promise_id, ExecError::InvalidArguments);
    assert_eq!(future.try_result(), Some(Err(ExecError::InvalidArguments)));
    assert!(!client.send_recovery_request(pg(), recovery_state()).is_ready());
}

#[test]
fn concurrent_claims_never_share_a_slot() {
    const THREADS: usize = 8;
    const CAPACITY: usize = 256;
    let table = Arc::new(CorrelationTable::new(CAPACITY));
    let claimed = Arc::new(Mutex::new(Vec::new()));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let table = Arc::clone(&table);
            let claimed = Arc::clone(&claimed);
            thread::spawn(move || {
                let mut mine = Vec::new();
                while let Some((id, future)) = table.claim_slot() {
                    mine.push((id, future));
                }
                claimed.lock().unwrap().extend(mine);
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let claimed = claimed.lock().unwrap();
    let ids: HashSet<_> = claimed.iter().map(|(id, _)| *id).collect();
    assert_eq!(claimed.len(), CAPACITY);
    assert_eq!(ids.len(), CAPACITY);
}

#[test]
fn many_senders_one_consumer() {
    const SENDERS: usize = 4;
    const PER_SENDER: usize = 200;
    let client = Arc::new(RingRecoveryClient::new().unwrap());

    let consumer = {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            let mut answered = 0;
            while answered < SENDERS * PER_SENDER {
                match client.get_next_request() {
                    Some(req) => {
                        assert!(client.set_response_success(req.promise_id));
                        answered += 1;
                    }
                    None => thread::yield_now(),
                }
            }
        })
    };

    let senders: Vec<_> = (0..SENDERS)
        .map(|s| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                for i in 0..PER_SENDER {
                    let name = format!("pg{s}_{i}");
                    let f = client.send_recovery_request(IdentifierHash::new(&name), recovery_state());
                    assert_eq!(f.wait(), Ok(()));
                }
            })
        })
        .collect();

    for s in senders {
        s.join().unwrap();
    }
    consumer.join().unwrap();
    assert_eq!(client.correlation_table().in_use_count(), 0);
}

#[tokio::test]
async fn future_can_be_awaited() {
    let client = Arc::new(small_client(4));
    let future = client.send_recovery_request(pg(), recovery_state());

    let responder = {
        let client = Arc::clone(&client);
        thread::spawn(move || loop {
            if let Some(req) = client.get_next_request() {
                client.set_response_success(req.promise_id);
                break;
            }
            thread::sleep(Duration::from_millis(1));
        })
    };

    assert_eq!(future.await, Ok(()));
    responder.join().unwrap();
}
