// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bounded pool of request slots pairing a completion promise with an in-use
// marker. The slot index travels over the wire as `promise_id`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::completion::{CompletionCell, Outcome, Promise, RecoveryFuture};
use crate::error::ExecError;

/// Index of a slot in a [`CorrelationTable`].
pub type SlotId = usize;

struct Armed {
    promise: Option<Promise>,
    cell: CompletionCell,
}

/// One outstanding request.
pub struct RequestSlot {
    armed: Mutex<Armed>,
    in_use: AtomicBool,
}

impl RequestSlot {
    fn new() -> Self {
        Self {
            armed: Mutex::new(Armed {
                promise: None,
                cell: CompletionCell::new(),
            }),
            in_use: AtomicBool::new(false),
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    fn armed(&self) -> MutexGuard<'_, Armed> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-capacity correlation table.
///
/// Claiming is lock-free (an atomic compare-exchange per slot, scanned from a
/// rotating hint) and safe under any number of concurrent callers. A slot is
/// released only by resolving it.
pub struct CorrelationTable {
    slots: Box<[RequestSlot]>,
    hint: AtomicUsize,
}

impl CorrelationTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| RequestSlot::new()).collect(),
            hint: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently claimed.
    pub fn in_use_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_in_use()).count()
    }

    /// Claim a free slot and arm it with a fresh promise. Returns the slot id
    /// and the future bound to it, or `None` when every slot is taken.
    ///
    /// The slot's completion cell is reused when the previous requester has
    /// dropped its future, so steady-state claims do not allocate.
    pub fn claim_slot(&self) -> Option<(SlotId, RecoveryFuture)> {
        let n = self.slots.len();
        let start = self.hint.load(Ordering::Relaxed);
        for i in 0..n {
            let id = (start + i) % n;
            let slot = &self.slots[id];
            if slot
                .in_use
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let mut armed = slot.armed();
                let (promise, future) = armed.cell.arm();
                armed.promise = Some(promise);
                drop(armed);
                self.hint.store((id + 1) % n, Ordering::Relaxed);
                debug!(slot = id, "correlation slot claimed");
                return Some((id, future));
            }
        }
        None
    }

    pub fn get_slot(&self, id: SlotId) -> Option<&RequestSlot> {
        self.slots.get(id)
    }

    /// Fulfil slot `id` with success and release it. Returns `false` if the
    /// slot is out of range or not claimed.
    pub fn resolve_success(&self, id: SlotId) -> bool {
        self.resolve(id, Ok(()))
    }

    /// Fail slot `id` with `error` and release it.
    pub fn resolve_error(&self, id: SlotId, error: ExecError) -> bool {
        self.resolve(id, Err(error))
    }

    fn resolve(&self, id: SlotId, outcome: Outcome) -> bool {
        let Some(slot) = self.slots.get(id) else {
            warn!(slot = id, capacity = self.slots.len(), "response for out-of-range slot");
            return false;
        };
        if !slot.is_in_use() {
            warn!(slot = id, "response for a slot that is not claimed");
            return false;
        }
        // Take the promise before releasing so a racing claim never sees
        // its fresh promise consumed by this response.
        let Some(promise) = slot.armed().promise.take() else {
            warn!(slot = id, "slot claimed but not armed");
            return false;
        };
        slot.in_use.store(false, Ordering::Release);

        let observed = match outcome {
            Ok(()) => promise.set_value(),
            Err(e) => promise.set_error(e),
        };
        if !observed {
            debug!(slot = id, "requester stopped waiting; response discarded");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_distinct_slots_until_exhausted() {
        let table = CorrelationTable::new(4);
        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(table.claim_slot().expect("free slot"));
        }
        let mut ids: Vec<_> = held.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(table.claim_slot().is_none());
        assert_eq!(table.in_use_count(), 4);
    }

    #[test]
    fn resolving_unclaimed_slot_is_rejected() {
        let table = CorrelationTable::new(2);
        assert!(!table.resolve_success(0));
        assert!(!table.resolve_error(7, ExecError::Failed));
    }

    #[test]
    fn resolve_releases_and_fulfils() {
        let table = CorrelationTable::new(1);
        let (id, future) = table.claim_slot().expect("slot");
        assert!(table.get_slot(id).is_some_and(RequestSlot::is_in_use));
        assert!(table.resolve_error(id, ExecError::InvalidArguments));
        assert_eq!(future.try_result(), Some(Err(ExecError::InvalidArguments)));
        assert!(!table.get_slot(id).is_some_and(RequestSlot::is_in_use));
        assert!(table.claim_slot().is_some());
    }

    #[test]
    fn reclaimed_slot_starts_unresolved() {
        let table = CorrelationTable::new(1);
        let (id, first) = table.claim_slot().expect("slot");
        assert!(table.resolve_success(id));
        assert_eq!(first.wait(), Ok(()));
        drop(first);

        let (again, second) = table.claim_slot().expect("slot");
        assert_eq!(again, id);
        assert_eq!(second.try_result(), None);
        assert!(table.resolve_error(again, ExecError::Failed));
        assert_eq!(second.try_result(), Some(Err(ExecError::Failed)));
    }
}
