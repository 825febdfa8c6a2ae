// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cyclic distribution of process state changes to registered process states.
//
// Each cycle drains the receiver, applies every record to its process state
// and pushes it once its timestamp is not newer than the cycle's sync
// timestamp. A newer record is applied but its push is deferred to the start
// of the next cycle, and draining stops there so later records are not
// pushed ahead of it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, error, trace, warn};

use super::process_state::{HmProcessState, ProcessStateStore, StateHandle};
use crate::identifier::ProcessId;
use crate::process_state::ProcessStateReceiver;
use crate::wire::PosixProcess;

pub struct ProcessStateReader {
    receiver: Box<dyn ProcessStateReceiver>,
    registry: HashMap<ProcessId, StateHandle>,
    /// Process whose update was applied but not yet pushed.
    pending: Option<StateHandle>,
}

impl ProcessStateReader {
    pub fn new(receiver: Box<dyn ProcessStateReceiver>) -> Self {
        Self {
            receiver,
            registry: HashMap::new(),
            pending: None,
        }
    }

    /// Route updates for `id` to `handle`. Returns `false` (and keeps the
    /// first registration) if `id` is already registered.
    pub fn register_process_state(&mut self, handle: StateHandle, id: ProcessId) -> bool {
        match self.registry.entry(id) {
            Entry::Occupied(_) => {
                error!(process_id = %id, "process state already registered");
                false
            }
            Entry::Vacant(v) => {
                v.insert(handle);
                true
            }
        }
    }

    pub fn deregister_process_state(&mut self, id: ProcessId) {
        if let Some(handle) = self.registry.remove(&id) {
            if self.pending == Some(handle) {
                self.pending = None;
            }
        }
    }

    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }

    pub fn has_pending_push(&self) -> bool {
        self.pending.is_some()
    }

    /// Run one distribution cycle against `store`.
    ///
    /// Returns `false` if the receiver reported a communication error; the
    /// cycle ends there and the next one starts fresh.
    pub fn distribute_changes<S>(&mut self, store: &mut S, sync_ts: u64) -> bool
    where
        S: ProcessStateStore + ?Sized,
    {
        if let Some(handle) = self.pending.take() {
            if let Some(state) = store.state_mut(handle) {
                state.push_data();
                debug!(process = state.config_name(), "deferred update pushed");
            }
        }

        loop {
            match self.receiver.get_next_changed_posix_process() {
                Ok(None) => return true,
                Ok(Some(process)) => {
                    if self.apply(store, &process, sync_ts) {
                        return true;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "process state distribution interrupted");
                    return false;
                }
            }
        }
    }

    /// Apply one record. Returns `true` if its push was deferred.
    fn apply<S>(&mut self, store: &mut S, process: &PosixProcess, sync_ts: u64) -> bool
    where
        S: ProcessStateStore + ?Sized,
    {
        let Some(&handle) = self.registry.get(&process.id) else {
            trace!(process_id = %process.id, "update for unregistered process ignored");
            return false;
        };
        let Some(state) = store.state_mut(handle) else {
            warn!(process_id = %process.id, "registered process state no longer exists");
            return false;
        };

        let hm_state = HmProcessState::from(process.process_state_id);
        state.set_state(hm_state);
        state.set_process_group_state(process.process_group_state_id);
        state.set_timestamp(process.system_clock_timestamp);

        if process.system_clock_timestamp <= sync_ts {
            state.push_data();
            debug!(
                process = state.config_name(),
                state = ?hm_state,
                timestamp = process.system_clock_timestamp,
                "state change distributed"
            );
            false
        } else {
            debug!(
                process = state.config_name(),
                timestamp = process.system_clock_timestamp,
                sync_ts,
                "state change newer than cycle; push deferred"
            );
            self.pending = Some(handle);
            true
        }
    }
}
