// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Health-monitor view of a supervised process, and the arena that owns them.

use slab::Slab;

use crate::identifier::IdentifierHash;
use crate::wire::ProcessStateId;

/// Supervision state as the health monitor names it.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HmProcessState {
    #[default]
    Idle = 0,
    Starting = 1,
    Running = 2,
    Sigterm = 3,
    Off = 4,
}

// The translation below is a plain discriminant copy; both enums must agree.
const _: () = assert!(HmProcessState::Idle as u8 == ProcessStateId::Idle as u8);
const _: () = assert!(HmProcessState::Starting as u8 == ProcessStateId::Starting as u8);
const _: () = assert!(HmProcessState::Running as u8 == ProcessStateId::Running as u8);
const _: () = assert!(HmProcessState::Sigterm as u8 == ProcessStateId::Terminating as u8);
const _: () = assert!(HmProcessState::Off as u8 == ProcessStateId::Terminated as u8);

impl From<ProcessStateId> for HmProcessState {
    fn from(state: ProcessStateId) -> Self {
        match state {
            ProcessStateId::Idle => HmProcessState::Idle,
            ProcessStateId::Starting => HmProcessState::Starting,
            ProcessStateId::Running => HmProcessState::Running,
            ProcessStateId::Terminating => HmProcessState::Sigterm,
            ProcessStateId::Terminated => HmProcessState::Off,
        }
    }
}

/// A supervised process as tracked by the health monitor.
///
/// The reader updates state, group state and timestamp for every record and
/// calls [`push_data`](Self::push_data) once the update is due.
pub trait ProcessState: Send {
    fn set_state(&mut self, state: HmProcessState);
    fn set_process_group_state(&mut self, pg_state: IdentifierHash);
    fn set_timestamp(&mut self, timestamp: u64);

    /// Publish the current values to the monitor's checks.
    fn push_data(&mut self);

    /// Configuration name of the process, for logs.
    fn config_name(&self) -> &str;
}

/// Handle to a process state living in a [`ProcessStateStore`].
///
/// Carries a generation so a handle to a removed entry never resolves to
/// whatever reused its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHandle {
    key: usize,
    generation: u64,
}

/// Owner of the process states a reader distributes to.
pub trait ProcessStateStore {
    fn state_mut(&mut self, handle: StateHandle) -> Option<&mut dyn ProcessState>;
}

struct Entry<P> {
    generation: u64,
    value: P,
}

/// Slab-backed [`ProcessStateStore`].
pub struct ProcessStateArena<P> {
    entries: Slab<Entry<P>>,
    next_generation: u64,
}

impl<P: ProcessState> ProcessStateArena<P> {
    pub fn new() -> Self {
        Self {
            entries: Slab::new(),
            next_generation: 0,
        }
    }

    pub fn insert(&mut self, value: P) -> StateHandle {
        let generation = self.next_generation;
        self.next_generation += 1;
        let key = self.entries.insert(Entry { generation, value });
        StateHandle { key, generation }
    }

    pub fn remove(&mut self, handle: StateHandle) -> Option<P> {
        self.get(handle)?;
        Some(self.entries.remove(handle.key).value)
    }

    pub fn get(&self, handle: StateHandle) -> Option<&P> {
        self.entries
            .get(handle.key)
            .filter(|e| e.generation == handle.generation)
            .map(|e| &e.value)
    }

    pub fn get_mut(&mut self, handle: StateHandle) -> Option<&mut P> {
        self.entries
            .get_mut(handle.key)
            .filter(|e| e.generation == handle.generation)
            .map(|e| &mut e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P: ProcessState> Default for ProcessStateArena<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ProcessState> ProcessStateStore for ProcessStateArena<P> {
    fn state_mut(&mut self, handle: StateHandle) -> Option<&mut dyn ProcessState> {
        self.get_mut(handle).map(|p| p as &mut dyn ProcessState)
    }
}
