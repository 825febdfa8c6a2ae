// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

//! Health monitor side: process state registry, cyclic distribution and the
//! daemon thread that drives it.

mod daemon;
mod process_state;
mod reader;

pub use daemon::{
    run, DistributionDaemon, HealthMonitor, InitSignal, InitStatus, MonitorDaemon,
};
pub use process_state::{
    HmProcessState, ProcessState, ProcessStateArena, ProcessStateStore, StateHandle,
};
pub use reader::ProcessStateReader;
