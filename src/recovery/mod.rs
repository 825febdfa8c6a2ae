// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

//! Recovery requests (HM → LCM) and their completion.

mod client;
mod completion;
mod correlation;

pub use client::{RecoveryClient, RingRecoveryClient};
pub use completion::{Outcome, Promise, RecoveryFuture, StopToken};
pub use correlation::{CorrelationTable, RequestSlot, SlotId};
