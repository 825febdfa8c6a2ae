// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error types shared by the transport and the protocol layers.

use std::io;

use thiserror::Error;

/// Error code carried across the LCM/HM boundary.
///
/// Every cross-boundary operation reports failure through this type, either
/// as the error half of a `Result` or as the outcome of a completion handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ExecError {
    /// Unspecified failure (e.g. a dequeue that failed on a non-empty ring).
    #[error("general error")]
    General,

    /// The channel overflowed or delivered a malformed record.
    #[error("communication error")]
    Communication,

    /// No free correlation slot was available for a new request.
    #[error("resource exhausted")]
    ResourceExhausted,

    /// The caller stopped waiting before the request completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The recovery action was executed and reported failure.
    #[error("operation failed")]
    Failed,

    /// The request referenced an unknown process group or state.
    #[error("invalid arguments")]
    InvalidArguments,
}

/// Errors raised while constructing or attaching to a transport channel.
///
/// These are configuration problems: they surface once, when a channel is
/// created or opened, never per message.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("ring capacity {0} is not a power of two")]
    CapacityNotPowerOfTwo(usize),

    #[error("ring element size must be non-zero")]
    ZeroElementSize,

    #[error(
        "ring layout mismatch: expected {expected_capacity}x{expected_element_size}, \
         found {found_capacity}x{found_element_size}"
    )]
    LayoutMismatch {
        expected_capacity: usize,
        expected_element_size: usize,
        found_capacity: usize,
        found_element_size: usize,
    },

    #[error("ring segment exists but was never initialized")]
    NotInitialized,

    #[error("ring {0} endpoint is already attached")]
    EndpointInUse(&'static str),

    #[error("record of {record_size} bytes does not fit a {element_size}-byte slot")]
    RecordTooLarge {
        record_size: usize,
        element_size: usize,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A record could not be decoded from its slot bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("invalid process state discriminant {0}")]
    InvalidProcessState(u8),

    #[error("buffer of {actual} bytes is shorter than the {expected}-byte record")]
    ShortBuffer { expected: usize, actual: usize },
}

impl From<WireError> for ExecError {
    fn from(_: WireError) -> Self {
        ExecError::Communication
    }
}
