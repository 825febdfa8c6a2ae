// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-size wire records carried by the transport rings.
//
// All integers are little-endian. No field is variable length, so every
// record fits one ring slot and both ends agree on the slot size up front.

use crate::error::WireError;
use crate::identifier::{IdentifierHash, ProcessId};

/// Upper bound on any record size; sizes the stack buffers of `TypedRing`.
pub const MAX_RECORD_SIZE: usize = 64;

/// A record with a fixed binary layout.
pub trait WireRecord: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Write the record into `out`, which is exactly `SIZE` bytes long.
    fn encode(&self, out: &mut [u8]);

    /// Read a record back. Fails on short input or invalid discriminants.
    fn decode(bytes: &[u8]) -> Result<Self, WireError>;
}

/// Lifecycle state of a posix process as observed by the launch manager.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessStateId {
    #[default]
    Idle = 0,
    Starting = 1,
    Running = 2,
    Terminating = 3,
    Terminated = 4,
}

impl TryFrom<u8> for ProcessStateId {
    type Error = WireError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(ProcessStateId::Idle),
            1 => Ok(ProcessStateId::Starting),
            2 => Ok(ProcessStateId::Running),
            3 => Ok(ProcessStateId::Terminating),
            4 => Ok(ProcessStateId::Terminated),
            other => Err(WireError::InvalidProcessState(other)),
        }
    }
}

/// One observed state transition of a posix process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PosixProcess {
    pub id: ProcessId,
    pub process_group_state_id: IdentifierHash,
    pub process_state_id: ProcessStateId,
    /// Monotonic clock, nanoseconds.
    pub system_clock_timestamp: u64,
}

impl WireRecord for PosixProcess {
    // id(8) | pg state(8) | timestamp(8) | state(1) | pad(7)
    const SIZE: usize = 32;

    fn encode(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.id.data().to_le_bytes());
        out[8..16].copy_from_slice(&self.process_group_state_id.data().to_le_bytes());
        out[16..24].copy_from_slice(&self.system_clock_timestamp.to_le_bytes());
        out[24] = self.process_state_id as u8;
        out[25..32].fill(0);
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        check_len(bytes, Self::SIZE)?;
        Ok(Self {
            id: IdentifierHash::from_raw(read_u64(bytes, 0)),
            process_group_state_id: IdentifierHash::from_raw(read_u64(bytes, 8)),
            system_clock_timestamp: read_u64(bytes, 16),
            process_state_id: ProcessStateId::try_from(bytes[24])?,
        })
    }
}

/// Request from the health monitor to switch a process group into a
/// recovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryRequest {
    pub pg_name: IdentifierHash,
    pub pg_state_name: IdentifierHash,
    /// Correlation slot waiting for the answer.
    pub promise_id: usize,
}

impl WireRecord for RecoveryRequest {
    // pg name(8) | pg state(8) | promise id(8)
    const SIZE: usize = 24;

    fn encode(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.pg_name.data().to_le_bytes());
        out[8..16].copy_from_slice(&self.pg_state_name.data().to_le_bytes());
        out[16..24].copy_from_slice(&(self.promise_id as u64).to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        check_len(bytes, Self::SIZE)?;
        Ok(Self {
            pg_name: IdentifierHash::from_raw(read_u64(bytes, 0)),
            pg_state_name: IdentifierHash::from_raw(read_u64(bytes, 8)),
            promise_id: read_u64(bytes, 16) as usize,
        })
    }
}

fn check_len(bytes: &[u8], expected: usize) -> Result<(), WireError> {
    if bytes.len() < expected {
        return Err(WireError::ShortBuffer {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

const _: () = assert!(PosixProcess::SIZE <= MAX_RECORD_SIZE);
const _: () = assert!(RecoveryRequest::SIZE <= MAX_RECORD_SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_process_layout() {
        let p = PosixProcess {
            id: IdentifierHash::from_raw(0x0102),
            process_group_state_id: IdentifierHash::from_raw(7),
            process_state_id: ProcessStateId::Terminating,
            system_clock_timestamp: 99,
        };
        let mut buf = [0xaa; PosixProcess::SIZE];
        p.encode(&mut buf);
        assert_eq!(&buf[0..2], &[0x02, 0x01]);
        assert_eq!(buf[24], 3);
        assert!(buf[25..].iter().all(|&b| b == 0));
        assert_eq!(PosixProcess::decode(&buf), Ok(p));
    }

    #[test]
    fn invalid_state_byte_is_rejected() {
        let mut buf = [0u8; PosixProcess::SIZE];
        buf[24] = 5;
        assert_eq!(PosixProcess::decode(&buf), Err(WireError::InvalidProcessState(5)));
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert_eq!(
            RecoveryRequest::decode(&[0u8; 10]),
            Err(WireError::ShortBuffer { expected: 24, actual: 10 })
        );
    }
}
