// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Hashed identifiers for processes, process groups and process-group states.

use std::fmt;

/// FNV-1a 64-bit hash.
pub const fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut i = 0;
    while i < data.len() {
        hash ^= data[i] as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        i += 1;
    }
    hash
}

/// Fixed-width identifier derived from a configuration name.
///
/// Records on the wire never carry strings; both sides hash the configured
/// name and compare the 64-bit result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IdentifierHash(u64);

impl IdentifierHash {
    pub const fn new(name: &str) -> Self {
        Self(fnv1a_64(name.as_bytes()))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn data(self) -> u64 {
        self.0
    }
}

impl From<&str> for IdentifierHash {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for IdentifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identifier of a modelled posix process.
pub type ProcessId = IdentifierHash;
