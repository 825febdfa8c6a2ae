// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX shm object names for transport segments.

use crate::identifier::fnv1a_64;

/// Maximum length of a POSIX shm name, including the leading '/'.
///
/// macOS caps names at `PSHMNAMLEN` (31). Linux accepts up to NAME_MAX; 0
/// disables shortening.
#[cfg(target_os = "macos")]
pub const SHM_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const SHM_NAME_MAX: usize = 0;

/// Prefix shared by every segment this crate creates.
pub const SEGMENT_PREFIX: &str = "lcmipc.";

/// Build the POSIX name of the segment backing `channel`.
///
/// Names that would exceed [`SHM_NAME_MAX`] are shortened to
/// `/<head>_<16 hex digits of FNV-1a>` so distinct channels stay distinct.
pub fn make_shm_name(channel: &str) -> String {
    let body = channel.strip_prefix('/').unwrap_or(channel);
    let full = format!("/{SEGMENT_PREFIX}{body}");

    if SHM_NAME_MAX == 0 || full.len() <= SHM_NAME_MAX {
        return full;
    }

    // '/' + head + '_' + 16 hex digits
    let head_len = SHM_NAME_MAX.saturating_sub(1 + 1 + 16);
    let head: String = full[1..].chars().take(head_len).collect();
    format!("/{head}_{:016x}", fnv1a_64(full.as_bytes()))
}
