// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Build-time tunables and the VM configuration.

/// Default heap capacity in bytes (16 KiB).
pub const DEFAULT_HEAP_SIZE: usize = 16 * 1024;

/// Number of value slots per segment in a segment list.
pub const SEGLIST_SLOTS: usize = 8;

/// Configuration for one VM instance.
///
/// The heap does not grow; pick a capacity that fits the target.
#[derive(Clone, Copy, Debug)]
pub struct VmConfig {
    /// Heap capacity in bytes.
    pub heap_size: usize,
}

impl VmConfig {
    /// Configuration with the given heap capacity.
    #[must_use]
    pub const fn with_heap_size(heap_size: usize) -> Self {
        Self { heap_size }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            heap_size: DEFAULT_HEAP_SIZE,
        }
    }
}
