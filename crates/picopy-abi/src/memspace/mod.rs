// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Memory-space enumeration.
//!
//! Every code and string object carries the address space its payload
//! lives in, so interpret-time reads route through the correct host
//! accessor. The raw byte values appear in image directories built by
//! the offline compiler and must stay stable.


use core::fmt;

/// An enumerated address domain.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MemSpace {
    /// Plain RAM; also the VM heap.
    #[default]
    Ram = 0,
    /// Program flash.
    Prog = 1,
    /// On-chip EEPROM.
    Eeprom = 2,
    /// Serial (off-chip) EEPROM.
    Seeprom = 3,
    /// Platform-defined space 0.
    Other0 = 4,
    /// Platform-defined space 1.
    Other1 = 5,
    /// Platform-defined space 2.
    Other2 = 6,
    /// Platform-defined space 3.
    Other3 = 7,
}

impl MemSpace {
    /// The raw space byte.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a raw space byte.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Ram,
            1 => Self::Prog,
            2 => Self::Eeprom,
            3 => Self::Seeprom,
            4 => Self::Other0,
            5 => Self::Other1,
            6 => Self::Other2,
            7 => Self::Other3,
            _ => return None,
        })
    }
}

impl fmt::Display for MemSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ram => "ram",
            Self::Prog => "prog",
            Self::Eeprom => "eeprom",
            Self::Seeprom => "seeprom",
            Self::Other0 => "other0",
            Self::Other1 => "other1",
            Self::Other2 => "other2",
            Self::Other3 => "other3",
        };
        f.write_str(name)
    }
}
