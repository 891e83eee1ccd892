// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Return values for VM-internal functions to report status, errors and
//! exceptions.
//!
//! Functions that use these values propagate the same value up the call
//! tree to the interpreter, which begins unwinding when it observes any
//! exception code. The byte values are part of the host contract: the
//! process exit status of a VM run equals the raw code byte.

#[cfg(test)]
mod codes_test;

use core::fmt;

/// Status and exception codes, one byte each.
///
/// General status codes occupy `0x00` and `0xFB..=0xFF`; exception codes
/// occupy `0xDF..=0xF0`. Everything in between is reserved.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnCode {
    /// Everything is ok.
    Ok = 0x00,
    /// General "no result".
    No = 0xFF,
    /// General failure.
    Err = 0xFE,
    /// Return value for a stub function.
    Stub = 0xFD,
    /// Assertion failure; fatal.
    AssertFail = 0xFC,
    /// The current frame pointer was modified; dispatch must reload it.
    FrameSwitch = 0xFB,

    /// Invalid number of arguments on a call.
    ExNumArgs = 0xDF,
    /// General exception.
    Ex = 0xE0,
    /// System exit.
    ExExit = 0xE1,
    /// Input/output error.
    ExIo = 0xE2,
    /// Zero division error.
    ExZdiv = 0xE3,
    /// Assertion error.
    ExAssrt = 0xE4,
    /// Attribute error.
    ExAttr = 0xE5,
    /// Import error.
    ExImprt = 0xE6,
    /// Index error.
    ExIndx = 0xE7,
    /// Key error.
    ExKey = 0xE8,
    /// Memory error.
    ExMem = 0xE9,
    /// Name error.
    ExName = 0xEA,
    /// Syntax error.
    ExSyntax = 0xEB,
    /// System error.
    ExSys = 0xEC,
    /// Type error.
    ExType = 0xED,
    /// Value error.
    ExVal = 0xEE,
    /// Stop iteration.
    ExStop = 0xEF,
    /// Warning.
    ExWarn = 0xF0,
}

impl ReturnCode {
    /// The raw code byte.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a raw code byte.
    ///
    /// Returns `None` for bytes outside the defined code space.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0x00 => Self::Ok,
            0xFF => Self::No,
            0xFE => Self::Err,
            0xFD => Self::Stub,
            0xFC => Self::AssertFail,
            0xFB => Self::FrameSwitch,
            0xDF => Self::ExNumArgs,
            0xE0 => Self::Ex,
            0xE1 => Self::ExExit,
            0xE2 => Self::ExIo,
            0xE3 => Self::ExZdiv,
            0xE4 => Self::ExAssrt,
            0xE5 => Self::ExAttr,
            0xE6 => Self::ExImprt,
            0xE7 => Self::ExIndx,
            0xE8 => Self::ExKey,
            0xE9 => Self::ExMem,
            0xEA => Self::ExName,
            0xEB => Self::ExSyntax,
            0xEC => Self::ExSys,
            0xED => Self::ExType,
            0xEE => Self::ExVal,
            0xEF => Self::ExStop,
            0xF0 => Self::ExWarn,
            _ => return None,
        })
    }

    /// Whether this code represents a catchable user-level exception.
    #[inline]
    #[must_use]
    pub const fn is_exception(self) -> bool {
        let raw = self as u8;
        raw >= Self::ExNumArgs as u8 && raw <= Self::ExWarn as u8
    }

    /// Whether this code is a fatal VM-internal failure.
    ///
    /// Fatal codes abort interpretation instead of unwinding.
    #[inline]
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Err | Self::AssertFail)
    }

    /// Human-readable description of the code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Ok => "Everything is ok",
            Self::No => "General no result",
            Self::Err => "General failure",
            Self::Stub => "Return val for stub fxn",
            Self::AssertFail => "Assertion failure",
            Self::FrameSwitch => "Frame pointer was modified",
            Self::ExNumArgs => "Invalid number of arguments",
            Self::Ex => "General exception",
            Self::ExExit => "System exit",
            Self::ExIo => "Input/output error",
            Self::ExZdiv => "Zero division error",
            Self::ExAssrt => "Assertion error",
            Self::ExAttr => "Attribute error",
            Self::ExImprt => "Import error",
            Self::ExIndx => "Index error",
            Self::ExKey => "Key error",
            Self::ExMem => "Memory error",
            Self::ExName => "Name error",
            Self::ExSyntax => "Syntax error",
            Self::ExSys => "System error",
            Self::ExType => "Type error",
            Self::ExVal => "Value error",
            Self::ExStop => "Stop iteration",
            Self::ExWarn => "Warning",
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
