// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! VM error type and raise-site capture.
//!
//! Every fallible VM operation returns [`VmResult`]. The error carries the
//! status code byte plus the source location of the raise site, replacing
//! the original file-id/line globals with `#[track_caller]` capture. The
//! interpreter inspects the code to decide between unwinding (exception
//! codes) and aborting (fatal codes).

use core::panic::Location;

use picopy_abi::ReturnCode;

/// Result alias used throughout the VM.
pub type VmResult<T> = Result<T, VmError>;

/// A raised status code with its capture site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{code} (raised at {file}:{line})")]
pub struct VmError {
    /// The status code byte.
    pub code: ReturnCode,
    /// Source file of the raise site.
    pub file: &'static str,
    /// Source line of the raise site.
    pub line: u32,
}

impl VmError {
    /// Raise a code, capturing the caller's location.
    #[track_caller]
    #[must_use]
    pub fn raise(code: ReturnCode) -> Self {
        let loc = Location::caller();
        Self {
            code,
            file: loc.file(),
            line: loc.line(),
        }
    }

    /// Whether this error is a catchable user-level exception.
    #[inline]
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        self.code.is_exception()
    }
}

impl From<ReturnCode> for VmError {
    #[track_caller]
    fn from(code: ReturnCode) -> Self {
        Self::raise(code)
    }
}
