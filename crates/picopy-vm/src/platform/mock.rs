// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Mock platform implementation for testing.
//!
//! Program and RAM spaces are backed by byte buffers, input is scripted,
//! output is captured, and the tick counter is advanced by hand. Reads
//! outside a buffer return zero, which conveniently terminates image
//! table scans.

#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;
#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

use picopy_abi::{MemSpace, ReturnCode};

use crate::error::{VmError, VmResult};
use crate::platform::Platform;

/// A scripted platform backed by in-memory buffers.
#[derive(Default, Debug)]
pub struct MockPlatform {
    /// Program-flash space contents.
    pub prog: Vec<u8>,
    /// RAM space contents (host side, distinct from the VM heap).
    pub ram: Vec<u8>,
    /// Scripted input bytes, consumed front to back.
    pub input: Vec<u8>,
    /// Read cursor into `input`.
    pub input_pos: usize,
    /// Captured output bytes.
    pub output: Vec<u8>,
    /// Manually advanced tick counter.
    pub ticks: u32,
}

impl MockPlatform {
    /// A mock with the given program-space contents.
    #[must_use]
    pub fn with_prog(prog: Vec<u8>) -> Self {
        Self {
            prog,
            ..Self::default()
        }
    }

    /// The captured output as a byte slice.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.output
    }
}

impl Platform for MockPlatform {
    fn mem_get_byte(&self, space: MemSpace, cursor: &mut u32) -> u8 {
        let buf = match space {
            MemSpace::Ram => &self.ram,
            MemSpace::Prog => &self.prog,
            _ => return 0,
        };
        let b = buf.get(*cursor as usize).copied().unwrap_or(0);
        *cursor += 1;
        b
    }

    fn get_byte(&mut self) -> VmResult<u8> {
        let Some(&b) = self.input.get(self.input_pos) else {
            return Err(VmError::raise(ReturnCode::ExIo));
        };
        self.input_pos += 1;
        Ok(b)
    }

    fn put_byte(&mut self, b: u8) -> VmResult<()> {
        self.output.push(b);
        Ok(())
    }

    fn get_ms_ticks(&self) -> u32 {
        self.ticks
    }
}
