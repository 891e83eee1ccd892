// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Desktop platform: stdio for byte I/O, wall clock for ticks.
//!
//! Program and RAM spaces are served from a host-owned image buffer; the
//! remaining spaces are unsupported and read as zero.

use std::io::{Read, Write};
use std::time::Instant;
use std::vec::Vec;

use picopy_abi::{MemSpace, ReturnCode};

use crate::error::{VmError, VmResult};
use crate::platform::Platform;

/// Platform implementation for desktop hosts.
pub struct DesktopPlatform {
    image: Vec<u8>,
    started: Instant,
}

impl DesktopPlatform {
    /// A desktop platform serving `image` from the RAM and PROG spaces.
    #[must_use]
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            started: Instant::now(),
        }
    }
}

impl Platform for DesktopPlatform {
    fn mem_get_byte(&self, space: MemSpace, cursor: &mut u32) -> u8 {
        match space {
            MemSpace::Ram | MemSpace::Prog => {
                let b = self.image.get(*cursor as usize).copied().unwrap_or(0);
                *cursor += 1;
                b
            }
            _ => 0,
        }
    }

    fn get_byte(&mut self) -> VmResult<u8> {
        let mut buf = [0u8; 1];
        match std::io::stdin().read(&mut buf) {
            Ok(1) => Ok(buf[0]),
            // Zero bytes read means end of input
            _ => Err(VmError::raise(ReturnCode::ExIo)),
        }
    }

    fn put_byte(&mut self, b: u8) -> VmResult<()> {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        if lock.write_all(&[b]).and_then(|()| lock.flush()).is_err() {
            return Err(VmError::raise(ReturnCode::ExIo));
        }
        Ok(())
    }

    fn get_ms_ticks(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    fn report_error(&mut self, err: &VmError) {
        log::error!(
            "Error: {} (0x{:02X}) at {}:{}",
            err.code,
            err.code.as_u8(),
            err.file,
            err.line
        );
    }
}
