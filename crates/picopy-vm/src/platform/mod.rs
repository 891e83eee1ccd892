// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Platform abstraction: the host contract.
//!
//! The core requires from the host exactly byte-level access to the
//! enumerated memory spaces, one blocking input byte, one output byte,
//! a millisecond tick source, and a dispatch table for host-defined
//! native functions. Everything else the VM builds on top.
//!
//! Word and int reads are composed from `mem_get_byte` little-endian;
//! every read post-increments the caller's cursor, so the reader is
//! reentrant.

#[cfg(test)]
mod mock_test;

#[cfg(any(test, feature = "std"))]
mod desktop;
mod mock;

#[cfg(any(test, feature = "std"))]
pub use desktop::DesktopPlatform;
pub use mock::MockPlatform;

use picopy_abi::MemSpace;

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{Ref, Singletons};

/// Host contract for one VM instance.
pub trait Platform {
    /// One-time host setup.
    fn init(&mut self) -> VmResult<()> {
        Ok(())
    }

    /// Read one byte from `space` at `*cursor`, post-incrementing the
    /// cursor. Unsupported spaces read as zero without incrementing.
    fn mem_get_byte(&self, space: MemSpace, cursor: &mut u32) -> u8;

    /// Block for one input byte. Signals `IO` on end of input.
    fn get_byte(&mut self) -> VmResult<u8>;

    /// Emit one output byte.
    fn put_byte(&mut self, b: u8) -> VmResult<()>;

    /// Milliseconds elapsed since an arbitrary epoch.
    fn get_ms_ticks(&self) -> u32;

    /// Dispatch a host-defined native function.
    ///
    /// Called for native function indices past the built-in table. The
    /// host reads arguments through the object API and returns the
    /// result reference (owned by the caller).
    fn native(
        &mut self,
        heap: &mut Heap,
        singletons: &Singletons,
        index: u16,
        args: &[Ref],
    ) -> VmResult<Ref> {
        let _ = (heap, singletons, args);
        let _ = index;
        Err(VmError::raise(picopy_abi::ReturnCode::ExSys))
    }

    /// Report an uncaught error with its capture site.
    fn report_error(&mut self, err: &VmError) {
        log::error!("uncaught: {err}");
    }
}

/// Read a 2-byte little-endian word, post-incrementing the cursor.
#[must_use]
pub fn mem_get_word<P: Platform>(plat: &P, space: MemSpace, cursor: &mut u32) -> u16 {
    let lo = plat.mem_get_byte(space, cursor);
    let hi = plat.mem_get_byte(space, cursor);
    u16::from_le_bytes([lo, hi])
}

/// Read a 4-byte little-endian int, post-incrementing the cursor.
#[must_use]
pub fn mem_get_int<P: Platform>(plat: &P, space: MemSpace, cursor: &mut u32) -> i32 {
    let b0 = plat.mem_get_byte(space, cursor);
    let b1 = plat.mem_get_byte(space, cursor);
    let b2 = plat.mem_get_byte(space, cursor);
    let b3 = plat.mem_get_byte(space, cursor);
    i32::from_le_bytes([b0, b1, b2, b3])
}
