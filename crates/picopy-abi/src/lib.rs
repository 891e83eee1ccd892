// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Shared ABI definitions between the PicoPy VM, its hosts, and the
//! offline image compiler.
//!
//! This crate defines the three contracts that cross the VM boundary:
//! - Return and exception codes (bit-exact byte values; the process exit
//!   status of a VM run is the raw code byte)
//! - Memory-space enumeration used by every image and string read
//! - The binary image format constants (type tag bytes, code-image field
//!   offsets, list sentinel)
//!
//! # Design Principles
//!
//! - **No dependencies**: Pure data types, 100% host-testable
//! - **Bit-exact**: All byte values are part of the external contract and
//!   must never be renumbered
//!
//! # Modules
//!
//! - [`codes`]: `ReturnCode` status and exception bytes
//! - [`memspace`]: `MemSpace` address-space enumeration
//! - [`image`]: image format tag bytes and field offsets

#![no_std]

pub mod codes;
pub mod image;
pub mod memspace;

// Re-export commonly used types at crate root
pub use codes::ReturnCode;
pub use memspace::MemSpace;
