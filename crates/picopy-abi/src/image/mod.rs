// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Binary image format constants.
//!
//! An image is a linearly-laid-out blob encoding one top-level code or
//! native-code object, loaded without relocation. Images are concatenated
//! in their memory space and the table ends with a sentinel zero byte.
//!
//! Layout of a code image:
//!
//! ```text
//! offset  0: type byte (TAG_CIM)
//! offset  1: image size, u16 LE, covers type byte through image end
//! offset  3: stack size in slots
//! offset  4: number of locals
//! offset  5: number of free variables (reserved)
//! offset  6: argument count
//! offset  7: names tuple, then consts tuple (recursive objects)
//! then     : bytecode until image end
//! ```
//!
//! A native image carries the same type/size prefix followed by an
//! argument count byte and a u16 LE native function index.
//!
//! Nested objects use one tag byte each: none, integer (4B LE), string
//! (u16 LE length + payload), tuple (u16 LE count + elements), or a
//! nested code/native image.


/// Sentinel byte terminating a concatenated image table.
pub const IMG_LIST_SENTINEL: u8 = 0;

/// Offset of the stack-size field in a code image.
pub const CI_STACKSIZE_FIELD: u32 = 3;
/// Offset of the locals-count field in a code image.
pub const CI_NLOCALS_FIELD: u32 = 4;
/// Offset of the free-variable-count field in a code image.
pub const CI_NFREEVARS_FIELD: u32 = 5;
/// Offset of the argument-count field in a code image.
pub const CI_ARGCOUNT_FIELD: u32 = 6;
/// Offset of the names tuple in a code image.
pub const CI_NAMES_FIELD: u32 = 7;

/// Object tag bytes that may appear in an image.
///
/// These are the loadable subset of the VM's object tag space; the VM
/// defines the runtime-only tags in the same numbering.
pub mod tag {
    /// The None singleton.
    pub const NON: u8 = 0x00;
    /// Signed 32-bit integer, 4-byte LE value.
    pub const INT: u8 = 0x01;
    /// String, u16 LE length plus payload bytes.
    pub const STR: u8 = 0x03;
    /// Tuple, u16 LE count plus that many recursive objects.
    pub const TUP: u8 = 0x04;
    /// Code image.
    pub const CIM: u8 = 0x0A;
    /// Native code image.
    pub const NIM: u8 = 0x0B;
}
