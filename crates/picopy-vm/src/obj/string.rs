// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! String objects: immutable byte strings.
//!
//! Record layout past the descriptor:
//!
//! ```text
//! offset 4: payload memory space (u8)
//! offset 6: payload length (u16 LE)
//! offset 8: payload address (u32 LE)
//! ```
//!
//! A heap-resident payload (space RAM) lives inline in the same chunk and
//! `addr` is its heap offset. A payload loaded from program memory is
//! borrowed: `addr` points into the image and every read routes through
//! the host's memory-space accessor.

#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;
#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

use picopy_abi::{MemSpace, ReturnCode};

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Tag, init_desc, tag};
use crate::platform::Platform;

const OFF_SPACE: u32 = DESC_SIZE;
const OFF_LEN: u32 = DESC_SIZE + 2;
const OFF_ADDR: u32 = DESC_SIZE + 4;
const HDR: u32 = DESC_SIZE + 8;

/// Create a string with an inline copy of `payload`.
pub fn new(heap: &mut Heap, payload: &[u8]) -> VmResult<Ref> {
    let r = heap.get_chunk(HDR as usize + payload.len())?;
    init_desc(heap, r, Tag::Str);
    heap.set_byte(r.offset() + OFF_SPACE, MemSpace::Ram.as_u8());
    heap.set_word(r.offset() + OFF_LEN, payload.len() as u16);
    heap.set_dword(r.offset() + OFF_ADDR, r.offset() + HDR);
    heap.copy_in(r.offset() + HDR, payload);
    Ok(r)
}

/// Load a length-prefixed string from an image.
///
/// Payloads in program memory are borrowed (address plus space tag);
/// other spaces are copied inline. The cursor advances past the payload.
pub fn load_from_img<P: Platform>(
    heap: &mut Heap,
    plat: &P,
    space: MemSpace,
    cursor: &mut u32,
) -> VmResult<Ref> {
    let len = crate::platform::mem_get_word(plat, space, cursor);
    if space == MemSpace::Prog {
        let r = heap.get_chunk(HDR as usize)?;
        init_desc(heap, r, Tag::Str);
        heap.set_byte(r.offset() + OFF_SPACE, space.as_u8());
        heap.set_word(r.offset() + OFF_LEN, len);
        heap.set_dword(r.offset() + OFF_ADDR, *cursor);
        *cursor += u32::from(len);
        return Ok(r);
    }
    let mut payload = Vec::with_capacity(len as usize);
    for _ in 0..len {
        payload.push(plat.mem_get_byte(space, cursor));
    }
    new(heap, &payload)
}

/// Payload length in bytes.
#[inline]
#[must_use]
pub fn length(heap: &Heap, r: Ref) -> u16 {
    heap.word(r.offset() + OFF_LEN)
}

/// The memory space holding the payload.
#[must_use]
pub fn space(heap: &Heap, r: Ref) -> MemSpace {
    MemSpace::from_raw(heap.byte(r.offset() + OFF_SPACE)).unwrap_or(MemSpace::Ram)
}

/// Read one payload byte.
#[must_use]
pub fn byte_at<P: Platform>(heap: &Heap, plat: &P, r: Ref, i: u16) -> u8 {
    let addr = heap.dword(r.offset() + OFF_ADDR);
    match space(heap, r) {
        MemSpace::Ram => heap.byte(addr + u32::from(i)),
        s => {
            let mut cursor = addr + u32::from(i);
            plat.mem_get_byte(s, &mut cursor)
        }
    }
}

/// Byte-value compare of two strings.
#[must_use]
pub fn compare<P: Platform>(heap: &Heap, plat: &P, a: Ref, b: Ref) -> bool {
    let len = length(heap, a);
    if len != length(heap, b) {
        return false;
    }
    (0..len).all(|i| byte_at(heap, plat, a, i) == byte_at(heap, plat, b, i))
}

/// Compare a string object against a byte slice.
#[must_use]
pub fn eq_bytes<P: Platform>(heap: &Heap, plat: &P, r: Ref, s: &[u8]) -> bool {
    let len = length(heap, r) as usize;
    len == s.len() && (0..len).all(|i| byte_at(heap, plat, r, i as u16) == s[i])
}

/// Concatenation; produces a new inline string.
pub fn concat<P: Platform>(heap: &mut Heap, plat: &P, a: Ref, b: Ref) -> VmResult<Ref> {
    let (la, lb) = (length(heap, a), length(heap, b));
    let mut payload = Vec::with_capacity(la as usize + lb as usize);
    for i in 0..la {
        payload.push(byte_at(heap, plat, a, i));
    }
    for i in 0..lb {
        payload.push(byte_at(heap, plat, b, i));
    }
    new(heap, &payload)
}

/// Subscript: a fresh single-byte string.
///
/// Negative indices are normalized by adding the length; out of range
/// raises `INDX`.
pub fn subscript<P: Platform>(heap: &mut Heap, plat: &P, r: Ref, idx: i32) -> VmResult<Ref> {
    let len = i32::from(length(heap, r));
    let idx = if idx < 0 { idx + len } else { idx };
    if idx < 0 || idx >= len {
        return Err(VmError::raise(ReturnCode::ExIndx));
    }
    let b = byte_at(heap, plat, r, idx as u16);
    new(heap, &[b])
}

/// Containment per the object-model rule: the needle must be a string; an
/// empty needle is always present; a needle longer than one byte raises
/// `VAL`; otherwise scan for the byte.
pub fn contains<P: Platform>(heap: &Heap, plat: &P, hay: Ref, needle: Ref) -> VmResult<bool> {
    if tag(heap, needle) != Tag::Str {
        return Err(VmError::raise(ReturnCode::ExType));
    }
    let nlen = length(heap, needle);
    if nlen == 0 {
        return Ok(true);
    }
    if nlen != 1 {
        return Err(VmError::raise(ReturnCode::ExVal));
    }
    let c = byte_at(heap, plat, needle, 0);
    for i in 0..length(heap, hay) {
        if byte_at(heap, plat, hay, i) == c {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Print the payload; marshalled form wraps it in single quotes.
pub fn print<P: Platform>(heap: &Heap, plat: &mut P, r: Ref, marshall: bool) -> VmResult<()> {
    if marshall {
        plat.put_byte(b'\'')?;
    }
    for i in 0..length(heap, r) {
        let b = byte_at(heap, plat, r, i);
        plat.put_byte(b)?;
    }
    if marshall {
        plat.put_byte(b'\'')?;
    }
    Ok(())
}
