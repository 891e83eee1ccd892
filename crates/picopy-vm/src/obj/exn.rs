// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Exception objects: a numeric kind wrapped as a value.
//!
//! The builtin exception names are bound to static instances of these at
//! init; RAISE and the exception-match compare operate on the kind byte.

use picopy_abi::ReturnCode;

use crate::error::VmResult;
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Tag, init_desc, set_static};

const OFF_KIND: u32 = DESC_SIZE;
const SIZE: usize = 8;

/// Create an exception object for `kind`.
pub fn new(heap: &mut Heap, kind: ReturnCode) -> VmResult<Ref> {
    let r = heap.get_chunk(SIZE)?;
    init_desc(heap, r, Tag::Exn);
    heap.set_byte(r.offset() + OFF_KIND, kind.as_u8());
    Ok(r)
}

/// Allocate an immortal exception object (builtin exception names).
pub fn new_static(heap: &mut Heap, kind: ReturnCode) -> VmResult<Ref> {
    let r = new(heap, kind)?;
    set_static(heap, r);
    Ok(r)
}

/// The exception kind byte.
#[inline]
#[must_use]
pub fn kind(heap: &Heap, r: Ref) -> u8 {
    heap.byte(r.offset() + OFF_KIND)
}
