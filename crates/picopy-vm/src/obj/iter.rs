// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Sequence iterators: a source object plus a cursor index.

use picopy_abi::ReturnCode;

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Tag, inc_ref, init_desc, list, string, tag, tuple};
use crate::platform::Platform;

const OFF_OBJ: u32 = DESC_SIZE;
const OFF_IDX: u32 = DESC_SIZE + 4;
const SIZE: usize = 12;

/// Wrap a sequence (string, tuple or list) in an iterator, consuming the
/// source reference. Other tags raise `TYPE`.
pub fn new(heap: &mut Heap, source_ref: Ref) -> VmResult<Ref> {
    if !matches!(tag(heap, source_ref), Tag::Str | Tag::Tup | Tag::Lst) {
        return Err(VmError::raise(ReturnCode::ExType));
    }
    let r = heap.get_chunk(SIZE)?;
    init_desc(heap, r, Tag::Sqi);
    heap.set_dword(r.offset() + OFF_OBJ, source_ref.offset());
    heap.set_word(r.offset() + OFF_IDX, 0);
    Ok(r)
}

/// The source object, borrowed.
#[inline]
#[must_use]
pub fn source(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_OBJ))
}

/// Advance the iterator, returning the next value (owned by the caller).
/// Exhaustion raises `STOP`.
pub fn next<P: Platform>(heap: &mut Heap, plat: &P, r: Ref) -> VmResult<Ref> {
    let src = source(heap, r);
    let idx = heap.word(r.offset() + OFF_IDX);
    let len = match tag(heap, src) {
        Tag::Str => string::length(heap, src),
        Tag::Tup => tuple::length(heap, src),
        _ => list::length(heap, src),
    };
    if idx >= len {
        return Err(VmError::raise(ReturnCode::ExStop));
    }
    heap.set_word(r.offset() + OFF_IDX, idx + 1);
    match tag(heap, src) {
        Tag::Str => string::subscript(heap, plat, src, i32::from(idx)),
        Tag::Tup => {
            let item = tuple::item(heap, src, idx);
            inc_ref(heap, item);
            Ok(item)
        }
        _ => {
            let item = list::get_item(heap, src, i32::from(idx))?;
            inc_ref(heap, item);
            Ok(item)
        }
    }
}
