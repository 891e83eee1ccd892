// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tuple objects: immutable, with an inline payload of owned references.

use picopy_abi::ReturnCode;

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Tag, init_desc};
use crate::platform::Platform;

const OFF_LEN: u32 = DESC_SIZE;
const HDR: u32 = DESC_SIZE + 4;

/// Allocate a tuple with all items set to the null link.
///
/// The creator must fill every slot with `set_item_raw` before the tuple
/// is shared; tuples are immutable afterwards.
pub fn new(heap: &mut Heap, len: u16) -> VmResult<Ref> {
    let r = heap.get_chunk(HDR as usize + 4 * len as usize)?;
    init_desc(heap, r, Tag::Tup);
    heap.set_word(r.offset() + OFF_LEN, len);
    for i in 0..len {
        heap.set_dword(r.offset() + HDR + 4 * u32::from(i), Ref::NULL.offset());
    }
    Ok(r)
}

/// Number of items.
#[inline]
#[must_use]
pub fn length(heap: &Heap, r: Ref) -> u16 {
    heap.word(r.offset() + OFF_LEN)
}

/// The i-th item, borrowed.
#[inline]
#[must_use]
pub fn item(heap: &Heap, r: Ref, i: u16) -> Ref {
    Ref::new(heap.dword(r.offset() + HDR + 4 * u32::from(i)))
}

/// Store an item during construction, consuming the reference.
#[inline]
pub fn set_item_raw(heap: &mut Heap, r: Ref, i: u16, val: Ref) {
    heap.set_dword(r.offset() + HDR + 4 * u32::from(i), val.offset());
}

/// The i-th item with negative-index normalization; `INDX` out of range.
pub fn get_item(heap: &Heap, r: Ref, idx: i32) -> VmResult<Ref> {
    let len = i32::from(length(heap, r));
    let idx = if idx < 0 { idx + len } else { idx };
    if idx < 0 || idx >= len {
        return Err(VmError::raise(ReturnCode::ExIndx));
    }
    Ok(item(heap, r, idx as u16))
}

/// Concatenation; produces a new tuple holding fresh references.
pub fn concat(heap: &mut Heap, a: Ref, b: Ref) -> VmResult<Ref> {
    let (la, lb) = (length(heap, a), length(heap, b));
    let r = new(heap, la + lb)?;
    for i in 0..la {
        let elem = item(heap, a, i);
        crate::obj::inc_ref(heap, elem);
        set_item_raw(heap, r, i, elem);
    }
    for i in 0..lb {
        let elem = item(heap, b, i);
        crate::obj::inc_ref(heap, elem);
        set_item_raw(heap, r, la + i, elem);
    }
    Ok(r)
}

/// Print as `(e0, e1, ...)` with marshalled elements.
pub fn print<P: Platform>(heap: &Heap, plat: &mut P, r: Ref) -> VmResult<()> {
    plat.put_byte(b'(')?;
    let len = length(heap, r);
    for i in 0..len {
        if i > 0 {
            plat.put_byte(b',')?;
            plat.put_byte(b' ')?;
        }
        crate::obj::print(heap, plat, item(heap, r, i), true)?;
    }
    plat.put_byte(b')')
}
