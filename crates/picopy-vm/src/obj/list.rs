// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! List objects: mutable sequences over a single segment list.
//!
//! Negative indices are normalized by adding the length; out of range
//! raises `INDX`. Concatenation and slicing produce new lists.

use picopy_abi::ReturnCode;

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Tag, init_desc, seglist};
use crate::platform::Platform;

const OFF_LEN: u32 = DESC_SIZE;
/// Offset of the segment-list head link; the central destructor reads it.
pub(crate) const OFF_HEAD: u32 = DESC_SIZE + 4;
const SIZE: usize = 12;

/// Create an empty list.
pub fn new(heap: &mut Heap) -> VmResult<Ref> {
    let r = heap.get_chunk(SIZE)?;
    init_desc(heap, r, Tag::Lst);
    heap.set_word(r.offset() + OFF_LEN, 0);
    heap.set_dword(r.offset() + OFF_HEAD, Ref::NULL.offset());
    Ok(r)
}

/// Number of elements.
#[inline]
#[must_use]
pub fn length(heap: &Heap, r: Ref) -> u16 {
    heap.word(r.offset() + OFF_LEN)
}

fn head(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_HEAD))
}

fn set_head(heap: &mut Heap, r: Ref, h: Ref) {
    heap.set_dword(r.offset() + OFF_HEAD, h.offset());
}

fn normalize(heap: &Heap, r: Ref, idx: i32) -> VmResult<usize> {
    let len = i32::from(length(heap, r));
    let idx = if idx < 0 { idx + len } else { idx };
    if idx < 0 || idx >= len {
        return Err(VmError::raise(ReturnCode::ExIndx));
    }
    Ok(idx as usize)
}

/// The element at `idx`, borrowed.
pub fn get_item(heap: &Heap, r: Ref, idx: i32) -> VmResult<Ref> {
    let i = normalize(heap, r, idx)?;
    seglist::get(heap, head(heap, r), i)
}

/// Replace the element at `idx`, consuming `val` and releasing the
/// displaced element.
pub fn set_item(heap: &mut Heap, r: Ref, idx: i32, val: Ref) -> VmResult<()> {
    let i = normalize(heap, r, idx)?;
    let old = seglist::set(heap, head(heap, r), i, val)?;
    crate::obj::release(heap, old)
}

/// Append an element, consuming the reference.
pub fn append(heap: &mut Heap, r: Ref, val: Ref) -> VmResult<()> {
    let new_head = seglist::append(heap, head(heap, r), val)?;
    set_head(heap, r, new_head);
    let len = length(heap, r);
    heap.set_word(r.offset() + OFF_LEN, len + 1);
    Ok(())
}

/// Insert an element before `idx` (clamped to the ends, as the original
/// insert does), consuming the reference.
pub fn insert(heap: &mut Heap, r: Ref, idx: i32, val: Ref) -> VmResult<()> {
    let len = i32::from(length(heap, r));
    let idx = if idx < 0 { (idx + len).max(0) } else { idx.min(len) };
    let new_head = seglist::insert(heap, head(heap, r), idx as usize, val)?;
    set_head(heap, r, new_head);
    heap.set_word(r.offset() + OFF_LEN, (len + 1) as u16);
    Ok(())
}

/// Delete the element at `idx`, releasing it.
pub fn del_item(heap: &mut Heap, r: Ref, idx: i32) -> VmResult<()> {
    let i = normalize(heap, r, idx)?;
    let (new_head, removed) = seglist::remove(heap, head(heap, r), i)?;
    set_head(heap, r, new_head);
    let len = length(heap, r);
    heap.set_word(r.offset() + OFF_LEN, len - 1);
    crate::obj::release(heap, removed)
}

/// Remove the first element equal to `item`; `VAL` when absent.
pub fn remove<P: Platform>(heap: &mut Heap, plat: &P, r: Ref, item: Ref) -> VmResult<()> {
    let len = length(heap, r);
    for i in 0..len {
        let elem = seglist::get(heap, head(heap, r), i as usize)?;
        if crate::obj::compare(heap, plat, elem, item) {
            return del_item(heap, r, i32::from(i));
        }
    }
    Err(VmError::raise(ReturnCode::ExVal))
}

/// Concatenation; produces a new list holding fresh references.
pub fn concat(heap: &mut Heap, a: Ref, b: Ref) -> VmResult<Ref> {
    let r = new(heap)?;
    for src in [a, b] {
        for i in 0..length(heap, src) {
            let elem = seglist::get(heap, head(heap, src), i as usize)?;
            crate::obj::inc_ref(heap, elem);
            append(heap, r, elem)?;
        }
    }
    Ok(r)
}

/// Slice `[lo, hi)` with negative-bound normalization and clamping;
/// produces a new list holding fresh references.
pub fn slice(heap: &mut Heap, r: Ref, lo: i32, hi: i32) -> VmResult<Ref> {
    let len = i32::from(length(heap, r));
    let clamp = |i: i32| {
        let i = if i < 0 { i + len } else { i };
        i.clamp(0, len)
    };
    let (lo, hi) = (clamp(lo), clamp(hi));
    let out = new(heap)?;
    let mut i = lo;
    while i < hi {
        let elem = seglist::get(heap, head(heap, r), i as usize)?;
        crate::obj::inc_ref(heap, elem);
        append(heap, out, elem)?;
        i += 1;
    }
    Ok(out)
}

/// Print as `[e0, e1, ...]` with marshalled elements.
pub fn print<P: Platform>(heap: &Heap, plat: &mut P, r: Ref) -> VmResult<()> {
    plat.put_byte(b'[')?;
    for i in 0..length(heap, r) {
        if i > 0 {
            plat.put_byte(b',')?;
            plat.put_byte(b' ')?;
        }
        let elem = seglist::get(heap, head(heap, r), i as usize)?;
        crate::obj::print(heap, plat, elem, true)?;
    }
    plat.put_byte(b']')
}
