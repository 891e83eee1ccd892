// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Dict objects: two parallel segment lists of keys and values.
//!
//! Key search is linear using the object compare operator; hashing is not
//! used. A matching key overwrites its value slot in place; a miss
//! appends the new pair at the tail of both lists. A key therefore keeps
//! its position for as long as it is present: the first-inserted key
//! stays front-most across any number of later inserts and
//! re-assignments, and iteration runs in insertion order. The i-th key
//! always pairs with the i-th value.

use picopy_abi::ReturnCode;

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Tag, init_desc, seglist};
use crate::platform::Platform;

const OFF_LEN: u32 = DESC_SIZE;
/// Offset of the key segment-list head; the central destructor reads it.
pub(crate) const OFF_KEYS: u32 = DESC_SIZE + 4;
/// Offset of the value segment-list head.
pub(crate) const OFF_VALS: u32 = DESC_SIZE + 8;
const SIZE: usize = 16;

/// Create an empty dict.
pub fn new(heap: &mut Heap) -> VmResult<Ref> {
    let r = heap.get_chunk(SIZE)?;
    init_desc(heap, r, Tag::Dic);
    heap.set_word(r.offset() + OFF_LEN, 0);
    heap.set_dword(r.offset() + OFF_KEYS, Ref::NULL.offset());
    heap.set_dword(r.offset() + OFF_VALS, Ref::NULL.offset());
    Ok(r)
}

/// Number of key/value pairs.
#[inline]
#[must_use]
pub fn length(heap: &Heap, r: Ref) -> u16 {
    heap.word(r.offset() + OFF_LEN)
}

fn keys(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_KEYS))
}

fn vals(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_VALS))
}

/// The i-th key in iteration order, borrowed.
pub fn key_at(heap: &Heap, r: Ref, i: u16) -> VmResult<Ref> {
    seglist::get(heap, keys(heap, r), i as usize)
}

/// The i-th value in iteration order, borrowed.
pub fn val_at(heap: &Heap, r: Ref, i: u16) -> VmResult<Ref> {
    seglist::get(heap, vals(heap, r), i as usize)
}

fn find<P: Platform>(heap: &Heap, plat: &P, r: Ref, key: Ref) -> Option<u16> {
    let len = length(heap, r);
    for i in 0..len {
        let k = seglist::get(heap, keys(heap, r), i as usize).ok()?;
        if crate::obj::compare(heap, plat, k, key) {
            return Some(i);
        }
    }
    None
}

/// The value stored under `key`, borrowed; `KEY` when absent.
pub fn get_item<P: Platform>(heap: &Heap, plat: &P, r: Ref, key: Ref) -> VmResult<Ref> {
    match find(heap, plat, r, key) {
        Some(i) => val_at(heap, r, i),
        None => Err(VmError::raise(ReturnCode::ExKey)),
    }
}

/// Store `val` under `key`, consuming both references.
///
/// A matching existing key keeps its slot (the passed key is released and
/// the displaced value freed), so re-assignment never moves a key; a
/// miss appends the pair at the tail of both lists.
pub fn set_item<P: Platform>(
    heap: &mut Heap,
    plat: &P,
    r: Ref,
    key: Ref,
    val: Ref,
) -> VmResult<()> {
    if let Some(i) = find(heap, plat, r, key) {
        let old = seglist::set(heap, vals(heap, r), i as usize, val)?;
        crate::obj::release(heap, old)?;
        return crate::obj::release(heap, key);
    }
    let new_keys = seglist::append(heap, keys(heap, r), key)?;
    heap.set_dword(r.offset() + OFF_KEYS, new_keys.offset());
    let new_vals = seglist::append(heap, vals(heap, r), val)?;
    heap.set_dword(r.offset() + OFF_VALS, new_vals.offset());
    let len = length(heap, r);
    heap.set_word(r.offset() + OFF_LEN, len + 1);
    Ok(())
}

/// Whether `key` is present.
#[must_use]
pub fn has_key<P: Platform>(heap: &Heap, plat: &P, r: Ref, key: Ref) -> bool {
    find(heap, plat, r, key).is_some()
}

/// Release all pairs, leaving the dict as freshly created.
pub fn clear(heap: &mut Heap, r: Ref) -> VmResult<()> {
    seglist::free_chain(heap, keys(heap, r))?;
    seglist::free_chain(heap, vals(heap, r))?;
    heap.set_word(r.offset() + OFF_LEN, 0);
    heap.set_dword(r.offset() + OFF_KEYS, Ref::NULL.offset());
    heap.set_dword(r.offset() + OFF_VALS, Ref::NULL.offset());
    Ok(())
}

/// Copy every pair of `src` into `dest` in iteration order.
pub fn update<P: Platform>(heap: &mut Heap, plat: &P, dest: Ref, src: Ref) -> VmResult<()> {
    for i in 0..length(heap, src) {
        let k = key_at(heap, src, i)?;
        let v = val_at(heap, src, i)?;
        crate::obj::inc_ref(heap, k);
        crate::obj::inc_ref(heap, v);
        set_item(heap, plat, dest, k, v)?;
    }
    Ok(())
}

/// Print as `{k:v, ...}` with marshalled keys and values.
pub fn print<P: Platform>(heap: &Heap, plat: &mut P, r: Ref) -> VmResult<()> {
    plat.put_byte(b'{')?;
    for i in 0..length(heap, r) {
        if i > 0 {
            plat.put_byte(b',')?;
            plat.put_byte(b' ')?;
        }
        crate::obj::print(heap, plat, key_at(heap, r, i)?, true)?;
        plat.put_byte(b':')?;
        crate::obj::print(heap, plat, val_at(heap, r, i)?, true)?;
    }
    plat.put_byte(b'}')
}
