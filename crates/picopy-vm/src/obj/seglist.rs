// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Segment lists: chains of small fixed-capacity arrays.
//!
//! Lists and dicts amortize growth over 8-slot segments threaded by a
//! `next` link, bounding each allocation to one segment. A segment list
//! is just a head reference (possibly null); the containing object tracks
//! the total length.
//!
//! Record layout past the descriptor:
//!
//! ```text
//! offset  4: slot count in this segment (u8)
//! offset  8: next segment (u32 LE, null link at the tail)
//! offset 12: slots, 8 x u32 LE
//! ```

use picopy_abi::ReturnCode;

use crate::config::SEGLIST_SLOTS;
use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Tag, init_desc, release};

const OFF_COUNT: u32 = DESC_SIZE;
const OFF_NEXT: u32 = DESC_SIZE + 4;
const OFF_SLOTS: u32 = DESC_SIZE + 8;
const SIZE: usize = (OFF_SLOTS as usize) + 4 * SEGLIST_SLOTS;

fn count(heap: &Heap, seg: Ref) -> usize {
    heap.byte(seg.offset() + OFF_COUNT) as usize
}

fn set_count(heap: &mut Heap, seg: Ref, n: usize) {
    heap.set_byte(seg.offset() + OFF_COUNT, n as u8);
}

fn next(heap: &Heap, seg: Ref) -> Ref {
    Ref::new(heap.dword(seg.offset() + OFF_NEXT))
}

fn set_next(heap: &mut Heap, seg: Ref, to: Ref) {
    heap.set_dword(seg.offset() + OFF_NEXT, to.offset());
}

fn slot(heap: &Heap, seg: Ref, i: usize) -> Ref {
    Ref::new(heap.dword(seg.offset() + OFF_SLOTS + 4 * i as u32))
}

fn set_slot(heap: &mut Heap, seg: Ref, i: usize, val: Ref) {
    heap.set_dword(seg.offset() + OFF_SLOTS + 4 * i as u32, val.offset());
}

fn new_segment(heap: &mut Heap) -> VmResult<Ref> {
    let seg = heap.get_chunk(SIZE)?;
    init_desc(heap, seg, Tag::Seg);
    set_count(heap, seg, 0);
    set_next(heap, seg, Ref::NULL);
    Ok(seg)
}

/// Walk to the segment and in-segment position holding logical index
/// `idx`. Overrunning the chain is a VM bug surfaced as `ASSERT_FAIL`
/// because containers validate indices against their length first.
fn locate(heap: &Heap, head: Ref, idx: usize) -> VmResult<(Ref, usize)> {
    let mut seg = head;
    let mut i = idx;
    while !seg.is_null() {
        let cnt = count(heap, seg);
        if i < cnt {
            return Ok((seg, i));
        }
        i -= cnt;
        seg = next(heap, seg);
    }
    Err(VmError::raise(ReturnCode::AssertFail))
}

/// The value at logical index `idx`, borrowed.
pub fn get(heap: &Heap, head: Ref, idx: usize) -> VmResult<Ref> {
    let (seg, i) = locate(heap, head, idx)?;
    Ok(slot(heap, seg, i))
}

/// Overwrite the value at logical index `idx`, returning the displaced
/// reference (the caller owns both the new and the old value).
pub fn set(heap: &mut Heap, head: Ref, idx: usize, val: Ref) -> VmResult<Ref> {
    let (seg, i) = locate(heap, head, idx)?;
    let old = slot(heap, seg, i);
    set_slot(heap, seg, i, val);
    Ok(old)
}

/// Prepend a value, returning the new head. O(1): a full head segment
/// gets a fresh segment chained in front of it.
pub fn prepend(heap: &mut Heap, head: Ref, val: Ref) -> VmResult<Ref> {
    if head.is_null() || count(heap, head) == SEGLIST_SLOTS {
        let seg = new_segment(heap)?;
        set_slot(heap, seg, 0, val);
        set_count(heap, seg, 1);
        set_next(heap, seg, head);
        return Ok(seg);
    }
    let cnt = count(heap, head);
    for i in (0..cnt).rev() {
        let v = slot(heap, head, i);
        set_slot(heap, head, i + 1, v);
    }
    set_slot(heap, head, 0, val);
    set_count(heap, head, cnt + 1);
    Ok(head)
}

/// Append a value at the tail, returning the (possibly new) head.
pub fn append(heap: &mut Heap, head: Ref, val: Ref) -> VmResult<Ref> {
    if head.is_null() {
        let seg = new_segment(heap)?;
        set_slot(heap, seg, 0, val);
        set_count(heap, seg, 1);
        return Ok(seg);
    }
    let mut tail = head;
    while !next(heap, tail).is_null() {
        tail = next(heap, tail);
    }
    let cnt = count(heap, tail);
    if cnt < SEGLIST_SLOTS {
        set_slot(heap, tail, cnt, val);
        set_count(heap, tail, cnt + 1);
    } else {
        let seg = new_segment(heap)?;
        set_slot(heap, seg, 0, val);
        set_count(heap, seg, 1);
        set_next(heap, tail, seg);
    }
    Ok(head)
}

/// Insert a value at logical index `idx` (0 through the current length),
/// returning the (possibly new) head. Full segments push their last slot
/// into the following segment.
pub fn insert(heap: &mut Heap, head: Ref, idx: usize, val: Ref) -> VmResult<Ref> {
    if idx == 0 {
        return prepend(heap, head, val);
    }

    // Locate the insertion segment; the position may equal the segment's
    // count (insertion at its end).
    let mut seg = head;
    let mut pos = idx;
    loop {
        if seg.is_null() {
            // idx beyond the chain length is a container bug
            return Err(VmError::raise(ReturnCode::AssertFail));
        }
        let cnt = count(heap, seg);
        if pos <= cnt {
            break;
        }
        pos -= cnt;
        seg = next(heap, seg);
    }

    // Ripple the overflow of each full segment into its successor
    let mut pending = val;
    loop {
        let cnt = count(heap, seg);
        if pos == cnt && cnt == SEGLIST_SLOTS {
            // Insertion lands past a full segment: continue in its
            // successor, appending a fresh tail when none exists.
            if next(heap, seg).is_null() {
                let tail = new_segment(heap)?;
                set_next(heap, seg, tail);
            }
            seg = next(heap, seg);
            pos = 0;
            continue;
        }
        if cnt < SEGLIST_SLOTS {
            for i in (pos..cnt).rev() {
                let v = slot(heap, seg, i);
                set_slot(heap, seg, i + 1, v);
            }
            set_slot(heap, seg, pos, pending);
            set_count(heap, seg, cnt + 1);
            return Ok(head);
        }
        let carry = slot(heap, seg, SEGLIST_SLOTS - 1);
        for i in (pos..SEGLIST_SLOTS - 1).rev() {
            let v = slot(heap, seg, i);
            set_slot(heap, seg, i + 1, v);
        }
        set_slot(heap, seg, pos, pending);
        pending = carry;
        pos = 0;
        if next(heap, seg).is_null() {
            let tail = new_segment(heap)?;
            set_next(heap, seg, tail);
        }
        seg = next(heap, seg);
    }
}

/// Remove the value at logical index `idx`, returning the new head and
/// the removed reference (ownership passes to the caller). Emptied
/// segments are unlinked and freed.
pub fn remove(heap: &mut Heap, head: Ref, idx: usize) -> VmResult<(Ref, Ref)> {
    let mut prev = Ref::NULL;
    let mut seg = head;
    let mut i = idx;
    loop {
        if seg.is_null() {
            return Err(VmError::raise(ReturnCode::AssertFail));
        }
        let cnt = count(heap, seg);
        if i < cnt {
            break;
        }
        i -= cnt;
        prev = seg;
        seg = next(heap, seg);
    }

    let removed = slot(heap, seg, i);
    let cnt = count(heap, seg);
    for j in i..cnt - 1 {
        let v = slot(heap, seg, j + 1);
        set_slot(heap, seg, j, v);
    }
    set_count(heap, seg, cnt - 1);

    let mut new_head = head;
    if cnt == 1 {
        let nxt = next(heap, seg);
        if prev.is_null() {
            new_head = nxt;
        } else {
            set_next(heap, prev, nxt);
        }
        heap.free_chunk(seg)?;
    }
    Ok((new_head, removed))
}

/// Release every slot of one segment. Used by the central destructor
/// dispatch; container teardown goes through [`free_chain`].
pub fn release_slots(heap: &mut Heap, seg: Ref) -> VmResult<()> {
    for i in 0..count(heap, seg) {
        release(heap, slot(heap, seg, i))?;
    }
    Ok(())
}

/// Release all values and free every segment of a chain.
pub fn free_chain(heap: &mut Heap, head: Ref) -> VmResult<()> {
    let mut seg = head;
    while !seg.is_null() {
        let nxt = next(heap, seg);
        release_slots(heap, seg)?;
        heap.free_chunk(seg)?;
        seg = nxt;
    }
    Ok(())
}
