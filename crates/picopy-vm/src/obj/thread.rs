// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Thread objects: one root frame plus scheduler state.

use crate::error::VmResult;
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Tag, init_desc};

const OFF_FRAME: u32 = DESC_SIZE;
const SIZE: usize = 8;

/// Create a thread rooted at `frame`, consuming the frame reference.
pub fn new(heap: &mut Heap, frame: Ref) -> VmResult<Ref> {
    let r = heap.get_chunk(SIZE)?;
    init_desc(heap, r, Tag::Thr);
    heap.set_dword(r.offset() + OFF_FRAME, frame.offset());
    Ok(r)
}

/// The thread's current frame, borrowed (null link once finished).
#[inline]
#[must_use]
pub fn frame_of(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_FRAME))
}

/// Replace the current frame (raw link; ownership of the old frame has
/// already been transferred by the interpreter).
#[inline]
pub fn set_frame(heap: &mut Heap, r: Ref, frame: Ref) {
    heap.set_dword(r.offset() + OFF_FRAME, frame.offset());
}
