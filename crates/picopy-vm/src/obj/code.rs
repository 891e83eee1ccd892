// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Code objects and native code objects.
//!
//! A code object wraps one code image: it remembers the image's memory
//! space and address, the bytecode start address, and owns its names and
//! consts tuples. The per-frame sizes (stack size, locals, argument
//! count) are not copied out; they are re-read from the image header
//! through the memory-space reader when a frame is built.
//!
//! The parent back-reference keeps an outer image's wrapper alive while
//! inner code objects from its consts tuple reference it.

use picopy_abi::{MemSpace, image};

use crate::error::VmResult;
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Tag, init_desc};
use crate::platform::Platform;

const OFF_SPACE: u32 = DESC_SIZE;
const OFF_IMGADDR: u32 = DESC_SIZE + 4;
const OFF_CODEADDR: u32 = DESC_SIZE + 8;
const OFF_NAMES: u32 = DESC_SIZE + 12;
const OFF_CONSTS: u32 = DESC_SIZE + 16;
const OFF_PARENT: u32 = DESC_SIZE + 20;
const SIZE: usize = 28;

/// Create a code object; takes ownership of `names`, `consts` and the
/// incremented `parent` link (pass the null link for a root image).
pub fn new(
    heap: &mut Heap,
    space: MemSpace,
    imgaddr: u32,
    codeaddr: u32,
    names: Ref,
    consts: Ref,
    parent: Ref,
) -> VmResult<Ref> {
    let r = heap.get_chunk(SIZE)?;
    init_desc(heap, r, Tag::Cob);
    heap.set_byte(r.offset() + OFF_SPACE, space.as_u8());
    heap.set_dword(r.offset() + OFF_IMGADDR, imgaddr);
    heap.set_dword(r.offset() + OFF_CODEADDR, codeaddr);
    heap.set_dword(r.offset() + OFF_NAMES, names.offset());
    heap.set_dword(r.offset() + OFF_CONSTS, consts.offset());
    heap.set_dword(r.offset() + OFF_PARENT, parent.offset());
    Ok(r)
}

/// The memory space the code image lives in.
#[must_use]
pub fn space(heap: &Heap, r: Ref) -> MemSpace {
    MemSpace::from_raw(heap.byte(r.offset() + OFF_SPACE)).unwrap_or(MemSpace::Ram)
}

/// Address of the code image (its type byte).
#[inline]
#[must_use]
pub fn imgaddr(heap: &Heap, r: Ref) -> u32 {
    heap.dword(r.offset() + OFF_IMGADDR)
}

/// Address of the first bytecode byte.
#[inline]
#[must_use]
pub fn codeaddr(heap: &Heap, r: Ref) -> u32 {
    heap.dword(r.offset() + OFF_CODEADDR)
}

/// The names tuple, borrowed.
#[inline]
#[must_use]
pub fn names(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_NAMES))
}

/// The consts tuple, borrowed.
#[inline]
#[must_use]
pub fn consts(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_CONSTS))
}

/// The parent object link, borrowed.
#[inline]
#[must_use]
pub fn parent(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_PARENT))
}

/// One past the last image byte.
#[must_use]
pub fn img_end<P: Platform>(heap: &Heap, plat: &P, r: Ref) -> u32 {
    let mut cursor = imgaddr(heap, r) + 1;
    let size = crate::platform::mem_get_word(plat, space(heap, r), &mut cursor);
    imgaddr(heap, r) + u32::from(size)
}

/// Stack size in slots, read from the image header.
#[must_use]
pub fn stacksize<P: Platform>(heap: &Heap, plat: &P, r: Ref) -> u8 {
    let mut cursor = imgaddr(heap, r) + image::CI_STACKSIZE_FIELD;
    plat.mem_get_byte(space(heap, r), &mut cursor)
}

/// Number of local slots, read from the image header.
#[must_use]
pub fn nlocals<P: Platform>(heap: &Heap, plat: &P, r: Ref) -> u8 {
    let mut cursor = imgaddr(heap, r) + image::CI_NLOCALS_FIELD;
    plat.mem_get_byte(space(heap, r), &mut cursor)
}

/// Declared argument count, read from the image header.
#[must_use]
pub fn argcount<P: Platform>(heap: &Heap, plat: &P, r: Ref) -> u8 {
    let mut cursor = imgaddr(heap, r) + image::CI_ARGCOUNT_FIELD;
    plat.mem_get_byte(space(heap, r), &mut cursor)
}

// --- Native code objects ---

const OFF_NO_ARGCOUNT: u32 = DESC_SIZE;
const OFF_NO_FUNCINDEX: u32 = DESC_SIZE + 2;
const NO_SIZE: usize = 8;

/// Argument count marking a variadic native function.
pub const NO_VARARGS: u8 = 0xFF;

/// Create a native code object.
pub fn no_new(heap: &mut Heap, argcount: u8, funcindex: u16) -> VmResult<Ref> {
    let r = heap.get_chunk(NO_SIZE)?;
    init_desc(heap, r, Tag::Nob);
    heap.set_byte(r.offset() + OFF_NO_ARGCOUNT, argcount);
    heap.set_word(r.offset() + OFF_NO_FUNCINDEX, funcindex);
    Ok(r)
}

/// Declared argument count of a native (`NO_VARARGS` = any).
#[inline]
#[must_use]
pub fn no_argcount(heap: &Heap, r: Ref) -> u8 {
    heap.byte(r.offset() + OFF_NO_ARGCOUNT)
}

/// Index into the native dispatch table.
#[inline]
#[must_use]
pub fn no_funcindex(heap: &Heap, r: Ref) -> u16 {
    heap.word(r.offset() + OFF_NO_FUNCINDEX)
}
