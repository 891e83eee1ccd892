// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Frames: per-call activation records, and their block stacks.
//!
//! A frame chunk is sized `header + (nlocals + stacksz) slots`, with both
//! counts read from the function's code image at construction. The
//! evaluation stack grows upward from `locals + nlocals`; the stack
//! pointer is a slot index and must stay within
//! `[nlocals, nlocals + stacksz]`. Violations are fatal VM bugs
//! (`ASSERT_FAIL`), not language-level errors.
//!
//! Record layout past the descriptor:
//!
//! ```text
//! offset  4: back frame (u32)        offset 24: instruction pointer (u32)
//! offset  8: function (u32)          offset 28: line number (u16)
//! offset 12: globals dict (u32)      offset 30: memory space (u8)
//! offset 16: attrs dict (u32)        offset 31: flags (u8, bit 0 import)
//! offset 20: block stack head (u32)  offset 32: nlocals, stacksz (u8 each)
//!                                    offset 34: stack pointer (u16)
//! offset 36: slots, (nlocals + stacksz) x u32
//! ```
//!
//! A block records a handler target for loop, try-except and try-finally
//! constructs: its kind, handler address, and the stack-pointer snapshot
//! taken at SETUP time. Blocks chain through the frame and are consulted
//! during unwind.

use picopy_abi::{MemSpace, ReturnCode};

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Singletons, Tag, code, func, inc_ref, init_desc, release, tag};
use crate::platform::Platform;

const OFF_BACK: u32 = DESC_SIZE;
const OFF_FUNC: u32 = DESC_SIZE + 4;
const OFF_GLOBALS: u32 = DESC_SIZE + 8;
const OFF_ATTRS: u32 = DESC_SIZE + 12;
const OFF_BLOCKS: u32 = DESC_SIZE + 16;
const OFF_IP: u32 = DESC_SIZE + 20;
const OFF_LINE: u32 = DESC_SIZE + 24;
const OFF_SPACE: u32 = DESC_SIZE + 26;
const OFF_FLAGS: u32 = DESC_SIZE + 27;
const OFF_NLOCALS: u32 = DESC_SIZE + 28;
const OFF_STACKSZ: u32 = DESC_SIZE + 29;
const OFF_SP: u32 = DESC_SIZE + 30;
const OFF_SLOTS: u32 = DESC_SIZE + 32;

const FLAG_IS_IMPORT: u8 = 0x01;

/// Block kinds.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// A loop body; BREAK unwinds to its handler.
    Loop = 0,
    /// A try-except handler.
    Except = 1,
    /// A try-finally handler.
    Finally = 2,
}

/// Create a frame for calling `func_ref` (borrowed, gains a reference).
///
/// Locals are initialized to None; the stack starts empty.
pub fn new<P: Platform>(
    heap: &mut Heap,
    plat: &P,
    singletons: &Singletons,
    func_ref: Ref,
) -> VmResult<Ref> {
    let co = func::code_obj(heap, func_ref);
    if tag(heap, co) != Tag::Cob {
        return Err(VmError::raise(ReturnCode::ExType));
    }
    let stacksz = code::stacksize(heap, plat, co);
    let nlocals = code::nlocals(heap, plat, co);
    let nslots = u32::from(stacksz) + u32::from(nlocals);
    let size = OFF_SLOTS + 4 * nslots;

    let r = heap.get_chunk(size as usize)?;
    init_desc(heap, r, Tag::Frm);
    heap.set_dword(r.offset() + OFF_BACK, Ref::NULL.offset());
    inc_ref(heap, func_ref);
    heap.set_dword(r.offset() + OFF_FUNC, func_ref.offset());

    let globals = func::globals(heap, func_ref);
    inc_ref(heap, globals);
    heap.set_dword(r.offset() + OFF_GLOBALS, globals.offset());
    let attrs = func::attrs(heap, func_ref);
    inc_ref(heap, attrs);
    heap.set_dword(r.offset() + OFF_ATTRS, attrs.offset());

    heap.set_dword(r.offset() + OFF_BLOCKS, Ref::NULL.offset());
    heap.set_dword(r.offset() + OFF_IP, code::codeaddr(heap, co));
    heap.set_word(r.offset() + OFF_LINE, 0);
    heap.set_byte(r.offset() + OFF_SPACE, code::space(heap, co).as_u8());
    heap.set_byte(r.offset() + OFF_FLAGS, 0);
    heap.set_byte(r.offset() + OFF_NLOCALS, nlocals);
    heap.set_byte(r.offset() + OFF_STACKSZ, stacksz);
    heap.set_word(r.offset() + OFF_SP, u16::from(nlocals));

    for i in 0..u16::from(nlocals) {
        inc_ref(heap, singletons.none);
        heap.set_dword(
            r.offset() + OFF_SLOTS + 4 * u32::from(i),
            singletons.none.offset(),
        );
    }
    Ok(r)
}

/// The calling frame, borrowed (null link for a root frame).
#[inline]
#[must_use]
pub fn back(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_BACK))
}

/// Chain this frame behind `caller` (raw link, no ownership).
#[inline]
pub fn set_back(heap: &mut Heap, r: Ref, caller: Ref) {
    heap.set_dword(r.offset() + OFF_BACK, caller.offset());
}

/// The executing function, borrowed.
#[inline]
#[must_use]
pub fn func_of(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_FUNC))
}

/// The globals dict, borrowed.
#[inline]
#[must_use]
pub fn globals_of(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_GLOBALS))
}

/// The attrs dict, borrowed.
#[inline]
#[must_use]
pub fn attrs_of(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_ATTRS))
}

/// Current instruction pointer (absolute image address).
#[inline]
#[must_use]
pub fn ip(heap: &Heap, r: Ref) -> u32 {
    heap.dword(r.offset() + OFF_IP)
}

/// Set the instruction pointer.
#[inline]
pub fn set_ip(heap: &mut Heap, r: Ref, ip: u32) {
    heap.set_dword(r.offset() + OFF_IP, ip);
}

/// Current source line number.
#[inline]
#[must_use]
pub fn line(heap: &Heap, r: Ref) -> u16 {
    heap.word(r.offset() + OFF_LINE)
}

/// Record the source line number.
#[inline]
pub fn set_line(heap: &mut Heap, r: Ref, line: u16) {
    heap.set_word(r.offset() + OFF_LINE, line);
}

/// The memory space the bytecode is read from.
#[must_use]
pub fn space(heap: &Heap, r: Ref) -> MemSpace {
    MemSpace::from_raw(heap.byte(r.offset() + OFF_SPACE)).unwrap_or(MemSpace::Ram)
}

/// Whether this frame executes a module body for an import.
#[inline]
#[must_use]
pub fn is_import(heap: &Heap, r: Ref) -> bool {
    heap.byte(r.offset() + OFF_FLAGS) & FLAG_IS_IMPORT != 0
}

/// Mark this frame as an import call.
pub fn set_is_import(heap: &mut Heap, r: Ref) {
    let flags = heap.byte(r.offset() + OFF_FLAGS);
    heap.set_byte(r.offset() + OFF_FLAGS, flags | FLAG_IS_IMPORT);
}

/// Number of local slots.
#[inline]
#[must_use]
pub fn nlocals(heap: &Heap, r: Ref) -> u16 {
    u16::from(heap.byte(r.offset() + OFF_NLOCALS))
}

/// Current stack pointer (slot index of the next free slot).
#[inline]
#[must_use]
pub fn sp(heap: &Heap, r: Ref) -> u16 {
    heap.word(r.offset() + OFF_SP)
}

/// Restore the stack pointer to a block snapshot, releasing the entries
/// above it.
pub fn unwind_to(heap: &mut Heap, r: Ref, target_sp: u16) -> VmResult<()> {
    while sp(heap, r) > target_sp {
        let v = pop(heap, r)?;
        release(heap, v)?;
    }
    Ok(())
}

fn slot(heap: &Heap, r: Ref, i: u16) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_SLOTS + 4 * u32::from(i)))
}

fn set_slot(heap: &mut Heap, r: Ref, i: u16, val: Ref) {
    heap.set_dword(r.offset() + OFF_SLOTS + 4 * u32::from(i), val.offset());
}

/// A local slot, borrowed.
pub fn get_local(heap: &Heap, r: Ref, i: u16) -> VmResult<Ref> {
    if i >= nlocals(heap, r) {
        return Err(VmError::raise(ReturnCode::AssertFail));
    }
    Ok(slot(heap, r, i))
}

/// Store into a local slot, consuming `val` and releasing the displaced
/// value.
pub fn set_local(heap: &mut Heap, r: Ref, i: u16, val: Ref) -> VmResult<()> {
    if i >= nlocals(heap, r) {
        return Err(VmError::raise(ReturnCode::AssertFail));
    }
    let old = slot(heap, r, i);
    set_slot(heap, r, i, val);
    release(heap, old)
}

/// Push a value, consuming the reference. Overflow is fatal.
pub fn push(heap: &mut Heap, r: Ref, val: Ref) -> VmResult<()> {
    let cur = sp(heap, r);
    let limit = nlocals(heap, r) + u16::from(heap.byte(r.offset() + OFF_STACKSZ));
    if cur >= limit {
        return Err(VmError::raise(ReturnCode::AssertFail));
    }
    set_slot(heap, r, cur, val);
    heap.set_word(r.offset() + OFF_SP, cur + 1);
    Ok(())
}

/// Pop a value; ownership passes to the caller. Underflow is fatal.
pub fn pop(heap: &mut Heap, r: Ref) -> VmResult<Ref> {
    let cur = sp(heap, r);
    if cur <= nlocals(heap, r) {
        return Err(VmError::raise(ReturnCode::AssertFail));
    }
    heap.set_word(r.offset() + OFF_SP, cur - 1);
    Ok(slot(heap, r, cur - 1))
}

/// The n-th value from the top (0 = top), borrowed.
pub fn peek(heap: &Heap, r: Ref, n: u16) -> VmResult<Ref> {
    let cur = sp(heap, r);
    if cur < nlocals(heap, r) + n + 1 {
        return Err(VmError::raise(ReturnCode::AssertFail));
    }
    Ok(slot(heap, r, cur - 1 - n))
}

// --- Block stack ---

const OFF_BLK_KIND: u32 = DESC_SIZE;
const OFF_BLK_SP: u32 = DESC_SIZE + 2;
const OFF_BLK_HANDLER: u32 = DESC_SIZE + 4;
const OFF_BLK_NEXT: u32 = DESC_SIZE + 8;
const BLK_SIZE: usize = 16;

/// Push a block recording the current stack pointer.
pub fn push_block(heap: &mut Heap, r: Ref, kind: BlockKind, handler: u32) -> VmResult<()> {
    let blk = heap.get_chunk(BLK_SIZE)?;
    init_desc(heap, blk, Tag::Blk);
    heap.set_byte(blk.offset() + OFF_BLK_KIND, kind as u8);
    let snapshot = sp(heap, r);
    heap.set_word(blk.offset() + OFF_BLK_SP, snapshot);
    heap.set_dword(blk.offset() + OFF_BLK_HANDLER, handler);
    let head = heap.dword(r.offset() + OFF_BLOCKS);
    heap.set_dword(blk.offset() + OFF_BLK_NEXT, head);
    heap.set_dword(r.offset() + OFF_BLOCKS, blk.offset());
    Ok(())
}

/// Pop the innermost block, returning (kind, handler, sp snapshot).
/// Popping an empty block stack is fatal.
pub fn pop_block(heap: &mut Heap, r: Ref) -> VmResult<(BlockKind, u32, u16)> {
    let blk = Ref::new(heap.dword(r.offset() + OFF_BLOCKS));
    if blk.is_null() {
        return Err(VmError::raise(ReturnCode::AssertFail));
    }
    let kind = match heap.byte(blk.offset() + OFF_BLK_KIND) {
        0 => BlockKind::Loop,
        1 => BlockKind::Except,
        _ => BlockKind::Finally,
    };
    let snapshot = heap.word(blk.offset() + OFF_BLK_SP);
    let handler = heap.dword(blk.offset() + OFF_BLK_HANDLER);
    let next = heap.dword(blk.offset() + OFF_BLK_NEXT);
    heap.set_dword(r.offset() + OFF_BLOCKS, next);
    heap.free_chunk(blk)?;
    Ok((kind, handler, snapshot))
}

/// Whether any block is on the stack.
#[inline]
#[must_use]
pub fn has_block(heap: &Heap, r: Ref) -> bool {
    !Ref::new(heap.dword(r.offset() + OFF_BLOCKS)).is_null()
}

/// Release everything a dying frame owns: its function, dicts, blocks and
/// every live slot (locals plus remaining stack entries).
pub fn release_contents(heap: &mut Heap, r: Ref) -> VmResult<()> {
    release(heap, func_of(heap, r))?;
    release(heap, attrs_of(heap, r))?;
    release(heap, globals_of(heap, r))?;
    while has_block(heap, r) {
        pop_block(heap, r)?;
    }
    for i in 0..sp(heap, r) {
        release(heap, slot(heap, r, i))?;
    }
    Ok(())
}
