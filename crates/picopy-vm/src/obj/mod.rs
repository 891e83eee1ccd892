// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Object model: tagged, reference-counted heap records.
//!
//! Every heap-resident value begins with a 4-byte descriptor:
//!
//! ```text
//! offset 0: tag byte (see [`Tag`])
//! offset 1: flags (STATIC marks immortal singletons)
//! offset 2: reference count, u16 LE
//! ```
//!
//! A [`Ref`] is the heap offset of a descriptor, so any object can be
//! examined for its tag without knowing the variant. Dispatch on the tag
//! provides equality compare, truthiness, containment, printing and
//! destruction; the per-variant record layouts live in the submodules.
//!
//! Ownership: containers hold one reference per element; frames hold one
//! reference per live slot plus their function, attrs and globals dicts.
//! When a count reaches zero the variant destructor releases children and
//! frees the chunk. The None/−1/0/1 singletons carry the STATIC flag and
//! are never freed; their count floors at one.

#[cfg(test)]
mod dict_test;
#[cfg(test)]
mod frame_test;
#[cfg(test)]
mod list_test;
#[cfg(test)]
mod mod_test;

pub mod code;
pub mod dict;
pub mod exn;
pub mod frame;
pub mod func;
pub mod int;
pub mod iter;
pub mod list;
pub mod seglist;
pub mod string;
pub mod thread;
pub mod tuple;

use core::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use picopy_abi::ReturnCode;

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::platform::Platform;

/// Descriptor size in bytes; every record layout starts past it.
pub const DESC_SIZE: u32 = 4;

/// Descriptor flag: the object is an immortal singleton.
pub const FLAG_STATIC: u8 = 0x01;

/// Handle to a heap object: the offset of its descriptor.
///
/// `Ref::NULL` marks absent links (cleared dict slots, no back-frame).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ref(u32);

impl Ref {
    /// The absent-link sentinel.
    pub const NULL: Self = Self(u32::MAX);

    /// Wrap a heap offset.
    #[inline]
    #[must_use]
    pub const fn new(offset: u32) -> Self {
        Self(offset)
    }

    /// The heap offset of the descriptor.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0
    }

    /// Whether this is the absent-link sentinel.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Ref(NULL)")
        } else {
            write!(f, "Ref(0x{:05X})", self.0)
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:05X}", self.0)
    }
}

/// Object type tags.
///
/// Values `0x00..=0x0C` may appear in images; the rest are runtime-only.
/// `Flt` is reserved: compare reads its value slot numerically but nothing
/// constructs one.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
pub enum Tag {
    /// The None singleton.
    Non = 0x00,
    /// Signed 32-bit integer.
    Int = 0x01,
    /// Reserved floating-point tag.
    Flt = 0x02,
    /// Byte string.
    Str = 0x03,
    /// Immutable tuple with inline payload.
    Tup = 0x04,
    /// Code object.
    Cob = 0x05,
    /// Module (function layout).
    Mod = 0x06,
    /// Legacy class.
    Clo = 0x07,
    /// Function.
    Fxn = 0x08,
    /// Class instance.
    Cli = 0x09,
    /// Code image (appears only as an image type byte).
    Cim = 0x0A,
    /// Native code image (appears only as an image type byte).
    Nim = 0x0B,
    /// Native code object.
    Nob = 0x0C,
    /// Mutable list.
    Lst = 0x10,
    /// Dict with two parallel segment lists.
    Dic = 0x11,
    /// Segment of a segment list.
    Seg = 0x12,
    /// Sequence iterator.
    Sqi = 0x13,
    /// Frame (activation record).
    Frm = 0x14,
    /// Exception-handling block record.
    Blk = 0x15,
    /// Exception.
    Exn = 0x16,
    /// Thread.
    Thr = 0x17,
}

/// Read the tag of an object.
#[inline]
#[must_use]
#[expect(clippy::panic, reason = "a corrupt descriptor is a fatal VM bug")]
pub fn tag(heap: &Heap, r: Ref) -> Tag {
    let raw = heap.byte(r.offset());
    Tag::try_from(raw).unwrap_or_else(|_| panic!("corrupt object tag 0x{raw:02X} at {r}"))
}

/// Initialize a freshly allocated descriptor.
pub fn init_desc(heap: &mut Heap, r: Ref, t: Tag) {
    heap.set_byte(r.offset(), t.into());
    heap.set_byte(r.offset() + 1, 0);
    heap.set_word(r.offset() + 2, 1);
}

/// Mark an object as an immortal singleton.
pub fn set_static(heap: &mut Heap, r: Ref) {
    let flags = heap.byte(r.offset() + 1);
    heap.set_byte(r.offset() + 1, flags | FLAG_STATIC);
}

/// Whether the object carries the STATIC flag.
#[inline]
#[must_use]
pub fn is_static(heap: &Heap, r: Ref) -> bool {
    heap.byte(r.offset() + 1) & FLAG_STATIC != 0
}

/// Current reference count.
#[inline]
#[must_use]
pub fn refcount(heap: &Heap, r: Ref) -> u16 {
    heap.word(r.offset() + 2)
}

/// Take one owning reference.
#[inline]
pub fn inc_ref(heap: &mut Heap, r: Ref) {
    if r.is_null() {
        return;
    }
    let refs = heap.word(r.offset() + 2);
    heap.set_word(r.offset() + 2, refs.saturating_add(1));
}

/// Drop one owning reference, destroying the object at zero.
///
/// Singletons survive any number of releases.
pub fn release(heap: &mut Heap, r: Ref) -> VmResult<()> {
    if r.is_null() {
        return Ok(());
    }
    let refs = heap.word(r.offset() + 2);
    if is_static(heap, r) {
        if refs > 1 {
            heap.set_word(r.offset() + 2, refs - 1);
        }
        return Ok(());
    }
    if refs > 1 {
        heap.set_word(r.offset() + 2, refs - 1);
        return Ok(());
    }
    destroy(heap, r)
}

/// Destroy an object: release children per variant, then free the chunk.
fn destroy(heap: &mut Heap, r: Ref) -> VmResult<()> {
    match tag(heap, r) {
        Tag::Tup => {
            let len = tuple::length(heap, r);
            for i in 0..len {
                release(heap, tuple::item(heap, r, i))?;
            }
        }
        Tag::Seg => seglist::release_slots(heap, r)?,
        Tag::Lst => {
            let head = heap.dword(r.offset() + list::OFF_HEAD);
            seglist::free_chain(heap, Ref::new(head))?;
        }
        Tag::Dic => {
            let keys = heap.dword(r.offset() + dict::OFF_KEYS);
            let vals = heap.dword(r.offset() + dict::OFF_VALS);
            seglist::free_chain(heap, Ref::new(keys))?;
            seglist::free_chain(heap, Ref::new(vals))?;
        }
        Tag::Cob => {
            release(heap, code::names(heap, r))?;
            release(heap, code::consts(heap, r))?;
            release(heap, code::parent(heap, r))?;
        }
        Tag::Fxn | Tag::Mod => {
            release(heap, func::code_obj(heap, r))?;
            release(heap, func::attrs(heap, r))?;
            release(heap, func::globals(heap, r))?;
            release(heap, func::defaults(heap, r))?;
        }
        Tag::Clo => release(heap, func::class_attrs(heap, r))?,
        Tag::Cli => {
            release(heap, func::instance_class(heap, r))?;
            release(heap, func::instance_attrs(heap, r))?;
        }
        Tag::Frm => frame::release_contents(heap, r)?,
        Tag::Sqi => release(heap, iter::source(heap, r))?,
        Tag::Thr => release(heap, thread::frame_of(heap, r))?,
        // Scalar records hold no references
        Tag::Non | Tag::Int | Tag::Flt | Tag::Str | Tag::Nob | Tag::Exn | Tag::Blk => {}
        // Image type bytes never become live objects
        Tag::Cim | Tag::Nim => return Err(VmError::raise(ReturnCode::Err)),
    }
    heap.free_chunk(r)
}

/// Whether the object is logically false.
///
/// None, integer zero and empty containers are false; everything else is
/// true.
#[must_use]
pub fn is_false(heap: &Heap, r: Ref) -> bool {
    match tag(heap, r) {
        Tag::Non => true,
        Tag::Int => int::value(heap, r) == 0,
        Tag::Str => string::length(heap, r) == 0,
        Tag::Tup => tuple::length(heap, r) == 0,
        Tag::Lst => list::length(heap, r) == 0,
        Tag::Dic => dict::length(heap, r) == 0,
        _ => false,
    }
}

/// Equality compare: true means SAME, false means DIFFER. Never raises.
///
/// Objects of different tags differ, except that `Int` and the reserved
/// `Flt` tag read the same value slot and compare numerically.
#[must_use]
pub fn compare<P: Platform>(heap: &Heap, plat: &P, a: Ref, b: Ref) -> bool {
    if a == b {
        return true;
    }
    let (ta, tb) = (tag(heap, a), tag(heap, b));
    let numeric = |t: Tag| matches!(t, Tag::Int | Tag::Flt);
    if ta != tb && !(numeric(ta) && numeric(tb)) {
        return false;
    }
    match ta {
        Tag::Non => true,
        Tag::Int | Tag::Flt => int::value(heap, a) == int::value(heap, b),
        Tag::Str => string::compare(heap, plat, a, b),
        Tag::Tup | Tag::Lst => seq_compare(heap, plat, a, b),
        // Dict comparison is not supported; identity was checked above
        _ => false,
    }
}

/// Elementwise compare of two sequences of the same tag.
fn seq_compare<P: Platform>(heap: &Heap, plat: &P, a: Ref, b: Ref) -> bool {
    let (len_a, len_b) = match tag(heap, a) {
        Tag::Tup => (tuple::length(heap, a), tuple::length(heap, b)),
        _ => (list::length(heap, a), list::length(heap, b)),
    };
    if len_a != len_b {
        return false;
    }
    for i in 0..len_a {
        let (ia, ib) = match tag(heap, a) {
            Tag::Tup => (tuple::item(heap, a, i), tuple::item(heap, b, i)),
            _ => {
                let Ok(ia) = list::get_item(heap, a, i as i32) else {
                    return false;
                };
                let Ok(ib) = list::get_item(heap, b, i as i32) else {
                    return false;
                };
                (ia, ib)
            }
        };
        if !compare(heap, plat, ia, ib) {
            return false;
        }
    }
    true
}

/// Whether `item` is contained in `container`.
///
/// Tuples and lists scan elements; dicts query keys; strings require a
/// single-byte needle (`TYPE` for non-strings, `VAL` for longer needles;
/// the empty needle is always present).
pub fn contains<P: Platform>(
    heap: &Heap,
    plat: &P,
    container: Ref,
    item: Ref,
) -> VmResult<bool> {
    match tag(heap, container) {
        Tag::Tup => {
            let len = tuple::length(heap, container);
            for i in 0..len {
                if compare(heap, plat, item, tuple::item(heap, container, i)) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Tag::Lst => {
            let len = list::length(heap, container);
            for i in 0..len {
                let elem = list::get_item(heap, container, i as i32)?;
                if compare(heap, plat, item, elem) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Tag::Dic => Ok(dict::get_item(heap, plat, container, item).is_ok()),
        Tag::Str => string::contains(heap, plat, container, item),
        _ => Err(VmError::raise(ReturnCode::ExType)),
    }
}

/// Print an object to the platform byte stream.
///
/// With `marshall` set, strings are quoted and None is spelled out, as in
/// container element rendering.
pub fn print<P: Platform>(heap: &Heap, plat: &mut P, r: Ref, marshall: bool) -> VmResult<()> {
    match tag(heap, r) {
        Tag::Non => {
            if marshall {
                for b in b"None" {
                    plat.put_byte(*b)?;
                }
            }
            Ok(())
        }
        Tag::Int | Tag::Flt => int::print(heap, plat, r),
        Tag::Str => string::print(heap, plat, r, marshall),
        Tag::Tup => tuple::print(heap, plat, r),
        Tag::Lst => list::print(heap, plat, r),
        Tag::Dic => dict::print(heap, plat, r),
        t => {
            for b in b"<obj type 0x" {
                plat.put_byte(*b)?;
            }
            int::print_hex_byte(plat, t.into())?;
            for b in b" @ 0x" {
                plat.put_byte(*b)?;
            }
            int::print_hex(plat, r.offset())?;
            plat.put_byte(b'>')
        }
    }
}

/// Singleton objects allocated once at VM init.
#[derive(Clone, Copy, Debug)]
pub struct Singletons {
    /// The None object.
    pub none: Ref,
    /// Integer zero.
    pub zero: Ref,
    /// Integer one.
    pub one: Ref,
    /// Integer minus one.
    pub neg_one: Ref,
}

impl Singletons {
    /// Allocate the singleton set.
    pub fn init(heap: &mut Heap) -> VmResult<Self> {
        let none = heap.get_chunk(DESC_SIZE as usize)?;
        init_desc(heap, none, Tag::Non);
        set_static(heap, none);
        Ok(Self {
            none,
            zero: int::new_static(heap, 0)?,
            one: int::new_static(heap, 1)?,
            neg_one: int::new_static(heap, -1)?,
        })
    }
}
