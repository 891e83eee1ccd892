// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Function, module, class and class-instance objects.
//!
//! A function is a bindable instance of a code object with its own attrs
//! and globals dicts. A module reuses the function layout under its own
//! tag; its attrs dict doubles as its globals so top-level name and
//! global stores land in the same namespace. The class objects implement
//! the legacy model: a class is an attrs dict carrying `__bt` (bases) and
//! `__nm` (name) entries.

use picopy_abi::ReturnCode;

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Tag, dict, inc_ref, init_desc, string, tag};
use crate::platform::Platform;

const OFF_CO: u32 = DESC_SIZE;
const OFF_ATTRS: u32 = DESC_SIZE + 4;
const OFF_GLOBALS: u32 = DESC_SIZE + 8;
const OFF_DEFAULTS: u32 = DESC_SIZE + 12;
const SIZE: usize = 20;

/// Create a function binding `co` with the given globals dict.
///
/// Borrows both arguments (each gains one reference). Functions over
/// native code objects carry no attrs or globals dicts.
pub fn new(heap: &mut Heap, co: Ref, globals: Ref) -> VmResult<Ref> {
    if !matches!(tag(heap, co), Tag::Cob | Tag::Nob) {
        return Err(VmError::raise(ReturnCode::ExType));
    }
    let r = heap.get_chunk(SIZE)?;
    init_desc(heap, r, Tag::Fxn);
    inc_ref(heap, co);
    heap.set_dword(r.offset() + OFF_CO, co.offset());
    if tag(heap, co) == Tag::Cob {
        let attrs = dict::new(heap)?;
        heap.set_dword(r.offset() + OFF_ATTRS, attrs.offset());
        inc_ref(heap, globals);
        heap.set_dword(r.offset() + OFF_GLOBALS, globals.offset());
    } else {
        heap.set_dword(r.offset() + OFF_ATTRS, Ref::NULL.offset());
        heap.set_dword(r.offset() + OFF_GLOBALS, Ref::NULL.offset());
    }
    heap.set_dword(r.offset() + OFF_DEFAULTS, Ref::NULL.offset());
    Ok(r)
}

/// Create a module for `co`: function layout whose fresh attrs dict is
/// also its globals dict.
pub fn new_module(heap: &mut Heap, co: Ref) -> VmResult<Ref> {
    if tag(heap, co) != Tag::Cob {
        return Err(VmError::raise(ReturnCode::ExType));
    }
    let r = heap.get_chunk(SIZE)?;
    init_desc(heap, r, Tag::Mod);
    inc_ref(heap, co);
    heap.set_dword(r.offset() + OFF_CO, co.offset());
    let attrs = dict::new(heap)?;
    heap.set_dword(r.offset() + OFF_ATTRS, attrs.offset());
    inc_ref(heap, attrs);
    heap.set_dword(r.offset() + OFF_GLOBALS, attrs.offset());
    heap.set_dword(r.offset() + OFF_DEFAULTS, Ref::NULL.offset());
    Ok(r)
}

/// The bound code (or native code) object, borrowed.
#[inline]
#[must_use]
pub fn code_obj(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_CO))
}

/// The attrs dict, borrowed (null link for natives).
#[inline]
#[must_use]
pub fn attrs(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_ATTRS))
}

/// The globals dict, borrowed (null link for natives).
#[inline]
#[must_use]
pub fn globals(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_GLOBALS))
}

/// The default-argument tuple, borrowed (null link when unset).
#[inline]
#[must_use]
pub fn defaults(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_DEFAULTS))
}

/// Install the default-argument tuple, consuming the reference and
/// releasing any previous tuple.
pub fn set_defaults(heap: &mut Heap, r: Ref, tup: Ref) -> VmResult<()> {
    let old = defaults(heap, r);
    heap.set_dword(r.offset() + OFF_DEFAULTS, tup.offset());
    crate::obj::release(heap, old)
}

// --- Legacy classes ---

const OFF_CLO_ATTRS: u32 = DESC_SIZE;
const CLO_SIZE: usize = 8;

const OFF_CLI_CLASS: u32 = DESC_SIZE;
const OFF_CLI_ATTRS: u32 = DESC_SIZE + 4;
const CLI_SIZE: usize = 12;

/// Create a class from a methods dict, bases tuple and name string.
///
/// Borrows all three; the methods dict becomes the class attrs dict and
/// gains `__bt` and `__nm` entries.
///
/// Deprecated in the original with no replacement; kept as-is.
pub fn class_new<P: Platform>(
    heap: &mut Heap,
    plat: &P,
    meths: Ref,
    bases: Ref,
    name: Ref,
) -> VmResult<Ref> {
    if tag(heap, meths) != Tag::Dic
        || tag(heap, bases) != Tag::Tup
        || tag(heap, name) != Tag::Str
    {
        return Err(VmError::raise(ReturnCode::ExType));
    }
    let r = heap.get_chunk(CLO_SIZE)?;
    init_desc(heap, r, Tag::Clo);
    inc_ref(heap, meths);
    heap.set_dword(r.offset() + OFF_CLO_ATTRS, meths.offset());

    let bt_key = string::new(heap, b"__bt")?;
    inc_ref(heap, bases);
    dict::set_item(heap, plat, meths, bt_key, bases)?;
    let nm_key = string::new(heap, b"__nm")?;
    inc_ref(heap, name);
    dict::set_item(heap, plat, meths, nm_key, name)?;
    Ok(r)
}

/// The class attrs dict, borrowed.
#[inline]
#[must_use]
pub fn class_attrs(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_CLO_ATTRS))
}

/// Create an instance of a class with a fresh attrs dict.
pub fn instance_new(heap: &mut Heap, class: Ref) -> VmResult<Ref> {
    if tag(heap, class) != Tag::Clo {
        return Err(VmError::raise(ReturnCode::ExType));
    }
    let r = heap.get_chunk(CLI_SIZE)?;
    init_desc(heap, r, Tag::Cli);
    inc_ref(heap, class);
    heap.set_dword(r.offset() + OFF_CLI_CLASS, class.offset());
    let attrs = dict::new(heap)?;
    heap.set_dword(r.offset() + OFF_CLI_ATTRS, attrs.offset());
    Ok(r)
}

/// The instance's class, borrowed.
#[inline]
#[must_use]
pub fn instance_class(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_CLI_CLASS))
}

/// The instance attrs dict, borrowed.
#[inline]
#[must_use]
pub fn instance_attrs(heap: &Heap, r: Ref) -> Ref {
    Ref::new(heap.dword(r.offset() + OFF_CLI_ATTRS))
}
