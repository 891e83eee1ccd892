// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Image loader: flat binary blobs into object graphs.
//!
//! An image table is scanned once at init to build the module directory.
//! A code image's module name is the last entry of its names tuple (the
//! offline compiler appends it there). Loading walks the image through
//! the memory-space reader and allocates wrapper objects on the heap;
//! string payloads in program memory stay borrowed.

#[cfg(test)]
mod image_test;

#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;
#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

use picopy_abi::{MemSpace, ReturnCode, image};

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{Ref, Singletons, code, func, inc_ref, int, release, string, tuple};
use crate::platform::{Platform, mem_get_int, mem_get_word};

/// One image table entry.
#[derive(Clone, Debug)]
pub struct ImageInfo {
    /// Module name (last entry of the image's names tuple).
    pub name: Vec<u8>,
    /// The space the image lives in.
    pub space: MemSpace,
    /// Address of the image's type byte.
    pub addr: u32,
}

/// The statically-built directory of images, searched by module name.
#[derive(Default, Debug)]
pub struct ImageDir {
    entries: Vec<ImageInfo>,
}

impl ImageDir {
    /// Look up an image by module name.
    #[must_use]
    pub fn find(&self, name: &[u8]) -> Option<&ImageInfo> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of directory entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Skip one serialized object, advancing the cursor past it.
fn skip_obj<P: Platform>(plat: &P, space: MemSpace, cursor: &mut u32) -> VmResult<()> {
    let start = *cursor;
    let t = plat.mem_get_byte(space, cursor);
    match t {
        image::tag::NON => {}
        image::tag::INT => *cursor += 4,
        image::tag::STR => {
            let len = mem_get_word(plat, space, cursor);
            *cursor += u32::from(len);
        }
        image::tag::TUP => {
            let count = mem_get_word(plat, space, cursor);
            for _ in 0..count {
                skip_obj(plat, space, cursor)?;
            }
        }
        image::tag::CIM | image::tag::NIM => {
            let size = mem_get_word(plat, space, cursor);
            *cursor = start + u32::from(size);
        }
        _ => return Err(VmError::raise(ReturnCode::ExSys)),
    }
    Ok(())
}

/// Read the module name of the code image at `addr`: the last entry of
/// its names tuple.
fn read_module_name<P: Platform>(
    plat: &P,
    space: MemSpace,
    addr: u32,
) -> VmResult<Vec<u8>> {
    let mut cursor = addr + image::CI_NAMES_FIELD;
    if plat.mem_get_byte(space, &mut cursor) != image::tag::TUP {
        return Err(VmError::raise(ReturnCode::ExSys));
    }
    let count = mem_get_word(plat, space, &mut cursor);
    if count == 0 {
        return Err(VmError::raise(ReturnCode::ExSys));
    }
    for _ in 0..count - 1 {
        skip_obj(plat, space, &mut cursor)?;
    }
    if plat.mem_get_byte(space, &mut cursor) != image::tag::STR {
        return Err(VmError::raise(ReturnCode::ExSys));
    }
    let len = mem_get_word(plat, space, &mut cursor);
    let mut name = Vec::with_capacity(len as usize);
    for _ in 0..len {
        name.push(plat.mem_get_byte(space, &mut cursor));
    }
    Ok(name)
}

/// Scan a concatenated image table, building the module directory.
///
/// The table ends with a sentinel zero byte. Native images carry no name
/// and are skipped; an unknown type byte raises `SYS`.
pub fn scan<P: Platform>(plat: &P, space: MemSpace, start: u32) -> VmResult<ImageDir> {
    let mut dir = ImageDir::default();
    let mut cursor = start;
    loop {
        let addr = cursor;
        let t = plat.mem_get_byte(space, &mut cursor);
        if t == image::IMG_LIST_SENTINEL {
            break;
        }
        let size = mem_get_word(plat, space, &mut cursor);
        if size < 3 {
            return Err(VmError::raise(ReturnCode::ExSys));
        }
        match t {
            image::tag::CIM => {
                let name = read_module_name(plat, space, addr)?;
                log::debug!(
                    "image at {space}:0x{addr:04X}, {size} bytes, module {:?}",
                    core::str::from_utf8(&name).unwrap_or("<bytes>")
                );
                dir.entries.push(ImageInfo { name, space, addr });
            }
            image::tag::NIM => {}
            _ => return Err(VmError::raise(ReturnCode::ExSys)),
        }
        cursor = addr + u32::from(size);
    }
    Ok(dir)
}

/// Load one serialized object, advancing the cursor past it.
///
/// `parent` is the link stored into nested code objects (pass the null
/// link for a root image). Unknown tags raise `SYS`.
pub fn load_obj<P: Platform>(
    heap: &mut Heap,
    plat: &P,
    singletons: &Singletons,
    space: MemSpace,
    cursor: &mut u32,
    parent: Ref,
) -> VmResult<Ref> {
    let t = plat.mem_get_byte(space, cursor);
    match t {
        image::tag::NON => {
            inc_ref(heap, singletons.none);
            Ok(singletons.none)
        }
        image::tag::INT => {
            let v = mem_get_int(plat, space, cursor);
            int::new(heap, singletons, v)
        }
        image::tag::STR => string::load_from_img(heap, plat, space, cursor),
        image::tag::TUP => {
            let count = mem_get_word(plat, space, cursor);
            let tup = tuple::new(heap, count)?;
            for i in 0..count {
                match load_obj(heap, plat, singletons, space, cursor, parent) {
                    Ok(elem) => tuple::set_item_raw(heap, tup, i, elem),
                    Err(e) => {
                        release(heap, tup)?;
                        return Err(e);
                    }
                }
            }
            Ok(tup)
        }
        image::tag::NIM => {
            // Skip the size word, then argcount and function index
            let _ = mem_get_word(plat, space, cursor);
            let argcount = plat.mem_get_byte(space, cursor);
            let funcindex = mem_get_word(plat, space, cursor);
            code::no_new(heap, argcount, funcindex)
        }
        image::tag::CIM => load_code_obj(heap, plat, singletons, space, cursor, parent),
        _ => Err(VmError::raise(ReturnCode::ExSys)),
    }
}

/// Load a code image into a code object. The cursor points just past the
/// type byte on entry and one past the image end on return.
fn load_code_obj<P: Platform>(
    heap: &mut Heap,
    plat: &P,
    singletons: &Singletons,
    space: MemSpace,
    cursor: &mut u32,
    parent: Ref,
) -> VmResult<Ref> {
    // The type byte was already consumed
    let imgaddr = *cursor - 1;
    let size = mem_get_word(plat, space, cursor);

    // Names and consts tuples sit at a fixed offset behind the sizes
    *cursor = imgaddr + image::CI_NAMES_FIELD;
    let names = load_obj(heap, plat, singletons, space, cursor, parent)?;
    let consts = match load_obj(heap, plat, singletons, space, cursor, parent) {
        Ok(consts) => consts,
        Err(e) => {
            release(heap, names)?;
            return Err(e);
        }
    };

    // Bytecode always follows consts and runs to the image end
    let codeaddr = *cursor;
    *cursor = imgaddr + u32::from(size);

    inc_ref(heap, parent);
    code::new(heap, space, imgaddr, codeaddr, names, consts, parent)
}

/// Import a module by name: find its image, load the code object, wrap
/// it in a module object ready to be interpreted.
///
/// An unknown name raises `IMPRT`.
pub fn mod_import<P: Platform>(
    heap: &mut Heap,
    plat: &P,
    singletons: &Singletons,
    dir: &ImageDir,
    name: &[u8],
) -> VmResult<Ref> {
    let Some(info) = dir.find(name) else {
        return Err(VmError::raise(ReturnCode::ExImprt));
    };
    log::debug!(
        "importing module {:?} from {}:0x{:04X}",
        core::str::from_utf8(name).unwrap_or("<bytes>"),
        info.space,
        info.addr
    );
    let mut cursor = info.addr;
    let co = load_obj(heap, plat, singletons, info.space, &mut cursor, Ref::NULL)?;
    let module = func::new_module(heap, co);
    release(heap, co)?;
    module
}
