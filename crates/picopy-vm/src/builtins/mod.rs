// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Built-in native functions.
//!
//! Builtins use a fixed calling convention: the interpreter pops the
//! positional arguments, dispatches on the native function index, and
//! pushes the returned reference. Indices below [`BUILTIN_COUNT`] resolve
//! here; anything higher goes to the host's dispatch table through
//! `Platform::native`.
//!
//! At init a module-like dict is populated with one native function
//! object per builtin plus the exception name bindings, and serves as the
//! final stop of name lookup.


use picopy_abi::ReturnCode;

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{
    self, Ref, Tag, code, dict, exn, frame, func, int, list, string, thread, tuple,
};
use crate::platform::Platform;
use crate::vm::Vm;

/// Native function indices of the builtins.
pub mod id {
    /// `len(seq)`
    pub const LEN: u16 = 0;
    /// `type(obj)` -> type tag as an integer
    pub const TYPE: u16 = 1;
    /// `range([start,] stop[, step])` -> list
    pub const RANGE: u16 = 2;
    /// `chr(n)` -> single-byte string
    pub const CHR: u16 = 3;
    /// `ord(s)` -> byte value
    pub const ORD: u16 = 4;
    /// `abs(n)`
    pub const ABS: u16 = 5;
    /// `id(obj)` -> object address
    pub const ID: u16 = 6;
    /// `globals()` -> the calling frame's globals dict
    pub const GLOBALS: u16 = 7;
    /// `print(...)` -> emits arguments and a newline
    pub const PRINT: u16 = 8;
    /// `pow(a, b)`
    pub const POW: u16 = 9;
    /// `spawn(fn)` -> starts a cooperative thread
    pub const SPAWN: u16 = 10;
}

/// Number of built-in native functions.
pub const BUILTIN_COUNT: u16 = 11;

/// Name, declared argument count (`NO_VARARGS` = any) and index of each
/// builtin.
const BUILTIN_TABLE: [(&[u8], u8, u16); BUILTIN_COUNT as usize] = [
    (b"len", 1, id::LEN),
    (b"type", 1, id::TYPE),
    (b"range", code::NO_VARARGS, id::RANGE),
    (b"chr", 1, id::CHR),
    (b"ord", 1, id::ORD),
    (b"abs", 1, id::ABS),
    (b"id", 1, id::ID),
    (b"globals", 0, id::GLOBALS),
    (b"print", code::NO_VARARGS, id::PRINT),
    (b"pow", 2, id::POW),
    (b"spawn", 1, id::SPAWN),
];

/// Exception names bound to static exception objects.
const EXCEPTION_TABLE: [(&[u8], ReturnCode); 16] = [
    (b"Exception", ReturnCode::Ex),
    (b"SystemExit", ReturnCode::ExExit),
    (b"IOError", ReturnCode::ExIo),
    (b"ZeroDivisionError", ReturnCode::ExZdiv),
    (b"AssertionError", ReturnCode::ExAssrt),
    (b"AttributeError", ReturnCode::ExAttr),
    (b"ImportError", ReturnCode::ExImprt),
    (b"IndexError", ReturnCode::ExIndx),
    (b"KeyError", ReturnCode::ExKey),
    (b"MemoryError", ReturnCode::ExMem),
    (b"NameError", ReturnCode::ExName),
    (b"SyntaxError", ReturnCode::ExSyntax),
    (b"SystemError", ReturnCode::ExSys),
    (b"TypeError", ReturnCode::ExType),
    (b"ValueError", ReturnCode::ExVal),
    (b"StopIteration", ReturnCode::ExStop),
];

/// Build the builtins dict.
pub fn init<P: Platform>(heap: &mut Heap, plat: &P) -> VmResult<Ref> {
    let d = dict::new(heap)?;
    for (name, argc, index) in BUILTIN_TABLE {
        let nob = code::no_new(heap, argc, index)?;
        let fxn = func::new(heap, nob, Ref::NULL)?;
        obj::release(heap, nob)?;
        let key = string::new(heap, name)?;
        dict::set_item(heap, plat, d, key, fxn)?;
    }
    for (name, kind) in EXCEPTION_TABLE {
        let e = exn::new_static(heap, kind)?;
        let key = string::new(heap, name)?;
        dict::set_item(heap, plat, d, key, e)?;
    }
    Ok(d)
}

fn expect_int<P: Platform>(vm: &Vm<P>, r: Ref) -> VmResult<i32> {
    if obj::tag(&vm.heap, r) != Tag::Int {
        return Err(VmError::raise(ReturnCode::ExType));
    }
    Ok(int::value(&vm.heap, r))
}

fn expect_argc(args: &[Ref], n: usize) -> VmResult<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(VmError::raise(ReturnCode::ExNumArgs))
    }
}

/// Dispatch a built-in native function.
///
/// Arguments are borrowed; the returned reference is owned by the
/// caller. `frame` is the calling frame (for `globals`).
pub fn call<P: Platform>(
    vm: &mut Vm<P>,
    frame: Ref,
    index: u16,
    args: &[Ref],
) -> VmResult<Ref> {
    match index {
        id::LEN => {
            expect_argc(args, 1)?;
            let len = match obj::tag(&vm.heap, args[0]) {
                Tag::Str => i32::from(string::length(&vm.heap, args[0])),
                Tag::Tup => i32::from(tuple::length(&vm.heap, args[0])),
                Tag::Lst => i32::from(list::length(&vm.heap, args[0])),
                Tag::Dic => i32::from(dict::length(&vm.heap, args[0])),
                _ => return Err(VmError::raise(ReturnCode::ExType)),
            };
            int::new(&mut vm.heap, &vm.singletons, len)
        }
        id::TYPE => {
            expect_argc(args, 1)?;
            let t: u8 = obj::tag(&vm.heap, args[0]).into();
            int::new(&mut vm.heap, &vm.singletons, i32::from(t))
        }
        id::RANGE => builtin_range(vm, args),
        id::CHR => {
            expect_argc(args, 1)?;
            let n = expect_int(vm, args[0])?;
            if !(0..=255).contains(&n) {
                return Err(VmError::raise(ReturnCode::ExVal));
            }
            string::new(&mut vm.heap, &[n as u8])
        }
        id::ORD => {
            expect_argc(args, 1)?;
            if obj::tag(&vm.heap, args[0]) != Tag::Str {
                return Err(VmError::raise(ReturnCode::ExType));
            }
            if string::length(&vm.heap, args[0]) != 1 {
                return Err(VmError::raise(ReturnCode::ExVal));
            }
            let b = string::byte_at(&vm.heap, &vm.plat, args[0], 0);
            int::new(&mut vm.heap, &vm.singletons, i32::from(b))
        }
        id::ABS => {
            expect_argc(args, 1)?;
            let n = expect_int(vm, args[0])?;
            int::new(&mut vm.heap, &vm.singletons, n.wrapping_abs())
        }
        id::ID => {
            expect_argc(args, 1)?;
            int::new(&mut vm.heap, &vm.singletons, args[0].offset() as i32)
        }
        id::GLOBALS => {
            expect_argc(args, 0)?;
            let globals = frame::globals_of(&vm.heap, frame);
            obj::inc_ref(&mut vm.heap, globals);
            Ok(globals)
        }
        id::PRINT => {
            for (i, &arg) in args.iter().enumerate() {
                if i > 0 {
                    vm.plat.put_byte(b' ')?;
                }
                obj::print(&vm.heap, &mut vm.plat, arg, false)?;
            }
            vm.plat.put_byte(b'\n')?;
            obj::inc_ref(&mut vm.heap, vm.singletons.none);
            Ok(vm.singletons.none)
        }
        id::POW => {
            expect_argc(args, 2)?;
            let a = expect_int(vm, args[0])?;
            let b = expect_int(vm, args[1])?;
            let v = int::pow(a, b)?;
            int::new(&mut vm.heap, &vm.singletons, v)
        }
        id::SPAWN => {
            expect_argc(args, 1)?;
            if obj::tag(&vm.heap, args[0]) != Tag::Fxn {
                return Err(VmError::raise(ReturnCode::ExType));
            }
            let root = frame::new(&mut vm.heap, &vm.plat, &vm.singletons, args[0])?;
            let thr = thread::new(&mut vm.heap, root)?;
            vm.threads.push(thr);
            obj::inc_ref(&mut vm.heap, vm.singletons.none);
            Ok(vm.singletons.none)
        }
        _ => Err(VmError::raise(ReturnCode::ExSys)),
    }
}

fn builtin_range<P: Platform>(vm: &mut Vm<P>, args: &[Ref]) -> VmResult<Ref> {
    let (start, stop, step) = match args.len() {
        1 => (0, expect_int(vm, args[0])?, 1),
        2 => (expect_int(vm, args[0])?, expect_int(vm, args[1])?, 1),
        3 => (
            expect_int(vm, args[0])?,
            expect_int(vm, args[1])?,
            expect_int(vm, args[2])?,
        ),
        _ => return Err(VmError::raise(ReturnCode::ExNumArgs)),
    };
    if step == 0 {
        return Err(VmError::raise(ReturnCode::ExVal));
    }
    let out = list::new(&mut vm.heap)?;
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        let v = int::new(&mut vm.heap, &vm.singletons, i)?;
        list::append(&mut vm.heap, out, v)?;
        i = i.wrapping_add(step);
    }
    Ok(out)
}
