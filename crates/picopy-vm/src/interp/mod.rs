// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The bytecode interpreter.
//!
//! Single-threaded cooperative dispatch over the byte opcode stream of
//! the current frame, read through the memory-space reader. Opcodes
//! below `HAVE_ARGUMENT` occupy one byte, the rest three (opcode plus a
//! little-endian u16 operand).
//!
//! Calls, returns and imports switch the thread's current-frame pointer;
//! the loop re-reads it at every opcode boundary, which is also where
//! the round-robin scheduler rotates between threads and where a
//! host-requested exit is honored. An exception code starts the unwind:
//! evaluation-stack entries above the innermost block are released, and
//! except/finally handlers receive the exception kind on the stack. A
//! thread whose last frame unwinds uncaught terminates interpretation
//! with the exception as the process-level outcome.


#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;
#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

use picopy_abi::ReturnCode;

use crate::builtins;
use crate::bytecode::{HAVE_ARGUMENT, cmp, op};
use crate::error::{VmError, VmResult};
use crate::image;
use crate::obj::{
    self, Ref, Tag, code, dict, exn, frame, func, int, iter, list, string, thread, tuple,
};
use crate::obj::frame::BlockKind;
use crate::platform::{Platform, mem_get_word};
use crate::vm::Vm;

/// Run all threads to completion.
///
/// Returns the first fatal code or uncaught exception; `Ok` when every
/// thread finishes normally.
pub fn interpret<P: Platform>(vm: &mut Vm<P>) -> VmResult<()> {
    while !vm.threads.is_empty() {
        if vm.exit_requested {
            vm.exit_requested = false;
            handle_exception(vm, VmError::raise(ReturnCode::ExExit))?;
            continue;
        }

        // Round-robin between runnable threads at opcode boundaries
        if vm.threads.len() > 1 {
            vm.current = (vm.current + 1) % vm.threads.len();
        } else {
            vm.current = 0;
        }
        let thr = vm.threads[vm.current];
        let cur = thread::frame_of(&vm.heap, thr);

        match step(vm, thr, cur) {
            Ok(()) => {}
            Err(err) if err.is_exception() => handle_exception(vm, err)?,
            // ERR and ASSERT_FAIL abort interpretation
            Err(err) => return Err(err),
        }

        // Reap the thread when its root frame returned
        let thr = vm.threads[vm.current];
        if thread::frame_of(&vm.heap, thr).is_null() {
            let dead = vm.threads.remove(vm.current);
            obj::release(&mut vm.heap, dead)?;
            if !vm.threads.is_empty() {
                vm.current %= vm.threads.len();
            }
        }
    }
    Ok(())
}

/// Unwind the current thread after `err` was raised.
///
/// Block stacks are drained frame by frame; an except or finally block
/// receives the exception kind on the restored stack and control moves
/// to its handler. With no frame left the exception becomes the
/// process-level outcome.
fn handle_exception<P: Platform>(vm: &mut Vm<P>, err: VmError) -> VmResult<()> {
    vm.last_raise = Some(err.code);
    vm.err_site = Some(err);
    let thr = vm.threads[vm.current];
    loop {
        let cur = thread::frame_of(&vm.heap, thr);
        if cur.is_null() {
            log::error!("uncaught exception: {err}");
            return Err(err);
        }
        while frame::has_block(&vm.heap, cur) {
            let (kind, handler, snapshot) = frame::pop_block(&mut vm.heap, cur)?;
            frame::unwind_to(&mut vm.heap, cur, snapshot)?;
            if matches!(kind, BlockKind::Except | BlockKind::Finally) {
                let e = exn::new(&mut vm.heap, err.code)?;
                frame::push(&mut vm.heap, cur, e)?;
                frame::set_ip(&mut vm.heap, cur, handler);
                return Ok(());
            }
        }
        let back = frame::back(&vm.heap, cur);
        thread::set_frame(&mut vm.heap, thr, back);
        obj::release(&mut vm.heap, cur)?;
    }
}

/// The code object executing in `cur`.
fn frame_code<P: Platform>(vm: &Vm<P>, cur: Ref) -> Ref {
    func::code_obj(&vm.heap, frame::func_of(&vm.heap, cur))
}

/// `names[idx]` of the frame's code object, borrowed.
fn name_at<P: Platform>(vm: &Vm<P>, cur: Ref, idx: u16) -> VmResult<Ref> {
    let names = code::names(&vm.heap, frame_code(vm, cur));
    tuple::get_item(&vm.heap, names, i32::from(idx))
}

/// Jump to an absolute bytecode offset.
fn jump_abs<P: Platform>(vm: &mut Vm<P>, cur: Ref, offset: u16) {
    let base = code::codeaddr(&vm.heap, frame_code(vm, cur));
    frame::set_ip(&mut vm.heap, cur, base + u32::from(offset));
}

/// Release a popped value and its companions on an error path.
fn release_all<P: Platform>(vm: &mut Vm<P>, refs: &[Ref]) -> VmResult<()> {
    for &r in refs {
        obj::release(&mut vm.heap, r)?;
    }
    Ok(())
}

/// Execute one opcode of the given thread's current frame.
#[expect(clippy::too_many_lines, reason = "one arm per opcode, as flat dispatch")]
fn step<P: Platform>(vm: &mut Vm<P>, thr: Ref, cur: Ref) -> VmResult<()> {
    let space = frame::space(&vm.heap, cur);
    let mut cursor = frame::ip(&vm.heap, cur);
    let opcode = vm.plat.mem_get_byte(space, &mut cursor);
    let operand = if opcode >= HAVE_ARGUMENT {
        mem_get_word(&vm.plat, space, &mut cursor)
    } else {
        0
    };
    frame::set_ip(&mut vm.heap, cur, cursor);

    match opcode {
        op::POP_TOP => {
            let v = frame::pop(&mut vm.heap, cur)?;
            obj::release(&mut vm.heap, v)
        }

        op::ROT_TWO => {
            let a = frame::pop(&mut vm.heap, cur)?;
            let b = frame::pop(&mut vm.heap, cur)?;
            frame::push(&mut vm.heap, cur, a)?;
            frame::push(&mut vm.heap, cur, b)
        }

        op::ROT_THREE => {
            let a = frame::pop(&mut vm.heap, cur)?;
            let b = frame::pop(&mut vm.heap, cur)?;
            let c = frame::pop(&mut vm.heap, cur)?;
            frame::push(&mut vm.heap, cur, a)?;
            frame::push(&mut vm.heap, cur, c)?;
            frame::push(&mut vm.heap, cur, b)
        }

        op::ROT_FOUR => {
            let a = frame::pop(&mut vm.heap, cur)?;
            let b = frame::pop(&mut vm.heap, cur)?;
            let c = frame::pop(&mut vm.heap, cur)?;
            let d = frame::pop(&mut vm.heap, cur)?;
            frame::push(&mut vm.heap, cur, a)?;
            frame::push(&mut vm.heap, cur, d)?;
            frame::push(&mut vm.heap, cur, c)?;
            frame::push(&mut vm.heap, cur, b)
        }

        op::DUP_TOP => {
            let v = frame::peek(&vm.heap, cur, 0)?;
            obj::inc_ref(&mut vm.heap, v);
            frame::push(&mut vm.heap, cur, v)
        }

        op::DUP_TOPX => {
            let n = operand;
            let mut vals = Vec::with_capacity(n as usize);
            for i in 0..n {
                vals.push(frame::peek(&vm.heap, cur, n - 1 - i)?);
            }
            for v in vals {
                obj::inc_ref(&mut vm.heap, v);
                frame::push(&mut vm.heap, cur, v)?;
            }
            Ok(())
        }

        op::UNARY_POSITIVE => unary_int(vm, cur, |n| Ok(n)),
        op::UNARY_NEGATIVE => unary_int(vm, cur, |n| Ok(n.wrapping_neg())),
        op::UNARY_INVERT => unary_int(vm, cur, |n| Ok(!n)),

        op::UNARY_NOT => {
            let v = frame::pop(&mut vm.heap, cur)?;
            let falsy = obj::is_false(&vm.heap, v);
            obj::release(&mut vm.heap, v)?;
            let r = int::new(&mut vm.heap, &vm.singletons, i32::from(falsy))?;
            frame::push(&mut vm.heap, cur, r)
        }

        op::BINARY_ADD | op::INPLACE_ADD => binary_int(vm, cur, |a, b| Ok(a.wrapping_add(b))),
        op::BINARY_SUBTRACT | op::INPLACE_SUBTRACT => {
            binary_int(vm, cur, |a, b| Ok(a.wrapping_sub(b)))
        }
        op::BINARY_MULTIPLY | op::INPLACE_MULTIPLY => {
            binary_int(vm, cur, |a, b| Ok(a.wrapping_mul(b)))
        }
        op::BINARY_DIVIDE | op::INPLACE_DIVIDE => binary_int(vm, cur, int::div),
        op::BINARY_MODULO | op::INPLACE_MODULO => binary_int(vm, cur, int::modulo),
        op::BINARY_POWER | op::INPLACE_POWER => binary_int(vm, cur, int::pow),
        op::BINARY_LSHIFT | op::INPLACE_LSHIFT => {
            binary_int(vm, cur, |a, b| Ok(a.wrapping_shl(b as u32)))
        }
        op::BINARY_RSHIFT | op::INPLACE_RSHIFT => {
            binary_int(vm, cur, |a, b| Ok(a.wrapping_shr(b as u32)))
        }
        op::BINARY_AND | op::INPLACE_AND => binary_int(vm, cur, |a, b| Ok(a & b)),
        op::BINARY_XOR | op::INPLACE_XOR => binary_int(vm, cur, |a, b| Ok(a ^ b)),
        op::BINARY_OR | op::INPLACE_OR => binary_int(vm, cur, |a, b| Ok(a | b)),

        op::BINARY_SUBSCR => binary_subscr(vm, cur),
        op::STORE_SUBSCR => store_subscr(vm, cur),

        op::COMPARE_OP => compare_op(vm, cur, operand),

        op::GET_ITER => {
            let v = frame::pop(&mut vm.heap, cur)?;
            match iter::new(&mut vm.heap, v) {
                Ok(it) => frame::push(&mut vm.heap, cur, it),
                Err(e) => {
                    obj::release(&mut vm.heap, v)?;
                    Err(e)
                }
            }
        }

        op::FOR_ITER => {
            let it = frame::peek(&vm.heap, cur, 0)?;
            if obj::tag(&vm.heap, it) != Tag::Sqi {
                return Err(VmError::raise(ReturnCode::ExSys));
            }
            match iter::next(&mut vm.heap, &vm.plat, it) {
                Ok(v) => frame::push(&mut vm.heap, cur, v),
                Err(e) if e.code == ReturnCode::ExStop => {
                    let it = frame::pop(&mut vm.heap, cur)?;
                    obj::release(&mut vm.heap, it)?;
                    let ip = frame::ip(&vm.heap, cur);
                    frame::set_ip(&mut vm.heap, cur, ip + u32::from(operand));
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }

        op::PRINT_ITEM => {
            let v = frame::pop(&mut vm.heap, cur)?;
            let result = obj::print(&vm.heap, &mut vm.plat, v, false);
            obj::release(&mut vm.heap, v)?;
            result
        }

        op::PRINT_NEWLINE => vm.plat.put_byte(b'\n'),

        op::BREAK_LOOP => loop {
            if !frame::has_block(&vm.heap, cur) {
                return Err(VmError::raise(ReturnCode::ExSys));
            }
            let (kind, handler, snapshot) = frame::pop_block(&mut vm.heap, cur)?;
            frame::unwind_to(&mut vm.heap, cur, snapshot)?;
            if kind == BlockKind::Loop {
                frame::set_ip(&mut vm.heap, cur, handler);
                return Ok(());
            }
        },

        op::CONTINUE_LOOP => {
            jump_abs(vm, cur, operand);
            Ok(())
        }

        op::RETURN_VALUE => {
            let retval = frame::pop(&mut vm.heap, cur)?;
            let back = frame::back(&vm.heap, cur);
            let was_import = frame::is_import(&vm.heap, cur);
            thread::set_frame(&mut vm.heap, thr, back);
            obj::release(&mut vm.heap, cur)?;
            if back.is_null() || was_import {
                // Thread finished, or the module object already sits on
                // the importer's stack
                obj::release(&mut vm.heap, retval)
            } else {
                frame::push(&mut vm.heap, back, retval)
            }
        }

        op::POP_BLOCK => {
            frame::pop_block(&mut vm.heap, cur)?;
            Ok(())
        }

        op::END_FINALLY => {
            let v = frame::pop(&mut vm.heap, cur)?;
            if obj::tag(&vm.heap, v) == Tag::Exn {
                let kind = exn::kind(&vm.heap, v);
                obj::release(&mut vm.heap, v)?;
                let code = ReturnCode::from_raw(kind).unwrap_or(ReturnCode::ExSys);
                return Err(VmError::raise(code));
            }
            obj::release(&mut vm.heap, v)
        }

        op::SETUP_LOOP | op::SETUP_EXCEPT | op::SETUP_FINALLY => {
            let kind = match opcode {
                op::SETUP_LOOP => BlockKind::Loop,
                op::SETUP_EXCEPT => BlockKind::Except,
                _ => BlockKind::Finally,
            };
            let handler = frame::ip(&vm.heap, cur) + u32::from(operand);
            frame::push_block(&mut vm.heap, cur, kind, handler)
        }

        op::RAISE_VARARGS => match operand {
            0 => {
                let Some(kind) = vm.last_raise else {
                    return Err(VmError::raise(ReturnCode::ExSys));
                };
                Err(VmError::raise(kind))
            }
            1 => {
                let v = frame::pop(&mut vm.heap, cur)?;
                if obj::tag(&vm.heap, v) != Tag::Exn {
                    obj::release(&mut vm.heap, v)?;
                    return Err(VmError::raise(ReturnCode::ExType));
                }
                let kind = exn::kind(&vm.heap, v);
                obj::release(&mut vm.heap, v)?;
                let code = ReturnCode::from_raw(kind).unwrap_or(ReturnCode::ExSys);
                Err(VmError::raise(code))
            }
            _ => Err(VmError::raise(ReturnCode::ExSys)),
        },

        op::STORE_NAME => {
            let attrs = frame::attrs_of(&vm.heap, cur);
            store_into_dict(vm, cur, attrs, operand)
        }

        op::STORE_GLOBAL => {
            let globals = frame::globals_of(&vm.heap, cur);
            store_into_dict(vm, cur, globals, operand)
        }

        op::STORE_FAST => {
            let v = frame::pop(&mut vm.heap, cur)?;
            frame::set_local(&mut vm.heap, cur, operand, v)
        }

        op::STORE_ATTR => store_attr(vm, cur, operand),

        op::LOAD_CONST => {
            let consts = code::consts(&vm.heap, frame_code(vm, cur));
            let v = tuple::get_item(&vm.heap, consts, i32::from(operand))?;
            obj::inc_ref(&mut vm.heap, v);
            frame::push(&mut vm.heap, cur, v)
        }

        op::LOAD_FAST => {
            let v = frame::get_local(&vm.heap, cur, operand)?;
            obj::inc_ref(&mut vm.heap, v);
            frame::push(&mut vm.heap, cur, v)
        }

        op::LOAD_NAME => {
            let name = name_at(vm, cur, operand)?;
            let attrs = frame::attrs_of(&vm.heap, cur);
            let globals = frame::globals_of(&vm.heap, cur);
            let v = lookup_name(vm, name, &[attrs, globals, vm.builtins])?;
            obj::inc_ref(&mut vm.heap, v);
            frame::push(&mut vm.heap, cur, v)
        }

        op::LOAD_GLOBAL => {
            let name = name_at(vm, cur, operand)?;
            let globals = frame::globals_of(&vm.heap, cur);
            let v = lookup_name(vm, name, &[globals, vm.builtins])?;
            obj::inc_ref(&mut vm.heap, v);
            frame::push(&mut vm.heap, cur, v)
        }

        op::LOAD_ATTR => load_attr(vm, cur, operand),

        op::BUILD_TUPLE => {
            let tup = tuple::new(&mut vm.heap, operand)?;
            for i in (0..operand).rev() {
                let v = frame::pop(&mut vm.heap, cur)?;
                tuple::set_item_raw(&mut vm.heap, tup, i, v);
            }
            frame::push(&mut vm.heap, cur, tup)
        }

        op::BUILD_LIST => {
            let mut items = Vec::with_capacity(operand as usize);
            for _ in 0..operand {
                items.push(frame::pop(&mut vm.heap, cur)?);
            }
            let lst = list::new(&mut vm.heap)?;
            for v in items.into_iter().rev() {
                list::append(&mut vm.heap, lst, v)?;
            }
            frame::push(&mut vm.heap, cur, lst)
        }

        op::BUILD_MAP => {
            let d = dict::new(&mut vm.heap)?;
            frame::push(&mut vm.heap, cur, d)
        }

        op::IMPORT_NAME => import_name(vm, thr, cur, operand),

        op::JUMP_FORWARD => {
            let ip = frame::ip(&vm.heap, cur);
            frame::set_ip(&mut vm.heap, cur, ip + u32::from(operand));
            Ok(())
        }

        op::JUMP_ABSOLUTE => {
            jump_abs(vm, cur, operand);
            Ok(())
        }

        op::POP_JUMP_IF_FALSE | op::POP_JUMP_IF_TRUE => {
            let v = frame::pop(&mut vm.heap, cur)?;
            let falsy = obj::is_false(&vm.heap, v);
            obj::release(&mut vm.heap, v)?;
            if falsy == (opcode == op::POP_JUMP_IF_FALSE) {
                jump_abs(vm, cur, operand);
            }
            Ok(())
        }

        op::JUMP_IF_FALSE_OR_POP | op::JUMP_IF_TRUE_OR_POP => {
            let v = frame::peek(&vm.heap, cur, 0)?;
            let falsy = obj::is_false(&vm.heap, v);
            if falsy == (opcode == op::JUMP_IF_FALSE_OR_POP) {
                jump_abs(vm, cur, operand);
            } else {
                let v = frame::pop(&mut vm.heap, cur)?;
                obj::release(&mut vm.heap, v)?;
            }
            Ok(())
        }

        op::SET_LINENO => {
            frame::set_line(&mut vm.heap, cur, operand);
            Ok(())
        }

        op::CALL_FUNCTION => call_function(vm, thr, cur, operand),

        op::MAKE_FUNCTION => make_function(vm, cur, operand),

        _ => Err(VmError::raise(ReturnCode::ExSys)),
    }
}

/// Pop one integer operand, apply `f`, push a fresh integer.
fn unary_int<P: Platform, F>(vm: &mut Vm<P>, cur: Ref, f: F) -> VmResult<()>
where
    F: FnOnce(i32) -> VmResult<i32>,
{
    let a = frame::pop(&mut vm.heap, cur)?;
    let value = if obj::tag(&vm.heap, a) == Tag::Int {
        Ok(int::value(&vm.heap, a))
    } else {
        Err(VmError::raise(ReturnCode::ExType))
    };
    obj::release(&mut vm.heap, a)?;
    let v = f(value?)?;
    let r = int::new(&mut vm.heap, &vm.singletons, v)?;
    frame::push(&mut vm.heap, cur, r)
}

/// Pop two integer operands, apply `f`, push a fresh integer. Non-integer
/// operands raise `TYPE`.
fn binary_int<P: Platform, F>(vm: &mut Vm<P>, cur: Ref, f: F) -> VmResult<()>
where
    F: FnOnce(i32, i32) -> VmResult<i32>,
{
    let b = frame::pop(&mut vm.heap, cur)?;
    let a = frame::pop(&mut vm.heap, cur)?;
    let values = if obj::tag(&vm.heap, a) == Tag::Int && obj::tag(&vm.heap, b) == Tag::Int {
        Ok((int::value(&vm.heap, a), int::value(&vm.heap, b)))
    } else {
        Err(VmError::raise(ReturnCode::ExType))
    };
    release_all(vm, &[a, b])?;
    let (a, b) = values?;
    let v = f(a, b)?;
    let r = int::new(&mut vm.heap, &vm.singletons, v)?;
    frame::push(&mut vm.heap, cur, r)
}

fn binary_subscr<P: Platform>(vm: &mut Vm<P>, cur: Ref) -> VmResult<()> {
    let idx = frame::pop(&mut vm.heap, cur)?;
    let container = frame::pop(&mut vm.heap, cur)?;
    let idx_val = if obj::tag(&vm.heap, idx) == Tag::Int {
        Some(int::value(&vm.heap, idx))
    } else {
        None
    };
    let result = match (obj::tag(&vm.heap, container), idx_val) {
        // A subscripted string yields a fresh single-byte string
        (Tag::Str, Some(i)) => string::subscript(&mut vm.heap, &vm.plat, container, i),
        (Tag::Tup, Some(i)) => tuple::get_item(&vm.heap, container, i).map(|v| {
            obj::inc_ref(&mut vm.heap, v);
            v
        }),
        (Tag::Lst, Some(i)) => list::get_item(&vm.heap, container, i).map(|v| {
            obj::inc_ref(&mut vm.heap, v);
            v
        }),
        (Tag::Dic, _) => dict::get_item(&vm.heap, &vm.plat, container, idx).map(|v| {
            obj::inc_ref(&mut vm.heap, v);
            v
        }),
        _ => Err(VmError::raise(ReturnCode::ExType)),
    };
    release_all(vm, &[idx, container])?;
    let v = result?;
    frame::push(&mut vm.heap, cur, v)
}

fn store_subscr<P: Platform>(vm: &mut Vm<P>, cur: Ref) -> VmResult<()> {
    let idx = frame::pop(&mut vm.heap, cur)?;
    let container = frame::pop(&mut vm.heap, cur)?;
    let val = frame::pop(&mut vm.heap, cur)?;
    match obj::tag(&vm.heap, container) {
        Tag::Lst => {
            if obj::tag(&vm.heap, idx) != Tag::Int {
                release_all(vm, &[idx, container, val])?;
                return Err(VmError::raise(ReturnCode::ExType));
            }
            let i = int::value(&vm.heap, idx);
            let result = list::set_item(&mut vm.heap, container, i, val);
            release_all(vm, &[idx, container])?;
            result
        }
        Tag::Dic => {
            let result = dict::set_item(&mut vm.heap, &vm.plat, container, idx, val);
            obj::release(&mut vm.heap, container)?;
            result
        }
        _ => {
            release_all(vm, &[idx, container, val])?;
            Err(VmError::raise(ReturnCode::ExType))
        }
    }
}

fn compare_op<P: Platform>(vm: &mut Vm<P>, cur: Ref, operand: u16) -> VmResult<()> {
    let b = frame::pop(&mut vm.heap, cur)?;
    let a = frame::pop(&mut vm.heap, cur)?;
    let numeric = |r: Ref| matches!(obj::tag(&vm.heap, r), Tag::Int | Tag::Flt);
    let result: VmResult<bool> = match operand {
        cmp::LT | cmp::LE | cmp::GT | cmp::GE => {
            if numeric(a) && numeric(b) {
                let (x, y) = (int::value(&vm.heap, a), int::value(&vm.heap, b));
                Ok(match operand {
                    cmp::LT => x < y,
                    cmp::LE => x <= y,
                    cmp::GT => x > y,
                    _ => x >= y,
                })
            } else {
                Err(VmError::raise(ReturnCode::ExType))
            }
        }
        cmp::EQ => Ok(obj::compare(&vm.heap, &vm.plat, a, b)),
        cmp::NE => Ok(!obj::compare(&vm.heap, &vm.plat, a, b)),
        cmp::IN => obj::contains(&vm.heap, &vm.plat, b, a),
        cmp::NOT_IN => obj::contains(&vm.heap, &vm.plat, b, a).map(|c| !c),
        cmp::IS => Ok(a == b),
        cmp::IS_NOT => Ok(a != b),
        cmp::EXC_MATCH => {
            if obj::tag(&vm.heap, a) == Tag::Exn && obj::tag(&vm.heap, b) == Tag::Exn {
                Ok(exn::kind(&vm.heap, a) == exn::kind(&vm.heap, b))
            } else {
                Err(VmError::raise(ReturnCode::ExType))
            }
        }
        _ => Err(VmError::raise(ReturnCode::ExSys)),
    };
    release_all(vm, &[a, b])?;
    let truth = result?;
    let r = int::new(&mut vm.heap, &vm.singletons, i32::from(truth))?;
    frame::push(&mut vm.heap, cur, r)
}

/// Look `name` up through the given dicts in order; `NAME` when absent.
fn lookup_name<P: Platform>(vm: &Vm<P>, name: Ref, scopes: &[Ref]) -> VmResult<Ref> {
    for &scope in scopes {
        if scope.is_null() {
            continue;
        }
        match dict::get_item(&vm.heap, &vm.plat, scope, name) {
            Ok(v) => return Ok(v),
            Err(e) if e.code == ReturnCode::ExKey => {}
            Err(e) => return Err(e),
        }
    }
    Err(VmError::raise(ReturnCode::ExName))
}

/// Pop TOS and store it under `names[operand]` in `target`.
fn store_into_dict<P: Platform>(
    vm: &mut Vm<P>,
    cur: Ref,
    target: Ref,
    operand: u16,
) -> VmResult<()> {
    let val = frame::pop(&mut vm.heap, cur)?;
    if target.is_null() {
        obj::release(&mut vm.heap, val)?;
        return Err(VmError::raise(ReturnCode::ExSys));
    }
    let name = name_at(vm, cur, operand)?;
    obj::inc_ref(&mut vm.heap, name);
    dict::set_item(&mut vm.heap, &vm.plat, target, name, val)
}

/// The attrs dict backing attribute access on `obj`, or `ATTR` when the
/// tag has none.
fn attrs_dict_of<P: Platform>(vm: &Vm<P>, r: Ref) -> VmResult<Ref> {
    match obj::tag(&vm.heap, r) {
        Tag::Fxn | Tag::Mod => Ok(func::attrs(&vm.heap, r)),
        Tag::Clo => Ok(func::class_attrs(&vm.heap, r)),
        Tag::Cli => Ok(func::instance_attrs(&vm.heap, r)),
        _ => Err(VmError::raise(ReturnCode::ExAttr)),
    }
}

fn load_attr<P: Platform>(vm: &mut Vm<P>, cur: Ref, operand: u16) -> VmResult<()> {
    let name = name_at(vm, cur, operand)?;
    let o = frame::pop(&mut vm.heap, cur)?;
    let result = attrs_dict_of(vm, o).and_then(|attrs| {
        match dict::get_item(&vm.heap, &vm.plat, attrs, name) {
            Ok(v) => Ok(v),
            Err(e) if e.code == ReturnCode::ExKey => {
                // Instance attribute misses fall back to the class
                if obj::tag(&vm.heap, o) == Tag::Cli {
                    let class = func::instance_class(&vm.heap, o);
                    let cattrs = func::class_attrs(&vm.heap, class);
                    dict::get_item(&vm.heap, &vm.plat, cattrs, name)
                        .map_err(|_| VmError::raise(ReturnCode::ExAttr))
                } else {
                    Err(VmError::raise(ReturnCode::ExAttr))
                }
            }
            Err(e) => Err(e),
        }
    });
    obj::release(&mut vm.heap, o)?;
    let v = result?;
    obj::inc_ref(&mut vm.heap, v);
    frame::push(&mut vm.heap, cur, v)
}

fn store_attr<P: Platform>(vm: &mut Vm<P>, cur: Ref, operand: u16) -> VmResult<()> {
    let o = frame::pop(&mut vm.heap, cur)?;
    let val = frame::pop(&mut vm.heap, cur)?;
    match attrs_dict_of(vm, o) {
        Ok(attrs) => {
            let name = name_at(vm, cur, operand)?;
            obj::inc_ref(&mut vm.heap, name);
            let result = dict::set_item(&mut vm.heap, &vm.plat, attrs, name, val);
            obj::release(&mut vm.heap, o)?;
            result
        }
        Err(e) => {
            release_all(vm, &[o, val])?;
            Err(e)
        }
    }
}

fn import_name<P: Platform>(vm: &mut Vm<P>, thr: Ref, cur: Ref, operand: u16) -> VmResult<()> {
    let name = name_at(vm, cur, operand)?;
    if obj::tag(&vm.heap, name) != Tag::Str {
        return Err(VmError::raise(ReturnCode::ExSys));
    }
    let len = string::length(&vm.heap, name);
    let mut name_bytes = Vec::with_capacity(len as usize);
    for i in 0..len {
        name_bytes.push(string::byte_at(&vm.heap, &vm.plat, name, i));
    }

    let module = image::mod_import(
        &mut vm.heap,
        &vm.plat,
        &vm.singletons,
        &vm.img_dir,
        &name_bytes,
    )?;
    // The importer's stack receives the module object now; the import
    // frame's return value is discarded instead.
    frame::push(&mut vm.heap, cur, module)?;

    let import_frame = frame::new(&mut vm.heap, &vm.plat, &vm.singletons, module)?;
    frame::set_is_import(&mut vm.heap, import_frame);
    frame::set_back(&mut vm.heap, import_frame, cur);
    thread::set_frame(&mut vm.heap, thr, import_frame);
    Ok(())
}

fn call_function<P: Platform>(
    vm: &mut Vm<P>,
    thr: Ref,
    cur: Ref,
    operand: u16,
) -> VmResult<()> {
    let argc = (operand & 0xFF) as usize;
    let kwargc = (operand >> 8) as usize;
    if kwargc != 0 {
        // Keyword arguments are not supported: drain the stack entries
        // before raising
        for _ in 0..(argc + 2 * kwargc + 1) {
            let v = frame::pop(&mut vm.heap, cur)?;
            obj::release(&mut vm.heap, v)?;
        }
        return Err(VmError::raise(ReturnCode::ExSys));
    }

    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        args.push(frame::pop(&mut vm.heap, cur)?);
    }
    args.reverse();
    let callable = frame::pop(&mut vm.heap, cur)?;

    match obj::tag(&vm.heap, callable) {
        Tag::Fxn => {
            let co = func::code_obj(&vm.heap, callable);
            match obj::tag(&vm.heap, co) {
                Tag::Cob => call_code(vm, thr, cur, callable, args),
                Tag::Nob => call_native(vm, cur, callable, co, args),
                _ => {
                    args.push(callable);
                    release_all(vm, &args)?;
                    Err(VmError::raise(ReturnCode::ExType))
                }
            }
        }
        Tag::Nob => call_native(vm, cur, callable, callable, args),
        Tag::Clo => {
            if !args.is_empty() {
                args.push(callable);
                release_all(vm, &args)?;
                return Err(VmError::raise(ReturnCode::ExNumArgs));
            }
            let instance = func::instance_new(&mut vm.heap, callable);
            obj::release(&mut vm.heap, callable)?;
            frame::push(&mut vm.heap, cur, instance?)
        }
        _ => {
            args.push(callable);
            release_all(vm, &args)?;
            Err(VmError::raise(ReturnCode::ExType))
        }
    }
}

/// Call a function over a code object: build the callee frame, populate
/// its first locals from the arguments (padding with defaults), switch
/// the thread to it.
fn call_code<P: Platform>(
    vm: &mut Vm<P>,
    thr: Ref,
    cur: Ref,
    callable: Ref,
    mut args: Vec<Ref>,
) -> VmResult<()> {
    let co = func::code_obj(&vm.heap, callable);
    let declared = code::argcount(&vm.heap, &vm.plat, co) as usize;

    let defaults = func::defaults(&vm.heap, callable);
    if args.len() < declared && !defaults.is_null() {
        let dl = tuple::length(&vm.heap, defaults) as usize;
        let missing = declared - args.len();
        if missing <= dl {
            for i in (dl - missing)..dl {
                let d = tuple::item(&vm.heap, defaults, i as u16);
                obj::inc_ref(&mut vm.heap, d);
                args.push(d);
            }
        }
    }
    if args.len() != declared {
        args.push(callable);
        release_all(vm, &args)?;
        return Err(VmError::raise(ReturnCode::ExNumArgs));
    }

    let callee = match frame::new(&mut vm.heap, &vm.plat, &vm.singletons, callable) {
        Ok(f) => f,
        Err(e) => {
            args.push(callable);
            release_all(vm, &args)?;
            return Err(e);
        }
    };
    for (i, arg) in args.into_iter().enumerate() {
        frame::set_local(&mut vm.heap, callee, i as u16, arg)?;
    }
    obj::release(&mut vm.heap, callable)?;

    frame::set_back(&mut vm.heap, callee, cur);
    thread::set_frame(&mut vm.heap, thr, callee);
    Ok(())
}

/// Invoke a native function and push its result.
fn call_native<P: Platform>(
    vm: &mut Vm<P>,
    cur: Ref,
    callable: Ref,
    nob: Ref,
    args: Vec<Ref>,
) -> VmResult<()> {
    let declared = code::no_argcount(&vm.heap, nob);
    if declared != code::NO_VARARGS && args.len() != declared as usize {
        let mut refs = args;
        refs.push(callable);
        release_all(vm, &refs)?;
        return Err(VmError::raise(ReturnCode::ExNumArgs));
    }
    let index = code::no_funcindex(&vm.heap, nob);
    let result = if index < builtins::BUILTIN_COUNT {
        builtins::call(vm, cur, index, &args)
    } else {
        vm.plat.native(&mut vm.heap, &vm.singletons, index, &args)
    };
    let mut refs = args;
    refs.push(callable);
    release_all(vm, &refs)?;
    let v = result?;
    frame::push(&mut vm.heap, cur, v)
}

fn make_function<P: Platform>(vm: &mut Vm<P>, cur: Ref, operand: u16) -> VmResult<()> {
    let co = frame::pop(&mut vm.heap, cur)?;
    if obj::tag(&vm.heap, co) != Tag::Cob {
        obj::release(&mut vm.heap, co)?;
        return Err(VmError::raise(ReturnCode::ExType));
    }
    let globals = frame::globals_of(&vm.heap, cur);
    let fxn = match func::new(&mut vm.heap, co, globals) {
        Ok(f) => f,
        Err(e) => {
            obj::release(&mut vm.heap, co)?;
            return Err(e);
        }
    };
    obj::release(&mut vm.heap, co)?;

    if operand > 0 {
        let tup = tuple::new(&mut vm.heap, operand)?;
        for i in (0..operand).rev() {
            let d = frame::pop(&mut vm.heap, cur)?;
            tuple::set_item_raw(&mut vm.heap, tup, i, d);
        }
        func::set_defaults(&mut vm.heap, fxn, tup)?;
    }
    frame::push(&mut vm.heap, cur, fxn)
}
