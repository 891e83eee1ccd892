// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! In-test image assembler.
//!
//! Interpreter and loader tests feed the VM hand-assembled images in the
//! exact format the offline compiler emits: a type byte, a u16 LE size
//! covering the whole image, the header fields, names and consts tuples,
//! then bytecode. The module name is the last entry of the names tuple.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use picopy_abi::{MemSpace, ReturnCode, image};

use crate::bytecode::op;
use crate::config::VmConfig;
use crate::platform::MockPlatform;
use crate::vm::Vm;

/// Serialized None object.
pub fn obj_none() -> Vec<u8> {
    vec![image::tag::NON]
}

/// Serialized integer object.
pub fn obj_int(v: i32) -> Vec<u8> {
    let mut out = vec![image::tag::INT];
    out.extend_from_slice(&v.to_le_bytes());
    out
}

/// Serialized string object.
pub fn obj_str(s: &[u8]) -> Vec<u8> {
    let mut out = vec![image::tag::STR];
    out.extend_from_slice(&(s.len() as u16).to_le_bytes());
    out.extend_from_slice(s);
    out
}

/// Serialized tuple object.
pub fn obj_tuple(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![image::tag::TUP];
    out.extend_from_slice(&(items.len() as u16).to_le_bytes());
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

/// Serialized native image.
pub fn obj_nim(argcount: u8, funcindex: u16) -> Vec<u8> {
    let mut out = vec![image::tag::NIM, 0, 0, argcount];
    out.extend_from_slice(&funcindex.to_le_bytes());
    let size = out.len() as u16;
    out[1..3].copy_from_slice(&size.to_le_bytes());
    out
}

/// Serialized code image. `names` are string entries (for a module, the
/// module name last); `consts` are pre-serialized objects.
pub fn code_img(
    stacksize: u8,
    nlocals: u8,
    argcount: u8,
    names: &[&[u8]],
    consts: &[Vec<u8>],
    bytecode: &[u8],
) -> Vec<u8> {
    let name_objs: Vec<Vec<u8>> = names.iter().map(|n| obj_str(n)).collect();
    let names_tuple = obj_tuple(&name_objs);
    let consts_tuple = obj_tuple(consts);

    let mut out = vec![image::tag::CIM, 0, 0, stacksize, nlocals, 0, argcount];
    out.extend_from_slice(&names_tuple);
    out.extend_from_slice(&consts_tuple);
    out.extend_from_slice(bytecode);
    let size = out.len() as u16;
    out[1..3].copy_from_slice(&size.to_le_bytes());
    out
}

/// Concatenate images into a table with the sentinel terminator.
pub fn table(images: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for img in images {
        out.extend_from_slice(img);
    }
    out.push(image::IMG_LIST_SENTINEL);
    out
}

/// Tiny bytecode assembler.
#[derive(Default)]
pub struct Asm {
    buf: Vec<u8>,
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a one-byte opcode.
    pub fn op(&mut self, opcode: u8) -> &mut Self {
        assert!(opcode < crate::bytecode::HAVE_ARGUMENT);
        self.buf.push(opcode);
        self
    }

    /// Emit an opcode with a u16 LE operand.
    pub fn arg(&mut self, opcode: u8, operand: u16) -> &mut Self {
        assert!(opcode >= crate::bytecode::HAVE_ARGUMENT);
        self.buf.push(opcode);
        self.buf.extend_from_slice(&operand.to_le_bytes());
        self
    }

    /// Current bytecode offset (for jump targets).
    pub fn here(&self) -> u16 {
        self.buf.len() as u16
    }

    /// Patch the operand of the instruction at `at`.
    pub fn patch(&mut self, at: u16, operand: u16) {
        let at = at as usize;
        self.buf[at + 1..at + 3].copy_from_slice(&operand.to_le_bytes());
    }

    /// Finish with `RETURN_VALUE` of None (consts slot 0 by convention).
    pub fn ret_none(&mut self) -> &mut Self {
        self.arg(op::LOAD_CONST, 0);
        self.op(op::RETURN_VALUE)
    }

    pub fn code(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

/// Run the module `main` from an image table on a mock platform.
pub fn run_table(tbl: Vec<u8>) -> (ReturnCode, Vec<u8>) {
    let (code, vm) = run_table_vm(tbl);
    (code, vm.plat.output)
}

/// Like [`run_table`] but hands back the whole VM for inspection.
pub fn run_table_vm(tbl: Vec<u8>) -> (ReturnCode, Vm<MockPlatform>) {
    let plat = MockPlatform::with_prog(tbl);
    let mut vm = Vm::init(VmConfig::default(), plat, MemSpace::Prog, 0).expect("vm init");
    let code = vm.run(b"main");
    (code, vm)
}
