// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for frames, their evaluation stacks and block stacks.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use picopy_abi::{MemSpace, ReturnCode};

use super::frame::BlockKind;
use super::{Ref, Singletons, dict, frame, func, int, release};
use crate::heap::Heap;
use crate::image;
use crate::platform::MockPlatform;
use crate::testimg;

/// A function frame over a code image with the given sizes.
fn setup(stacksize: u8, nlocals: u8) -> (Heap, Singletons, MockPlatform, Ref) {
    let img = testimg::code_img(stacksize, nlocals, 0, &[b"f"], &[testimg::obj_none()], &[]);
    let plat = MockPlatform::with_prog(img);
    let mut heap = Heap::new(8192);
    let singletons = Singletons::init(&mut heap).unwrap();

    let mut cursor = 0;
    let co = image::load_obj(
        &mut heap,
        &plat,
        &singletons,
        MemSpace::Prog,
        &mut cursor,
        Ref::NULL,
    )
    .unwrap();
    let globals = dict::new(&mut heap).unwrap();
    let f = func::new(&mut heap, co, globals).unwrap();
    release(&mut heap, co).unwrap();
    release(&mut heap, globals).unwrap();

    let frm = frame::new(&mut heap, &plat, &singletons, f).unwrap();
    release(&mut heap, f).unwrap();
    (heap, singletons, plat, frm)
}

#[test]
fn new_frame_reads_sizes_from_image() {
    let (heap, s, _p, frm) = setup(4, 3);
    assert_eq!(frame::nlocals(&heap, frm), 3);
    assert_eq!(frame::sp(&heap, frm), 3);
    assert!(!frame::is_import(&heap, frm));
    assert!(frame::back(&heap, frm).is_null());
    // Locals start as None
    for i in 0..3 {
        assert_eq!(frame::get_local(&heap, frm, i).unwrap(), s.none);
    }
}

#[test]
fn stack_push_pop() {
    let (mut heap, s, _p, frm) = setup(4, 1);
    let a = int::new(&mut heap, &s, 10).unwrap();
    let b = int::new(&mut heap, &s, 20).unwrap();
    frame::push(&mut heap, frm, a).unwrap();
    frame::push(&mut heap, frm, b).unwrap();
    assert_eq!(frame::sp(&heap, frm), 3);
    assert_eq!(frame::peek(&heap, frm, 0).unwrap(), b);
    assert_eq!(frame::peek(&heap, frm, 1).unwrap(), a);
    assert_eq!(frame::pop(&mut heap, frm).unwrap(), b);
    assert_eq!(frame::pop(&mut heap, frm).unwrap(), a);
    release(&mut heap, a).unwrap();
    release(&mut heap, b).unwrap();
}

#[test]
fn stack_overflow_is_fatal() {
    let (mut heap, s, _p, frm) = setup(2, 0);
    for _ in 0..2 {
        let v = int::new(&mut heap, &s, 7).unwrap();
        frame::push(&mut heap, frm, v).unwrap();
    }
    let v = int::new(&mut heap, &s, 7).unwrap();
    let err = frame::push(&mut heap, frm, v).unwrap_err();
    assert_eq!(err.code, ReturnCode::AssertFail);
}

#[test]
fn stack_underflow_is_fatal() {
    let (mut heap, _s, _p, frm) = setup(2, 2);
    let err = frame::pop(&mut heap, frm).unwrap_err();
    assert_eq!(err.code, ReturnCode::AssertFail);
}

#[test]
fn locals_replace_and_release() {
    let (mut heap, s, _p, frm) = setup(2, 1);
    let before = heap.avail();
    let v = int::new(&mut heap, &s, 42).unwrap();
    frame::set_local(&mut heap, frm, 0, v).unwrap();
    assert_eq!(frame::get_local(&heap, frm, 0).unwrap(), v);
    // Replacing releases the previous value
    let w = int::new(&mut heap, &s, 43).unwrap();
    frame::set_local(&mut heap, frm, 0, w).unwrap();
    assert_eq!(heap.avail(), before - 12);
}

#[test]
fn block_stack_push_pop() {
    let (mut heap, s, _p, frm) = setup(4, 0);
    let v = int::new(&mut heap, &s, 5).unwrap();
    frame::push(&mut heap, frm, v).unwrap();

    frame::push_block(&mut heap, frm, BlockKind::Loop, 0x100).unwrap();
    frame::push_block(&mut heap, frm, BlockKind::Except, 0x200).unwrap();
    assert!(frame::has_block(&heap, frm));

    let (kind, handler, snapshot) = frame::pop_block(&mut heap, frm).unwrap();
    assert_eq!(kind, BlockKind::Except);
    assert_eq!(handler, 0x200);
    assert_eq!(snapshot, 1);

    let (kind, handler, _) = frame::pop_block(&mut heap, frm).unwrap();
    assert_eq!(kind, BlockKind::Loop);
    assert_eq!(handler, 0x100);
    assert!(!frame::has_block(&heap, frm));

    let err = frame::pop_block(&mut heap, frm).unwrap_err();
    assert_eq!(err.code, ReturnCode::AssertFail);
}

#[test]
fn unwind_to_releases_stack_entries() {
    let (mut heap, s, _p, frm) = setup(6, 0);
    frame::push_block(&mut heap, frm, BlockKind::Except, 0x80).unwrap();
    let snapshot = frame::sp(&heap, frm);
    for i in 0..4 {
        let v = int::new(&mut heap, &s, 100 + i).unwrap();
        frame::push(&mut heap, frm, v).unwrap();
    }
    frame::unwind_to(&mut heap, frm, snapshot).unwrap();
    assert_eq!(frame::sp(&heap, frm), snapshot);
}

#[test]
fn frame_destruction_restores_heap_bytes() {
    let img = testimg::code_img(4, 2, 0, &[b"f"], &[testimg::obj_none()], &[]);
    let plat = MockPlatform::with_prog(img);
    let mut heap = Heap::new(8192);
    let singletons = Singletons::init(&mut heap).unwrap();
    let baseline = heap.avail();

    let mut cursor = 0;
    let co = image::load_obj(
        &mut heap,
        &plat,
        &singletons,
        MemSpace::Prog,
        &mut cursor,
        Ref::NULL,
    )
    .unwrap();
    let globals = dict::new(&mut heap).unwrap();
    let f = func::new(&mut heap, co, globals).unwrap();
    release(&mut heap, co).unwrap();
    release(&mut heap, globals).unwrap();

    let frm = frame::new(&mut heap, &plat, &singletons, f).unwrap();
    release(&mut heap, f).unwrap();

    // Leave values on the stack and a block pending; teardown releases
    // them all
    let v = int::new(&mut heap, &singletons, 1234).unwrap();
    frame::push(&mut heap, frm, v).unwrap();
    frame::push_block(&mut heap, frm, BlockKind::Finally, 0x40).unwrap();

    release(&mut heap, frm).unwrap();
    assert_eq!(heap.avail(), baseline);
}
