// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the image loader and module directory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use picopy_abi::{MemSpace, ReturnCode};

use super::{load_obj, mod_import, scan};
use crate::heap::Heap;
use crate::obj::{self, Ref, Singletons, Tag, code, func, int, string, tuple};
use crate::platform::MockPlatform;
use crate::testimg;

fn setup(prog: Vec<u8>) -> (Heap, Singletons, MockPlatform) {
    let mut heap = Heap::new(16 * 1024);
    let singletons = Singletons::init(&mut heap).unwrap();
    (heap, singletons, MockPlatform::with_prog(prog))
}

fn load(heap: &mut Heap, s: &Singletons, plat: &MockPlatform, at: u32) -> (Ref, u32) {
    let mut cursor = at;
    let r = load_obj(heap, plat, s, MemSpace::Prog, &mut cursor, Ref::NULL).unwrap();
    (r, cursor)
}

#[test]
fn loads_none_as_the_singleton() {
    let (mut heap, s, plat) = setup(testimg::obj_none());
    let (r, cursor) = load(&mut heap, &s, &plat, 0);
    assert_eq!(r, s.none);
    assert_eq!(cursor, 1);
}

#[test]
fn loads_integers_and_interns_singletons() {
    let mut prog = testimg::obj_int(0x1234_5678);
    prog.extend_from_slice(&testimg::obj_int(1));
    let (mut heap, s, plat) = setup(prog);

    let (r, cursor) = load(&mut heap, &s, &plat, 0);
    assert_eq!(obj::tag(&heap, r), Tag::Int);
    assert_eq!(int::value(&heap, r), 0x1234_5678);
    assert_eq!(cursor, 5);

    let (one, _) = load(&mut heap, &s, &plat, cursor);
    assert_eq!(one, s.one);
}

#[test]
fn loads_nested_tuples() {
    let inner = testimg::obj_tuple(&[testimg::obj_int(7), testimg::obj_str(b"x")]);
    let outer = testimg::obj_tuple(&[inner, testimg::obj_none()]);
    let (mut heap, s, plat) = setup(outer);
    let (r, _) = load(&mut heap, &s, &plat, 0);

    assert_eq!(obj::tag(&heap, r), Tag::Tup);
    assert_eq!(tuple::length(&heap, r), 2);
    let inner = tuple::item(&heap, r, 0);
    assert_eq!(tuple::length(&heap, inner), 2);
    assert_eq!(int::value(&heap, tuple::item(&heap, inner, 0)), 7);
    assert!(string::eq_bytes(
        &heap,
        &plat,
        tuple::item(&heap, inner, 1),
        b"x"
    ));
    assert_eq!(tuple::item(&heap, r, 1), s.none);
}

#[test]
fn unknown_tag_raises_sys() {
    let (mut heap, s, plat) = setup(vec![0x7F]);
    let mut cursor = 0;
    let err =
        load_obj(&mut heap, &plat, &s, MemSpace::Prog, &mut cursor, Ref::NULL).unwrap_err();
    assert_eq!(err.code, ReturnCode::ExSys);
}

#[test]
fn loads_native_image() {
    let (mut heap, s, plat) = setup(testimg::obj_nim(2, 0x0145));
    let (r, _) = load(&mut heap, &s, &plat, 0);
    assert_eq!(obj::tag(&heap, r), Tag::Nob);
    assert_eq!(code::no_argcount(&heap, r), 2);
    assert_eq!(code::no_funcindex(&heap, r), 0x0145);
}

#[test]
fn loads_code_image() {
    let bytecode = [0x01, 0x53];
    let img = testimg::code_img(
        4,
        1,
        0,
        &[b"print", b"mymod"],
        &[testimg::obj_none(), testimg::obj_int(99)],
        &bytecode,
    );
    let img_len = img.len() as u32;
    let (mut heap, s, plat) = setup(img);
    let (co, cursor) = load(&mut heap, &s, &plat, 0);

    assert_eq!(obj::tag(&heap, co), Tag::Cob);
    assert_eq!(cursor, img_len);
    assert_eq!(code::space(&heap, co), MemSpace::Prog);
    assert_eq!(code::imgaddr(&heap, co), 0);
    assert_eq!(code::codeaddr(&heap, co), img_len - 2);

    let names = code::names(&heap, co);
    assert_eq!(tuple::length(&heap, names), 2);
    assert!(string::eq_bytes(&heap, &plat, tuple::item(&heap, names, 1), b"mymod"));

    let consts = code::consts(&heap, co);
    assert_eq!(tuple::item(&heap, consts, 0), s.none);
    assert_eq!(int::value(&heap, tuple::item(&heap, consts, 1)), 99);

    // Frame sizes come from the image header
    assert_eq!(code::stacksize(&heap, &plat, co), 4);
    assert_eq!(code::nlocals(&heap, &plat, co), 1);
    assert_eq!(code::argcount(&heap, &plat, co), 0);
}

#[test]
fn code_image_strings_are_borrowed_from_prog() {
    let img = testimg::code_img(2, 0, 0, &[b"borrowed"], &[testimg::obj_none()], &[]);
    let (mut heap, s, plat) = setup(img);
    let (co, _) = load(&mut heap, &s, &plat, 0);
    let name = tuple::item(&heap, code::names(&heap, co), 0);
    assert_eq!(string::space(&heap, name), MemSpace::Prog);
    assert!(string::eq_bytes(&heap, &plat, name, b"borrowed"));
}

#[test]
fn scan_indexes_modules_by_trailing_name() {
    let a = testimg::code_img(2, 0, 0, &[b"main"], &[testimg::obj_none()], &[0x53]);
    let b = testimg::code_img(2, 0, 0, &[b"x", b"helper"], &[testimg::obj_none()], &[0x53]);
    let tbl = testimg::table(&[a.clone(), b]);
    let (_heap, _s, plat) = setup(tbl);

    let dir = scan(&plat, MemSpace::Prog, 0).unwrap();
    assert_eq!(dir.len(), 2);
    assert_eq!(dir.find(b"main").unwrap().addr, 0);
    assert_eq!(dir.find(b"helper").unwrap().addr, a.len() as u32);
    assert!(dir.find(b"absent").is_none());
}

#[test]
fn scan_skips_native_images() {
    let tbl = testimg::table(&[
        testimg::obj_nim(1, 7),
        testimg::code_img(2, 0, 0, &[b"m"], &[testimg::obj_none()], &[0x53]),
    ]);
    let (_heap, _s, plat) = setup(tbl);
    let dir = scan(&plat, MemSpace::Prog, 0).unwrap();
    assert_eq!(dir.len(), 1);
    assert!(dir.find(b"m").is_some());
}

#[test]
fn empty_table_is_empty_directory() {
    let (_heap, _s, plat) = setup(testimg::table(&[]));
    let dir = scan(&plat, MemSpace::Prog, 0).unwrap();
    assert!(dir.is_empty());
}

#[test]
fn import_wraps_code_in_a_module() {
    let tbl = testimg::table(&[testimg::code_img(
        2,
        0,
        0,
        &[b"main"],
        &[testimg::obj_none()],
        &[0x53],
    )]);
    let (mut heap, s, plat) = setup(tbl);
    let dir = scan(&plat, MemSpace::Prog, 0).unwrap();

    let module = mod_import(&mut heap, &plat, &s, &dir, b"main").unwrap();
    assert_eq!(obj::tag(&heap, module), Tag::Mod);
    // Module attrs double as its globals
    assert_eq!(func::attrs(&heap, module), func::globals(&heap, module));
    assert_eq!(obj::tag(&heap, func::code_obj(&heap, module)), Tag::Cob);
}

#[test]
fn import_unknown_module_raises_imprt() {
    let (mut heap, s, plat) = setup(testimg::table(&[]));
    let dir = scan(&plat, MemSpace::Prog, 0).unwrap();
    let err = mod_import(&mut heap, &plat, &s, &dir, b"ghost").unwrap_err();
    assert_eq!(err.code, ReturnCode::ExImprt);
}

#[test]
fn structural_round_trip_of_consts() {
    // Loading and re-serializing the consts tuple reproduces the bytes
    let consts = [
        testimg::obj_none(),
        testimg::obj_int(-7),
        testimg::obj_str(b"s"),
        testimg::obj_tuple(&[testimg::obj_int(1), testimg::obj_int(2)]),
    ];
    let img = testimg::code_img(2, 0, 0, &[b"m"], &consts, &[0x53]);
    let (mut heap, s, plat) = setup(img);
    let (co, _) = load(&mut heap, &s, &plat, 0);

    let loaded = code::consts(&heap, co);
    let reserialized = reserialize(&heap, &plat, &s, loaded);
    let mut expected = Vec::new();
    for c in &consts {
        expected.extend_from_slice(c);
    }
    let mut expected_tuple = vec![picopy_abi::image::tag::TUP, 4, 0];
    expected_tuple.extend_from_slice(&expected);
    assert_eq!(reserialized, expected_tuple);
}

/// Inverse of the loader for the loadable object subset.
fn reserialize(heap: &Heap, plat: &MockPlatform, s: &Singletons, r: Ref) -> Vec<u8> {
    match obj::tag(heap, r) {
        Tag::Non => testimg::obj_none(),
        Tag::Int => testimg::obj_int(int::value(heap, r)),
        Tag::Str => {
            let len = string::length(heap, r);
            let bytes: Vec<u8> = (0..len).map(|i| string::byte_at(heap, plat, r, i)).collect();
            testimg::obj_str(&bytes)
        }
        Tag::Tup => {
            let len = tuple::length(heap, r);
            let items: Vec<Vec<u8>> = (0..len)
                .map(|i| reserialize(heap, plat, s, tuple::item(heap, r, i)))
                .collect();
            testimg::obj_tuple(&items)
        }
        t => panic!("not serializable: {t:?}"),
    }
}

#[test]
fn load_failure_restores_heap_bytes() {
    // A tuple whose second element has an invalid tag
    let mut prog = vec![picopy_abi::image::tag::TUP, 2, 0];
    prog.extend_from_slice(&testimg::obj_int(5));
    prog.push(0x7F);
    let (mut heap, s, plat) = setup(prog);
    let baseline = heap.avail();
    let mut cursor = 0;
    let err =
        load_obj(&mut heap, &plat, &s, MemSpace::Prog, &mut cursor, Ref::NULL).unwrap_err();
    assert_eq!(err.code, ReturnCode::ExSys);
    assert_eq!(heap.avail(), baseline);
}

#[test]
fn dict_is_not_a_loadable_tag() {
    let (mut heap, s, plat) = setup(vec![0x11]);
    let mut cursor = 0;
    let err =
        load_obj(&mut heap, &plat, &s, MemSpace::Prog, &mut cursor, Ref::NULL).unwrap_err();
    assert_eq!(err.code, ReturnCode::ExSys);
}
