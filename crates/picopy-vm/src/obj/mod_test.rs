// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the object model core: descriptors, reference counts,
//! singletons, truthiness, compare and containment.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use picopy_abi::ReturnCode;

use super::*;
use crate::obj::{exn, int, list, string, tuple};
use crate::platform::MockPlatform;

fn setup() -> (Heap, Singletons, MockPlatform) {
    let mut heap = Heap::new(8192);
    let singletons = Singletons::init(&mut heap).unwrap();
    (heap, singletons, MockPlatform::default())
}

#[test]
fn descriptor_round_trip() {
    let (mut heap, _s, _p) = setup();
    let r = heap.get_chunk(8).unwrap();
    init_desc(&mut heap, r, Tag::Exn);
    assert_eq!(tag(&heap, r), Tag::Exn);
    assert_eq!(refcount(&heap, r), 1);
    assert!(!is_static(&heap, r));
    set_static(&mut heap, r);
    assert!(is_static(&heap, r));
    assert_eq!(tag(&heap, r), Tag::Exn);
}

#[test]
fn release_frees_at_zero() {
    let (mut heap, _s, _p) = setup();
    let baseline = heap.avail();
    let r = string::new(&mut heap, b"transient").unwrap();
    assert!(heap.avail() < baseline);
    inc_ref(&mut heap, r);
    release(&mut heap, r).unwrap();
    assert!(heap.avail() < baseline);
    release(&mut heap, r).unwrap();
    assert_eq!(heap.avail(), baseline);
}

#[test]
fn int_singletons_are_interned() {
    let (mut heap, s, _p) = setup();
    let a = int::new(&mut heap, &s, 0).unwrap();
    let b = int::new(&mut heap, &s, 0).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, s.zero);
    let one_a = int::new(&mut heap, &s, 1).unwrap();
    let one_b = int::new(&mut heap, &s, 1).unwrap();
    assert_eq!(one_a, one_b);
    let neg = int::new(&mut heap, &s, -1).unwrap();
    assert_eq!(neg, s.neg_one);
    // Non-singleton values allocate fresh objects
    let x = int::new(&mut heap, &s, 42).unwrap();
    let y = int::new(&mut heap, &s, 42).unwrap();
    assert_ne!(x, y);
}

#[test]
fn singletons_survive_refcount_underflow() {
    let (mut heap, s, _p) = setup();
    for _ in 0..10 {
        release(&mut heap, s.none).unwrap();
        release(&mut heap, s.zero).unwrap();
    }
    assert_eq!(tag(&heap, s.none), Tag::Non);
    assert_eq!(int::value(&heap, s.zero), 0);
    assert!(refcount(&heap, s.zero) >= 1);
}

#[test]
fn truthiness() {
    let (mut heap, s, _p) = setup();
    assert!(is_false(&heap, s.none));
    assert!(is_false(&heap, s.zero));
    assert!(!is_false(&heap, s.one));

    let empty = string::new(&mut heap, b"").unwrap();
    let full = string::new(&mut heap, b"x").unwrap();
    assert!(is_false(&heap, empty));
    assert!(!is_false(&heap, full));

    let lst = list::new(&mut heap).unwrap();
    assert!(is_false(&heap, lst));
    inc_ref(&mut heap, s.one);
    list::append(&mut heap, lst, s.one).unwrap();
    assert!(!is_false(&heap, lst));

    let d = dict::new(&mut heap).unwrap();
    assert!(is_false(&heap, d));

    let t = tuple::new(&mut heap, 0).unwrap();
    assert!(is_false(&heap, t));
}

#[test]
fn compare_same_and_differ() {
    let (mut heap, s, p) = setup();
    let a = int::new(&mut heap, &s, 400).unwrap();
    let b = int::new(&mut heap, &s, 400).unwrap();
    let c = int::new(&mut heap, &s, 401).unwrap();
    assert!(compare(&heap, &p, a, b));
    assert!(!compare(&heap, &p, a, c));

    let sa = string::new(&mut heap, b"abc").unwrap();
    let sb = string::new(&mut heap, b"abc").unwrap();
    let sc = string::new(&mut heap, b"abd").unwrap();
    assert!(compare(&heap, &p, sa, sb));
    assert!(!compare(&heap, &p, sa, sc));

    // Different tags differ
    assert!(!compare(&heap, &p, a, sa));
    assert!(!compare(&heap, &p, s.none, s.zero));
    // None compares same with itself
    assert!(compare(&heap, &p, s.none, s.none));
}

#[test]
fn compare_sequences_elementwise() {
    let (mut heap, s, p) = setup();
    let t1 = tuple::new(&mut heap, 2).unwrap();
    let t2 = tuple::new(&mut heap, 2).unwrap();
    for t in [t1, t2] {
        let x = int::new(&mut heap, &s, 7).unwrap();
        let y = string::new(&mut heap, b"q").unwrap();
        tuple::set_item_raw(&mut heap, t, 0, x);
        tuple::set_item_raw(&mut heap, t, 1, y);
    }
    assert!(compare(&heap, &p, t1, t2));

    let t3 = tuple::new(&mut heap, 1).unwrap();
    let z = int::new(&mut heap, &s, 7).unwrap();
    tuple::set_item_raw(&mut heap, t3, 0, z);
    assert!(!compare(&heap, &p, t1, t3));
}

#[test]
fn contains_in_sequences_and_dict() {
    let (mut heap, s, p) = setup();
    let lst = list::new(&mut heap).unwrap();
    for v in [10, 20, 30] {
        let r = int::new(&mut heap, &s, v).unwrap();
        list::append(&mut heap, lst, r).unwrap();
    }
    let twenty = int::new(&mut heap, &s, 20).unwrap();
    let forty = int::new(&mut heap, &s, 40).unwrap();
    assert!(contains(&heap, &p, lst, twenty).unwrap());
    assert!(!contains(&heap, &p, lst, forty).unwrap());

    let d = dict::new(&mut heap).unwrap();
    let key = string::new(&mut heap, b"k").unwrap();
    inc_ref(&mut heap, s.one);
    dict::set_item(&mut heap, &p, d, key, s.one).unwrap();
    let probe = string::new(&mut heap, b"k").unwrap();
    assert!(contains(&heap, &p, d, probe).unwrap());

    // Containment on a non-container raises TYPE
    let err = contains(&heap, &p, s.one, twenty).unwrap_err();
    assert_eq!(err.code, ReturnCode::ExType);
}

#[test]
fn container_destruction_releases_elements() {
    let (mut heap, s, _p) = setup();
    let baseline = heap.avail();

    let lst = list::new(&mut heap).unwrap();
    for v in [100, 200, 300, 400, 500, 600, 700, 800, 900] {
        let r = int::new(&mut heap, &s, v).unwrap();
        list::append(&mut heap, lst, r).unwrap();
    }
    release(&mut heap, lst).unwrap();
    assert_eq!(heap.avail(), baseline);
}

#[test]
fn tuple_destruction_releases_elements() {
    let (mut heap, s, _p) = setup();
    let baseline = heap.avail();

    let t = tuple::new(&mut heap, 3).unwrap();
    for i in 0..3 {
        let r = int::new(&mut heap, &s, 1000 + i).unwrap();
        tuple::set_item_raw(&mut heap, t, i as u16, r);
    }
    // A shared element survives the tuple
    let shared = tuple::item(&heap, t, 1);
    inc_ref(&mut heap, shared);
    release(&mut heap, t).unwrap();
    assert_eq!(int::value(&heap, shared), 1001);
    release(&mut heap, shared).unwrap();
    assert_eq!(heap.avail(), baseline);
}

#[test]
fn print_int_and_none() {
    let (mut heap, s, mut p) = setup();
    let n = int::new(&mut heap, &s, -321).unwrap();
    print(&heap, &mut p, n, false).unwrap();
    print(&heap, &mut p, s.none, true).unwrap();
    assert_eq!(p.output(), b"-321None");
}

#[test]
fn print_containers_marshalled() {
    let (mut heap, s, mut p) = setup();
    let lst = list::new(&mut heap).unwrap();
    let a = int::new(&mut heap, &s, 1).unwrap();
    list::append(&mut heap, lst, a).unwrap();
    let b = string::new(&mut heap, b"hi").unwrap();
    list::append(&mut heap, lst, b).unwrap();
    print(&heap, &mut p, lst, false).unwrap();
    assert_eq!(p.output(), b"[1, 'hi']");
}

#[test]
fn exception_kind_round_trip() {
    let (mut heap, _s, _p) = setup();
    let e = exn::new(&mut heap, ReturnCode::ExVal).unwrap();
    assert_eq!(tag(&heap, e), Tag::Exn);
    assert_eq!(exn::kind(&heap, e), 0xEE);
}
