// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for dict semantics: linear search, in-place overwrite,
//! append-on-miss, insertion-ordered iteration.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use picopy_abi::ReturnCode;

use super::{Singletons, dict, inc_ref, int, release, string};
use crate::heap::Heap;
use crate::platform::MockPlatform;

fn setup() -> (Heap, Singletons, MockPlatform) {
    let mut heap = Heap::new(8192);
    let singletons = Singletons::init(&mut heap).unwrap();
    (heap, singletons, MockPlatform::default())
}

#[test]
fn set_and_get() {
    let (mut heap, s, p) = setup();
    let d = dict::new(&mut heap).unwrap();
    let k = string::new(&mut heap, b"a").unwrap();
    let v = int::new(&mut heap, &s, 5).unwrap();
    dict::set_item(&mut heap, &p, d, k, v).unwrap();
    assert_eq!(dict::length(&heap, d), 1);

    let probe = string::new(&mut heap, b"a").unwrap();
    let got = dict::get_item(&heap, &p, d, probe).unwrap();
    assert_eq!(int::value(&heap, got), 5);
}

#[test]
fn missing_key_raises_key() {
    let (mut heap, _s, p) = setup();
    let d = dict::new(&mut heap).unwrap();
    let probe = string::new(&mut heap, b"nope").unwrap();
    let err = dict::get_item(&heap, &p, d, probe).unwrap_err();
    assert_eq!(err.code, ReturnCode::ExKey);
}

#[test]
fn overwrite_keeps_position_and_length() {
    // d[k1]=v1; d[k2]=v2; d[k1]=v3 iterates as (k1,v3), (k2,v2):
    // k1 remains front-most after the re-assignment
    let (mut heap, s, p) = setup();
    let d = dict::new(&mut heap).unwrap();

    let k1 = string::new(&mut heap, b"k1").unwrap();
    let v1 = int::new(&mut heap, &s, 11).unwrap();
    dict::set_item(&mut heap, &p, d, k1, v1).unwrap();

    let k2 = string::new(&mut heap, b"k2").unwrap();
    let v2 = int::new(&mut heap, &s, 22).unwrap();
    dict::set_item(&mut heap, &p, d, k2, v2).unwrap();

    let k1_again = string::new(&mut heap, b"k1").unwrap();
    let v3 = int::new(&mut heap, &s, 33).unwrap();
    dict::set_item(&mut heap, &p, d, k1_again, v3).unwrap();

    assert_eq!(dict::length(&heap, d), 2);
    assert!(string::eq_bytes(
        &heap,
        &p,
        dict::key_at(&heap, d, 0).unwrap(),
        b"k1"
    ));
    assert_eq!(int::value(&heap, dict::val_at(&heap, d, 0).unwrap()), 33);
    assert!(string::eq_bytes(
        &heap,
        &p,
        dict::key_at(&heap, d, 1).unwrap(),
        b"k2"
    ));
    assert_eq!(int::value(&heap, dict::val_at(&heap, d, 1).unwrap()), 22);
}

#[test]
fn first_insertion_stays_front_most() {
    let (mut heap, s, p) = setup();
    let d = dict::new(&mut heap).unwrap();
    for (i, name) in [&b"a"[..], b"b", b"c"].iter().enumerate() {
        let k = string::new(&mut heap, name).unwrap();
        let v = int::new(&mut heap, &s, i as i32 + 10).unwrap();
        dict::set_item(&mut heap, &p, d, k, v).unwrap();
    }
    assert!(string::eq_bytes(
        &heap,
        &p,
        dict::key_at(&heap, d, 0).unwrap(),
        b"a"
    ));
    assert!(string::eq_bytes(
        &heap,
        &p,
        dict::key_at(&heap, d, 2).unwrap(),
        b"c"
    ));
}

#[test]
fn integer_keys_compare_by_value() {
    let (mut heap, s, p) = setup();
    let d = dict::new(&mut heap).unwrap();
    let k = int::new(&mut heap, &s, 1000).unwrap();
    let v = int::new(&mut heap, &s, 1).unwrap();
    dict::set_item(&mut heap, &p, d, k, v).unwrap();

    let probe = int::new(&mut heap, &s, 1000).unwrap();
    assert!(dict::has_key(&heap, &p, d, probe));
}

#[test]
fn parallel_lists_stay_paired_past_a_segment() {
    // More pairs than one segment holds
    let (mut heap, s, p) = setup();
    let d = dict::new(&mut heap).unwrap();
    for i in 0..20 {
        let k = int::new(&mut heap, &s, i).unwrap();
        let v = int::new(&mut heap, &s, i * 100).unwrap();
        dict::set_item(&mut heap, &p, d, k, v).unwrap();
    }
    assert_eq!(dict::length(&heap, d), 20);
    for i in 0..20 {
        let k = dict::key_at(&heap, d, i).unwrap();
        let v = dict::val_at(&heap, d, i).unwrap();
        assert_eq!(int::value(&heap, k) * 100, int::value(&heap, v));
    }
}

#[test]
fn clear_resets_and_frees() {
    let (mut heap, s, p) = setup();
    let d = dict::new(&mut heap).unwrap();
    let after_new = heap.avail();
    for i in 0..12 {
        let k = int::new(&mut heap, &s, 100 + i).unwrap();
        let v = int::new(&mut heap, &s, 200 + i).unwrap();
        dict::set_item(&mut heap, &p, d, k, v).unwrap();
    }
    dict::clear(&mut heap, d).unwrap();
    assert_eq!(dict::length(&heap, d), 0);
    assert_eq!(heap.avail(), after_new);
}

#[test]
fn update_copies_pairs_in_order() {
    let (mut heap, s, p) = setup();
    let src = dict::new(&mut heap).unwrap();
    for name in [&b"x"[..], b"y"] {
        let k = string::new(&mut heap, name).unwrap();
        let v = int::new(&mut heap, &s, 9).unwrap();
        dict::set_item(&mut heap, &p, src, k, v).unwrap();
    }
    let dest = dict::new(&mut heap).unwrap();
    dict::update(&mut heap, &p, dest, src).unwrap();
    assert_eq!(dict::length(&heap, dest), 2);
    assert!(string::eq_bytes(
        &heap,
        &p,
        dict::key_at(&heap, dest, 0).unwrap(),
        b"x"
    ));
    assert!(string::eq_bytes(
        &heap,
        &p,
        dict::key_at(&heap, dest, 1).unwrap(),
        b"y"
    ));
}

#[test]
fn destruction_restores_heap_bytes() {
    let (mut heap, s, p) = setup();
    let baseline = heap.avail();
    let d = dict::new(&mut heap).unwrap();
    for i in 0..10 {
        let k = int::new(&mut heap, &s, 300 + i).unwrap();
        let v = string::new(&mut heap, b"value").unwrap();
        dict::set_item(&mut heap, &p, d, k, v).unwrap();
    }
    release(&mut heap, d).unwrap();
    assert_eq!(heap.avail(), baseline);
    // Unrelated: singletons are untouched by the teardown
    inc_ref(&mut heap, s.zero);
    release(&mut heap, s.zero).unwrap();
}
