// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the platform contract helpers and the mock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use picopy_abi::MemSpace;

use super::{MockPlatform, Platform, mem_get_int, mem_get_word};

#[test]
fn bytes_post_increment_cursor() {
    let plat = MockPlatform::with_prog(vec![0xAA, 0xBB, 0xCC]);
    let mut cursor = 0;
    assert_eq!(plat.mem_get_byte(MemSpace::Prog, &mut cursor), 0xAA);
    assert_eq!(plat.mem_get_byte(MemSpace::Prog, &mut cursor), 0xBB);
    assert_eq!(cursor, 2);
}

#[test]
fn unsupported_space_reads_zero_without_moving() {
    let plat = MockPlatform::with_prog(vec![0xAA]);
    let mut cursor = 0;
    assert_eq!(plat.mem_get_byte(MemSpace::Eeprom, &mut cursor), 0);
    assert_eq!(plat.mem_get_byte(MemSpace::Other2, &mut cursor), 0);
    assert_eq!(cursor, 0);
}

#[test]
fn reads_past_end_are_zero() {
    let plat = MockPlatform::with_prog(vec![0x42]);
    let mut cursor = 5;
    assert_eq!(plat.mem_get_byte(MemSpace::Prog, &mut cursor), 0);
    assert_eq!(cursor, 6);
}

#[test]
fn word_and_int_are_little_endian() {
    let plat = MockPlatform::with_prog(vec![0x34, 0x12, 0x78, 0x56, 0x34, 0x12]);
    let mut cursor = 0;
    assert_eq!(mem_get_word(&plat, MemSpace::Prog, &mut cursor), 0x1234);
    assert_eq!(mem_get_int(&plat, MemSpace::Prog, &mut cursor), 0x1234_5678);
    assert_eq!(cursor, 6);
}

#[test]
fn negative_int() {
    let plat = MockPlatform::with_prog(vec![0xFF, 0xFF, 0xFF, 0xFF]);
    let mut cursor = 0;
    assert_eq!(mem_get_int(&plat, MemSpace::Prog, &mut cursor), -1);
}

#[test]
fn scripted_input_then_io_error() {
    let mut plat = MockPlatform {
        input: vec![b'x'],
        ..MockPlatform::default()
    };
    assert_eq!(plat.get_byte().unwrap(), b'x');
    let err = plat.get_byte().unwrap_err();
    assert_eq!(err.code, picopy_abi::ReturnCode::ExIo);
}

#[test]
fn output_is_captured() {
    let mut plat = MockPlatform::default();
    plat.put_byte(b'h').unwrap();
    plat.put_byte(b'i').unwrap();
    assert_eq!(plat.output(), b"hi");
}
