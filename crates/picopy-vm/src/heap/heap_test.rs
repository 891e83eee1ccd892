// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the chunk allocator.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;

use super::Heap;

#[test]
fn new_heap_is_one_free_chunk() {
    let heap = Heap::new(4096);
    assert_eq!(heap.capacity(), 4096);
    assert_eq!(heap.avail(), 4096);
    assert_eq!(heap.free_region_count(), 1);
}

#[test]
fn capacity_rounds_down_to_alignment() {
    let heap = Heap::new(4097);
    assert_eq!(heap.capacity(), 4096);
}

#[test]
fn get_chunk_reduces_avail() {
    let mut heap = Heap::new(4096);
    let r = heap.get_chunk(16).unwrap();
    assert_eq!(heap.chunk_size(r), 16);
    // 16 payload + 4 header
    assert_eq!(heap.avail(), 4096 - 20);
}

#[test]
fn sizes_are_aligned_up() {
    let mut heap = Heap::new(4096);
    let r = heap.get_chunk(5).unwrap();
    assert_eq!(heap.chunk_size(r), 8);
    assert_eq!(heap.avail(), 4096 - 12);
}

#[test]
fn free_restores_single_chunk() {
    let mut heap = Heap::new(4096);
    let r = heap.get_chunk(64).unwrap();
    heap.free_chunk(r).unwrap();
    assert_eq!(heap.avail(), 4096);
    assert_eq!(heap.free_region_count(), 1);
}

#[test]
fn coalesces_with_both_neighbors() {
    let mut heap = Heap::new(4096);
    let a = heap.get_chunk(32).unwrap();
    let b = heap.get_chunk(32).unwrap();
    let c = heap.get_chunk(32).unwrap();
    // Free the outer chunks first; c merges with the trailing free
    // region, a stays an island
    heap.free_chunk(a).unwrap();
    heap.free_chunk(c).unwrap();
    assert_eq!(heap.free_region_count(), 2);
    // The middle chunk bridges everything back into one region
    heap.free_chunk(b).unwrap();
    assert_eq!(heap.free_region_count(), 1);
    assert_eq!(heap.avail(), 4096);
}

#[test]
fn first_fit_reuses_freed_chunk() {
    let mut heap = Heap::new(4096);
    let a = heap.get_chunk(64).unwrap();
    let _b = heap.get_chunk(64).unwrap();
    heap.free_chunk(a).unwrap();
    let c = heap.get_chunk(32).unwrap();
    // The freed hole at the front is split and reused
    assert_eq!(c.offset(), a.offset());
}

#[test]
fn oom_raises_mem() {
    let mut heap = Heap::new(64);
    let err = heap.get_chunk(256).unwrap_err();
    assert_eq!(err.code, picopy_abi::ReturnCode::ExMem);
}

#[test]
fn tight_remainder_is_not_split() {
    let mut heap = Heap::new(64);
    // 56 payload + 4 header leaves a 4-byte tail, below the minimum
    // chunk, so the whole region is handed out
    let r = heap.get_chunk(56).unwrap();
    assert_eq!(heap.chunk_size(r), 60);
    assert_eq!(heap.avail(), 0);
    heap.free_chunk(r).unwrap();
    assert_eq!(heap.avail(), 64);
}

#[test]
fn double_free_is_an_error() {
    let mut heap = Heap::new(256);
    let r = heap.get_chunk(16).unwrap();
    heap.free_chunk(r).unwrap();
    assert!(heap.free_chunk(r).is_err());
}

#[test]
fn scalar_accessors_round_trip() {
    let mut heap = Heap::new(256);
    heap.set_byte(0, 0xAB);
    assert_eq!(heap.byte(0), 0xAB);
    heap.set_word(4, 0x1234);
    assert_eq!(heap.word(4), 0x1234);
    heap.set_dword(8, 0xDEAD_BEEF);
    assert_eq!(heap.dword(8), 0xDEAD_BEEF);
    heap.set_int(12, -5);
    assert_eq!(heap.int(12), -5);
    // Little-endian layout
    assert_eq!(heap.byte(4), 0x34);
}

proptest! {
    /// Allocating any sequence and freeing it in reverse returns the
    /// free list to a single chunk covering the entire region.
    #[test]
    fn alloc_reverse_free_round_trip(sizes in prop::collection::vec(1usize..200, 1..24)) {
        let mut heap = Heap::new(8192);
        let mut chunks = Vec::new();
        for size in &sizes {
            match heap.get_chunk(*size) {
                Ok(r) => chunks.push(r),
                Err(_) => break,
            }
        }
        for r in chunks.into_iter().rev() {
            heap.free_chunk(r).unwrap();
        }
        prop_assert_eq!(heap.free_region_count(), 1);
        prop_assert_eq!(heap.avail(), 8192);
    }

    /// Freeing in allocation order coalesces just as completely.
    #[test]
    fn alloc_forward_free_round_trip(sizes in prop::collection::vec(1usize..200, 1..24)) {
        let mut heap = Heap::new(8192);
        let mut chunks = Vec::new();
        for size in &sizes {
            match heap.get_chunk(*size) {
                Ok(r) => chunks.push(r),
                Err(_) => break,
            }
        }
        for r in chunks {
            heap.free_chunk(r).unwrap();
        }
        prop_assert_eq!(heap.free_region_count(), 1);
        prop_assert_eq!(heap.avail(), 8192);
    }
}
