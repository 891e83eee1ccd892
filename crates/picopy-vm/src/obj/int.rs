// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Integer objects: signed 32-bit, with interned −1/0/1 singletons.
//!
//! Arithmetic wraps modulo 2^32. Division and modulo by zero raise
//! `ZDIV`; power with a negative exponent raises `VAL`.

use picopy_abi::ReturnCode;

use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::obj::{DESC_SIZE, Ref, Singletons, Tag, init_desc, set_static};
use crate::platform::Platform;

const OFF_VAL: u32 = DESC_SIZE;
const SIZE: usize = 8;

/// Create an integer, returning the interned singleton for −1, 0 and 1.
///
/// The returned reference is owned by the caller.
pub fn new(heap: &mut Heap, singletons: &Singletons, n: i32) -> VmResult<Ref> {
    let singleton = match n {
        0 => Some(singletons.zero),
        1 => Some(singletons.one),
        -1 => Some(singletons.neg_one),
        _ => None,
    };
    if let Some(r) = singleton {
        crate::obj::inc_ref(heap, r);
        return Ok(r);
    }
    let r = heap.get_chunk(SIZE)?;
    init_desc(heap, r, Tag::Int);
    heap.set_int(r.offset() + OFF_VAL, n);
    Ok(r)
}

/// Allocate one of the immortal integer singletons at VM init.
pub fn new_static(heap: &mut Heap, n: i32) -> VmResult<Ref> {
    let r = heap.get_chunk(SIZE)?;
    init_desc(heap, r, Tag::Int);
    set_static(heap, r);
    heap.set_int(r.offset() + OFF_VAL, n);
    Ok(r)
}

/// The integer's value. Also valid for the reserved `Flt` tag, which
/// shares the value slot.
#[inline]
#[must_use]
pub fn value(heap: &Heap, r: Ref) -> i32 {
    heap.int(r.offset() + OFF_VAL)
}

/// Wrapping division; `ZDIV` on a zero divisor.
pub fn div(a: i32, b: i32) -> VmResult<i32> {
    if b == 0 {
        return Err(VmError::raise(ReturnCode::ExZdiv));
    }
    Ok(a.wrapping_div(b))
}

/// Wrapping modulo; `ZDIV` on a zero divisor.
pub fn modulo(a: i32, b: i32) -> VmResult<i32> {
    if b == 0 {
        return Err(VmError::raise(ReturnCode::ExZdiv));
    }
    Ok(a.wrapping_rem(b))
}

/// Wrapping power; `VAL` on a negative exponent.
pub fn pow(a: i32, b: i32) -> VmResult<i32> {
    if b < 0 {
        return Err(VmError::raise(ReturnCode::ExVal));
    }
    let mut result = 1i32;
    for _ in 0..b {
        result = result.wrapping_mul(a);
    }
    Ok(result)
}

/// Print the decimal representation.
pub fn print<P: Platform>(heap: &Heap, plat: &mut P, r: Ref) -> VmResult<()> {
    let n = value(heap, r);
    // Widen so i32::MIN negates cleanly
    let mut v = i64::from(n);
    if v < 0 {
        plat.put_byte(b'-')?;
        v = -v;
    }
    let mut digits = [0u8; 10];
    let mut count = 0;
    loop {
        digits[count] = b'0' + (v % 10) as u8;
        count += 1;
        v /= 10;
        if v == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        plat.put_byte(digits[i])?;
    }
    Ok(())
}

/// Print one byte as two uppercase hex digits.
pub fn print_hex_byte<P: Platform>(plat: &mut P, b: u8) -> VmResult<()> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    plat.put_byte(HEX[(b >> 4) as usize])?;
    plat.put_byte(HEX[(b & 0x0F) as usize])
}

/// Print a u32 as eight uppercase hex digits.
pub fn print_hex<P: Platform>(plat: &mut P, v: u32) -> VmResult<()> {
    for shift in [24, 16, 8, 0] {
        print_hex_byte(plat, (v >> shift) as u8)?;
    }
    Ok(())
}
