//! Ripple-carry addition and the two's-complement operations built on it.
//!
//! Everything here composes single-bit AND/OR/XOR/NOT through a full adder;
//! no native `+`/`-` touches the datapath.

use crate::bits::Bits;

/// One-bit full adder: sum = a XOR b XOR cin, carry = majority(a, b, cin).
pub fn full_adder(a: u8, b: u8, carry_in: u8) -> (u8, u8) {
    let half = (a ^ b) & 1;
    let sum = (half ^ carry_in) & 1;
    let carry_out = ((a & b) | (a & carry_in) | (b & carry_in)) & 1;
    (sum, carry_out)
}

/// Add two same-width bit-vectors LSB to MSB, threading the carry.
///
/// Width is preserved; mismatched widths are a caller bug.
pub fn ripple_add(a: &Bits, b: &Bits, carry_in: u8) -> (Bits, u8) {
    assert_eq!(a.width(), b.width(), "ripple_add operands must share a width");

    let n = a.width();
    let mut sum = Bits::zeros(n);
    let mut carry = carry_in & 1;
    for i in (0..n).rev() {
        let (s, c) = full_adder(a.bit(i), b.bit(i), carry);
        sum.set_bit(i, s);
        carry = c;
    }
    (sum, carry)
}

/// Per-bit NOT.
pub fn invert(a: &Bits) -> Bits {
    let mut out = a.clone();
    for i in 0..out.width() {
        out.set_bit(i, 1 - a.bit(i));
    }
    out
}

/// Two's-complement negation: invert, then add one.
pub fn twos_negate(a: &Bits) -> Bits {
    let (negated, _) = ripple_add(&invert(a), &one(a.width()), 0);
    negated
}

/// `a - b` as `a + (~b + 1)`. The returned carry is 1 when no borrow
/// occurred (two's-complement convention).
pub fn sub(a: &Bits, b: &Bits) -> (Bits, u8) {
    ripple_add(a, &twos_negate(b), 0)
}

fn one(width: usize) -> Bits {
    let mut one = Bits::zeros(width);
    one.set_bit(width - 1, 1);
    one
}
