//! IEEE 754 binary32/binary64 add, subtract, and multiply on raw bit
//! patterns.
//!
//! A single implementation is parameterized by [`FloatFormat`]; the
//! significand datapath runs entirely on the L1 ripple adder and the L4
//! shift-add multiplier. Exponents are compared and adjusted as scalar
//! integers, mirroring the split between datapath and control.
//!
//! Subnormals are flushed to zero on input and output (underflow + inexact
//! on the output side). Only one quiet NaN pattern is ever produced.

use crate::adder::{ripple_add, sub};
use crate::bits::Bits;
use crate::mdu;

/// Field layout of an IEEE 754 binary interchange format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatFormat {
    pub exponent_bits: usize,
    pub fraction_bits: usize,
    pub bias: i32,
}

impl FloatFormat {
    pub const BINARY32: Self = Self { exponent_bits: 8, fraction_bits: 23, bias: 127 };
    pub const BINARY64: Self = Self { exponent_bits: 11, fraction_bits: 52, bias: 1023 };

    pub fn total_bits(self) -> usize {
        1 + self.exponent_bits + self.fraction_bits
    }

    /// All-ones biased exponent: Inf/NaN encodings start here.
    fn max_exponent(self) -> i32 {
        (1 << self.exponent_bits) - 1
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoundingMode {
    /// Round to nearest, ties to even (RNE).
    #[default]
    NearestEven,
    /// Round toward zero (RTZ).
    TowardZero,
    /// Round toward positive infinity (RUP).
    Up,
    /// Round toward negative infinity (RDN).
    Down,
}

/// IEEE exception flags. Every operation returns a defined bit pattern;
/// these only report what happened on the way there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FpuFlags {
    pub invalid: bool,
    pub overflow: bool,
    pub underflow: bool,
    pub inexact: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Zero,
    Normal,
    Infinity,
    Nan,
}

struct Unpacked {
    sign: u8,
    /// Biased exponent as a scalar.
    exponent: i32,
    /// Implicit-1 significand, `fraction_bits + 1` wide (normals only).
    significand: Bits,
    class: Class,
}

fn unpack(bits: &Bits, format: FloatFormat) -> Unpacked {
    assert_eq!(bits.width(), format.total_bits(), "operand width must match the format");

    let sign = bits.msb();
    let exponent_field = bits.head(1 + format.exponent_bits).tail(format.exponent_bits);
    let fraction = bits.tail(format.fraction_bits);

    let class = if exponent_field.is_zero() {
        if !fraction.is_zero() {
            log::debug!("subnormal operand flushed to zero");
        }
        Class::Zero
    } else if exponent_field == Bits::ones(format.exponent_bits) {
        if fraction.is_zero() { Class::Infinity } else { Class::Nan }
    } else {
        Class::Normal
    };

    Unpacked {
        sign,
        exponent: scalar_exponent(&exponent_field),
        significand: Bits::from_bits(&[1]).concat(&fraction),
        class,
    }
}

fn scalar_exponent(bits: &Bits) -> i32 {
    bits.as_slice().iter().fold(0, |acc, &b| (acc << 1) | i32::from(b))
}

fn exponent_field(value: i32, width: usize) -> Bits {
    let mut out = Bits::zeros(width);
    let mut v = value;
    for i in (0..width).rev() {
        out.set_bit(i, (v & 1) as u8);
        v >>= 1;
    }
    out
}

fn pack(sign: u8, exponent: i32, fraction: &Bits, format: FloatFormat) -> Bits {
    Bits::from_bits(&[sign])
        .concat(&exponent_field(exponent, format.exponent_bits))
        .concat(fraction)
}

/// The one quiet NaN this core produces: sign 0, exponent all-ones,
/// fraction MSB set.
fn canonical_nan(format: FloatFormat) -> Bits {
    Bits::from_bits(&[0])
        .concat(&Bits::ones(format.exponent_bits))
        .concat(&Bits::from_bits(&[1]))
        .concat(&Bits::zeros(format.fraction_bits - 1))
}

fn infinity(sign: u8, format: FloatFormat) -> Bits {
    Bits::from_bits(&[sign])
        .concat(&Bits::ones(format.exponent_bits))
        .concat(&Bits::zeros(format.fraction_bits))
}

fn signed_zero(sign: u8, format: FloatFormat) -> Bits {
    Bits::from_bits(&[sign]).concat(&Bits::zeros(format.exponent_bits + format.fraction_bits))
}

fn one(width: usize) -> Bits {
    let mut one = Bits::zeros(width);
    one.set_bit(width - 1, 1);
    one
}

/// Right-shift the significand by `shift`, collecting guard, round, and
/// sticky from the bits that fall off (sticky ORs everything past round).
fn align(significand: &Bits, shift: usize) -> (Bits, u8, u8, u8) {
    let width = significand.width();
    let mut body = significand.clone();
    let mut guard = 0;
    let mut round = 0;
    let mut sticky = 0;
    // Past width + 3 steps the state no longer changes.
    for _ in 0..shift.min(width + 3) {
        sticky |= round;
        round = guard;
        guard = body.lsb();
        body = Bits::zeros(1).concat(&body.head(width - 1));
    }
    (body, guard, round, sticky)
}

fn rounds_up(mode: RoundingMode, sign: u8, lsb: u8, guard: u8, round: u8, sticky: u8) -> bool {
    match mode {
        RoundingMode::NearestEven => guard == 1 && (round == 1 || sticky == 1 || lsb == 1),
        RoundingMode::TowardZero => false,
        RoundingMode::Up => (guard | round | sticky) == 1 && sign == 0,
        RoundingMode::Down => (guard | round | sticky) == 1 && sign == 1,
    }
}

/// Add one ulp; the bool reports a carry out of the MSB (the incremented
/// vector is then all zeros).
fn increment(bits: &Bits) -> (Bits, bool) {
    let (sum, carry) = ripple_add(bits, &one(bits.width()), 0);
    (sum, carry == 1)
}

pub fn fadd(format: FloatFormat, a: &Bits, b: &Bits, mode: RoundingMode) -> (Bits, FpuFlags) {
    add_core(format, a, b, mode)
}

/// Subtraction enters the addition path with b's sign flipped, so
/// `fsub(a, b)` and `fadd(a, -b)` are the same computation.
pub fn fsub(format: FloatFormat, a: &Bits, b: &Bits, mode: RoundingMode) -> (Bits, FpuFlags) {
    let mut negated = b.clone();
    negated.set_bit(0, 1 - b.msb());
    add_core(format, a, &negated, mode)
}

fn add_core(format: FloatFormat, a: &Bits, b: &Bits, mode: RoundingMode) -> (Bits, FpuFlags) {
    let ua = unpack(a, format);
    let ub = unpack(b, format);
    let wf = format.fraction_bits;

    if matches!(ua.class, Class::Nan) || matches!(ub.class, Class::Nan) {
        return (canonical_nan(format), FpuFlags { invalid: true, ..FpuFlags::default() });
    }

    match (ua.class, ub.class) {
        (Class::Infinity, Class::Infinity) if ua.sign != ub.sign => {
            log::debug!("inf + -inf: invalid");
            return (canonical_nan(format), FpuFlags { invalid: true, ..FpuFlags::default() });
        }
        (Class::Infinity, _) => return (infinity(ua.sign, format), FpuFlags::default()),
        (_, Class::Infinity) => return (infinity(ub.sign, format), FpuFlags::default()),
        (Class::Zero, Class::Zero) => {
            // Negative only when both addends are negative.
            return (signed_zero(ua.sign & ub.sign, format), FpuFlags::default());
        }
        (Class::Zero, _) => return (b.clone(), FpuFlags::default()),
        (_, Class::Zero) => return (a.clone(), FpuFlags::default()),
        _ => {}
    }

    let (big, small) = if ua.exponent >= ub.exponent { (ua, ub) } else { (ub, ua) };
    let mut exponent = big.exponent;
    let shift = (big.exponent - small.exponent) as usize;

    let (small_sig, mut guard, mut round, mut sticky) = align(&small.significand, shift);

    let result_sign;
    let mut significand;
    if big.sign == small.sign {
        result_sign = big.sign;
        let (sum, carry) = ripple_add(&big.significand, &small_sig, 0);
        if carry == 1 {
            // The sum overflowed one position: shift right, fold the old
            // guard/round into sticky, and take the dropped LSB as guard.
            sticky |= round | guard;
            round = 0;
            guard = sum.lsb();
            significand = Bits::from_bits(&[1]).concat(&sum.head(wf));
            exponent += 1;
        } else {
            significand = sum;
        }
    } else {
        // Subtract the smaller magnitude from the larger; the larger's sign
        // wins. With equal exponents either operand may hold the larger
        // significand.
        let (diff, no_borrow) = sub(&big.significand, &small_sig);
        let diff = if no_borrow == 1 {
            result_sign = big.sign;
            diff
        } else {
            result_sign = small.sign;
            sub(&small_sig, &big.significand).0
        };

        if diff.is_zero() {
            // Full cancellation yields +0 regardless of operand signs.
            let inexact = (guard | round | sticky) == 1;
            return (signed_zero(0, format), FpuFlags { inexact, ..FpuFlags::default() });
        }

        significand = diff;
        while significand.msb() == 0 {
            significand = significand.tail(wf).concat(&Bits::zeros(1));
            exponent -= 1;
        }
    }

    let inexact = (guard | round | sticky) == 1;
    if rounds_up(mode, result_sign, significand.lsb(), guard, round, sticky) {
        let (incremented, carried) = increment(&significand);
        if carried {
            // Rounding carried out of the significand MSB: renormalize to
            // 1.00...0 one exponent up.
            significand = Bits::from_bits(&[1]).concat(&Bits::zeros(wf));
            exponent += 1;
        } else {
            significand = incremented;
        }
    }

    if exponent >= format.max_exponent() {
        return (
            infinity(result_sign, format),
            FpuFlags { overflow: true, inexact: true, ..FpuFlags::default() },
        );
    }
    if exponent <= 0 {
        return (
            signed_zero(result_sign, format),
            FpuFlags { underflow: true, inexact: true, ..FpuFlags::default() },
        );
    }

    let result = pack(result_sign, exponent, &significand.tail(wf), format);
    (result, FpuFlags { inexact, ..FpuFlags::default() })
}

pub fn fmul(format: FloatFormat, a: &Bits, b: &Bits, mode: RoundingMode) -> (Bits, FpuFlags) {
    let ua = unpack(a, format);
    let ub = unpack(b, format);
    let wf = format.fraction_bits;
    let sign = ua.sign ^ ub.sign;

    if matches!(ua.class, Class::Nan) || matches!(ub.class, Class::Nan) {
        return (canonical_nan(format), FpuFlags { invalid: true, ..FpuFlags::default() });
    }

    match (ua.class, ub.class) {
        (Class::Infinity, Class::Zero) | (Class::Zero, Class::Infinity) => {
            log::debug!("0 * inf: invalid");
            return (canonical_nan(format), FpuFlags { invalid: true, ..FpuFlags::default() });
        }
        (Class::Infinity, _) | (_, Class::Infinity) => {
            return (infinity(sign, format), FpuFlags::default());
        }
        (Class::Zero, _) | (_, Class::Zero) => {
            return (signed_zero(sign, format), FpuFlags::default());
        }
        _ => {}
    }

    // (wf+1)-bit significands multiply into 2(wf+1) bits; the product of
    // two values in [1, 2) lands in [1, 4), so at most one normalizing
    // shift is ever taken in practice.
    let mut product = mdu::mul_shift_add(&ua.significand, &ub.significand);
    let mut exponent = ua.exponent + ub.exponent - format.bias + 1;

    let mut shifts = 0;
    while product.msb() == 0 && shifts < wf + 2 {
        product = product.tail(product.width() - 1).concat(&Bits::zeros(1));
        exponent -= 1;
        shifts += 1;
    }

    let mut fraction = Bits::from_bits(&product.as_slice()[1..=wf]);
    let guard = product.bit(wf + 1);
    let round = product.bit(wf + 2);
    let sticky = u8::from(product.as_slice()[wf + 3..].iter().any(|&bit| bit == 1));

    let inexact = (guard | round | sticky) == 1;
    if rounds_up(mode, sign, fraction.lsb(), guard, round, sticky) {
        let (incremented, carried) = increment(&fraction);
        // A carry out of the fraction lands in the implicit-1 position:
        // the fraction is exactly zero one exponent up.
        fraction = incremented;
        if carried {
            exponent += 1;
        }
    }

    if exponent >= format.max_exponent() {
        return (
            infinity(sign, format),
            FpuFlags { overflow: true, inexact: true, ..FpuFlags::default() },
        );
    }
    if exponent <= 0 {
        return (
            signed_zero(sign, format),
            FpuFlags { underflow: true, inexact: true, ..FpuFlags::default() },
        );
    }

    (pack(sign, exponent, &fraction, format), FpuFlags { inexact, ..FpuFlags::default() })
}

pub fn fadd_f32(a: &Bits, b: &Bits, mode: RoundingMode) -> (Bits, FpuFlags) {
    fadd(FloatFormat::BINARY32, a, b, mode)
}

pub fn fsub_f32(a: &Bits, b: &Bits, mode: RoundingMode) -> (Bits, FpuFlags) {
    fsub(FloatFormat::BINARY32, a, b, mode)
}

pub fn fmul_f32(a: &Bits, b: &Bits, mode: RoundingMode) -> (Bits, FpuFlags) {
    fmul(FloatFormat::BINARY32, a, b, mode)
}

pub fn fadd_f64(a: &Bits, b: &Bits, mode: RoundingMode) -> (Bits, FpuFlags) {
    fadd(FloatFormat::BINARY64, a, b, mode)
}

pub fn fsub_f64(a: &Bits, b: &Bits, mode: RoundingMode) -> (Bits, FpuFlags) {
    fsub(FloatFormat::BINARY64, a, b, mode)
}

pub fn fmul_f64(a: &Bits, b: &Bits, mode: RoundingMode) -> (Bits, FpuFlags) {
    fmul(FloatFormat::BINARY64, a, b, mode)
}
