//! Multiply/divide unit: shift-add multiplication and restoring division,
//! with the RV32M signedness variants layered on top.
//!
//! Multiplication is the only operation in the core that widens: n-bit
//! operands produce a 2n-bit product. Division follows the RISC-V M
//! conventions for divide-by-zero and INT_MIN / -1.

use crate::adder::{ripple_add, sub, twos_negate};
use crate::bits::Bits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulFlags {
    /// The signed product does not fit in the low half.
    pub overflow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivFlags {
    pub div_by_zero: bool,
    /// Set only by signed INT_MIN / -1.
    pub overflow: bool,
}

/// Datapath snapshot after one multiplier step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulStep {
    pub accumulator: Bits,
    pub multiplicand: Bits,
    pub multiplier: Bits,
}

/// Datapath snapshot after one divider step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivStep {
    pub remainder: Bits,
    pub quotient: Bits,
    /// Whether the tentative subtract was kept (no borrow) or restored.
    pub subtracted: bool,
}

/// Unsigned shift-add multiply of two n-bit vectors into 2n bits.
///
/// Each of the n steps conditionally adds the multiplicand into the
/// accumulator, then walks the multiplicand up and the multiplier down.
pub fn mul_shift_add(a: &Bits, b: &Bits) -> Bits {
    mul_shift_add_inner(a, b, None)
}

/// [`mul_shift_add`] that also records per-step snapshots.
pub fn mul_shift_add_traced(a: &Bits, b: &Bits) -> (Bits, Vec<MulStep>) {
    let mut steps = Vec::new();
    let product = mul_shift_add_inner(a, b, Some(&mut steps));
    (product, steps)
}

fn mul_shift_add_inner(a: &Bits, b: &Bits, mut steps: Option<&mut Vec<MulStep>>) -> Bits {
    assert_eq!(a.width(), b.width(), "mul_shift_add operands must share a width");

    let n = a.width();
    let mut accumulator = Bits::zeros(2 * n);
    let mut multiplicand = Bits::zeros(n).concat(a);
    let mut multiplier = b.clone();

    for i in 0..n {
        if multiplier.lsb() == 1 {
            accumulator = ripple_add(&accumulator, &multiplicand, 0).0;
        }
        log::trace!("mul step {i}: acc={accumulator} multiplier={multiplier}");
        if let Some(steps) = steps.as_deref_mut() {
            steps.push(MulStep {
                accumulator: accumulator.clone(),
                multiplicand: multiplicand.clone(),
                multiplier: multiplier.clone(),
            });
        }

        // Multiplicand moves one place toward the MSB, multiplier toward
        // the LSB.
        multiplicand = multiplicand.tail(2 * n - 1).concat(&Bits::zeros(1));
        multiplier = Bits::zeros(1).concat(&multiplier.head(n - 1));
    }

    accumulator
}

fn magnitude(a: &Bits) -> Bits {
    if a.msb() == 1 { twos_negate(a) } else { a.clone() }
}

fn signed_product(a: &Bits, b: &Bits) -> Bits {
    let product = mul_shift_add(&magnitude(a), &magnitude(b));
    if a.msb() ^ b.msb() == 1 { twos_negate(&product) } else { product }
}

/// Signed multiply returning the low n bits (RV32M MUL).
///
/// `overflow` is set when any high-half bit disagrees with the low half's
/// sign, i.e. the signed product does not fit in n bits.
pub fn mul_low(a: &Bits, b: &Bits) -> (Bits, MulFlags) {
    mul_low_inner(a, b, None)
}

/// [`mul_low`] with the magnitude multiply's per-step snapshots.
pub fn mul_low_traced(a: &Bits, b: &Bits) -> (Bits, MulFlags, Vec<MulStep>) {
    let mut steps = Vec::new();
    let (low, flags) = mul_low_inner(a, b, Some(&mut steps));
    (low, flags, steps)
}

fn mul_low_inner(a: &Bits, b: &Bits, steps: Option<&mut Vec<MulStep>>) -> (Bits, MulFlags) {
    let n = a.width();
    let product = mul_shift_add_inner(&magnitude(a), &magnitude(b), steps);
    let product = if a.msb() ^ b.msb() == 1 { twos_negate(&product) } else { product };
    let low = product.tail(n);
    let sign = low.msb();
    let overflow = product.head(n).as_slice().iter().any(|&bit| bit != sign);
    (low, MulFlags { overflow })
}

/// High n bits of the signed x signed product (RV32M MULH).
pub fn mulh(a: &Bits, b: &Bits) -> Bits {
    let n = a.width();
    signed_product(a, b).head(n)
}

/// High n bits of the unsigned x unsigned product (RV32M MULHU).
pub fn mulhu(a: &Bits, b: &Bits) -> Bits {
    let n = a.width();
    mul_shift_add(a, b).head(n)
}

/// High n bits of the signed(a) x unsigned(b) product (RV32M MULHSU).
pub fn mulhsu(a: &Bits, b: &Bits) -> Bits {
    let n = a.width();
    let product = mul_shift_add(&magnitude(a), b);
    let product = if a.msb() == 1 { twos_negate(&product) } else { product };
    product.head(n)
}

/// Restoring division over non-negative magnitudes; divisor must be nonzero.
///
/// Walks dividend bits MSB-first: shift the remainder left bringing in the
/// next bit, tentatively subtract the divisor, and keep the difference only
/// when no borrow occurred, shifting the outcome into the quotient.
fn restoring_divide(
    dividend: &Bits,
    divisor: &Bits,
    mut steps: Option<&mut Vec<DivStep>>,
) -> (Bits, Bits) {
    let n = dividend.width();
    let mut remainder = Bits::zeros(n);
    let mut quotient = Bits::zeros(n);

    for i in 0..n {
        remainder = remainder.tail(n - 1).concat(&Bits::from_bits(&[dividend.bit(i)]));

        let (difference, carry) = sub(&remainder, divisor);
        let subtracted = carry == 1;
        if subtracted {
            remainder = difference;
        }
        quotient = quotient
            .tail(n - 1)
            .concat(&Bits::from_bits(&[u8::from(subtracted)]));

        log::trace!(
            "div step {i}: rem={remainder} quo={quotient} {}",
            if subtracted { "sub" } else { "restore" }
        );
        if let Some(steps) = steps.as_deref_mut() {
            steps.push(DivStep {
                remainder: remainder.clone(),
                quotient: quotient.clone(),
                subtracted,
            });
        }
    }

    (quotient, remainder)
}

/// Unsigned divide (RV32M DIVU): divisor zero yields q = all-ones,
/// r = dividend, `div_by_zero`.
pub fn divu(a: &Bits, b: &Bits) -> (Bits, Bits, DivFlags) {
    divu_inner(a, b, None)
}

/// [`divu`] with per-step snapshots (empty on divide-by-zero).
pub fn divu_traced(a: &Bits, b: &Bits) -> (Bits, Bits, DivFlags, Vec<DivStep>) {
    let mut steps = Vec::new();
    let (q, r, flags) = divu_inner(a, b, Some(&mut steps));
    (q, r, flags, steps)
}

fn divu_inner(a: &Bits, b: &Bits, steps: Option<&mut Vec<DivStep>>) -> (Bits, Bits, DivFlags) {
    let n = a.width();
    if b.is_zero() {
        log::trace!("divu: divide by zero");
        return (Bits::ones(n), a.clone(), DivFlags { div_by_zero: true, overflow: false });
    }
    let (q, r) = restoring_divide(a, b, steps);
    (q, r, DivFlags { div_by_zero: false, overflow: false })
}

/// Signed divide (RV32M DIV): divisor zero as in [`divu`]; INT_MIN / -1
/// yields q = INT_MIN, r = 0 with `overflow` set; quotient and remainder
/// signs follow the RISC-V convention (remainder takes the dividend sign).
pub fn div(a: &Bits, b: &Bits) -> (Bits, Bits, DivFlags) {
    div_inner(a, b, None)
}

/// [`div`] with per-step snapshots of the magnitude division (empty on the
/// special cases).
pub fn div_traced(a: &Bits, b: &Bits) -> (Bits, Bits, DivFlags, Vec<DivStep>) {
    let mut steps = Vec::new();
    let (q, r, flags) = div_inner(a, b, Some(&mut steps));
    (q, r, flags, steps)
}

fn div_inner(a: &Bits, b: &Bits, steps: Option<&mut Vec<DivStep>>) -> (Bits, Bits, DivFlags) {
    let n = a.width();
    if b.is_zero() {
        log::trace!("div: divide by zero");
        return (Bits::ones(n), a.clone(), DivFlags { div_by_zero: true, overflow: false });
    }

    let is_int_min = a.msb() == 1 && a.tail(n - 1).is_zero();
    if is_int_min && *b == Bits::ones(n) {
        log::trace!("div: INT_MIN / -1 overflow");
        return (a.clone(), Bits::zeros(n), DivFlags { div_by_zero: false, overflow: true });
    }

    let (q, r) = restoring_divide(&magnitude(a), &magnitude(b), steps);
    let q = if a.msb() ^ b.msb() == 1 { twos_negate(&q) } else { q };
    let r = if a.msb() == 1 && !r.is_zero() { twos_negate(&r) } else { r };
    (q, r, DivFlags { div_by_zero: false, overflow: false })
}

/// Remainder of the signed divide (RV32M REM).
pub fn rem(a: &Bits, b: &Bits) -> (Bits, DivFlags) {
    let (_, r, flags) = div(a, b);
    (r, flags)
}

/// Remainder of the unsigned divide (RV32M REMU).
pub fn remu(a: &Bits, b: &Bits) -> (Bits, DivFlags) {
    let (_, r, flags) = divu(a, b);
    (r, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adder::ripple_add;

    fn hex32(s: &str) -> Bits {
        Bits::from_hex_width(s, 32).unwrap()
    }

    #[test]
    fn mul_shift_add_small_values() {
        let product = mul_shift_add(&hex32("0x0000000D"), &hex32("0x0000000B"));
        assert_eq!(product.width(), 64);
        assert_eq!(product.to_hex_string(16), "0x000000000000008F");
    }

    #[test]
    fn mul_shift_add_traced_records_every_step() {
        let (product, steps) = mul_shift_add_traced(&hex32("0x00000003"), &hex32("0x00000005"));
        assert_eq!(steps.len(), 32);
        assert_eq!(product, steps.last().unwrap().accumulator);
    }

    #[test]
    fn mul_low_is_commutative() {
        let cases = [
            ("0x0000000D", "0xFFFFFFF3"),
            ("0x7FFFFFFF", "0x00000002"),
            ("0xDEADBEEF", "0x12345678"),
        ];
        for (a_hex, b_hex) in cases {
            let a = hex32(a_hex);
            let b = hex32(b_hex);
            assert_eq!(mul_low(&a, &b).0, mul_low(&b, &a).0, "{a_hex} * {b_hex}");
        }
    }

    #[test]
    fn mul_low_negative_times_positive() {
        // -13 * 3 = -39
        let (low, flags) = mul_low(&hex32("0xFFFFFFF3"), &hex32("0x00000003"));
        assert_eq!(low.to_hex_string(8), "0xFFFFFFD9");
        assert!(!flags.overflow);
    }

    #[test]
    fn mul_low_flags_high_half_disagreement() {
        let (_, flags) = mul_low(&hex32("0x7FFFFFFF"), &hex32("0x00000002"));
        assert!(flags.overflow);
    }

    #[test]
    fn mulh_family_known_values() {
        let minus_one = hex32("0xFFFFFFFF");
        // (-1) * (-1) = 1: signed high half is zero.
        assert!(mulh(&minus_one, &minus_one).is_zero());
        // 0xFFFFFFFF^2 unsigned = 0xFFFFFFFE_00000001.
        assert_eq!(mulhu(&minus_one, &minus_one).to_hex_string(8), "0xFFFFFFFE");
        // signed(-1) * unsigned(0xFFFFFFFF) = -0xFFFFFFFF = 0xFFFFFFFF_00000001.
        assert_eq!(mulhsu(&minus_one, &minus_one).to_hex_string(8), "0xFFFFFFFF");
    }

    #[test]
    fn mulh_and_mul_low_compose_the_full_product() {
        let cases = [
            ("0x0000000D", "0xFFFFFFF3"),
            ("0x80000000", "0x7FFFFFFF"),
            ("0xDEADBEEF", "0xCAFEBABE"),
        ];
        for (a_hex, b_hex) in cases {
            let a = hex32(a_hex);
            let b = hex32(b_hex);
            let composed = mulh(&a, &b).concat(&mul_low(&a, &b).0);

            // The low 64 bits of the 64x64 product of the sign-extended
            // operands is the full signed 32x32 product.
            let full = mul_shift_add(&a.sign_extend(64), &b.sign_extend(64)).tail(64);
            assert_eq!(composed, full, "{a_hex} * {b_hex}");
        }
    }

    #[test]
    fn divu_basic() {
        let (q, r, flags) = divu(&hex32("0x80000000"), &hex32("0x00000003"));
        assert_eq!(q.to_hex_string(8), "0x2AAAAAAA");
        assert_eq!(r.to_hex_string(8), "0x00000002");
        assert!(!flags.div_by_zero);
    }

    #[test]
    fn divu_by_zero() {
        let a = hex32("0x12345678");
        let (q, r, flags) = divu(&a, &Bits::zeros(32));
        assert_eq!(q, Bits::ones(32));
        assert_eq!(r, a);
        assert!(flags.div_by_zero);
    }

    #[test]
    fn div_int_min_by_minus_one_overflows() {
        let int_min = hex32("0x80000000");
        let (q, r, flags) = div(&int_min, &hex32("0xFFFFFFFF"));
        assert_eq!(q, int_min);
        assert!(r.is_zero());
        assert!(flags.overflow);
        assert!(!flags.div_by_zero);
    }

    #[test]
    fn rem_sign_follows_the_dividend() {
        // -7 rem 3 = -1
        let (r, _) = rem(&hex32("0xFFFFFFF9"), &hex32("0x00000003"));
        assert_eq!(r.to_hex_string(8), "0xFFFFFFFF");

        // 7 rem -3 = 1
        let (r, _) = rem(&hex32("0x00000007"), &hex32("0xFFFFFFFD"));
        assert_eq!(r.to_hex_string(8), "0x00000001");
    }

    #[test]
    fn remu_exact_division_leaves_zero() {
        let (r, _) = remu(&hex32("0x80000007"), &hex32("0x00000003"));
        assert!(r.is_zero());
    }

    #[test]
    fn div_reconstructs_the_dividend() {
        // A = q*B + r, remainder sign matching the dividend.
        let cases = [
            ("0xFFFFFFF9", "0x00000003"),
            ("0x00000007", "0xFFFFFFFD"),
            ("0x80000001", "0x00000002"),
            ("0x12345678", "0x00001234"),
        ];
        for (a_hex, b_hex) in cases {
            let a = hex32(a_hex);
            let b = hex32(b_hex);
            let (q, r, _) = div(&a, &b);
            let (qb, _) = mul_low(&q, &b);
            let (reconstructed, _) = ripple_add(&qb, &r, 0);
            assert_eq!(reconstructed, a, "{a_hex} / {b_hex}");
        }
    }

    #[test]
    fn div_traced_walks_all_bits() {
        let (_, _, _, steps) = div_traced(&hex32("0x0000001C"), &hex32("0x00000005"));
        assert_eq!(steps.len(), 32);
    }
}
