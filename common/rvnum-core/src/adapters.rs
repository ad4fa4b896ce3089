//! Host-boundary adapters: IEEE bit patterns from host floats (test
//! fixtures) and decimal-string conversion to 32-bit two's complement.
//!
//! The decimal encoder stays on the core datapath (x10 = (x<<3) + (x<<1)
//! through the shifter and ripple adder); the float packers and the decoder
//! sit outside the no-native-arithmetic discipline by design.

use crate::adder::{ripple_add, twos_negate};
use crate::bits::{Bits, HexParseError};
use crate::shifter::sll;
use thiserror::Error;

const XLEN: usize = 32;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecimalParseError {
    #[error("invalid decimal digit: '{0}'")]
    InvalidDigit(char),
}

/// Rendering of a decimal string as a 32-bit two's-complement value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwosComplement {
    pub bin: String,
    pub hex: String,
    /// Out-of-range inputs wrap silently; this is always false.
    pub overflow: bool,
}

/// IEEE binary32 bit pattern of a host float, big-endian bit order.
pub fn pack_f32(value: f32) -> Bits {
    bits_from_raw(u64::from(value.to_bits()), 32)
}

/// IEEE binary64 bit pattern of a host float, big-endian bit order.
pub fn pack_f64(value: f64) -> Bits {
    bits_from_raw(value.to_bits(), 64)
}

pub fn bits_to_hex32(bits: &Bits) -> String {
    bits.to_hex_string(8)
}

pub fn bits_to_hex64(bits: &Bits) -> String {
    bits.to_hex_string(16)
}

fn bits_from_raw(raw: u64, width: usize) -> Bits {
    let mut out = Bits::zeros(width);
    for i in 0..width {
        out.set_bit(width - 1 - i, ((raw >> i) & 1) as u8);
    }
    out
}

/// Encode `[+-]?[0-9]+` as 32-bit two's complement by repeated x10 + digit.
pub fn encode_twos_complement(input: &str) -> Result<TwosComplement, DecimalParseError> {
    let bits = parse_decimal(input)?;
    Ok(TwosComplement {
        bin: bits.pretty_bin(),
        hex: bits.to_hex_string(8),
        overflow: false,
    })
}

/// Signed value of a 32-bit two's-complement hex pattern.
pub fn decode_twos_complement(hex: &str) -> Result<i64, HexParseError> {
    let bits = Bits::from_hex_width(hex, XLEN)?;
    let negative = bits.msb() == 1;
    let magnitude = if negative { twos_negate(&bits) } else { bits };

    let mut value: i64 = 0;
    for &bit in magnitude.as_slice() {
        value = (value << 1) | i64::from(bit);
    }
    Ok(if negative { -value } else { value })
}

fn parse_decimal(input: &str) -> Result<Bits, DecimalParseError> {
    let trimmed = input.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let mut acc = Bits::zeros(XLEN);
    for ch in digits.chars() {
        let digit = digit_bits(ch).ok_or(DecimalParseError::InvalidDigit(ch))?;
        let (times_ten, _) = ripple_add(&sll(&acc, 3), &sll(&acc, 1), 0);
        acc = ripple_add(&times_ten, &digit, 0).0;
    }

    Ok(if negative { twos_negate(&acc) } else { acc })
}

fn digit_bits(ch: char) -> Option<Bits> {
    let nibble: [u8; 4] = match ch {
        '0' => [0, 0, 0, 0],
        '1' => [0, 0, 0, 1],
        '2' => [0, 0, 1, 0],
        '3' => [0, 0, 1, 1],
        '4' => [0, 1, 0, 0],
        '5' => [0, 1, 0, 1],
        '6' => [0, 1, 1, 0],
        '7' => [0, 1, 1, 1],
        '8' => [1, 0, 0, 0],
        '9' => [1, 0, 0, 1],
        _ => return None,
    };
    Some(Bits::from_bits(&nibble).zero_extend(XLEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_f32_known_patterns() {
        assert_eq!(bits_to_hex32(&pack_f32(1.5)), "0x3FC00000");
        assert_eq!(bits_to_hex32(&pack_f32(-2.25)), "0xC0100000");
        assert_eq!(bits_to_hex32(&pack_f32(0.0)), "0x00000000");
    }

    #[test]
    fn pack_f64_known_patterns() {
        assert_eq!(bits_to_hex64(&pack_f64(1.5)), "0x3FF8000000000000");
        assert_eq!(bits_to_hex64(&pack_f64(2.25)), "0x4002000000000000");
    }

    #[test]
    fn encode_positive_decimal() {
        let encoded = encode_twos_complement("13").unwrap();
        assert_eq!(encoded.hex, "0x0000000D");
        assert_eq!(encoded.bin, "00000000_00000000_00000000_00001101");
        assert!(!encoded.overflow);
    }

    #[test]
    fn encode_negative_decimal() {
        let encoded = encode_twos_complement("-13").unwrap();
        assert_eq!(encoded.hex, "0xFFFFFFF3");
    }

    #[test]
    fn encode_accepts_an_explicit_plus() {
        assert_eq!(encode_twos_complement("+255").unwrap().hex, "0x000000FF");
    }

    #[test]
    fn encode_rejects_non_digits() {
        assert_eq!(
            encode_twos_complement("12a4"),
            Err(DecimalParseError::InvalidDigit('a'))
        );
    }

    #[test]
    fn encode_wraps_silently_past_32_bits() {
        // 2^32 wraps to zero.
        let encoded = encode_twos_complement("4294967296").unwrap();
        assert_eq!(encoded.hex, "0x00000000");
        assert!(!encoded.overflow);
    }

    #[test]
    fn decode_round_trips_encode() {
        for value in ["0", "1", "13", "-13", "2147483647", "-2147483648"] {
            let encoded = encode_twos_complement(value).unwrap();
            let decoded = decode_twos_complement(&encoded.hex).unwrap();
            assert_eq!(decoded.to_string(), value.trim_start_matches('+'), "{value}");
        }
    }

    #[test]
    fn decode_int_min() {
        assert_eq!(decode_twos_complement("0x80000000"), Ok(-2147483648));
    }
}
