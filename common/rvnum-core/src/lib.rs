//! Bit-level numeric computation core: integer and IEEE 754 arithmetic built
//! from single-bit logical primitives instead of the host's numeric operators.
//!
//! Layered bottom-up: [`bits`] (bit-vector type and hex/binary conversion),
//! [`adder`] (ripple-carry add/negate/subtract), [`shifter`], [`alu`]
//! (add/sub with N/Z/C/V flags), [`mdu`] (multiply/divide), [`fpu`]
//! (binary32/binary64 add/sub/mul), and [`adapters`] at the host boundary.
//! Lower layers know nothing of higher layers.

pub mod adapters;
pub mod adder;
pub mod alu;
pub mod bits;
pub mod fpu;
pub mod mdu;
pub mod shifter;

pub use crate::bits::Bits;
