//! Numeric instruction semantics.

use super::Trap;
use crate::parse::instr::{
    Conversion, FloatBinary, FloatCompare, FloatUnary, IntBinary, IntCompare, IntUnary,
};

macro_rules! int_ops {
    ($int:ty, $uint:ty, $bits:expr, $compare:ident, $unary:ident, $binary:ident) => {
        pub(super) fn $compare(op: IntCompare, a: $int, b: $int) -> bool {
            match op {
                IntCompare::Eq => a == b,
                IntCompare::Ne => a != b,
                IntCompare::LtS => a < b,
                IntCompare::LtU => (a as $uint) < (b as $uint),
                IntCompare::GtS => a > b,
                IntCompare::GtU => (a as $uint) > (b as $uint),
                IntCompare::LeS => a <= b,
                IntCompare::LeU => (a as $uint) <= (b as $uint),
                IntCompare::GeS => a >= b,
                IntCompare::GeU => (a as $uint) >= (b as $uint),
            }
        }

        pub(super) fn $unary(op: IntUnary, a: $int) -> $int {
            match op {
                IntUnary::Clz => a.leading_zeros() as $int,
                IntUnary::Ctz => a.trailing_zeros() as $int,
                IntUnary::Popcnt => a.count_ones() as $int,
                IntUnary::Extend8S => a as i8 as $int,
                IntUnary::Extend16S => a as i16 as $int,
                IntUnary::Extend32S => a as i32 as $int,
            }
        }

        pub(super) fn $binary(op: IntBinary, a: $int, b: $int) -> Result<$int, Trap> {
            Ok(match op {
                IntBinary::Add => a.wrapping_add(b),
                IntBinary::Sub => a.wrapping_sub(b),
                IntBinary::Mul => a.wrapping_mul(b),
                IntBinary::DivS => {
                    if b == 0 {
                        return Err(Trap::IntegerDivideByZero);
                    }
                    a.checked_div(b).ok_or(Trap::IntegerOverflow)?
                }
                IntBinary::DivU => {
                    if b == 0 {
                        return Err(Trap::IntegerDivideByZero);
                    }
                    ((a as $uint) / (b as $uint)) as $int
                }
                IntBinary::RemS => {
                    if b == 0 {
                        return Err(Trap::IntegerDivideByZero);
                    }
                    a.wrapping_rem(b)
                }
                IntBinary::RemU => {
                    if b == 0 {
                        return Err(Trap::IntegerDivideByZero);
                    }
                    ((a as $uint) % (b as $uint)) as $int
                }
                IntBinary::And => a & b,
                IntBinary::Or => a | b,
                IntBinary::Xor => a ^ b,
                IntBinary::Shl => a.wrapping_shl(b as u32),
                IntBinary::ShrS => a.wrapping_shr(b as u32),
                IntBinary::ShrU => (a as $uint).wrapping_shr(b as u32) as $int,
                IntBinary::Rotl => a.rotate_left((b as u32) % $bits),
                IntBinary::Rotr => a.rotate_right((b as u32) % $bits),
            })
        }
    };
}

int_ops!(i32, u32, 32, i32_compare, i32_unary, i32_binary);
int_ops!(i64, u64, 64, i64_compare, i64_unary, i64_binary);

macro_rules! float_ops {
    ($float:ty, $compare:ident, $unary:ident, $binary:ident) => {
        pub(super) fn $compare(op: FloatCompare, a: $float, b: $float) -> bool {
            match op {
                FloatCompare::Eq => a == b,
                FloatCompare::Ne => a != b,
                FloatCompare::Lt => a < b,
                FloatCompare::Gt => a > b,
                FloatCompare::Le => a <= b,
                FloatCompare::Ge => a >= b,
            }
        }

        pub(super) fn $unary(op: FloatUnary, a: $float) -> $float {
            match op {
                FloatUnary::Abs => a.abs(),
                FloatUnary::Neg => -a,
                FloatUnary::Ceil => a.ceil(),
                FloatUnary::Floor => a.floor(),
                FloatUnary::Trunc => a.trunc(),
                FloatUnary::Nearest => a.round_ties_even(),
                FloatUnary::Sqrt => a.sqrt(),
            }
        }

        pub(super) fn $binary(op: FloatBinary, a: $float, b: $float) -> $float {
            match op {
                FloatBinary::Add => a + b,
                FloatBinary::Sub => a - b,
                FloatBinary::Mul => a * b,
                FloatBinary::Div => a / b,
                // NaN propagates; -0 orders below +0.
                FloatBinary::Min => {
                    if a.is_nan() || b.is_nan() {
                        <$float>::NAN
                    } else if a == b {
                        if a.is_sign_negative() { a } else { b }
                    } else {
                        a.min(b)
                    }
                }
                FloatBinary::Max => {
                    if a.is_nan() || b.is_nan() {
                        <$float>::NAN
                    } else if a == b {
                        if a.is_sign_positive() { a } else { b }
                    } else {
                        a.max(b)
                    }
                }
                FloatBinary::Copysign => a.copysign(b),
            }
        }
    };
}

float_ops!(f32, f32_compare, f32_unary, f32_binary);
float_ops!(f64, f64_compare, f64_unary, f64_binary);

/// Truncate toward zero, trapping unless the result lies in `[min, max)`.
fn trunc_checked(x: f64, min: f64, max: f64) -> Result<f64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = x.trunc();
    if t < min || t >= max {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t)
}

const I32_RANGE: (f64, f64) = (-2147483648.0, 2147483648.0);
const U32_RANGE: (f64, f64) = (0.0, 4294967296.0);
const I64_RANGE: (f64, f64) = (-9223372036854775808.0, 9223372036854775808.0);
const U64_RANGE: (f64, f64) = (0.0, 18446744073709551616.0);

#[inline]
fn f32_arg(bits: u64) -> f64 {
    f32::from_bits(bits as u32) as f64
}

#[inline]
fn f64_arg(bits: u64) -> f64 {
    f64::from_bits(bits)
}

#[inline]
fn i32_bits(v: i32) -> u64 {
    v as u32 as u64
}

#[inline]
fn f32_bits(v: f32) -> u64 {
    v.to_bits() as u64
}

/// Apply a conversion to a raw operand, producing a raw result.
pub(super) fn convert(op: Conversion, bits: u64) -> Result<u64, Trap> {
    use Conversion as C;

    Ok(match op {
        C::I32WrapI64 => i32_bits(bits as i64 as i32),
        C::I64ExtendI32S => bits as i32 as i64 as u64,
        C::I64ExtendI32U => bits as u32 as u64,
        C::I32TruncF32S => i32_bits(trunc_checked(f32_arg(bits), I32_RANGE.0, I32_RANGE.1)? as i32),
        C::I32TruncF32U => trunc_checked(f32_arg(bits), U32_RANGE.0, U32_RANGE.1)? as u32 as u64,
        C::I32TruncF64S => i32_bits(trunc_checked(f64_arg(bits), I32_RANGE.0, I32_RANGE.1)? as i32),
        C::I32TruncF64U => trunc_checked(f64_arg(bits), U32_RANGE.0, U32_RANGE.1)? as u32 as u64,
        C::I64TruncF32S => trunc_checked(f32_arg(bits), I64_RANGE.0, I64_RANGE.1)? as i64 as u64,
        C::I64TruncF32U => trunc_checked(f32_arg(bits), U64_RANGE.0, U64_RANGE.1)? as u64,
        C::I64TruncF64S => trunc_checked(f64_arg(bits), I64_RANGE.0, I64_RANGE.1)? as i64 as u64,
        C::I64TruncF64U => trunc_checked(f64_arg(bits), U64_RANGE.0, U64_RANGE.1)? as u64,
        C::F32ConvertI32S => f32_bits(bits as i32 as f32),
        C::F32ConvertI32U => f32_bits(bits as u32 as f32),
        C::F32ConvertI64S => f32_bits(bits as i64 as f32),
        C::F32ConvertI64U => f32_bits(bits as f32),
        C::F64ConvertI32S => (bits as i32 as f64).to_bits(),
        C::F64ConvertI32U => (bits as u32 as f64).to_bits(),
        C::F64ConvertI64S => (bits as i64 as f64).to_bits(),
        C::F64ConvertI64U => (bits as f64).to_bits(),
        C::F32DemoteF64 => f32_bits(f64_arg(bits) as f32),
        C::F64PromoteF32 => f32_arg(bits).to_bits(),
        // Reinterpretation keeps the bit pattern; only the slot width matters.
        C::I32ReinterpretF32 | C::F32ReinterpretI32 => bits & 0xFFFF_FFFF,
        C::I64ReinterpretF64 | C::F64ReinterpretI64 => bits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_division_edge_cases() {
        assert_eq!(
            i32_binary(IntBinary::DivS, 7, 0),
            Err(Trap::IntegerDivideByZero)
        );
        assert_eq!(
            i32_binary(IntBinary::DivS, i32::MIN, -1),
            Err(Trap::IntegerOverflow)
        );
        assert_eq!(i32_binary(IntBinary::RemS, i32::MIN, -1), Ok(0));
        assert_eq!(i64_binary(IntBinary::DivU, -1, 2), Ok(i64::MAX));
    }

    #[test]
    fn shifts_and_rotates_mask_the_count() {
        assert_eq!(i32_binary(IntBinary::Shl, 1, 33), Ok(2));
        assert_eq!(i32_binary(IntBinary::ShrU, -1, 28), Ok(0xF));
        assert_eq!(i32_binary(IntBinary::Rotl, i32::MIN, 1), Ok(1));
        assert_eq!(i64_binary(IntBinary::Rotr, 1, 65), Ok(i64::MIN));
    }

    #[test]
    fn unsigned_compare_treats_negative_as_large() {
        assert!(i32_compare(IntCompare::GtU, -1, 1));
        assert!(!i32_compare(IntCompare::GtS, -1, 1));
    }

    #[test]
    fn float_min_max_follow_wasm_rules() {
        assert!(f32_binary(FloatBinary::Min, f32::NAN, 1.0).is_nan());
        assert!(f64_binary(FloatBinary::Min, 0.0, -0.0).is_sign_negative());
        assert!(f64_binary(FloatBinary::Max, -0.0, 0.0).is_sign_positive());
        assert_eq!(f32_unary(FloatUnary::Nearest, 2.5), 2.0);
    }

    #[test]
    fn truncation_traps_on_nan_and_overflow() {
        let nan = f64::NAN.to_bits();
        assert_eq!(
            convert(Conversion::I32TruncF64S, nan),
            Err(Trap::InvalidConversionToInteger)
        );
        let big = 3e9f64.to_bits();
        assert_eq!(
            convert(Conversion::I32TruncF64S, big),
            Err(Trap::IntegerOverflow)
        );
        assert_eq!(convert(Conversion::I32TruncF64U, big), Ok(3_000_000_000));
        let neg = (-0.5f64).to_bits();
        assert_eq!(convert(Conversion::I32TruncF64U, neg), Ok(0));
    }

    #[test]
    fn extend_and_wrap() {
        assert_eq!(
            convert(Conversion::I64ExtendI32S, 0xFFFF_FFFF),
            Ok(u64::MAX)
        );
        assert_eq!(
            convert(Conversion::I64ExtendI32U, 0xFFFF_FFFF),
            Ok(0xFFFF_FFFF)
        );
        assert_eq!(convert(Conversion::I32WrapI64, u64::MAX), Ok(0xFFFF_FFFF));
    }
}
