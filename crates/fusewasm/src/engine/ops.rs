//! Semantics for every [`Instr`] pure-compute variant (C4, `spec.md` §4.4).
//!
//! Each function here is pure: it reads its typed operands out of an
//! [`UntypedVal`] bit pattern, computes, and packs the result back. The
//! dispatch loop (`super::dispatch`) owns where operands come from (stack
//! pop vs. a locals read) and where the result goes (`Dst`); this module
//! never touches the operand stack or the locals frame.

use fusewasm_core::{Trap, TrapCode, UntypedVal};
use fusewasm_ir::{BinOpKind, CmpKind, MacKind, UnOpKind};

pub(crate) fn i32v(v: UntypedVal) -> i32 {
    v.to_bits() as u32 as i32
}
pub(crate) fn u32v(v: UntypedVal) -> u32 {
    v.to_bits() as u32
}
pub(crate) fn i64v(v: UntypedVal) -> i64 {
    v.to_bits() as i64
}
pub(crate) fn u64v(v: UntypedVal) -> u64 {
    v.to_bits()
}
pub(crate) fn f32v(v: UntypedVal) -> f32 {
    f32::from_bits(v.to_bits() as u32)
}
pub(crate) fn f64v(v: UntypedVal) -> f64 {
    f64::from_bits(v.to_bits())
}

pub fn eval_un(op: UnOpKind, x: UntypedVal) -> Result<UntypedVal, Trap> {
    use UnOpKind::*;
    let v = match op {
        I32Clz => UntypedVal::from(u32v(x).leading_zeros() as i32),
        I32Ctz => UntypedVal::from(u32v(x).trailing_zeros() as i32),
        I32Popcnt => UntypedVal::from(u32v(x).count_ones() as i32),
        I64Clz => UntypedVal::from(u64v(x).leading_zeros() as i64),
        I64Ctz => UntypedVal::from(u64v(x).trailing_zeros() as i64),
        I64Popcnt => UntypedVal::from(u64v(x).count_ones() as i64),
        F32Abs => UntypedVal::from(f32v(x).abs()),
        F32Neg => UntypedVal::from(-f32v(x)),
        F32Sqrt => UntypedVal::from(libm::sqrtf(f32v(x))),
        F32Ceil => UntypedVal::from(libm::ceilf(f32v(x))),
        F32Floor => UntypedVal::from(libm::floorf(f32v(x))),
        F32Trunc => UntypedVal::from(libm::truncf(f32v(x))),
        F32Nearest => UntypedVal::from(libm::rintf(f32v(x))),
        F64Abs => UntypedVal::from(f64v(x).abs()),
        F64Neg => UntypedVal::from(-f64v(x)),
        F64Sqrt => UntypedVal::from(libm::sqrt(f64v(x))),
        F64Ceil => UntypedVal::from(libm::ceil(f64v(x))),
        F64Floor => UntypedVal::from(libm::floor(f64v(x))),
        F64Trunc => UntypedVal::from(libm::trunc(f64v(x))),
        F64Nearest => UntypedVal::from(libm::rint(f64v(x))),
        I32Eqz => UntypedVal::from((u32v(x) == 0) as i32),
        I64Eqz => UntypedVal::from((u64v(x) == 0) as i32),
        I32WrapI64 => UntypedVal::from(i64v(x) as i32),
        I64ExtendI32S => UntypedVal::from(i32v(x) as i64),
        I64ExtendI32U => UntypedVal::from(u32v(x) as u64),
        I32Extend8S => UntypedVal::from(i32v(x) as i8 as i32),
        I32Extend16S => UntypedVal::from(i32v(x) as i16 as i32),
        I64Extend8S => UntypedVal::from(i64v(x) as i8 as i64),
        I64Extend16S => UntypedVal::from(i64v(x) as i16 as i64),
        I64Extend32S => UntypedVal::from(i64v(x) as i32 as i64),
        F32DemoteF64 => UntypedVal::from(f64v(x) as f32),
        F64PromoteF32 => UntypedVal::from(f64::from(f32v(x))),
        F32ConvertI32S => UntypedVal::from(i32v(x) as f32),
        F32ConvertI32U => UntypedVal::from(u32v(x) as f32),
        F32ConvertI64S => UntypedVal::from(i64v(x) as f32),
        F32ConvertI64U => UntypedVal::from(u64v(x) as f32),
        F64ConvertI32S => UntypedVal::from(i32v(x) as f64),
        F64ConvertI32U => UntypedVal::from(u32v(x) as f64),
        F64ConvertI64S => UntypedVal::from(i64v(x) as f64),
        F64ConvertI64U => UntypedVal::from(u64v(x) as f64),
        I32TruncF32S => UntypedVal::from(trunc_f32_i32(f32v(x))?),
        I32TruncF32U => UntypedVal::from(trunc_f32_u32(f32v(x))?),
        I32TruncF64S => UntypedVal::from(trunc_f64_i32(f64v(x))?),
        I32TruncF64U => UntypedVal::from(trunc_f64_u32(f64v(x))?),
        I64TruncF32S => UntypedVal::from(trunc_f32_i64(f32v(x))?),
        I64TruncF32U => UntypedVal::from(trunc_f32_u64(f32v(x))?),
        I64TruncF64S => UntypedVal::from(trunc_f64_i64(f64v(x))?),
        I64TruncF64U => UntypedVal::from(trunc_f64_u64(f64v(x))?),
        I32ReinterpretF32 => UntypedVal::from(f32v(x).to_bits() as i32),
        F32ReinterpretI32 => UntypedVal::from(f32::from_bits(u32v(x))),
        I64ReinterpretF64 => UntypedVal::from(f64v(x).to_bits() as i64),
        F64ReinterpretI64 => UntypedVal::from(f64::from_bits(u64v(x))),
    };
    Ok(v)
}

fn trunc_f32_i32(x: f32) -> Result<i32, Trap> {
    if !(-2147483904.0f32..2147483648.0f32).contains(&x) || x.is_nan() {
        return Err(TrapCode::InvalidConversionToInteger.into());
    }
    Ok(x as i32)
}
fn trunc_f32_u32(x: f32) -> Result<u32, Trap> {
    if !(-1.0f32..4294967296.0f32).contains(&x) || x.is_nan() {
        return Err(TrapCode::InvalidConversionToInteger.into());
    }
    Ok(x as u32)
}
fn trunc_f64_i32(x: f64) -> Result<i32, Trap> {
    if !(-2147483649.0f64..2147483648.0f64).contains(&x) || x.is_nan() {
        return Err(TrapCode::InvalidConversionToInteger.into());
    }
    Ok(x as i32)
}
fn trunc_f64_u32(x: f64) -> Result<u32, Trap> {
    if !(-1.0f64..4294967296.0f64).contains(&x) || x.is_nan() {
        return Err(TrapCode::InvalidConversionToInteger.into());
    }
    Ok(x as u32)
}
fn trunc_f32_i64(x: f32) -> Result<i64, Trap> {
    if !(-9223373136366403584.0f32..9223372036854775808.0f32).contains(&x) || x.is_nan() {
        return Err(TrapCode::InvalidConversionToInteger.into());
    }
    Ok(x as i64)
}
fn trunc_f32_u64(x: f32) -> Result<u64, Trap> {
    if !(-1.0f32..18446744073709551616.0f32).contains(&x) || x.is_nan() {
        return Err(TrapCode::InvalidConversionToInteger.into());
    }
    Ok(x as u64)
}
fn trunc_f64_i64(x: f64) -> Result<i64, Trap> {
    if !(-9223372036854777856.0f64..9223372036854775808.0f64).contains(&x) || x.is_nan() {
        return Err(TrapCode::InvalidConversionToInteger.into());
    }
    Ok(x as i64)
}
fn trunc_f64_u64(x: f64) -> Result<u64, Trap> {
    if !(-1.0f64..18446744073709551616.0f64).contains(&x) || x.is_nan() {
        return Err(TrapCode::InvalidConversionToInteger.into());
    }
    Ok(x as u64)
}

pub fn eval_bin(op: BinOpKind, lhs: UntypedVal, rhs: UntypedVal) -> Result<UntypedVal, Trap> {
    use BinOpKind::*;
    let v = match op {
        I32Add => UntypedVal::from(i32v(lhs).wrapping_add(i32v(rhs))),
        I32Sub => UntypedVal::from(i32v(lhs).wrapping_sub(i32v(rhs))),
        I32Mul => UntypedVal::from(i32v(lhs).wrapping_mul(i32v(rhs))),
        I32DivS => {
            let (a, b) = (i32v(lhs), i32v(rhs));
            if b == 0 {
                return Err(TrapCode::IntegerDivideByZero.into());
            }
            if a == i32::MIN && b == -1 {
                return Err(TrapCode::IntegerOverflow.into());
            }
            UntypedVal::from(a.wrapping_div(b))
        }
        I32DivU => {
            let (a, b) = (u32v(lhs), u32v(rhs));
            if b == 0 {
                return Err(TrapCode::IntegerDivideByZero.into());
            }
            UntypedVal::from(a / b)
        }
        I32RemS => {
            let (a, b) = (i32v(lhs), i32v(rhs));
            if b == 0 {
                return Err(TrapCode::IntegerDivideByZero.into());
            }
            UntypedVal::from(a.wrapping_rem(b))
        }
        I32RemU => {
            let (a, b) = (u32v(lhs), u32v(rhs));
            if b == 0 {
                return Err(TrapCode::IntegerDivideByZero.into());
            }
            UntypedVal::from(a % b)
        }
        I32And => UntypedVal::from(u32v(lhs) & u32v(rhs)),
        I32Or => UntypedVal::from(u32v(lhs) | u32v(rhs)),
        I32Xor => UntypedVal::from(u32v(lhs) ^ u32v(rhs)),
        I32Shl => UntypedVal::from(u32v(lhs).wrapping_shl(u32v(rhs))),
        I32ShrS => UntypedVal::from(i32v(lhs).wrapping_shr(u32v(rhs))),
        I32ShrU => UntypedVal::from(u32v(lhs).wrapping_shr(u32v(rhs))),
        I32Rotl => UntypedVal::from(u32v(lhs).rotate_left(u32v(rhs) & 31)),
        I32Rotr => UntypedVal::from(u32v(lhs).rotate_right(u32v(rhs) & 31)),
        I64Add => UntypedVal::from(i64v(lhs).wrapping_add(i64v(rhs))),
        I64Sub => UntypedVal::from(i64v(lhs).wrapping_sub(i64v(rhs))),
        I64Mul => UntypedVal::from(i64v(lhs).wrapping_mul(i64v(rhs))),
        I64DivS => {
            let (a, b) = (i64v(lhs), i64v(rhs));
            if b == 0 {
                return Err(TrapCode::IntegerDivideByZero.into());
            }
            if a == i64::MIN && b == -1 {
                return Err(TrapCode::IntegerOverflow.into());
            }
            UntypedVal::from(a.wrapping_div(b))
        }
        I64DivU => {
            let (a, b) = (u64v(lhs), u64v(rhs));
            if b == 0 {
                return Err(TrapCode::IntegerDivideByZero.into());
            }
            UntypedVal::from(a / b)
        }
        I64RemS => {
            let (a, b) = (i64v(lhs), i64v(rhs));
            if b == 0 {
                return Err(TrapCode::IntegerDivideByZero.into());
            }
            UntypedVal::from(a.wrapping_rem(b))
        }
        I64RemU => {
            let (a, b) = (u64v(lhs), u64v(rhs));
            if b == 0 {
                return Err(TrapCode::IntegerDivideByZero.into());
            }
            UntypedVal::from(a % b)
        }
        I64And => UntypedVal::from(u64v(lhs) & u64v(rhs)),
        I64Or => UntypedVal::from(u64v(lhs) | u64v(rhs)),
        I64Xor => UntypedVal::from(u64v(lhs) ^ u64v(rhs)),
        I64Shl => UntypedVal::from(u64v(lhs).wrapping_shl(u32v(rhs))),
        I64ShrS => UntypedVal::from(i64v(lhs).wrapping_shr(u32v(rhs))),
        I64ShrU => UntypedVal::from(u64v(lhs).wrapping_shr(u32v(rhs))),
        I64Rotl => UntypedVal::from(u64v(lhs).rotate_left(u32v(rhs) & 63)),
        I64Rotr => UntypedVal::from(u64v(lhs).rotate_right(u32v(rhs) & 63)),
        F32Add => UntypedVal::from(f32v(lhs) + f32v(rhs)),
        F32Sub => UntypedVal::from(f32v(lhs) - f32v(rhs)),
        F32Mul => UntypedVal::from(f32v(lhs) * f32v(rhs)),
        F32Div => UntypedVal::from(f32v(lhs) / f32v(rhs)),
        F32Min => UntypedVal::from(wasm_fmin(f32v(lhs), f32v(rhs))),
        F32Max => UntypedVal::from(wasm_fmax(f32v(lhs), f32v(rhs))),
        F32Copysign => UntypedVal::from(libm::copysignf(f32v(lhs), f32v(rhs))),
        F64Add => UntypedVal::from(f64v(lhs) + f64v(rhs)),
        F64Sub => UntypedVal::from(f64v(lhs) - f64v(rhs)),
        F64Mul => UntypedVal::from(f64v(lhs) * f64v(rhs)),
        F64Div => UntypedVal::from(f64v(lhs) / f64v(rhs)),
        F64Min => UntypedVal::from(wasm_fmin(f64v(lhs), f64v(rhs))),
        F64Max => UntypedVal::from(wasm_fmax(f64v(lhs), f64v(rhs))),
        F64Copysign => UntypedVal::from(libm::copysign(f64v(lhs), f64v(rhs))),
    };
    Ok(v)
}

/// Wasm `min`/`max`: propagate NaN, and distinguish `-0.0`/`+0.0`, unlike
/// Rust's `f32::min`/`f32::max`.
fn wasm_fmin<T: Float>(a: T, b: T) -> T {
    if a.is_nan() || b.is_nan() {
        return T::nan();
    }
    if a.is_zero() && b.is_zero() {
        return if a.is_sign_negative() { a } else { b };
    }
    if a < b {
        a
    } else {
        b
    }
}
fn wasm_fmax<T: Float>(a: T, b: T) -> T {
    if a.is_nan() || b.is_nan() {
        return T::nan();
    }
    if a.is_zero() && b.is_zero() {
        return if a.is_sign_positive() { a } else { b };
    }
    if a > b {
        a
    } else {
        b
    }
}

trait Float: PartialOrd + Copy {
    fn is_nan(self) -> bool;
    fn is_zero(self) -> bool;
    fn is_sign_negative(self) -> bool;
    fn is_sign_positive(self) -> bool;
    fn nan() -> Self;
}
impl Float for f32 {
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
    fn is_zero(self) -> bool {
        self == 0.0
    }
    fn is_sign_negative(self) -> bool {
        f32::is_sign_negative(self)
    }
    fn is_sign_positive(self) -> bool {
        f32::is_sign_positive(self)
    }
    fn nan() -> Self {
        f32::NAN
    }
}
impl Float for f64 {
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
    fn is_zero(self) -> bool {
        self == 0.0
    }
    fn is_sign_negative(self) -> bool {
        f64::is_sign_negative(self)
    }
    fn is_sign_positive(self) -> bool {
        f64::is_sign_positive(self)
    }
    fn nan() -> Self {
        f64::NAN
    }
}

pub fn eval_cmp(op: CmpKind, lhs: UntypedVal, rhs: UntypedVal) -> UntypedVal {
    use CmpKind::*;
    let b = match op {
        I32Eq => i32v(lhs) == i32v(rhs),
        I32Ne => i32v(lhs) != i32v(rhs),
        I32LtS => i32v(lhs) < i32v(rhs),
        I32LtU => u32v(lhs) < u32v(rhs),
        I32GtS => i32v(lhs) > i32v(rhs),
        I32GtU => u32v(lhs) > u32v(rhs),
        I32LeS => i32v(lhs) <= i32v(rhs),
        I32LeU => u32v(lhs) <= u32v(rhs),
        I32GeS => i32v(lhs) >= i32v(rhs),
        I32GeU => u32v(lhs) >= u32v(rhs),
        I64Eq => i64v(lhs) == i64v(rhs),
        I64Ne => i64v(lhs) != i64v(rhs),
        I64LtS => i64v(lhs) < i64v(rhs),
        I64LtU => u64v(lhs) < u64v(rhs),
        I64GtS => i64v(lhs) > i64v(rhs),
        I64GtU => u64v(lhs) > u64v(rhs),
        I64LeS => i64v(lhs) <= i64v(rhs),
        I64LeU => u64v(lhs) <= u64v(rhs),
        I64GeS => i64v(lhs) >= i64v(rhs),
        I64GeU => u64v(lhs) >= u64v(rhs),
        F32Eq => f32v(lhs) == f32v(rhs),
        F32Ne => f32v(lhs) != f32v(rhs),
        F32Lt => f32v(lhs) < f32v(rhs),
        F32Gt => f32v(lhs) > f32v(rhs),
        F32Le => f32v(lhs) <= f32v(rhs),
        F32Ge => f32v(lhs) >= f32v(rhs),
        F64Eq => f64v(lhs) == f64v(rhs),
        F64Ne => f64v(lhs) != f64v(rhs),
        F64Lt => f64v(lhs) < f64v(rhs),
        F64Gt => f64v(lhs) > f64v(rhs),
        F64Le => f64v(lhs) <= f64v(rhs),
        F64Ge => f64v(lhs) >= f64v(rhs),
    };
    UntypedVal::from(b as i32)
}

/// MAC/FMA-like fusion: always two discrete IEEE-754 ops, never a real
/// hardware FMA (`spec.md` §9, Open Question — rounding must match the
/// un-fused two-instruction sequence exactly).
pub fn eval_mac(op: MacKind, a: UntypedVal, b: UntypedVal, c: UntypedVal) -> UntypedVal {
    use MacKind::*;
    match op {
        F32MulAdd => UntypedVal::from(f32v(a) * f32v(b) + f32v(c)),
        F32MulSub => UntypedVal::from(f32v(a) * f32v(b) - f32v(c)),
        F64MulAdd => UntypedVal::from(f64v(a) * f64v(b) + f64v(c)),
        F64MulSub => UntypedVal::from(f64v(a) * f64v(b) - f64v(c)),
        I32MulAdd => UntypedVal::from(i32v(a).wrapping_mul(i32v(b)).wrapping_add(i32v(c))),
        I64MulAdd => UntypedVal::from(i64v(a).wrapping_mul(i64v(b)).wrapping_add(i64v(c))),
    }
}
