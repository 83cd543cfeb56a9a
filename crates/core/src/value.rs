/// The kind of a guest scalar value.
///
/// Exactly the four Wasm 1.0 numeric types participate as operand-stack,
/// local, parameter or result kinds. `FuncRef`/`ExternRef` only ever show up
/// as table element kinds, never as a value kind here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    /// Size in bytes of the canonical little-endian in-memory encoding.
    ///
    /// Also the kind's natural alignment, per the ABI packing rule in
    /// `spec.md` §4.1: each kind is aligned to its own size.
    pub const fn size(self) -> usize {
        match self {
            ValType::I32 | ValType::F32 => 4,
            ValType::I64 | ValType::F64 => 8,
        }
    }

    pub const fn is_32(self) -> bool {
        matches!(self, ValType::I32 | ValType::F32)
    }

    pub const fn is_64(self) -> bool {
        matches!(self, ValType::I64 | ValType::F64)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, ValType::F32 | ValType::F64)
    }
}

/// Convert one type to another by wrapping (truncating) the bit pattern.
pub trait WrapInto<T> {
    fn wrap_into(self) -> T;
}

/// Convert one type to another by rounding toward zero.
///
/// # Errors
///
/// Traps when the input float is NaN or out of the destination's
/// representable range.
pub trait TryTruncateInto<T, E> {
    fn try_truncate_into(self) -> Result<T, E>;
}

/// Convert one type to another by rounding toward zero with saturating
/// semantics: NaN becomes `0`, out-of-range values saturate to the nearest
/// representable bound.
pub trait TruncateSaturateInto<T> {
    fn truncate_saturate_into(self) -> T;
}

/// Convert one type to another by zero- or float-extending.
pub trait ExtendInto<T> {
    fn extend_into(self) -> T;
}

/// Sign-extends `Self` from the narrower integer representation `T`.
pub trait SignExtendFrom<T> {
    fn sign_extend_from(self) -> Self;
}

/// Reinterprets the bits of one type as another type of equal width.
pub trait TransmuteInto<T> {
    fn transmute_into(self) -> T;
}

macro_rules! impl_wrap_into {
    ($from:ty => $to:ty) => {
        impl WrapInto<$to> for $from {
            fn wrap_into(self) -> $to {
                self as $to
            }
        }
    };
}
impl_wrap_into!(i64 => i32);
impl_wrap_into!(u64 => u32);
impl_wrap_into!(f64 => f32);

macro_rules! impl_extend_into {
    ($from:ty => $to:ty) => {
        impl ExtendInto<$to> for $from {
            fn extend_into(self) -> $to {
                self as $to
            }
        }
    };
}
impl_extend_into!(i32 => i64);
impl_extend_into!(u32 => i64);
impl_extend_into!(u32 => u64);
impl_extend_into!(f32 => f64);

macro_rules! impl_sign_extend_from {
    ($ty:ty, $from:ty) => {
        impl SignExtendFrom<$from> for $ty {
            fn sign_extend_from(self) -> Self {
                (self as $from) as $ty
            }
        }
    };
}
impl_sign_extend_from!(i32, i8);
impl_sign_extend_from!(i32, i16);
impl_sign_extend_from!(i64, i8);
impl_sign_extend_from!(i64, i16);
impl_sign_extend_from!(i64, i32);

macro_rules! impl_transmute_into {
    ($from:ty, $to:ty) => {
        impl TransmuteInto<$to> for $from {
            fn transmute_into(self) -> $to {
                <$to>::from_ne_bytes(self.to_ne_bytes())
            }
        }
    };
}
impl_transmute_into!(u32, f32);
impl_transmute_into!(f32, u32);
impl_transmute_into!(u64, f64);
impl_transmute_into!(f64, u64);
impl_transmute_into!(i32, f32);
impl_transmute_into!(f32, i32);
impl_transmute_into!(i64, f64);
impl_transmute_into!(f64, i64);

macro_rules! impl_truncate_saturate_into {
    ($from:ty => $to:ty) => {
        impl TruncateSaturateInto<$to> for $from {
            fn truncate_saturate_into(self) -> $to {
                // `as` casts between float and integer types already saturate
                // and map NaN to `0` per Rust's `as` semantics (RFC 0401).
                self as $to
            }
        }
    };
}
impl_truncate_saturate_into!(f32 => i32);
impl_truncate_saturate_into!(f32 => u32);
impl_truncate_saturate_into!(f32 => i64);
impl_truncate_saturate_into!(f32 => u64);
impl_truncate_saturate_into!(f64 => i32);
impl_truncate_saturate_into!(f64 => u32);
impl_truncate_saturate_into!(f64 => i64);
impl_truncate_saturate_into!(f64 => u64);

macro_rules! impl_try_truncate_into {
    ($from:ty => $to:ty, $min:expr, $max:expr) => {
        impl TryTruncateInto<$to, crate::TrapCode> for $from {
            fn try_truncate_into(self) -> Result<$to, crate::TrapCode> {
                if self.is_nan() {
                    return Err(crate::TrapCode::InvalidConversionToInteger);
                }
                if self < $min || self > $max {
                    return Err(crate::TrapCode::InvalidConversionToInteger);
                }
                Ok(self as $to)
            }
        }
    };
}
impl_try_truncate_into!(f32 => i32, -2147483904.0f32, 2147483648.0f32);
impl_try_truncate_into!(f32 => u32, -1.0f32, 4294967296.0f32);
impl_try_truncate_into!(f64 => i32, -2147483649.0f64, 2147483648.0f64);
impl_try_truncate_into!(f64 => u32, -1.0f64, 4294967296.0f64);
impl_try_truncate_into!(f32 => i64, -9223373136366403584.0f32, 9223372036854775808.0f32);
impl_try_truncate_into!(f32 => u64, -1.0f32, 18446744073709551616.0f32);
impl_try_truncate_into!(f64 => i64, -9223372036854777856.0f64, 9223372036854775808.0f64);
impl_try_truncate_into!(f64 => u64, -1.0f64, 18446744073709551616.0f64);
