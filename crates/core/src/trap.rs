use core::fmt::{self, Display};

/// The fatal-trap taxonomy of `spec.md` §4.7.
///
/// Every variant here is a *fatal* condition: reaching one terminates guest
/// execution and is reported through the call bridge's trap reporter. There
/// is no in-guest catch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TrapCode {
    /// Reached an `unreachable` instruction.
    Unreachable,
    /// A float-to-integer conversion overflowed or the input was NaN.
    InvalidConversionToInteger,
    /// Integer division or remainder by zero.
    IntegerDivideByZero,
    /// Signed integer division overflow (`MIN / -1`).
    IntegerOverflow,
    /// A load or store address fell outside the linear memory's bounds.
    MemoryOutOfBounds,
    /// `call_indirect` selector was >= the table length.
    TableOutOfBounds,
    /// `call_indirect` selected a null table element.
    NullElement,
    /// `call_indirect`'s resolved signature didn't match the type index.
    BadSignature,
    /// Reserved for a future exception/catch-tag mechanism; currently
    /// equivalent to any other trap (`spec.md` §4.7).
    UncaughtTag,
}

impl Display for TrapCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let message = match self {
            Self::Unreachable => "unreachable",
            Self::InvalidConversionToInteger => "invalid conversion to integer",
            Self::IntegerDivideByZero => "integer divide by zero",
            Self::IntegerOverflow => "integer overflow",
            Self::MemoryOutOfBounds => "out of bounds memory access",
            Self::TableOutOfBounds => "undefined element: out of bounds table access",
            Self::NullElement => "uninitialized element",
            Self::BadSignature => "indirect call type mismatch",
            Self::UncaughtTag => "uncaught exception tag",
        };
        f.write_str(message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TrapCode {}

/// Extra detail carried by an out-of-bounds memory trap so the reporter can
/// print the exact operand tuple demanded by `spec.md` §4.2.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryOobDetail {
    pub static_offset: u32,
    pub address: u32,
    pub effective_offset: u64,
    pub memory_len: u64,
    pub access_width: u8,
}

/// A fatal trap, optionally carrying the memory-access detail tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trap {
    code: TrapCode,
    memory_detail: Option<MemoryOobDetail>,
}

impl Trap {
    pub fn new(code: TrapCode) -> Self {
        Self {
            code,
            memory_detail: None,
        }
    }

    pub fn memory_oob(detail: MemoryOobDetail) -> Self {
        Self {
            code: TrapCode::MemoryOutOfBounds,
            memory_detail: Some(detail),
        }
    }

    pub fn code(&self) -> TrapCode {
        self.code
    }

    pub fn memory_detail(&self) -> Option<MemoryOobDetail> {
        self.memory_detail
    }
}

impl From<TrapCode> for Trap {
    fn from(code: TrapCode) -> Self {
        Self::new(code)
    }
}

impl Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.memory_detail {
            None => Display::fmt(&self.code, f),
            Some(detail) => write!(
                f,
                "{}: static_offset=0x{:x} address=0x{:x} effective=0x{:x} length=0x{:x} width={}",
                self.code,
                detail.static_offset,
                detail.address,
                detail.effective_offset,
                detail.memory_len,
                detail.access_width,
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Trap {}
