//! The WASI preview1 errno subset this crate returns (`SPEC_FULL.md` §4.11,
//! `spec.md` §4.8: "the errno set used includes at minimum `esuccess`,
//! `einval`, `eoverflow`, `eio`").

use thiserror::Error;

/// A WASI preview1 `errno`, encoded as the guest-visible `u16` wire value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[repr(u16)]
pub enum Errno {
    #[error("success")]
    Success = 0,
    #[error("bad file descriptor")]
    Badf = 8,
    #[error("invalid argument")]
    Inval = 28,
    #[error("i/o error")]
    Io = 29,
    #[error("value too large")]
    Overflow = 61,
}

impl Errno {
    pub fn as_i32(self) -> i32 {
        self as u16 as i32
    }
}
