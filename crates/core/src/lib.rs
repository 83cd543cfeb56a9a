#![cfg_attr(not(feature = "std"), no_std)]

//! Value and type model shared between the translator, the op table and the
//! dispatch engine.
//!
//! This crate owns nothing that depends on a particular module's storage: it
//! is the vocabulary every other crate in the workspace speaks.

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std as alloc;

mod func_type;
mod pages;
mod trap;
mod untyped;
mod value;

pub use self::{
    func_type::FuncType,
    pages::Pages,
    trap::{MemoryOobDetail, Trap, TrapCode},
    untyped::UntypedVal,
    value::{
        ExtendInto,
        SignExtendFrom,
        TransmuteInto,
        TruncateSaturateInto,
        TryTruncateInto,
        ValType,
        WrapInto,
    },
};
