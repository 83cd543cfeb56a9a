//! The fused-opcode catalog (`spec.md` §4.4, component C4).
//!
//! This crate owns the operation record type (`Instr`) and the small closed
//! enums that parameterize it (binary/unary/compare/MAC op kinds, memory
//! widths). It knows nothing about how a function body is translated into a
//! sequence of these records (that's `fusewasm`'s translator, C5) or how
//! they're executed (`fusewasm`'s dispatch engine, C6) — it is purely the
//! vocabulary both of those share.

mod index;
mod instr;
mod op;

pub use self::{
    index::{FuncIdx, InstrIdx, LocalOffset, ModuleId, TableIdx, TypeIdx},
    instr::{Dst, GlobalIdx, Instr},
    op::{BinOpKind, CmpKind, LoadExtend, MacKind, MemWidth, UnOpKind},
};
