//! Library-boundary error types (`SPEC_FULL.md` §2): every fallible entry
//! point that isn't a guest-visible [`fusewasm_core::Trap`] returns one of
//! these via `thiserror`, mirroring the teacher's split between structured
//! library errors and `anyhow`-wrapped CLI context.

use fusewasm_core::Trap;
use fusewasm_ir::{FuncIdx, ModuleId};
use thiserror::Error;

/// Failures while parsing or validating a module (`spec.md` §4.9).
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("malformed module: {0}")]
    Malformed(String),
    #[error("module failed validation: {0}")]
    Invalid(String),
    #[error("unsupported construct: {0}")]
    Unsupported(String),
}

impl From<wasmparser::BinaryReaderError> for ModuleError {
    fn from(err: wasmparser::BinaryReaderError) -> Self {
        ModuleError::Malformed(err.to_string())
    }
}

/// Failures while resolving imports during instantiation (`spec.md` §4.10,
/// §3's link-state machine).
#[derive(Debug, Error)]
pub enum LinkerError {
    #[error("module {module} import {index} has no matching export")]
    Unresolved { module: ModuleId, index: u32 },
    #[error("import alias chain from module {module} import {index} exceeds the maximum of {max} hops")]
    ChainTooLong { module: ModuleId, index: u32, max: u32 },
    #[error("module {module} function {func} imports a signature incompatible with its export")]
    SignatureMismatch { module: ModuleId, func: FuncIdx },
    #[error("no module registered with id {0}")]
    UnknownModule(ModuleId),
    #[error(transparent)]
    Translate(#[from] ModuleError),
    #[error("module's start function trapped: {0}")]
    StartTrapped(#[from] Trap),
}
