//! `fusewasm`: a fused-opcode, threaded WebAssembly interpreter core.
//!
//! Loads and validates Wasm 1.0 MVP binaries ([`loader`]), translates their
//! function bodies into a peephole-fused op table ([`translator`]), links
//! modules together against each other and against host functions
//! ([`linker`]), and runs the result through a match-loop dispatch engine
//! ([`engine`]) over a packed-byte locals frame and an untyped operand
//! stack.

pub mod call;
pub mod compiled;
pub mod config;
pub mod engine;
pub mod error;
pub mod linker;
pub mod loader;
pub mod memory;
pub mod module;
pub mod registry;
pub mod store;
pub mod translator;

pub use fusewasm_core::{FuncType, MemoryOobDetail, Pages, Trap, TrapCode, UntypedVal, ValType};
pub use fusewasm_ir::{FuncIdx, GlobalIdx, Instr, InstrIdx, LocalOffset, ModuleId, TableIdx, TypeIdx};

pub use crate::{
    call::CallStack,
    compiled::{CompiledFunc, CompiledModule},
    config::{CompileOptions, EngineConfig, StackWindow},
    error::{LinkerError, ModuleError},
    linker::{HostImports, NoHostImports},
    store::{ModuleInstance, Store},
};

/// Parses, validates and instantiates one Wasm binary in a fresh position
/// within `store`, wiring up its imports against every module already
/// present plus `host` (`SPEC_FULL.md` §4.9/§4.10's combined front door).
pub fn load_and_instantiate(
    store: &mut Store,
    name: impl Into<String>,
    bytes: &[u8],
    host: &dyn HostImports,
    config: &EngineConfig,
    options: &CompileOptions,
) -> Result<ModuleId, LoadError> {
    let name = name.into();
    tracing::debug!(module = %name, bytes = bytes.len(), "loading module");
    let parsed = match loader::load_module(bytes) {
        Ok(parsed) => parsed,
        Err(error) => {
            tracing::error!(module = %name, %error, "module failed to parse or validate");
            return Err(error.into());
        }
    };
    let id = match linker::instantiate(store, name.clone(), parsed, host, config, options) {
        Ok(id) => id,
        Err(error) => {
            tracing::error!(module = %name, %error, "module failed to link");
            return Err(error.into());
        }
    };
    tracing::debug!(module = %name, "module instantiated");
    Ok(id)
}

/// Either half of [`load_and_instantiate`]'s two fallible stages.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Linker(#[from] LinkerError),
}

/// Invokes an exported function of `module` by name, packing `params` and
/// unpacking into `result` per the ABI's ordinary packing rule
/// (`spec.md` §4.1).
pub fn invoke_export(
    store: &Store,
    call_stack: &mut CallStack,
    module: ModuleId,
    export_name: &str,
    params: &[u8],
    result: &mut [u8],
) -> Result<(), InvokeError> {
    let inst = store.module(module);
    let desc = inst
        .exports
        .get(export_name)
        .copied()
        .ok_or_else(|| InvokeError::NoSuchExport(export_name.to_string()))?;
    let loader::ExportDesc::Func(idx) = desc else {
        return Err(InvokeError::NotAFunction(export_name.to_string()));
    };
    call::call_direct(store, call_stack, module, FuncIdx::from_u32(idx), params, result).map_err(InvokeError::Trap)
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("no export named {0:?}")]
    NoSuchExport(String),
    #[error("export {0:?} is not a function")]
    NotAFunction(String),
    #[error(transparent)]
    Trap(#[from] Trap),
}
