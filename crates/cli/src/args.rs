//! Command-line surface: `fusewasm run <path.wasm> [--invoke name] [args...]
//! [--wasi]` (`SPEC_FULL.md` §6).

use std::path::PathBuf;

use clap::Parser;

/// Runs a Wasm module through the fusewasm interpreter.
#[derive(Parser)]
#[command(name = "fusewasm", version, about = "A fused-opcode WebAssembly interpreter")]
pub struct Args {
    /// The function to invoke.
    ///
    /// If missing, fusewasm runs `_start` when `--wasi` is set, or falls
    /// back to printing the module's exported functions.
    #[arg(long = "invoke", value_name = "FUNCTION")]
    pub invoke: Option<String>,

    /// Wires the `wasi_snapshot_preview1` import set into the module's
    /// imports and treats the trailing arguments as WASI CLI arguments.
    #[arg(long = "wasi")]
    pub wasi: bool,

    /// Raises the tracing filter to `debug`.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// The Wasm module to run.
    pub wasm_file: PathBuf,

    /// Arguments given to the invoked function, or to WASI when `--wasi`
    /// is set and `--invoke` is not.
    pub func_args: Vec<String>,
}
