//! `WasiCtx`: the per-module state a `wasi_snapshot_preview1` import set
//! closes over (`SPEC_FULL.md` §4.11).
//!
//! A `HostFn` (`fusewasm::module::HostFn`) is a context-free
//! `Fn(&mut [u8], &[u8]) -> Result<(), Trap>` closure with no way to reach
//! the calling module's linear memory directly — guest pointers inside
//! `params` are just `u32` offsets. `WasiCtx::bind_memory` closes that gap:
//! the linker resolves WASI imports before the owning module's memory
//! exists, so the closures built in `resolve_func` capture `ctx` by `Arc`
//! and look the memory up lazily, once, the first time a syscall runs.

use std::sync::{Arc, Mutex, OnceLock};

use fusewasm::memory::LinearMemory;
use fusewasm_core::{Trap, TrapCode};

/// Command-line arguments and environment a guest sees through
/// `args_get`/`environ_get` (`SPEC_FULL.md` §4.11).
#[derive(Debug, Default, Clone)]
pub struct WasiCtx {
    args: Vec<String>,
    env: Vec<(String, String)>,
    memory: OnceLock<Arc<LinearMemory>>,
    exit_code: Arc<Mutex<Option<i32>>>,
}

impl WasiCtx {
    pub fn builder() -> WasiCtxBuilder {
        WasiCtxBuilder::default()
    }

    /// Binds the memory a bound `HostFn` closure should read and write.
    /// Called once by the embedder right after the WASI-importing module
    /// is instantiated. Idempotent by construction: every closure shares
    /// one `Arc<WasiCtx>`, and a module has exactly one memory.
    pub fn bind_memory(&self, memory: Arc<LinearMemory>) {
        let _ = self.memory.set(memory);
    }

    /// Looks up the bound memory, or traps: a syscall running before
    /// `bind_memory` is an embedder bug, not a guest-reachable condition.
    pub(crate) fn memory(&self) -> Result<&LinearMemory, Trap> {
        self.memory
            .get()
            .map(|arc| arc.as_ref())
            .ok_or_else(|| Trap::new(TrapCode::Unreachable))
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Records the code a guest passed to `proc_exit`. The call site must
    /// still return a fatal trap to unwind out of guest execution — there
    /// is no "exit" trap kind, so this cell is how the real code survives
    /// past it (`SPEC_FULL.md` §4.11, `DESIGN.md`).
    pub(crate) fn record_exit(&self, code: i32) {
        tracing::debug!(code, "guest called proc_exit");
        *self.exit_code.lock().expect("exit_code mutex poisoned") = Some(code);
    }

    /// The exit code recorded by `proc_exit`, if the guest called it.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock().expect("exit_code mutex poisoned")
    }
}

#[derive(Debug, Default)]
pub struct WasiCtxBuilder {
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl WasiCtxBuilder {
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn inherit_env(mut self) -> Self {
        self.env.extend(std::env::vars());
        self
    }

    pub fn build(self) -> Arc<WasiCtx> {
        Arc::new(WasiCtx {
            args: self.args,
            env: self.env,
            memory: OnceLock::new(),
            exit_code: Arc::new(Mutex::new(None)),
        })
    }
}
