//! `fusewasm-wasi`: a pass-through WASI preview1 import set for
//! `fusewasm`, plus `poll_oneoff` (`SPEC_FULL.md` §4.11, `spec.md` §4.8).
//!
//! Every syscall is resolved as a `dl` host function
//! (`fusewasm::module::HostFn`): a context-free C-ABI closure. Each one
//! closes over a shared [`WasiCtx`], which the embedder binds to the
//! importing module's linear memory after instantiation
//! (`WasiCtx::bind_memory`).

mod ctx;
mod errno;
mod guest;
mod poll_oneoff;
mod syscalls;

pub use ctx::{WasiCtx, WasiCtxBuilder};
pub use errno::Errno;

use std::sync::Arc;

use fusewasm::linker::HostImports;
use fusewasm::module::HostFn;
use fusewasm::{FuncType, Trap};

const MODULE_NAME: &str = "wasi_snapshot_preview1";

/// The `HostImports` front door for `wasi_snapshot_preview1` calls.
/// Constructed around one [`WasiCtx`] and handed to
/// `fusewasm::load_and_instantiate`.
pub struct WasiImports {
    ctx: Arc<WasiCtx>,
}

impl WasiImports {
    pub fn new(ctx: Arc<WasiCtx>) -> Self {
        Self { ctx }
    }

    pub fn ctx(&self) -> &Arc<WasiCtx> {
        &self.ctx
    }
}

macro_rules! host_fn {
    ($ctx:expr, $f:path) => {{
        let ctx = $ctx.clone();
        Some(Arc::new(move |result: &mut [u8], params: &[u8]| -> Result<(), Trap> {
            let errno = $f(&ctx, params)?;
            result[0..4].copy_from_slice(&errno.to_le_bytes());
            Ok(())
        }) as HostFn)
    }};
}

impl HostImports for WasiImports {
    fn resolve_func(&self, module: &str, name: &str, _ty: &FuncType) -> Option<HostFn> {
        if module != MODULE_NAME {
            return None;
        }
        match name {
            "args_get" => host_fn!(self.ctx, syscalls::args_get),
            "args_sizes_get" => host_fn!(self.ctx, syscalls::args_sizes_get),
            "environ_get" => host_fn!(self.ctx, syscalls::environ_get),
            "environ_sizes_get" => host_fn!(self.ctx, syscalls::environ_sizes_get),
            "clock_time_get" => host_fn!(self.ctx, syscalls::clock_time_get),
            "fd_write" => host_fn!(self.ctx, syscalls::fd_write),
            "fd_read" => host_fn!(self.ctx, syscalls::fd_read),
            "random_get" => host_fn!(self.ctx, syscalls::random_get),
            "proc_exit" => host_fn!(self.ctx, syscalls::proc_exit),
            "poll_oneoff" => host_fn!(self.ctx, poll_oneoff::poll_oneoff),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusewasm::{
        call::{call_direct, CallStack},
        config::{CompileOptions, EngineConfig},
        load_and_instantiate,
        loader::ExportDesc,
        FuncIdx, Store,
    };

    #[test]
    fn args_sizes_get_reports_the_bound_arguments() {
        let wasm = wat::parse_str(
            r#"
            (module
                (import "wasi_snapshot_preview1" "args_sizes_get"
                    (func $args_sizes_get (param i32 i32) (result i32)))
                (memory (export "memory") 1)
                (func (export "run") (param i32 i32) (result i32)
                    local.get 0
                    local.get 1
                    call $args_sizes_get))
            "#,
        )
        .unwrap();

        let ctx = WasiCtx::builder().arg("prog").arg("one").build();
        let imports = WasiImports::new(ctx.clone());

        let mut store = Store::new();
        let module = load_and_instantiate(&mut store, "m", &wasm, &imports, &EngineConfig::default(), &CompileOptions::default())
            .expect("module loads and instantiates");
        let memory = store.module(module).storage.memory().expect("module exports memory").clone();
        ctx.bind_memory(memory);

        let func = match store.module(module).exports["run"] {
            ExportDesc::Func(idx) => FuncIdx::from_u32(idx),
            _ => panic!("run is not a function"),
        };
        let mut call_stack = CallStack::new();
        let mut params = Vec::new();
        params.extend_from_slice(&0u32.to_le_bytes());
        params.extend_from_slice(&4u32.to_le_bytes());
        let mut result = [0u8; 4];
        call_direct(&store, &mut call_stack, module, func, &params, &mut result).unwrap();
        assert_eq!(i32::from_le_bytes(result), Errno::Success.as_i32());

        let mem = ctx.memory().unwrap();
        let guard = mem.lock();
        let argc = u32::from_le_bytes(guard.base()[0..4].try_into().unwrap());
        assert_eq!(argc, 2);
    }
}
