//! The CLI application's state: the engine [`Store`], the loaded module's
//! id, and the call stack used for every invocation (`SPEC_FULL.md` §6).

use std::{fs, path::Path, sync::Arc};

use anyhow::{anyhow, Context as _, Error};
use fusewasm::{
    config::{CompileOptions, EngineConfig},
    linker::{HostImports, NoHostImports},
    loader::ExportDesc,
    store::ModuleInstance,
    CallStack, FuncType, ModuleId, Store,
};
use fusewasm_wasi::{WasiCtx, WasiImports};

pub struct Context {
    store: Store,
    call_stack: CallStack,
    module: ModuleId,
    wasi: Option<Arc<WasiCtx>>,
}

impl Context {
    /// Parses, validates and instantiates the module at `wasm_file`. When
    /// `wasi_ctx` is given, the `wasi_snapshot_preview1` import set is wired
    /// in and bound to the module's memory once instantiation succeeds.
    pub fn new(wasm_file: &Path, wasi_ctx: Option<Arc<WasiCtx>>) -> Result<Self, Error> {
        let wasm = fs::read(wasm_file).with_context(|| format!("failed to read Wasm file {wasm_file:?}"))?;

        let mut store = Store::new();
        let imports = wasi_ctx.clone().map(WasiImports::new);
        let host: &dyn HostImports = match &imports {
            Some(imports) => imports,
            None => &NoHostImports,
        };
        let config = EngineConfig::default();
        let options = CompileOptions::default();
        let name = wasm_file.to_string_lossy().into_owned();
        let module = fusewasm::load_and_instantiate(&mut store, name, &wasm, host, &config, &options)
            .map_err(|error| anyhow!("failed to parse, validate or instantiate {wasm_file:?}: {error}"))?;

        if let Some(ctx) = &wasi_ctx {
            if let Some(memory) = store.module(module).storage.memory() {
                ctx.bind_memory(memory.clone());
            }
        }

        Ok(Self { store, call_stack: CallStack::new(), module, wasi: wasi_ctx })
    }

    pub fn instance(&self) -> &ModuleInstance {
        self.store.module(self.module)
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn wasi(&self) -> Option<&Arc<WasiCtx>> {
        self.wasi.as_ref()
    }

    /// Calls `func` against this context's module, using its own call stack
    /// for the trace (`spec.md` §4.7).
    pub fn call(&mut self, func: fusewasm::FuncIdx, params: &[u8], result: &mut [u8]) -> Result<(), fusewasm::Trap> {
        fusewasm::call::call_direct(&self.store, &mut self.call_stack, self.module, func, params, result)
    }

    /// The call-stack frames left behind by the most recent call, innermost
    /// last — used to name the function a trap happened in (`spec.md`
    /// §4.7, §8 scenario 2).
    pub fn call_stack_frames(&self) -> &[fusewasm::call::Frame] {
        self.call_stack.frames()
    }

    /// The exported named functions of the module.
    pub fn exported_funcs(&self) -> impl Iterator<Item = (&str, &FuncType)> {
        let storage = &self.instance().storage;
        self.instance().exports.iter().filter_map(move |(name, desc)| match desc {
            ExportDesc::Func(idx) => storage.func_type(fusewasm::FuncIdx::from_u32(*idx)).map(|ty| (name.as_str(), ty)),
            _ => None,
        })
    }

    /// Resolves `name` to its exported function index and signature.
    pub fn get_func(&self, name: &str) -> Result<(fusewasm::FuncIdx, &FuncType), Error> {
        let storage = &self.instance().storage;
        match self.instance().exports.get(name) {
            Some(ExportDesc::Func(idx)) => {
                let idx = fusewasm::FuncIdx::from_u32(*idx);
                let ty = storage.func_type(idx).ok_or_else(|| anyhow!("function {name:?} has no signature"))?;
                Ok((idx, ty))
            }
            Some(_) => Err(anyhow!("export {name:?} is not a function")),
            None => Err(anyhow!("failed to find function named {name:?} in the Wasm module")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    fn write_wat(name: &str, wat: &str) -> std::path::PathBuf {
        let bytes = wat::parse_str(wat).unwrap();
        let mut path = std::env::temp_dir();
        path.push(format!("fusewasm-cli-test-{name}-{}.wasm", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&bytes).unwrap();
        path
    }

    #[test]
    fn calls_exported_function_by_name() {
        let path = write_wat(
            "add",
            r#"(module (func (export "add") (param i32 i32) (result i32)
                local.get 0 local.get 1 i32.add))"#,
        );
        let mut ctx = Context::new(&path, None).unwrap();
        let (func, ty) = ctx.get_func("add").unwrap();
        assert_eq!(ty.params().len(), 2);
        let mut params = Vec::new();
        params.extend_from_slice(&2i32.to_le_bytes());
        params.extend_from_slice(&3i32.to_le_bytes());
        let mut result = [0u8; 4];
        ctx.call(func, &params, &mut result).unwrap();
        assert_eq!(result, 5i32.to_le_bytes());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_export_is_reported_by_name() {
        let path = write_wat("empty", r#"(module)"#);
        let ctx = Context::new(&path, None).unwrap();
        let result = ctx.get_func("missing");
        assert_matches!(result, Err(_));
        assert!(result.unwrap_err().to_string().contains("missing"));
        let _ = fs::remove_file(&path);
    }
}
