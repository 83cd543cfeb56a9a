//! The engine session: every loaded module's storage and compiled code,
//! addressed by [`ModuleId`] (`spec.md` §3, §9).

use std::collections::BTreeMap;

use fusewasm_ir::ModuleId;

use crate::{compiled::CompiledModule, loader::ExportDesc, module::ModuleStorage, registry::ModuleRegistry};

/// One loaded module's runtime storage plus its translated code.
#[derive(Debug)]
pub struct ModuleInstance {
    pub storage: ModuleStorage,
    pub compiled: CompiledModule,
    /// Name-indexed export table built at link time (`spec.md` §3), kept
    /// alongside storage so a later module's imports can resolve against
    /// it without re-reading the original binary.
    pub exports: BTreeMap<String, ExportDesc>,
}

/// All modules loaded in one engine session.
#[derive(Debug, Default)]
pub struct Store {
    pub registry: ModuleRegistry,
    modules: Vec<ModuleInstance>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(
        &mut self,
        name: impl Into<String>,
        storage: ModuleStorage,
        compiled: CompiledModule,
        exports: BTreeMap<String, ExportDesc>,
    ) -> ModuleId {
        let id = self.registry.register(name);
        self.modules.push(ModuleInstance { storage, compiled, exports });
        id
    }

    pub fn module(&self, id: ModuleId) -> &ModuleInstance {
        &self.modules[id.to_usize()]
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
