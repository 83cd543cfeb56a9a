//! Module identity (`spec.md` §3, §9's module-identity design note):
//! assigns each loaded module a dense [`ModuleId`] in load order and keeps
//! the name each was loaded under for diagnostics and trap traces.

use fusewasm_ir::ModuleId;

/// Load-order registry of every module instantiated in one engine session
/// (`SPEC_FULL.md` §3).
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    names: Vec<String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next dense [`ModuleId`] to `name` and returns it.
    /// Module ids are never reused or reassigned (`spec.md` §9): identity
    /// is load order, not name, so two modules loaded under the same name
    /// get distinct ids.
    pub fn register(&mut self, name: impl Into<String>) -> ModuleId {
        let id = ModuleId::from_u32(self.names.len() as u32);
        self.names.push(name.into());
        id
    }

    pub fn name(&self, id: ModuleId) -> Option<&str> {
        self.names.get(id.to_usize()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
