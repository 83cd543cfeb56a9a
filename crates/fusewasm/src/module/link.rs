use std::sync::Arc;

use fusewasm_core::{FuncType, Trap};
use fusewasm_ir::{FuncIdx, ModuleId};

/// Entry point for a "second-class in-process module": something the host
/// resolved to a callable index rather than to another `fusewasm` module
/// (`spec.md` §3, §6).
pub trait SecondClassModule: Send + Sync {
    fn call_by_index(&self, index: u32, result: &mut [u8], params: &[u8]) -> Result<(), Trap>;
}

/// A host function reached through the `dl`/`weak_symbol` link kinds: the
/// C-ABI `(result*, params*) -> void` surface of `spec.md` §6, modeled here
/// as a boxed closure since Rust has no bare function-pointer-plus-capture.
pub type HostFn = Arc<dyn Fn(&mut [u8], &[u8]) -> Result<(), Trap> + Send + Sync>;

/// How an imported function is currently resolved (`spec.md` §3).
///
/// A closed sum type, not a trait-object hierarchy: dispatch on an
/// imported call hinges on exactly this one tag (`spec.md` §9,
/// "Variants over inheritance").
#[derive(Clone)]
pub enum LinkState {
    /// Not yet resolved. The core refuses to execute through this state —
    /// reaching it at call time is an internal-bug abort (`spec.md` §3).
    Unresolved,
    /// Aliases another module's import slot; the core never observes this
    /// directly (the loader must resolve every chain before execution,
    /// `spec.md` §3's invariant), but the link graph the linker walks
    /// during instantiation is built out of exactly these edges.
    Imported { module: ModuleId, import_index: u32 },
    /// Resolved to a local-defined function in another module.
    Defined { module: ModuleId, func: FuncIdx },
    /// Resolved to a second-class in-process module's `call_by_index`.
    LocalImported { module: Arc<dyn SecondClassModule>, index: u32 },
    /// Resolved to a dynamically loaded native function.
    Dl(HostFn),
    /// Resolved to a statically known weak symbol.
    WeakSymbol(HostFn),
}

/// One entry of a module's imported-function vector (`spec.md` §3).
#[derive(Clone)]
pub struct ImportedFunc {
    pub ty: FuncType,
    pub state: LinkState,
}

/// A precomputed import-dispatch-cache entry (`spec.md` §3): built once,
/// after all modules are compiled and before any guest code runs, so a
/// direct call through an import never re-walks the alias chain.
#[derive(Clone)]
pub enum ResolvedTarget {
    Defined {
        module: ModuleId,
        func: FuncIdx,
        ty: FuncType,
    },
    LocalImported {
        module: Arc<dyn SecondClassModule>,
        index: u32,
        ty: FuncType,
    },
    Dl {
        f: HostFn,
        ty: FuncType,
        display: (ModuleId, FuncIdx),
    },
    WeakSymbol {
        f: HostFn,
        ty: FuncType,
        display: (ModuleId, FuncIdx),
    },
}

impl ResolvedTarget {
    pub fn ty(&self) -> &FuncType {
        match self {
            Self::Defined { ty, .. }
            | Self::LocalImported { ty, .. }
            | Self::Dl { ty, .. }
            | Self::WeakSymbol { ty, .. } => ty,
        }
    }

    /// `(module_id, function_index)` to print in a trap trace
    /// (`spec.md` §3).
    pub fn display_target(&self) -> (ModuleId, FuncIdx) {
        match self {
            Self::Defined { module, func, .. } => (*module, *func),
            Self::LocalImported { index, .. } => (ModuleId::from_u32(u32::MAX), FuncIdx::from_u32(*index)),
            Self::Dl { display, .. } | Self::WeakSymbol { display, .. } => *display,
        }
    }
}

/// A module's import-dispatch cache: dense, parallel to its
/// imported-function vector (`spec.md` §3).
#[derive(Clone, Default)]
pub struct ImportDispatchCache {
    entries: Vec<ResolvedTarget>,
}

impl ImportDispatchCache {
    pub fn new(entries: Vec<ResolvedTarget>) -> Self {
        Self { entries }
    }

    pub fn get(&self, import_index: u32) -> &ResolvedTarget {
        &self.entries[import_index as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
