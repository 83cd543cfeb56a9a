//! Runtime module storage (`spec.md` §3) — the external loader/linker's
//! output, read-only once instantiation finishes.

mod link;
mod storage;

pub use self::{
    link::{HostFn, ImportDispatchCache, ImportedFunc, LinkState, ResolvedTarget, SecondClassModule},
    storage::{Global, GlobalOrigin, ModuleStorage, Table, TableElement},
};
