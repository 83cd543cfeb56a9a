//! The call bridge (C7, `spec.md` §4.7): direct and `call_indirect`
//! dispatch, plus the call-stack trace attached to every trap.

use fusewasm_core::{Trap, TrapCode};
use fusewasm_ir::{FuncIdx, ModuleId, TableIdx, TypeIdx};

use crate::{engine::dispatch, module::TableElement, store::Store};

/// One call-stack frame: the `(module_id, function_index)` pair printed in
/// a trap trace (`spec.md` §3, §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    pub module: ModuleId,
    pub func: FuncIdx,
}

/// The live call stack for one top-level invocation. Traps are fatal and
/// non-catchable (`spec.md` §4.7); this exists purely to report where one
/// happened, not to support unwinding back into guest code.
#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<Frame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, module: ModuleId, func: FuncIdx) {
        self.frames.push(Frame { module, func });
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

/// Calls `(module, func)` directly. `func` may itself still be an import
/// slot of `module` — [`dispatch::run_func_at`] resolves through the
/// import dispatch cache before running any guest bytecode, so a direct
/// call to an imported function and a direct call to a local one share
/// this one entry point (`spec.md` §3's import dispatch cache).
pub fn call_direct(
    store: &Store,
    call_stack: &mut CallStack,
    module: ModuleId,
    func: FuncIdx,
    params: &[u8],
    result: &mut [u8],
) -> Result<(), Trap> {
    tracing::debug!(module = module.to_u32(), func = func.to_u32(), "call entry");
    let outcome = dispatch::run_func_at(store, call_stack, module, func, params, result);
    match &outcome {
        Ok(()) => tracing::debug!(module = module.to_u32(), func = func.to_u32(), "call exit"),
        Err(trap) => tracing::error!(module = module.to_u32(), func = func.to_u32(), %trap, "trap"),
    }
    outcome
}

/// `call_indirect` (`spec.md` §4.7): enforces, in order, the three trap
/// classes the MVP distinguishes — selector out of the table's bounds,
/// a null element, and a signature mismatch against `type_index`.
pub fn call_indirect(
    store: &Store,
    call_stack: &mut CallStack,
    caller_module: ModuleId,
    type_index: TypeIdx,
    table_index: TableIdx,
    selector: u32,
    params: &[u8],
    result: &mut [u8],
) -> Result<(), Trap> {
    let inst = store.module(caller_module);
    let table = inst.storage.table(table_index.to_u32());
    if selector >= table.len() {
        return Err(TrapCode::TableOutOfBounds.into());
    }
    let expected_ty = &inst.storage.types()[type_index.to_usize()];
    match table.get(selector).expect("selector checked above") {
        TableElement::Null => Err(TrapCode::NullElement.into()),
        TableElement::Local(func) => {
            let actual_ty = inst
                .storage
                .func_type(func)
                .expect("table element references a valid function index");
            if actual_ty != expected_ty {
                return Err(TrapCode::BadSignature.into());
            }
            call_direct(store, call_stack, caller_module, func, params, result)
        }
        TableElement::Imported { module, import_index } => {
            let target_func = FuncIdx::from_u32(import_index);
            let actual_ty = store
                .module(module)
                .storage
                .func_type(target_func)
                .expect("table element references a valid import slot");
            if actual_ty != expected_ty {
                return Err(TrapCode::BadSignature.into());
            }
            call_direct(store, call_stack, module, target_func, params, result)
        }
    }
}
