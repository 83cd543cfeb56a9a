//! The translator's output (`spec.md` §4.4/§4.5, component C5): one
//! [`CompiledFunc`] per local-defined function, grouped into a
//! [`CompiledModule`].

use fusewasm_core::{FuncType, ValType};
use fusewasm_ir::Instr;

/// One translated function body: a dense op table plus the precomputed
/// facts the dispatch engine and call bridge need without re-deriving them
/// from the signature on every call (`spec.md` §4.5's "packed locals
/// frame").
#[derive(Debug)]
pub struct CompiledFunc {
    pub ty: FuncType,
    pub ops: Vec<Instr>,
    /// Byte size of the packed locals frame's parameter prefix —
    /// `sum(param kind sizes)`, no padding (`spec.md` §4.5).
    pub param_bytes: u32,
    /// Byte size of the full packed locals frame: parameters followed by
    /// declared locals, same packing rule.
    pub frame_bytes: u32,
    /// Byte size of the result area the call bridge writes into.
    pub result_bytes: u32,
    /// `ValType` of the local whose packed-frame slot starts at each byte
    /// offset, indexed by byte offset; only offsets that are a local's
    /// first byte are meaningful. Lets the dispatch loop recover a
    /// `LocalOffset` immediate's width without threading a type alongside
    /// every `LocalGet`/`LocalSet`/`LocalTee` instruction.
    pub local_widths: Box<[ValType]>,
    /// Worst-case byte footprint of the operand stack across every path
    /// through this function, computed by symbolic stack tracking during
    /// translation (`spec.md` §3, §4.5 step 5's budget computation). The
    /// dispatch loop pre-sizes its operand stack from this instead of
    /// growing an unbounded `Vec`.
    pub operand_stack_byte_max: u32,
    /// Optional debug name, carried only when the module's custom
    /// `name` section supplied one (`SPEC_FULL.md` §3).
    pub name: Option<String>,
}

impl CompiledFunc {
    pub fn param_bytes(&self) -> u32 {
        self.param_bytes
    }

    pub fn result_bytes(&self) -> u32 {
        self.result_bytes
    }

    pub fn local_width(&self, offset: u32) -> ValType {
        self.local_widths[offset as usize]
    }
}

/// All locally defined functions of one module, in `FuncIdx` order starting
/// right after the module's imported-function count (`spec.md` §3).
#[derive(Debug, Default)]
pub struct CompiledModule {
    pub funcs: Vec<CompiledFunc>,
}

impl CompiledModule {
    pub fn get(&self, local_index: usize) -> &CompiledFunc {
        &self.funcs[local_index]
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}
