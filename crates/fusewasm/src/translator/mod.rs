//! The translator (C5, `spec.md` §4.4/§4.5): turns one [`RawFunctionBody`]
//! into a [`CompiledFunc`] — assigns the packed locals frame layout, emits
//! the baseline (un-fused) op table, fixes up forward/backward branches,
//! then hands the result to [`fuse::apply`] for the peephole fusion pass.
//!
//! Resolving branch targets needs no symbolic operand-stack tracking:
//! `wasmparser`'s validator has already proven every block/loop/if's stack
//! shape, so that part of this pass only resolves *branch targets* (which
//! `InstrIdx` a `br` lands on), not value types or stack heights. The
//! separate depth-budget pass at the end of [`translate_func`] *does* track
//! depth, for exactly the reason the validator makes it safe to do with a
//! single forward scan: every path reaching a given op has the same depth.

mod fuse;

use fusewasm_core::{FuncType, UntypedVal, ValType};
use fusewasm_ir::{
    BinOpKind,
    CmpKind,
    Dst,
    FuncIdx,
    Instr,
    InstrIdx,
    LoadExtend,
    LocalOffset,
    MemWidth,
    ModuleId,
    TableIdx,
    TypeIdx,
    UnOpKind,
};

use crate::{compiled::CompiledFunc, config::CompileOptions, error::ModuleError, loader::RawFunctionBody};

enum ControlKind {
    Block,
    Loop { start: usize },
    /// `else_jump_site` is set once an `else` is seen: the op index of the
    /// unconditional `Br` that skips the else-branch when taken from the
    /// then-branch's fallthrough.
    If { else_jump_site: Option<usize> },
}

struct ControlFrame {
    kind: ControlKind,
    /// Op indices of `Br`/`BrIfPop`/`br_table` slots that branch to this
    /// frame's end and still need their target patched in.
    end_fixups: Vec<PatchSite>,
}

#[derive(Clone, Copy)]
enum PatchSite {
    Br(usize),
    BrIfPop(usize),
    BrTableTarget(usize, usize),
    BrTableDefault(usize),
}

fn patch(ops: &mut [Instr], site: PatchSite, target: InstrIdx) {
    match site {
        PatchSite::Br(i) => {
            if let Instr::Br(t) = &mut ops[i] {
                *t = target;
            }
        }
        PatchSite::BrIfPop(i) => {
            if let Instr::BrIfPop(t) = &mut ops[i] {
                *t = target;
            }
        }
        PatchSite::BrTableTarget(i, slot) => {
            if let Instr::BrTablePop { targets, .. } = &mut ops[i] {
                targets[slot] = target;
            }
        }
        PatchSite::BrTableDefault(i) => {
            if let Instr::BrTablePop { default, .. } = &mut ops[i] {
                *default = target;
            }
        }
    }
}

/// Packed-frame layout for one function's parameters and declared locals
/// (`spec.md` §4.5): plain concatenation, 4 or 8 byte slots, no padding.
struct LocalsLayout {
    offsets: Vec<u32>,
    types: Vec<ValType>,
    param_bytes: u32,
    frame_bytes: u32,
}

fn layout_locals(ty: &FuncType, declared: &[(u32, ValType)]) -> LocalsLayout {
    let mut offsets = Vec::new();
    let mut types = Vec::new();
    let mut cursor = 0u32;
    for &p in ty.params() {
        offsets.push(cursor);
        types.push(p);
        cursor += p.size() as u32;
    }
    let param_bytes = cursor;
    for &(count, ty) in declared {
        for _ in 0..count {
            offsets.push(cursor);
            types.push(ty);
            cursor += ty.size() as u32;
        }
    }
    LocalsLayout {
        offsets,
        types,
        param_bytes,
        frame_bytes: cursor,
    }
}

fn local_widths_table(layout: &LocalsLayout) -> Box<[ValType]> {
    let mut widths = vec![ValType::I32; layout.frame_bytes as usize];
    for (&offset, &ty) in layout.offsets.iter().zip(layout.types.iter()) {
        for b in widths.iter_mut().skip(offset as usize).take(ty.size()) {
            *b = ty;
        }
    }
    widths.into_boxed_slice()
}

/// Translates one function body. `module_id` identifies the module the
/// compiled function belongs to: `call`'s `Instr::CallDirect` always
/// targets `(module_id, callee_index)` in this module's own combined
/// import+local function space, leaving resolution of an import slot to
/// the dispatch engine at call time (`spec.md` §3's import dispatch
/// cache).
pub fn translate_func(
    module_id: ModuleId,
    ty: &FuncType,
    body: &RawFunctionBody,
    options: &CompileOptions,
    name: Option<String>,
    func_types: &[FuncType],
    types: &[FuncType],
) -> Result<CompiledFunc, ModuleError> {
    let layout = layout_locals(ty, &body.locals);
    let mut ops: Vec<Instr> = Vec::new();
    let mut control: Vec<ControlFrame> = Vec::new();

    let local_at = |idx: u32| -> LocalOffset { LocalOffset::from_u32(layout.offsets[idx as usize]) };

    for op in &body.operators {
        use wasmparser::Operator as O;
        match op {
            O::Unreachable => ops.push(Instr::Unreachable),
            O::Nop => {}
            O::Block { .. } => control.push(ControlFrame {
                kind: ControlKind::Block,
                end_fixups: Vec::new(),
            }),
            O::Loop { .. } => control.push(ControlFrame {
                kind: ControlKind::Loop { start: ops.len() },
                end_fixups: Vec::new(),
            }),
            O::If { .. } => {
                // Baseline `if`: negate the popped condition, then branch
                // past the then-branch when it was originally false.
                ops.push(Instr::PopUnOp(UnOpKind::I32Eqz));
                let site = ops.len();
                ops.push(Instr::BrIfPop(InstrIdx::from_u32(0)));
                control.push(ControlFrame {
                    kind: ControlKind::If { else_jump_site: None },
                    end_fixups: vec![PatchSite::BrIfPop(site)],
                });
            }
            O::Else => {
                let frame = control.last_mut().expect("else outside if");
                // Jump over the else-branch once the then-branch falls through.
                let jump_site = ops.len();
                ops.push(Instr::Br(InstrIdx::from_u32(0)));
                frame.end_fixups.push(PatchSite::Br(jump_site));
                if let ControlKind::If { else_jump_site } = &mut frame.kind {
                    *else_jump_site = Some(jump_site);
                }
                // The pending `BrIfPop` (to the else-branch) resolves here,
                // at the else-branch's first instruction.
                let else_start = InstrIdx::from_u32(ops.len() as u32);
                if let Some(PatchSite::BrIfPop(i)) = frame.end_fixups.first().copied() {
                    patch(&mut ops, PatchSite::BrIfPop(i), else_start);
                }
                frame.end_fixups.remove(0);
            }
            O::End => {
                if let Some(frame) = control.pop() {
                    let end = InstrIdx::from_u32(ops.len() as u32);
                    for site in frame.end_fixups {
                        patch(&mut ops, site, end);
                    }
                }
                // The outermost `end` closes the function itself and is
                // handled by the `EndOfFunction` sentinel appended below.
            }
            O::Br { relative_depth } => {
                let site = ops.len();
                ops.push(Instr::Br(InstrIdx::from_u32(0)));
                resolve_branch(&mut control, *relative_depth, PatchSite::Br(site), &mut ops);
            }
            O::BrIf { relative_depth } => {
                let site = ops.len();
                ops.push(Instr::BrIfPop(InstrIdx::from_u32(0)));
                resolve_branch(&mut control, *relative_depth, PatchSite::BrIfPop(site), &mut ops);
            }
            O::BrTable { targets } => {
                let site = ops.len();
                let depths: Vec<u32> = targets.targets().collect::<Result<_, _>>().map_err(|e| ModuleError::Malformed(e.to_string()))?;
                let default_depth = targets.default();
                ops.push(Instr::BrTablePop {
                    targets: vec![InstrIdx::from_u32(0); depths.len()].into_boxed_slice(),
                    default: InstrIdx::from_u32(0),
                });
                for (slot, depth) in depths.into_iter().enumerate() {
                    resolve_branch(&mut control, depth, PatchSite::BrTableTarget(site, slot), &mut ops);
                }
                resolve_branch(&mut control, default_depth, PatchSite::BrTableDefault(site), &mut ops);
            }
            O::Return => ops.push(Instr::Return),
            O::Call { function_index } => ops.push(Instr::CallDirect {
                target_module: module_id,
                target_func: FuncIdx::from_u32(*function_index),
            }),
            O::CallIndirect { type_index, table_index, .. } => ops.push(Instr::CallIndirect {
                type_index: TypeIdx::from_u32(*type_index),
                table_index: TableIdx::from_u32(*table_index),
            }),
            O::Drop => ops.push(Instr::Drop),
            O::Select | O::TypedSelect { .. } => ops.push(Instr::SelectPop),
            O::LocalGet { local_index } => ops.push(Instr::LocalGet(local_at(*local_index))),
            O::LocalSet { local_index } => ops.push(Instr::LocalSet(local_at(*local_index))),
            O::LocalTee { local_index } => ops.push(Instr::LocalTee(local_at(*local_index))),
            O::GlobalGet { global_index } => ops.push(Instr::GlobalGet(fusewasm_ir::GlobalIdx::from_u32(*global_index))),
            O::GlobalSet { global_index } => ops.push(Instr::GlobalSet(fusewasm_ir::GlobalIdx::from_u32(*global_index))),
            O::I32Const { value } => ops.push(Instr::I32Const(*value)),
            O::I64Const { value } => ops.push(Instr::I64Const(*value)),
            O::F32Const { value } => ops.push(Instr::F32Const(f32::from_bits(value.bits()))),
            O::F64Const { value } => ops.push(Instr::F64Const(f64::from_bits(value.bits()))),
            O::MemorySize { .. } => ops.push(Instr::MemorySize),
            O::MemoryGrow { .. } => ops.push(Instr::MemoryGrowPop),

            O::I32Load { memarg } => mem_load(&mut ops, memarg, MemWidth::I32, LoadExtend::None),
            O::I64Load { memarg } => mem_load(&mut ops, memarg, MemWidth::I64, LoadExtend::None),
            O::F32Load { memarg } => mem_load(&mut ops, memarg, MemWidth::F32, LoadExtend::None),
            O::F64Load { memarg } => mem_load(&mut ops, memarg, MemWidth::F64, LoadExtend::None),
            O::I32Load8S { memarg } => mem_load(&mut ops, memarg, MemWidth::I8, LoadExtend::Sign),
            O::I32Load8U { memarg } => mem_load(&mut ops, memarg, MemWidth::I8, LoadExtend::Zero),
            O::I32Load16S { memarg } => mem_load(&mut ops, memarg, MemWidth::I16, LoadExtend::Sign),
            O::I32Load16U { memarg } => mem_load(&mut ops, memarg, MemWidth::I16, LoadExtend::Zero),
            O::I64Load8S { memarg } => mem_load(&mut ops, memarg, MemWidth::I8, LoadExtend::Sign),
            O::I64Load8U { memarg } => mem_load(&mut ops, memarg, MemWidth::I8, LoadExtend::Zero),
            O::I64Load16S { memarg } => mem_load(&mut ops, memarg, MemWidth::I16, LoadExtend::Sign),
            O::I64Load16U { memarg } => mem_load(&mut ops, memarg, MemWidth::I16, LoadExtend::Zero),
            O::I64Load32S { memarg } => mem_load(&mut ops, memarg, MemWidth::I32, LoadExtend::Sign),
            O::I64Load32U { memarg } => mem_load(&mut ops, memarg, MemWidth::I32, LoadExtend::Zero),

            O::I32Store { memarg } => mem_store(&mut ops, memarg, MemWidth::I32),
            O::I64Store { memarg } => mem_store(&mut ops, memarg, MemWidth::I64),
            O::F32Store { memarg } => mem_store(&mut ops, memarg, MemWidth::F32),
            O::F64Store { memarg } => mem_store(&mut ops, memarg, MemWidth::F64),
            O::I32Store8 { memarg } => mem_store(&mut ops, memarg, MemWidth::I8),
            O::I32Store16 { memarg } => mem_store(&mut ops, memarg, MemWidth::I16),
            O::I64Store8 { memarg } => mem_store(&mut ops, memarg, MemWidth::I8),
            O::I64Store16 { memarg } => mem_store(&mut ops, memarg, MemWidth::I16),
            O::I64Store32 { memarg } => mem_store(&mut ops, memarg, MemWidth::I32),

            other => {
                if let Some(un) = unop(other) {
                    ops.push(Instr::PopUnOp(un));
                } else if let Some(bin) = binop(other) {
                    ops.push(Instr::PopBinOp(bin));
                } else if let Some(cmp) = cmpop(other) {
                    ops.push(Instr::PopCmp(cmp));
                } else {
                    return Err(ModuleError::Unsupported(format!("unsupported operator: {other:?}")));
                }
            }
        }
    }
    ops.push(Instr::EndOfFunction);

    let ops = fuse::apply(ops, options);
    let operand_stack_byte_max = operand_stack_budget(&ops, func_types, types);

    Ok(CompiledFunc {
        ty: ty.clone(),
        ops,
        param_bytes: layout.param_bytes,
        frame_bytes: layout.frame_bytes,
        result_bytes: ty.result_bytes() as u32,
        local_widths: local_widths_table(&layout),
        operand_stack_byte_max,
        name,
    })
}

/// Symbolic stack tracking (`spec.md` §3, §4.5 step 5): walks the compiled
/// op table in program order accumulating each op's net effect on the
/// operand stack depth, and returns the worst depth reached times
/// `size_of::<UntypedVal>()`. A straight forward pass over the flat op
/// table is enough — no need to follow individual branches — because the
/// validator has already proven every block/loop/if merges with a
/// consistent stack depth, so the depth at any op's address is the same
/// on every path that reaches it.
fn operand_stack_budget(ops: &[Instr], func_types: &[FuncType], types: &[FuncType]) -> u32 {
    let mut depth: i64 = 0;
    let mut max_depth: i64 = 0;
    for op in ops {
        depth += stack_effect(op, func_types, types);
        max_depth = max_depth.max(depth);
    }
    max_depth as u32 * std::mem::size_of::<UntypedVal>() as u32
}

fn dst_pushes(dst: &Dst) -> i64 {
    match dst {
        Dst::Push | Dst::LocalTee(_) => 1,
        Dst::Local(_) => 0,
    }
}

/// Net change in operand-stack depth from executing one op, mirroring the
/// push/pop calls `engine/dispatch.rs::run_compiled` actually makes.
fn stack_effect(op: &Instr, func_types: &[FuncType], types: &[FuncType]) -> i64 {
    use Instr::*;
    match op {
        Unreachable | Br(_) | FusedCmpBranch { .. } | FusedEqzBranch { .. } | FusedCountedLoop { .. } | Return | EndOfFunction => 0,
        BrIfPop(_) | BrTablePop { .. } => -1,
        LocalGet(_) | GlobalGet(_) | I32Const(_) | I64Const(_) | F32Const(_) | F64Const(_) | MemorySize => 1,
        LocalSet(_) | GlobalSet(_) | Drop => -1,
        LocalTee(_) | PopUnOp(_) | MemLoadPop { .. } | FusedMemStore { .. } | FusedMemCopy1 { .. } | MemoryGrowPop => 0,
        SelectPop => -2,
        MemStorePop { .. } => -2,
        PopBinOp(_) | PopCmp(_) => -1,
        FusedSelect { dst, .. }
        | FusedLocalLocalBin { dst, .. }
        | FusedLocalImmBin { dst, .. }
        | FusedLocalUn { dst, .. }
        | FusedMac { dst, .. }
        | FusedBitMix { dst, .. }
        | FusedMemLoad { dst, .. } => dst_pushes(dst),
        CallDirect { target_func, .. } => {
            let ty = &func_types[target_func.to_usize()];
            ty.results().len() as i64 - ty.params().len() as i64
        }
        CallIndirect { type_index, .. } => {
            let ty = &types[type_index.to_usize()];
            ty.results().len() as i64 - ty.params().len() as i64 - 1
        }
    }
}

fn resolve_branch(control: &mut [ControlFrame], relative_depth: u32, site: PatchSite, ops: &mut [Instr]) {
    let frame_index = control.len() - 1 - relative_depth as usize;
    match &control[frame_index].kind {
        ControlKind::Loop { start } => patch(ops, site, InstrIdx::from_u32(*start as u32)),
        ControlKind::Block | ControlKind::If { .. } => control[frame_index].end_fixups.push(site),
    }
}

fn mem_load(ops: &mut Vec<Instr>, memarg: &wasmparser::MemArg, width: MemWidth, extend: LoadExtend) {
    ops.push(Instr::MemLoadPop {
        static_offset: memarg.offset as u32,
        width,
        extend,
    });
}

fn mem_store(ops: &mut Vec<Instr>, memarg: &wasmparser::MemArg, width: MemWidth) {
    ops.push(Instr::MemStorePop {
        static_offset: memarg.offset as u32,
        width,
    });
}

fn unop(op: &wasmparser::Operator) -> Option<UnOpKind> {
    use wasmparser::Operator as O;
    use UnOpKind::*;
    Some(match op {
        O::I32Clz => I32Clz,
        O::I32Ctz => I32Ctz,
        O::I32Popcnt => I32Popcnt,
        O::I64Clz => I64Clz,
        O::I64Ctz => I64Ctz,
        O::I64Popcnt => I64Popcnt,
        O::F32Abs => F32Abs,
        O::F32Neg => F32Neg,
        O::F32Sqrt => F32Sqrt,
        O::F32Ceil => F32Ceil,
        O::F32Floor => F32Floor,
        O::F32Trunc => F32Trunc,
        O::F32Nearest => F32Nearest,
        O::F64Abs => F64Abs,
        O::F64Neg => F64Neg,
        O::F64Sqrt => F64Sqrt,
        O::F64Ceil => F64Ceil,
        O::F64Floor => F64Floor,
        O::F64Trunc => F64Trunc,
        O::F64Nearest => F64Nearest,
        O::I32Eqz => I32Eqz,
        O::I64Eqz => I64Eqz,
        O::I32WrapI64 => I32WrapI64,
        O::I64ExtendI32S => I64ExtendI32S,
        O::I64ExtendI32U => I64ExtendI32U,
        O::I32Extend8S => I32Extend8S,
        O::I32Extend16S => I32Extend16S,
        O::I64Extend8S => I64Extend8S,
        O::I64Extend16S => I64Extend16S,
        O::I64Extend32S => I64Extend32S,
        O::F32DemoteF64 => F32DemoteF64,
        O::F64PromoteF32 => F64PromoteF32,
        O::F32ConvertI32S => F32ConvertI32S,
        O::F32ConvertI32U => F32ConvertI32U,
        O::F32ConvertI64S => F32ConvertI64S,
        O::F32ConvertI64U => F32ConvertI64U,
        O::F64ConvertI32S => F64ConvertI32S,
        O::F64ConvertI32U => F64ConvertI32U,
        O::F64ConvertI64S => F64ConvertI64S,
        O::F64ConvertI64U => F64ConvertI64U,
        O::I32TruncF32S => I32TruncF32S,
        O::I32TruncF32U => I32TruncF32U,
        O::I32TruncF64S => I32TruncF64S,
        O::I32TruncF64U => I32TruncF64U,
        O::I64TruncF32S => I64TruncF32S,
        O::I64TruncF32U => I64TruncF32U,
        O::I64TruncF64S => I64TruncF64S,
        O::I64TruncF64U => I64TruncF64U,
        O::I32ReinterpretF32 => I32ReinterpretF32,
        O::F32ReinterpretI32 => F32ReinterpretI32,
        O::I64ReinterpretF64 => I64ReinterpretF64,
        O::F64ReinterpretI64 => F64ReinterpretI64,
        _ => return None,
    })
}

fn binop(op: &wasmparser::Operator) -> Option<BinOpKind> {
    use wasmparser::Operator as O;
    use BinOpKind::*;
    Some(match op {
        O::I32Add => I32Add,
        O::I32Sub => I32Sub,
        O::I32Mul => I32Mul,
        O::I32DivS => I32DivS,
        O::I32DivU => I32DivU,
        O::I32RemS => I32RemS,
        O::I32RemU => I32RemU,
        O::I32And => I32And,
        O::I32Or => I32Or,
        O::I32Xor => I32Xor,
        O::I32Shl => I32Shl,
        O::I32ShrS => I32ShrS,
        O::I32ShrU => I32ShrU,
        O::I32Rotl => I32Rotl,
        O::I32Rotr => I32Rotr,
        O::I64Add => I64Add,
        O::I64Sub => I64Sub,
        O::I64Mul => I64Mul,
        O::I64DivS => I64DivS,
        O::I64DivU => I64DivU,
        O::I64RemS => I64RemS,
        O::I64RemU => I64RemU,
        O::I64And => I64And,
        O::I64Or => I64Or,
        O::I64Xor => I64Xor,
        O::I64Shl => I64Shl,
        O::I64ShrS => I64ShrS,
        O::I64ShrU => I64ShrU,
        O::I64Rotl => I64Rotl,
        O::I64Rotr => I64Rotr,
        O::F32Add => F32Add,
        O::F32Sub => F32Sub,
        O::F32Mul => F32Mul,
        O::F32Div => F32Div,
        O::F32Min => F32Min,
        O::F32Max => F32Max,
        O::F32Copysign => F32Copysign,
        O::F64Add => F64Add,
        O::F64Sub => F64Sub,
        O::F64Mul => F64Mul,
        O::F64Div => F64Div,
        O::F64Min => F64Min,
        O::F64Max => F64Max,
        O::F64Copysign => F64Copysign,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmparser::Operator as O;

    fn i32_i32_ty() -> FuncType {
        FuncType::new(vec![ValType::I32, ValType::I32], vec![ValType::I32])
    }

    fn translate(operators: Vec<wasmparser::Operator<'static>>, ty: &FuncType) -> CompiledFunc {
        let body = RawFunctionBody { locals: Vec::new(), operators };
        translate_func(ModuleId::from_u32(0), ty, &body, &CompileOptions::default(), None, &[ty.clone()], &[ty.clone()]).unwrap()
    }

    #[test]
    fn fused_two_local_add_budgets_one_slot() {
        let ty = i32_i32_ty();
        let func = translate(vec![O::LocalGet { local_index: 0 }, O::LocalGet { local_index: 1 }, O::I32Add], &ty);
        assert!(matches!(func.ops[0], Instr::FusedLocalLocalBin { dst: Dst::Push, .. }));
        assert_eq!(func.operand_stack_byte_max, std::mem::size_of::<UntypedVal>() as u32);
    }

    #[test]
    fn unfused_three_constants_budget_their_peak_depth() {
        let ty = i32_i32_ty();
        let func = translate(
            vec![
                O::I32Const { value: 1 },
                O::I32Const { value: 2 },
                O::I32Const { value: 3 },
                O::I32Add,
                O::I32Add,
            ],
            &ty,
        );
        assert_eq!(func.operand_stack_byte_max, 3 * std::mem::size_of::<UntypedVal>() as u32);
    }
}

fn cmpop(op: &wasmparser::Operator) -> Option<CmpKind> {
    use wasmparser::Operator as O;
    use CmpKind::*;
    Some(match op {
        O::I32Eq => I32Eq,
        O::I32Ne => I32Ne,
        O::I32LtS => I32LtS,
        O::I32LtU => I32LtU,
        O::I32GtS => I32GtS,
        O::I32GtU => I32GtU,
        O::I32LeS => I32LeS,
        O::I32LeU => I32LeU,
        O::I32GeS => I32GeS,
        O::I32GeU => I32GeU,
        O::I64Eq => I64Eq,
        O::I64Ne => I64Ne,
        O::I64LtS => I64LtS,
        O::I64LtU => I64LtU,
        O::I64GtS => I64GtS,
        O::I64GtU => I64GtU,
        O::I64LeS => I64LeS,
        O::I64LeU => I64LeU,
        O::I64GeS => I64GeS,
        O::I64GeU => I64GeU,
        O::F32Eq => F32Eq,
        O::F32Ne => F32Ne,
        O::F32Lt => F32Lt,
        O::F32Gt => F32Gt,
        O::F32Le => F32Le,
        O::F32Ge => F32Ge,
        O::F64Eq => F64Eq,
        O::F64Ne => F64Ne,
        O::F64Lt => F64Lt,
        O::F64Gt => F64Gt,
        O::F64Le => F64Le,
        O::F64Ge => F64Ge,
        _ => return None,
    })
}
