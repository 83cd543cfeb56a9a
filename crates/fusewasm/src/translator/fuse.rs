//! The peephole fusion pass (`spec.md` §4.4's fusion catalog): a
//! left-to-right, longest-match windowed matcher over the baseline op
//! table the rest of `translator` emits.
//!
//! Only a representative subset of the catalog is implemented here —
//! two-local compute, load-local compute with an immediate, unary,
//! compare-and-branch, eqz-and-branch, select, and memory load/store with
//! a local address. `FusedBitMix` and `FusedCountedLoop` remain part of
//! [`Instr`]'s vocabulary but are never emitted by this matcher; see
//! `DESIGN.md` for why those two were scoped out of the matcher itself.

use std::collections::HashSet;

use fusewasm_core::UntypedVal;
use fusewasm_ir::{BinOpKind, Dst, Instr, InstrIdx, MacKind, UnOpKind};

use crate::config::CompileOptions;

/// Runs the fusion pass and remaps every branch target to the post-fusion
/// instruction stream.
pub fn apply(ops: Vec<Instr>, options: &CompileOptions) -> Vec<Instr> {
    let _ = options; // stack-top windows gate the *translator's* choice of
                      // baseline-vs-fused at a finer grain than this pass
                      // models; kept for signature parity with `spec.md` §4.9.

    let mut branch_targets: HashSet<usize> = HashSet::new();
    for op in &ops {
        match op {
            Instr::Br(t) | Instr::BrIfPop(t) => {
                branch_targets.insert(t.to_usize());
            }
            Instr::BrTablePop { targets, default } => {
                for t in targets.iter() {
                    branch_targets.insert(t.to_usize());
                }
                branch_targets.insert(default.to_usize());
            }
            _ => {}
        }
    }

    let mut new_ops: Vec<Instr> = Vec::with_capacity(ops.len());
    let mut remap = vec![0usize; ops.len()];
    let mut i = 0usize;
    while i < ops.len() {
        let new_index = new_ops.len();
        let consumed = try_fuse(&ops, i, &branch_targets, &mut new_ops);
        for slot in remap.iter_mut().skip(i).take(consumed) {
            *slot = new_index;
        }
        i += consumed;
    }

    for instr in new_ops.iter_mut() {
        match instr {
            Instr::Br(t) => *t = InstrIdx::from(remap[t.to_usize()]),
            Instr::BrIfPop(t) => *t = InstrIdx::from(remap[t.to_usize()]),
            Instr::BrTablePop { targets, default } => {
                for t in targets.iter_mut() {
                    *t = InstrIdx::from(remap[t.to_usize()]);
                }
                *default = InstrIdx::from(remap[default.to_usize()]);
            }
            _ => {}
        }
    }
    new_ops
}

/// True when none of `ops[start+1 ..= start+len-1]` is some other branch's
/// target — fusing across a jump-in point would silently change behavior.
fn interior_is_safe(branch_targets: &HashSet<usize>, start: usize, len: usize) -> bool {
    (start + 1..start + len).all(|i| !branch_targets.contains(&i))
}

/// Attempts to merge a trailing `LocalSet`/`LocalTee` into `dst`, given the
/// base window already spans `base_len` old instructions starting at
/// `start`. Returns the total window length consumed.
fn merge_trailing_dst(ops: &[Instr], start: usize, base_len: usize, branch_targets: &HashSet<usize>) -> (Dst, usize) {
    let next = start + base_len;
    if next < ops.len() && !branch_targets.contains(&next) {
        match ops[next] {
            Instr::LocalSet(off) => return (Dst::Local(off), base_len + 1),
            Instr::LocalTee(off) => return (Dst::LocalTee(off), base_len + 1),
            _ => {}
        }
    }
    (Dst::Push, base_len)
}

fn try_fuse(ops: &[Instr], i: usize, branch_targets: &HashSet<usize>, new_ops: &mut Vec<Instr>) -> usize {
    let remaining = ops.len() - i;

    // MAC: local,local,mul ; local,add/sub (5-instruction window).
    if remaining >= 5 && interior_is_safe(branch_targets, i, 5) {
        if let (Instr::LocalGet(a), Instr::LocalGet(b), Instr::PopBinOp(mul), Instr::LocalGet(c), Instr::PopBinOp(addsub)) =
            (ops[i], ops[i + 1], ops[i + 2], ops[i + 3], ops[i + 4])
        {
            let kind = match (mul, addsub) {
                (BinOpKind::F32Mul, BinOpKind::F32Add) => Some(MacKind::F32MulAdd),
                (BinOpKind::F32Mul, BinOpKind::F32Sub) => Some(MacKind::F32MulSub),
                (BinOpKind::F64Mul, BinOpKind::F64Add) => Some(MacKind::F64MulAdd),
                (BinOpKind::F64Mul, BinOpKind::F64Sub) => Some(MacKind::F64MulSub),
                (BinOpKind::I32Mul, BinOpKind::I32Add) => Some(MacKind::I32MulAdd),
                (BinOpKind::I64Mul, BinOpKind::I64Add) => Some(MacKind::I64MulAdd),
                _ => None,
            };
            if let Some(kind) = kind {
                let (dst, len) = merge_trailing_dst(ops, i, 5, branch_targets);
                new_ops.push(Instr::FusedMac { a, b, c, kind, dst });
                return len;
            }
        }
    }

    // Compare-and-branch: local, local, cmp, br_if (4-instruction window).
    if remaining >= 4 && interior_is_safe(branch_targets, i, 4) {
        if let (Instr::LocalGet(lhs), Instr::LocalGet(rhs), Instr::PopCmp(cmp), Instr::BrIfPop(target)) =
            (ops[i], ops[i + 1], ops[i + 2], ops[i + 3])
        {
            new_ops.push(Instr::FusedCmpBranch { lhs, rhs, cmp, target });
            return 4;
        }
    }

    // Memory store with a local address: local(addr), local(value), store.
    if remaining >= 3 && interior_is_safe(branch_targets, i, 3) {
        if let (Instr::LocalGet(addr), Instr::LocalGet(value), Instr::MemStorePop { static_offset, width }) =
            (ops[i], ops[i + 1], ops[i + 2])
        {
            new_ops.push(Instr::FusedMemStore { addr, value, static_offset, width });
            return 3;
        }
        // Select: local(a), local(b), local(cond), select — needs a 4th slot
        // checked just below; try the select-specific 4-window first.
    }
    if remaining >= 4 && interior_is_safe(branch_targets, i, 4) {
        if let (Instr::LocalGet(a), Instr::LocalGet(b), Instr::LocalGet(cond), Instr::SelectPop) =
            (ops[i], ops[i + 1], ops[i + 2], ops[i + 3])
        {
            let (dst, len) = merge_trailing_dst(ops, i, 4, branch_targets);
            new_ops.push(Instr::FusedSelect { a, b, cond, dst });
            return len;
        }
    }

    // eqz-and-branch: local, eqz, br_if (3-instruction window).
    if remaining >= 3 && interior_is_safe(branch_targets, i, 3) {
        if let (Instr::LocalGet(local), Instr::PopUnOp(UnOpKind::I32Eqz), Instr::BrIfPop(target)) = (ops[i], ops[i + 1], ops[i + 2]) {
            new_ops.push(Instr::FusedEqzBranch { local, is_64: false, target });
            return 3;
        }
        if let (Instr::LocalGet(local), Instr::PopUnOp(UnOpKind::I64Eqz), Instr::BrIfPop(target)) = (ops[i], ops[i + 1], ops[i + 2]) {
            new_ops.push(Instr::FusedEqzBranch { local, is_64: true, target });
            return 3;
        }
        // Two-local compute: local, local, op.
        if let (Instr::LocalGet(lhs), Instr::LocalGet(rhs), Instr::PopBinOp(op)) = (ops[i], ops[i + 1], ops[i + 2]) {
            let (dst, len) = merge_trailing_dst(ops, i, 3, branch_targets);
            new_ops.push(Instr::FusedLocalLocalBin { lhs, rhs, op, dst });
            return len;
        }
        // Load-local compute with an immediate: local, const, op.
        if let Some(imm) = const_val(ops[i + 1]) {
            if let Instr::PopBinOp(op) = ops[i + 2] {
                if let Instr::LocalGet(local) = ops[i] {
                    let (dst, len) = merge_trailing_dst(ops, i, 3, branch_targets);
                    new_ops.push(Instr::FusedLocalImmBin { local, imm, op, dst });
                    return len;
                }
            }
        }
        // Memory load with a local address: local(addr), load.
    }
    if remaining >= 2 && interior_is_safe(branch_targets, i, 2) {
        if let (Instr::LocalGet(addr), Instr::MemLoadPop { static_offset, width, extend }) = (ops[i], ops[i + 1]) {
            let (dst, len) = merge_trailing_dst(ops, i, 2, branch_targets);
            new_ops.push(Instr::FusedMemLoad { addr, static_offset, width, extend, dst });
            return len;
        }
        // Unary compute: local, op.
        if let (Instr::LocalGet(local), Instr::PopUnOp(op)) = (ops[i], ops[i + 1]) {
            let (dst, len) = merge_trailing_dst(ops, i, 2, branch_targets);
            new_ops.push(Instr::FusedLocalUn { local, op, dst });
            return len;
        }
    }

    new_ops.push(ops[i]);
    1
}

fn const_val(instr: Instr) -> Option<UntypedVal> {
    match instr {
        Instr::I32Const(v) => Some(UntypedVal::from(v)),
        Instr::I64Const(v) => Some(UntypedVal::from(v)),
        Instr::F32Const(v) => Some(UntypedVal::from(v)),
        Instr::F64Const(v) => Some(UntypedVal::from(v)),
        _ => None,
    }
}
