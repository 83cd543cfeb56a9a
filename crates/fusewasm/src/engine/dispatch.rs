//! The dispatch engine (C6, `spec.md` §4.6): walks a [`CompiledFunc`]'s op
//! table by index, maintaining a packed locals frame and an untyped operand
//! stack. This realizes the "byref ABI" fallback rather than tail-call
//! threading (`spec.md` §4.4/§9, `DESIGN.md`).

use fusewasm_core::{FuncType, Trap, TrapCode, UntypedVal, ValType};
use fusewasm_ir::{Dst, Instr, LoadExtend, MemWidth, ModuleId};

use crate::{
    call::{self, CallStack},
    compiled::CompiledFunc,
    memory::LinearMemory,
    module::GlobalOrigin,
    store::Store,
};

use super::ops;

fn read_local(frame: &[u8], offset: u32, ty: ValType) -> UntypedVal {
    let off = offset as usize;
    let size = ty.size();
    let mut buf = [0u8; 8];
    buf[..size].copy_from_slice(&frame[off..off + size]);
    UntypedVal::from_bits(u64::from_le_bytes(buf))
}

fn write_local(frame: &mut [u8], offset: u32, ty: ValType, val: UntypedVal) {
    let off = offset as usize;
    let size = ty.size();
    let bytes = val.to_bits().to_le_bytes();
    frame[off..off + size].copy_from_slice(&bytes[..size]);
}

fn store_dst(frame: &mut [u8], stack: &mut Vec<UntypedVal>, compiled: &CompiledFunc, dst: Dst, val: UntypedVal) {
    match dst {
        Dst::Push => stack.push(val),
        Dst::Local(off) => write_local(frame, off.to_u32(), compiled.local_width(off.to_u32()), val),
        Dst::LocalTee(off) => {
            write_local(frame, off.to_u32(), compiled.local_width(off.to_u32()), val);
            stack.push(val);
        }
    }
}

fn extend_load(bytes: [u8; 8], width: MemWidth, extend: LoadExtend) -> UntypedVal {
    match width {
        MemWidth::I8 => {
            let b = bytes[0];
            let bits = match extend {
                LoadExtend::Sign => (b as i8 as i64) as u64,
                LoadExtend::Zero | LoadExtend::None => b as u64,
            };
            UntypedVal::from_bits(bits)
        }
        MemWidth::I16 => {
            let h = u16::from_le_bytes([bytes[0], bytes[1]]);
            let bits = match extend {
                LoadExtend::Sign => (h as i16 as i64) as u64,
                LoadExtend::Zero | LoadExtend::None => h as u64,
            };
            UntypedVal::from_bits(bits)
        }
        MemWidth::I32 => {
            let w = u32::from_le_bytes(bytes[..4].try_into().expect("4 bytes"));
            let bits = match extend {
                LoadExtend::Sign => (w as i32 as i64) as u64,
                LoadExtend::Zero | LoadExtend::None => w as u64,
            };
            UntypedVal::from_bits(bits)
        }
        MemWidth::I64 => UntypedVal::from_bits(u64::from_le_bytes(bytes)),
        MemWidth::F32 => UntypedVal::from(f32::from_le_bytes(bytes[..4].try_into().expect("4 bytes"))),
        MemWidth::F64 => UntypedVal::from(f64::from_le_bytes(bytes)),
    }
}

fn memory<'a>(store: &'a Store, module: ModuleId) -> &'a LinearMemory {
    store
        .module(module)
        .storage
        .memory()
        .expect("memory op reached in a module without linear memory")
}

fn read_global(store: &Store, module: ModuleId, idx: fusewasm_ir::GlobalIdx) -> UntypedVal {
    let g = store.module(module).storage.global(idx);
    match &g.origin {
        GlobalOrigin::Local(cell) => cell.get(),
        GlobalOrigin::Imported { module: m, index } => read_global(store, *m, *index),
    }
}

fn write_global(store: &Store, module: ModuleId, idx: fusewasm_ir::GlobalIdx, val: UntypedVal) {
    let g = store.module(module).storage.global(idx);
    match &g.origin {
        GlobalOrigin::Local(cell) => cell.set(val),
        GlobalOrigin::Imported { module: m, index } => write_global(store, *m, *index, val),
    }
}

fn pack_call_params(stack: &mut Vec<UntypedVal>, ty: &FuncType, buf: &mut [u8]) {
    let params = ty.params();
    let n = params.len();
    let mut vals = vec![UntypedVal::from_bits(0); n];
    for slot in vals.iter_mut().rev() {
        *slot = stack.pop().expect("operand stack underflow packing call params");
    }
    let mut offset = 0usize;
    for (k, v) in params.iter().zip(vals.iter()) {
        let size = k.size();
        buf[offset..offset + size].copy_from_slice(&v.to_bits().to_le_bytes()[..size]);
        offset += size;
    }
}

fn push_call_results(stack: &mut Vec<UntypedVal>, ty: &FuncType, buf: &[u8]) {
    let mut offset = 0usize;
    for k in ty.results() {
        let size = k.size();
        let mut b = [0u8; 8];
        b[..size].copy_from_slice(&buf[offset..offset + size]);
        stack.push(UntypedVal::from_bits(u64::from_le_bytes(b)));
        offset += size;
    }
}

fn pack_results(ty: &FuncType, stack: &[UntypedVal], result: &mut [u8]) {
    let results = ty.results();
    let n = results.len();
    let start = stack.len() - n;
    let mut offset = 0usize;
    for (k, v) in results.iter().zip(&stack[start..]) {
        let size = k.size();
        result[offset..offset + size].copy_from_slice(&v.to_bits().to_le_bytes()[..size]);
        offset += size;
    }
}

/// Entry point shared by a direct call, an indirect call, and the top-level
/// invocation driven by the CLI (`spec.md` §4.7's "import dispatch cache"):
/// `func` may itself still be an import slot of `module`, resolved here
/// before any guest bytecode runs.
pub fn run_func_at(
    store: &Store,
    call_stack: &mut CallStack,
    module: ModuleId,
    func: fusewasm_ir::FuncIdx,
    params: &[u8],
    result: &mut [u8],
) -> Result<(), Trap> {
    let inst = store.module(module);
    let n_imports = inst.storage.imported_funcs().len();
    if func.to_usize() < n_imports {
        let resolved = inst.storage.import_dispatch().get(func.to_u32()).clone();
        return call_resolved(store, call_stack, &resolved, params, result);
    }
    let local_index = func.to_usize() - n_imports;
    let compiled = inst.compiled.get(local_index);
    call_stack.push(module, func);
    let r = run_compiled(store, call_stack, module, compiled, params, result);
    // Traps are fatal and non-catchable (`spec.md` §4.7): leave the frame in
    // place on error so it survives up to the caller's trap trace instead of
    // unwinding it away.
    if r.is_ok() {
        call_stack.pop();
    }
    r
}

fn call_resolved(
    store: &Store,
    call_stack: &mut CallStack,
    resolved: &crate::module::ResolvedTarget,
    params: &[u8],
    result: &mut [u8],
) -> Result<(), Trap> {
    use crate::module::ResolvedTarget::*;
    match resolved {
        Defined { module, func, .. } => run_func_at(store, call_stack, *module, *func, params, result),
        LocalImported { module, index, .. } => {
            let (frame_module, frame_func) = resolved.display_target();
            call_stack.push(frame_module, frame_func);
            let r = module.call_by_index(*index, result, params);
            if r.is_ok() {
                call_stack.pop();
            }
            r
        }
        Dl { f, .. } | WeakSymbol { f, .. } => {
            let (frame_module, frame_func) = resolved.display_target();
            call_stack.push(frame_module, frame_func);
            let r = f(result, params);
            if r.is_ok() {
                call_stack.pop();
            }
            r
        }
    }
}

/// Walks `compiled`'s op table, maintaining a packed locals frame and an
/// untyped operand stack (`spec.md` §4.5, §4.6).
pub fn run_compiled(
    store: &Store,
    call_stack: &mut CallStack,
    module: ModuleId,
    compiled: &CompiledFunc,
    params: &[u8],
    result: &mut [u8],
) -> Result<(), Trap> {
    let mut frame = vec![0u8; compiled.frame_bytes as usize];
    frame[..compiled.param_bytes as usize].copy_from_slice(&params[..compiled.param_bytes as usize]);
    let stack_capacity = compiled.operand_stack_byte_max as usize / std::mem::size_of::<UntypedVal>();
    let mut stack: Vec<UntypedVal> = Vec::with_capacity(stack_capacity);
    let mut ip: usize = 0;

    loop {
        let instr = compiled.ops[ip];
        match instr {
            Instr::Unreachable => return Err(TrapCode::Unreachable.into()),
            Instr::Br(target) => {
                ip = target.to_usize();
                continue;
            }
            Instr::BrIfPop(target) => {
                let cond = stack.pop().expect("operand stack underflow");
                if ops::i32v(cond) != 0 {
                    ip = target.to_usize();
                    continue;
                }
            }
            Instr::BrTablePop { targets, default } => {
                let sel = stack.pop().expect("operand stack underflow");
                let idx = ops::i32v(sel) as u32 as usize;
                let target = targets.get(idx).copied().unwrap_or(default);
                ip = target.to_usize();
                continue;
            }
            Instr::FusedCmpBranch { lhs, rhs, cmp, target } => {
                let l = read_local(&frame, lhs.to_u32(), compiled.local_width(lhs.to_u32()));
                let r = read_local(&frame, rhs.to_u32(), compiled.local_width(rhs.to_u32()));
                if ops::i32v(ops::eval_cmp(cmp, l, r)) != 0 {
                    ip = target.to_usize();
                    continue;
                }
            }
            Instr::FusedEqzBranch { local, is_64, target } => {
                let ty = if is_64 { ValType::I64 } else { ValType::I32 };
                let v = read_local(&frame, local.to_u32(), ty);
                let zero = if is_64 { v.to_bits() == 0 } else { ops::u32v(v) == 0 };
                if zero {
                    ip = target.to_usize();
                    continue;
                }
            }
            Instr::FusedCountedLoop { counter, step, limit, target } => {
                let c = read_local(&frame, counter.to_u32(), ValType::I32);
                let new_c = ops::i32v(c).wrapping_add(step);
                write_local(&mut frame, counter.to_u32(), ValType::I32, UntypedVal::from(new_c));
                let l = read_local(&frame, limit.to_u32(), ValType::I32);
                if new_c < ops::i32v(l) {
                    ip = target.to_usize();
                    continue;
                }
            }
            Instr::Return | Instr::EndOfFunction => {
                pack_results(&compiled.ty, &stack, result);
                return Ok(());
            }
            Instr::LocalGet(off) => {
                let ty = compiled.local_width(off.to_u32());
                stack.push(read_local(&frame, off.to_u32(), ty));
            }
            Instr::LocalSet(off) => {
                let ty = compiled.local_width(off.to_u32());
                let v = stack.pop().expect("operand stack underflow");
                write_local(&mut frame, off.to_u32(), ty, v);
            }
            Instr::LocalTee(off) => {
                let ty = compiled.local_width(off.to_u32());
                let v = *stack.last().expect("operand stack underflow");
                write_local(&mut frame, off.to_u32(), ty, v);
            }
            Instr::GlobalGet(idx) => stack.push(read_global(store, module, idx)),
            Instr::GlobalSet(idx) => {
                let v = stack.pop().expect("operand stack underflow");
                write_global(store, module, idx, v);
            }
            Instr::I32Const(v) => stack.push(UntypedVal::from(v)),
            Instr::I64Const(v) => stack.push(UntypedVal::from(v)),
            Instr::F32Const(v) => stack.push(UntypedVal::from(v)),
            Instr::F64Const(v) => stack.push(UntypedVal::from(v)),
            Instr::Drop => {
                stack.pop().expect("operand stack underflow");
            }
            Instr::SelectPop => {
                let cond = stack.pop().expect("operand stack underflow");
                let b = stack.pop().expect("operand stack underflow");
                let a = stack.pop().expect("operand stack underflow");
                stack.push(if ops::i32v(cond) != 0 { a } else { b });
            }
            Instr::FusedSelect { a, b, cond, dst } => {
                let av = read_local(&frame, a.to_u32(), compiled.local_width(a.to_u32()));
                let bv = read_local(&frame, b.to_u32(), compiled.local_width(b.to_u32()));
                let cv = read_local(&frame, cond.to_u32(), ValType::I32);
                let res = if ops::i32v(cv) != 0 { av } else { bv };
                store_dst(&mut frame, &mut stack, compiled, dst, res);
            }
            Instr::PopUnOp(op) => {
                let x = stack.pop().expect("operand stack underflow");
                stack.push(ops::eval_un(op, x)?);
            }
            Instr::PopBinOp(op) => {
                let r = stack.pop().expect("operand stack underflow");
                let l = stack.pop().expect("operand stack underflow");
                stack.push(ops::eval_bin(op, l, r)?);
            }
            Instr::PopCmp(op) => {
                let r = stack.pop().expect("operand stack underflow");
                let l = stack.pop().expect("operand stack underflow");
                stack.push(ops::eval_cmp(op, l, r));
            }
            Instr::FusedLocalLocalBin { lhs, rhs, op, dst } => {
                let l = read_local(&frame, lhs.to_u32(), compiled.local_width(lhs.to_u32()));
                let r = read_local(&frame, rhs.to_u32(), compiled.local_width(rhs.to_u32()));
                let res = ops::eval_bin(op, l, r)?;
                store_dst(&mut frame, &mut stack, compiled, dst, res);
            }
            Instr::FusedLocalImmBin { local, imm, op, dst } => {
                let l = read_local(&frame, local.to_u32(), compiled.local_width(local.to_u32()));
                let res = ops::eval_bin(op, l, imm)?;
                store_dst(&mut frame, &mut stack, compiled, dst, res);
            }
            Instr::FusedLocalUn { local, op, dst } => {
                let v = read_local(&frame, local.to_u32(), compiled.local_width(local.to_u32()));
                let res = ops::eval_un(op, v)?;
                store_dst(&mut frame, &mut stack, compiled, dst, res);
            }
            Instr::FusedMac { a, b, c, kind, dst } => {
                let av = read_local(&frame, a.to_u32(), compiled.local_width(a.to_u32()));
                let bv = read_local(&frame, b.to_u32(), compiled.local_width(b.to_u32()));
                let cv = read_local(&frame, c.to_u32(), compiled.local_width(c.to_u32()));
                let res = ops::eval_mac(kind, av, bv, cv);
                store_dst(&mut frame, &mut stack, compiled, dst, res);
            }
            Instr::FusedBitMix { x, shr, shl, dst } => {
                let xv = read_local(&frame, x.to_u32(), ValType::I32);
                let xi = ops::u32v(xv);
                let res = xi ^ (xi.checked_shr(shr).unwrap_or(0)) ^ (xi.checked_shl(shl).unwrap_or(0));
                store_dst(&mut frame, &mut stack, compiled, dst, UntypedVal::from(res));
            }
            Instr::MemLoadPop { static_offset, width, extend } => {
                let addr = stack.pop().expect("operand stack underflow");
                let bytes = memory(store, module).load(ops::u32v(addr), static_offset, width)?;
                stack.push(extend_load(bytes, width, extend));
            }
            Instr::MemStorePop { static_offset, width } => {
                let val = stack.pop().expect("operand stack underflow");
                let addr = stack.pop().expect("operand stack underflow");
                let bytes = val.to_bits().to_le_bytes();
                memory(store, module).store(ops::u32v(addr), static_offset, width, &bytes)?;
            }
            Instr::FusedMemLoad { addr, static_offset, width, extend, dst } => {
                let a = read_local(&frame, addr.to_u32(), ValType::I32);
                let bytes = memory(store, module).load(ops::u32v(a), static_offset, width)?;
                let res = extend_load(bytes, width, extend);
                store_dst(&mut frame, &mut stack, compiled, dst, res);
            }
            Instr::FusedMemStore { addr, value, static_offset, width } => {
                let a = read_local(&frame, addr.to_u32(), ValType::I32);
                let v = read_local(&frame, value.to_u32(), compiled.local_width(value.to_u32()));
                let bytes = v.to_bits().to_le_bytes();
                memory(store, module).store(ops::u32v(a), static_offset, width, &bytes)?;
            }
            Instr::FusedMemCopy1 { src, src_offset, dst, dst_offset, width } => {
                let s = read_local(&frame, src.to_u32(), ValType::I32);
                let d = read_local(&frame, dst.to_u32(), ValType::I32);
                let mem = memory(store, module);
                let bytes = mem.load(ops::u32v(s), src_offset, width)?;
                mem.store(ops::u32v(d), dst_offset, width, &bytes[..width.byte_size() as usize])?;
            }
            Instr::MemorySize => {
                let pages = memory(store, module).current_pages();
                stack.push(UntypedVal::from(pages as i32));
            }
            Instr::MemoryGrowPop => {
                let delta = stack.pop().expect("operand stack underflow");
                let prev = memory(store, module).grow(ops::u32v(delta));
                stack.push(UntypedVal::from(prev.map(|p| p as i32).unwrap_or(-1)));
            }
            Instr::CallDirect { target_module, target_func } => {
                let ty = store
                    .module(target_module)
                    .storage
                    .func_type(target_func)
                    .expect("valid direct call target")
                    .clone();
                let mut params_buf = vec![0u8; ty.param_bytes()];
                pack_call_params(&mut stack, &ty, &mut params_buf);
                let mut result_buf = vec![0u8; ty.result_bytes()];
                call::call_direct(store, call_stack, target_module, target_func, &params_buf, &mut result_buf)?;
                push_call_results(&mut stack, &ty, &result_buf);
            }
            Instr::CallIndirect { type_index, table_index } => {
                let selector = stack.pop().expect("operand stack underflow");
                let ty = store.module(module).storage.types()[type_index.to_usize()].clone();
                let mut params_buf = vec![0u8; ty.param_bytes()];
                pack_call_params(&mut stack, &ty, &mut params_buf);
                let mut result_buf = vec![0u8; ty.result_bytes()];
                call::call_indirect(
                    store,
                    call_stack,
                    module,
                    type_index,
                    table_index,
                    ops::u32v(selector),
                    &params_buf,
                    &mut result_buf,
                )?;
                push_call_results(&mut stack, &ty, &result_buf);
            }
        }
        ip += 1;
    }
}
