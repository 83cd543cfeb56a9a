//! The pass-through `wasi_snapshot_preview1` surface: everything except
//! `poll_oneoff`, which gets its own module (`SPEC_FULL.md` §4.11).
//!
//! Every function here has the shape `fn(&WasiCtx, &[u8]) -> Result<i32,
//! Trap>`: `params` is the guest's packed argument bytes, the `i32` return
//! is the errno the guest sees, and `Err` is reserved for conditions the
//! embedder, not the guest, got wrong (no memory bound yet).

use std::io::{IoSlice, IoSliceMut};

use fusewasm_core::Trap;
use rustix::fd::BorrowedFd;

use crate::{
    ctx::WasiCtx,
    errno::Errno,
    guest::{read_bytes, read_u32, write_bytes, write_u32},
};

pub(crate) fn clock_id_to_rustix(id: u32) -> Option<rustix::time::ClockId> {
    use rustix::time::ClockId;
    match id {
        0 => Some(ClockId::Realtime),
        1 => Some(ClockId::Monotonic),
        2 => Some(ClockId::ProcessCPUTime),
        3 => Some(ClockId::ThreadCPUTime),
        _ => None,
    }
}

pub fn clock_time_get(ctx: &WasiCtx, params: &[u8]) -> Result<i32, Trap> {
    let mem = ctx.memory()?;
    let id = u32::from_le_bytes(params[0..4].try_into().unwrap());
    let time_ptr = u32::from_le_bytes(params[12..16].try_into().unwrap());
    let Some(clock) = clock_id_to_rustix(id) else {
        return Ok(Errno::Inval.as_i32());
    };
    let ts = rustix::time::clock_gettime(clock);
    let nanos = (ts.tv_sec as u128) * 1_000_000_000 + ts.tv_nsec as u128;
    let Ok(nanos) = u64::try_from(nanos) else {
        return Ok(Errno::Overflow.as_i32());
    };
    if write_u64(mem, time_ptr, nanos).is_err() {
        return Ok(Errno::Inval.as_i32());
    }
    Ok(Errno::Success.as_i32())
}

fn write_u64(mem: &fusewasm::memory::LinearMemory, offset: u32, value: u64) -> Result<(), Errno> {
    write_bytes(mem, offset, &value.to_le_bytes())
}

fn io_errno(err: rustix::io::Errno) -> Errno {
    if err == rustix::io::Errno::BADF {
        Errno::Badf
    } else {
        Errno::Io
    }
}

pub fn fd_write(ctx: &WasiCtx, params: &[u8]) -> Result<i32, Trap> {
    let mem = ctx.memory()?;
    let fd = u32::from_le_bytes(params[0..4].try_into().unwrap());
    let iovs_ptr = u32::from_le_bytes(params[4..8].try_into().unwrap());
    let iovs_len = u32::from_le_bytes(params[8..12].try_into().unwrap());
    let nwritten_ptr = u32::from_le_bytes(params[12..16].try_into().unwrap());

    let iovecs = match read_iovecs(mem, iovs_ptr, iovs_len) {
        Ok(v) => v,
        Err(e) => return Ok(e.as_i32()),
    };
    let slices: Vec<IoSlice> = iovecs.iter().map(|b| IoSlice::new(b)).collect();

    let raw_fd = fd as std::os::fd::RawFd;
    let written = unsafe {
        let borrowed = BorrowedFd::borrow_raw(raw_fd);
        rustix::io::writev(borrowed, &slices)
    };
    let written = match written {
        Ok(n) => n,
        Err(e) => return Ok(io_errno(e).as_i32()),
    };
    if write_u32(mem, nwritten_ptr, written as u32).is_err() {
        return Ok(Errno::Inval.as_i32());
    }
    Ok(Errno::Success.as_i32())
}

pub fn fd_read(ctx: &WasiCtx, params: &[u8]) -> Result<i32, Trap> {
    let mem = ctx.memory()?;
    let fd = u32::from_le_bytes(params[0..4].try_into().unwrap());
    let iovs_ptr = u32::from_le_bytes(params[4..8].try_into().unwrap());
    let iovs_len = u32::from_le_bytes(params[8..12].try_into().unwrap());
    let nread_ptr = u32::from_le_bytes(params[12..16].try_into().unwrap());

    let regions = match read_iovec_regions(mem, iovs_ptr, iovs_len) {
        Ok(v) => v,
        Err(e) => return Ok(e.as_i32()),
    };
    let mut bufs: Vec<Vec<u8>> = regions.iter().map(|(_, len)| vec![0u8; *len as usize]).collect();
    let mut slices: Vec<IoSliceMut> = bufs.iter_mut().map(|b| IoSliceMut::new(b)).collect();

    let raw_fd = fd as std::os::fd::RawFd;
    let read = unsafe {
        let borrowed = BorrowedFd::borrow_raw(raw_fd);
        rustix::io::readv(borrowed, &mut slices)
    };
    let mut remaining = match read {
        Ok(n) => n,
        Err(e) => return Ok(io_errno(e).as_i32()),
    };
    let total = remaining;

    for (buf, (ptr, len)) in bufs.iter().zip(regions.iter()) {
        let take = (*len as usize).min(remaining);
        if write_bytes(mem, *ptr, &buf[..take]).is_err() {
            return Ok(Errno::Inval.as_i32());
        }
        remaining -= take;
        if remaining == 0 {
            break;
        }
    }
    if write_u32(mem, nread_ptr, total as u32).is_err() {
        return Ok(Errno::Inval.as_i32());
    }
    Ok(Errno::Success.as_i32())
}

fn read_iovecs(mem: &fusewasm::memory::LinearMemory, iovs_ptr: u32, iovs_len: u32) -> Result<Vec<Vec<u8>>, Errno> {
    let mut out = Vec::with_capacity(iovs_len as usize);
    for i in 0..iovs_len {
        let entry = iovs_ptr.checked_add(i.checked_mul(8).ok_or(Errno::Overflow)?).ok_or(Errno::Overflow)?;
        let ptr = read_u32(mem, entry)?;
        let len = read_u32(mem, entry + 4)?;
        out.push(read_bytes(mem, ptr, len)?);
    }
    Ok(out)
}

fn read_iovec_regions(mem: &fusewasm::memory::LinearMemory, iovs_ptr: u32, iovs_len: u32) -> Result<Vec<(u32, u32)>, Errno> {
    let mut out = Vec::with_capacity(iovs_len as usize);
    for i in 0..iovs_len {
        let entry = iovs_ptr.checked_add(i.checked_mul(8).ok_or(Errno::Overflow)?).ok_or(Errno::Overflow)?;
        let ptr = read_u32(mem, entry)?;
        let len = read_u32(mem, entry + 4)?;
        out.push((ptr, len));
    }
    Ok(out)
}

pub fn random_get(ctx: &WasiCtx, params: &[u8]) -> Result<i32, Trap> {
    let mem = ctx.memory()?;
    let buf_ptr = u32::from_le_bytes(params[0..4].try_into().unwrap());
    let buf_len = u32::from_le_bytes(params[4..8].try_into().unwrap());
    let mut buf = vec![0u8; buf_len as usize];
    let mut filled = 0;
    while filled < buf.len() {
        match rustix::rand::getrandom(&mut buf[filled..], rustix::rand::GetRandomFlags::empty()) {
            Ok(n) => filled += n,
            Err(_) => return Ok(Errno::Io.as_i32()),
        }
    }
    if write_bytes(mem, buf_ptr, &buf).is_err() {
        return Ok(Errno::Inval.as_i32());
    }
    Ok(Errno::Success.as_i32())
}

/// Never returns a normal errno: the call site converts `proc_exit`'s
/// result into a fatal trap after recording the guest's requested code
/// (`SPEC_FULL.md` §4.11, `DESIGN.md`).
pub fn proc_exit(ctx: &WasiCtx, params: &[u8]) -> Result<i32, Trap> {
    let code = i32::from_le_bytes(params[0..4].try_into().unwrap());
    ctx.record_exit(code);
    Err(Trap::new(fusewasm_core::TrapCode::Unreachable))
}

pub fn args_sizes_get(ctx: &WasiCtx, params: &[u8]) -> Result<i32, Trap> {
    let mem = ctx.memory()?;
    let argc_ptr = u32::from_le_bytes(params[0..4].try_into().unwrap());
    let buf_size_ptr = u32::from_le_bytes(params[4..8].try_into().unwrap());
    let buf_size: usize = ctx.args().iter().map(|a| a.len() + 1).sum();
    if write_u32(mem, argc_ptr, ctx.args().len() as u32).is_err() || write_u32(mem, buf_size_ptr, buf_size as u32).is_err() {
        return Ok(Errno::Inval.as_i32());
    }
    Ok(Errno::Success.as_i32())
}

pub fn args_get(ctx: &WasiCtx, params: &[u8]) -> Result<i32, Trap> {
    let mem = ctx.memory()?;
    let argv_ptr = u32::from_le_bytes(params[0..4].try_into().unwrap());
    let argv_buf_ptr = u32::from_le_bytes(params[4..8].try_into().unwrap());
    if write_string_table(mem, argv_ptr, argv_buf_ptr, ctx.args()).is_err() {
        return Ok(Errno::Inval.as_i32());
    }
    Ok(Errno::Success.as_i32())
}

pub fn environ_sizes_get(ctx: &WasiCtx, params: &[u8]) -> Result<i32, Trap> {
    let mem = ctx.memory()?;
    let count_ptr = u32::from_le_bytes(params[0..4].try_into().unwrap());
    let buf_size_ptr = u32::from_le_bytes(params[4..8].try_into().unwrap());
    let buf_size: usize = ctx.env().iter().map(|(k, v)| k.len() + 1 + v.len() + 1).sum();
    if write_u32(mem, count_ptr, ctx.env().len() as u32).is_err() || write_u32(mem, buf_size_ptr, buf_size as u32).is_err() {
        return Ok(Errno::Inval.as_i32());
    }
    Ok(Errno::Success.as_i32())
}

pub fn environ_get(ctx: &WasiCtx, params: &[u8]) -> Result<i32, Trap> {
    let mem = ctx.memory()?;
    let environ_ptr = u32::from_le_bytes(params[0..4].try_into().unwrap());
    let environ_buf_ptr = u32::from_le_bytes(params[4..8].try_into().unwrap());
    let entries: Vec<String> = ctx.env().iter().map(|(k, v)| format!("{k}={v}")).collect();
    if write_string_table(mem, environ_ptr, environ_buf_ptr, &entries).is_err() {
        return Ok(Errno::Inval.as_i32());
    }
    Ok(Errno::Success.as_i32())
}

fn write_string_table(mem: &fusewasm::memory::LinearMemory, ptrs_ptr: u32, buf_ptr: u32, entries: &[String]) -> Result<(), Errno> {
    let mut cursor = buf_ptr;
    for (i, entry) in entries.iter().enumerate() {
        let slot = ptrs_ptr.checked_add((i as u32).checked_mul(4).ok_or(Errno::Overflow)?).ok_or(Errno::Overflow)?;
        write_u32(mem, slot, cursor)?;
        let mut bytes = entry.as_bytes().to_vec();
        bytes.push(0);
        write_bytes(mem, cursor, &bytes)?;
        cursor = cursor.checked_add(bytes.len() as u32).ok_or(Errno::Overflow)?;
    }
    Ok(())
}
