//! WASI `poll_oneoff` (`spec.md` §4.8): byte-exact `subscription`/`event`
//! wire layouts and the single-clock blocking special case.

use std::time::Duration;

use fusewasm_core::Trap;

use crate::{
    ctx::WasiCtx,
    errno::Errno,
    guest::{check_range, read_bytes, write_u32},
    syscalls::clock_id_to_rustix,
};

const SUBSCRIPTION_SIZE: u32 = 48;
const EVENT_SIZE: u32 = 32;
const EVENTTYPE_CLOCK: u8 = 0;
const SUBSCRIPTION_CLOCK_ABSTIME: u16 = 1;

struct ClockSubscription {
    clock_id: u32,
    timeout: u64,
    flags: u16,
}

enum Subscription {
    Clock(ClockSubscription),
    /// `eventtype::fd_read`/`fd_write`: MVP policy never dispatches these
    /// to the host (`spec.md` §4.8 step 5).
    FdReadWrite,
}

fn decode_subscription(bytes: &[u8]) -> Option<Subscription> {
    let union_tag = bytes[8];
    match union_tag {
        EVENTTYPE_CLOCK => {
            let clock_id = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
            let timeout = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
            let flags = u16::from_le_bytes(bytes[40..42].try_into().unwrap());
            Some(Subscription::Clock(ClockSubscription { clock_id, timeout, flags }))
        }
        1 | 2 => Some(Subscription::FdReadWrite),
        _ => None,
    }
}

pub fn poll_oneoff(ctx: &WasiCtx, params: &[u8]) -> Result<i32, Trap> {
    let mem = ctx.memory()?;
    let in_ptr = u32::from_le_bytes(params[0..4].try_into().unwrap());
    let out_ptr = u32::from_le_bytes(params[4..8].try_into().unwrap());
    let nsubscriptions = u32::from_le_bytes(params[8..12].try_into().unwrap());
    let nevents_ptr = u32::from_le_bytes(params[12..16].try_into().unwrap());

    if nsubscriptions == 0 {
        let _ = write_u32(mem, nevents_ptr, 0);
        return Ok(Errno::Inval.as_i32());
    }

    let Some(in_len) = nsubscriptions.checked_mul(SUBSCRIPTION_SIZE) else {
        return Ok(Errno::Overflow.as_i32());
    };
    let Some(out_len) = nsubscriptions.checked_mul(EVENT_SIZE) else {
        return Ok(Errno::Overflow.as_i32());
    };

    // Both the `in` and `out` regions must be validated against guest
    // memory before anything else proceeds (`spec.md` §4.8 step 2), even
    // though this implementation never writes a real event into `out`.
    if let Err(e) = check_range(mem, out_ptr, out_len) {
        return Ok(e.as_i32());
    }

    let raw = match read_bytes(mem, in_ptr, in_len) {
        Ok(b) => b,
        Err(e) => return Ok(e.as_i32()),
    };

    let mut subs = Vec::with_capacity(nsubscriptions as usize);
    for chunk in raw.chunks_exact(SUBSCRIPTION_SIZE as usize) {
        match decode_subscription(chunk) {
            Some(s) => subs.push(s),
            None => return Ok(Errno::Inval.as_i32()),
        }
    }

    if nsubscriptions == 1 {
        if let Subscription::Clock(clock) = &subs[0] {
            if let Err(errno) = block_on_clock(clock) {
                return Ok(errno.as_i32());
            }
            // No events are produced for a pure clock wait; the sleep is
            // the entire effect (spec.md §8 scenario 5).
            if write_u32(mem, nevents_ptr, 0).is_err() {
                return Ok(Errno::Inval.as_i32());
            }
            return Ok(Errno::Success.as_i32());
        }
    }

    // All other compositions: non-blocking, no events (spec.md §4.8 step 5).
    if write_u32(mem, nevents_ptr, 0).is_err() {
        return Ok(Errno::Inval.as_i32());
    }
    Ok(Errno::Success.as_i32())
}

/// Blocks for the requested duration (`spec.md` §4.8 step 4).
fn block_on_clock(clock: &ClockSubscription) -> Result<(), Errno> {
    let absolute = clock.flags & SUBSCRIPTION_CLOCK_ABSTIME != 0;
    if absolute {
        let clock_id = clock_id_to_rustix(clock.clock_id).ok_or(Errno::Inval)?;
        let now = rustix::time::clock_gettime(clock_id);
        let now_nanos = (now.tv_sec as u128) * 1_000_000_000 + now.tv_nsec as u128;
        let target = clock.timeout as u128;
        let remaining = target.saturating_sub(now_nanos);
        std::thread::sleep(Duration::from_nanos(remaining.min(u64::MAX as u128) as u64));
    } else if clock.timeout != 0 {
        std::thread::sleep(Duration::from_nanos(clock.timeout));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use fusewasm::memory::LinearMemory;

    use super::*;
    use crate::ctx::WasiCtx;

    const IN_PTR: u32 = 0;
    const OUT_PTR: u32 = 1024;
    const NEVENTS_PTR: u32 = 2048;

    fn ctx_with_memory() -> (Arc<WasiCtx>, Arc<LinearMemory>) {
        let ctx = WasiCtx::builder().build();
        let mem = Arc::new(LinearMemory::new(1, None));
        ctx.bind_memory(mem.clone());
        (ctx, mem)
    }

    fn params(nsubscriptions: u32) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&IN_PTR.to_le_bytes());
        p.extend_from_slice(&OUT_PTR.to_le_bytes());
        p.extend_from_slice(&nsubscriptions.to_le_bytes());
        p.extend_from_slice(&NEVENTS_PTR.to_le_bytes());
        p
    }

    fn write_clock_subscription(mem: &LinearMemory, timeout_ns: u64, flags: u16) {
        let mut guard = mem.lock();
        let base = guard.base_mut();
        base[IN_PTR as usize + 8] = EVENTTYPE_CLOCK;
        base[IN_PTR as usize + 16..IN_PTR as usize + 20].copy_from_slice(&0u32.to_le_bytes());
        base[IN_PTR as usize + 24..IN_PTR as usize + 32].copy_from_slice(&timeout_ns.to_le_bytes());
        base[IN_PTR as usize + 40..IN_PTR as usize + 42].copy_from_slice(&flags.to_le_bytes());
    }

    #[test]
    fn zero_subscriptions_is_einval_and_clears_nevents() {
        let (ctx, mem) = ctx_with_memory();
        mem.lock().base_mut()[NEVENTS_PTR as usize..NEVENTS_PTR as usize + 4].copy_from_slice(&7u32.to_le_bytes());
        let errno = poll_oneoff(&ctx, &params(0)).unwrap();
        assert_eq!(errno, Errno::Inval.as_i32());
        let nevents = u32::from_le_bytes(mem.lock().base()[NEVENTS_PTR as usize..NEVENTS_PTR as usize + 4].try_into().unwrap());
        assert_eq!(nevents, 0);
    }

    #[test]
    fn single_relative_clock_sleeps_and_reports_success() {
        let (ctx, mem) = ctx_with_memory();
        write_clock_subscription(&mem, 10_000_000, 0);
        let start = Instant::now();
        let errno = poll_oneoff(&ctx, &params(1)).unwrap();
        assert!(start.elapsed().as_millis() >= 9);
        assert_eq!(errno, Errno::Success.as_i32());
        let nevents = u32::from_le_bytes(mem.lock().base()[NEVENTS_PTR as usize..NEVENTS_PTR as usize + 4].try_into().unwrap());
        assert_eq!(nevents, 0);
    }

    #[test]
    fn unknown_union_tag_is_einval() {
        let (ctx, mem) = ctx_with_memory();
        mem.lock().base_mut()[IN_PTR as usize + 8] = 0xff;
        let errno = poll_oneoff(&ctx, &params(1)).unwrap();
        assert_eq!(errno, Errno::Inval.as_i32());
    }

    #[test]
    fn out_of_bounds_out_pointer_is_einval() {
        let (ctx, mem) = ctx_with_memory();
        write_clock_subscription(&mem, 0, 0);
        let one_page_len = mem.lock().base().len() as u32;
        let mut p = Vec::new();
        p.extend_from_slice(&IN_PTR.to_le_bytes());
        p.extend_from_slice(&one_page_len.to_le_bytes());
        p.extend_from_slice(&1u32.to_le_bytes());
        p.extend_from_slice(&NEVENTS_PTR.to_le_bytes());
        let errno = poll_oneoff(&ctx, &p).unwrap();
        assert_eq!(errno, Errno::Inval.as_i32());
    }
}
