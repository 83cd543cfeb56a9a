//! Linear memory object (C3) and the access primitives shared by every
//! fused load/store op (C2). See `spec.md` §4.2, §4.3.

use fusewasm_core::{MemoryOobDetail, Pages, Trap};
use fusewasm_ir::MemWidth;
use spin::Mutex;

/// Upper bound on Wasm 1.0 linear memory: 4 GiB addressable via `i32`.
const MAX_PAGES: u32 = 0x1_0000;

#[derive(Debug)]
struct Inner {
    bytes: Vec<u8>,
    max_pages: Option<u32>,
}

/// Owns a growable byte region and serializes growth against concurrent
/// accesses via an operation-lock (`spec.md` §4.3).
///
/// Guest code within one instance runs on a single host thread
/// (`spec.md` §5), so the lock's role here is to make the grow/access
/// protocol explicit and to guarantee no op ever observes a torn
/// `{begin, length}` pair, not to arbitrate real contention.
#[derive(Debug)]
pub struct LinearMemory {
    inner: Mutex<Inner>,
}

/// A scoped acquisition of the memory's operation-lock (`spec.md` §4.3).
pub struct MemoryGuard<'a> {
    inner: spin::MutexGuard<'a, Inner>,
}

impl MemoryGuard<'_> {
    pub fn length(&self) -> usize {
        self.inner.bytes.len()
    }

    pub fn base(&self) -> &[u8] {
        &self.inner.bytes
    }

    pub fn base_mut(&mut self) -> &mut [u8] {
        &mut self.inner.bytes
    }
}

impl LinearMemory {
    pub fn new(initial_pages: u32, max_pages: Option<u32>) -> Self {
        let initial_bytes = Pages::new(initial_pages).to_bytes().expect("initial size fits usize");
        Self {
            inner: Mutex::new(Inner {
                bytes: vec![0u8; initial_bytes],
                max_pages,
            }),
        }
    }

    /// Acquires the operation-lock. Required around any bounds-checked
    /// access (`spec.md` §4.3).
    pub fn lock(&self) -> MemoryGuard<'_> {
        MemoryGuard {
            inner: self.inner.lock(),
        }
    }

    pub fn current_pages(&self) -> u32 {
        (self.lock().length() / Pages::PAGE_SIZE as usize) as u32
    }

    /// Attempts to grow by `delta` pages. Returns the previous page count,
    /// or `None` if the grow would exceed the maximum or overflow — a
    /// non-trap failure per `spec.md` §4.3.
    pub fn grow(&self, delta: u32) -> Option<u32> {
        let mut inner = self.inner.lock();
        let prev_pages = (inner.bytes.len() / Pages::PAGE_SIZE as usize) as u32;
        let new_pages = prev_pages.checked_add(delta)?;
        if new_pages > MAX_PAGES {
            return None;
        }
        if let Some(max) = inner.max_pages {
            if new_pages > max {
                return None;
            }
        }
        let new_bytes = Pages::new(new_pages).to_bytes()?;
        inner.bytes.resize(new_bytes, 0);
        Some(prev_pages)
    }

    /// Effective-offset bounds check and little-endian load, per
    /// `spec.md` §4.2. The 33-bit sum of `addr` and `static_offset` is
    /// carried in a `u64` so a wrap past the top bit is caught as
    /// out-of-bounds rather than silently truncated.
    pub fn load(&self, addr: u32, static_offset: u32, width: MemWidth) -> Result<[u8; 8], Trap> {
        let guard = self.lock();
        let effective = self.checked_range(&guard, addr, static_offset, width.byte_size())?;
        let mut buf = [0u8; 8];
        let size = width.byte_size() as usize;
        buf[..size].copy_from_slice(&guard.base()[effective as usize..effective as usize + size]);
        Ok(buf)
    }

    pub fn store(&self, addr: u32, static_offset: u32, width: MemWidth, bytes: &[u8]) -> Result<(), Trap> {
        let mut guard = self.lock();
        let effective = self.checked_range(&guard, addr, static_offset, width.byte_size())?;
        let size = width.byte_size() as usize;
        guard.base_mut()[effective as usize..effective as usize + size].copy_from_slice(&bytes[..size]);
        Ok(())
    }

    /// Bounds-check core (`spec.md` §4.2's Generic-checked variant; see
    /// `DESIGN.md` for why this crate never selects the guard-page
    /// fast-path alternative). Every load/store funnels through here so a
    /// failure always produces the identical trap with the full operand
    /// tuple.
    fn checked_range(&self, guard: &MemoryGuard<'_>, addr: u32, static_offset: u32, width: u32) -> Result<u64, Trap> {
        let effective = u64::from(addr) + u64::from(static_offset);
        let len = guard.length() as u64;
        let end = effective.checked_add(u64::from(width));
        let in_bounds = matches!(end, Some(end) if end <= len);
        if in_bounds {
            return Ok(effective);
        }
        Err(Trap::memory_oob(MemoryOobDetail {
            static_offset,
            address: addr,
            effective_offset: effective,
            memory_len: len,
            access_width: width as u8,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_safety_observes_either_pre_or_post_length() {
        let mem = LinearMemory::new(1, None);
        assert_eq!(mem.grow(1), Some(1));
        assert_eq!(mem.current_pages(), 2);
    }

    #[test]
    fn store_then_load_round_trips_i32() {
        let mem = LinearMemory::new(1, None);
        mem.store(0, 0, MemWidth::I32, &42i32.to_le_bytes()).unwrap();
        let bytes = mem.load(0, 0, MemWidth::I32).unwrap();
        assert_eq!(i32::from_le_bytes(bytes[..4].try_into().unwrap()), 42);
    }

    #[test]
    fn oob_access_traps_with_detail() {
        let mem = LinearMemory::new(1, None);
        let err = mem.load(0x1_0000, 0, MemWidth::I32).unwrap_err();
        let detail = err.memory_detail().unwrap();
        assert_eq!(detail.address, 0x1_0000);
        assert_eq!(detail.memory_len, 0x1_0000);
    }
}
