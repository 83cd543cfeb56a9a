//! Translator and engine configuration (`spec.md` §4.9's ambient knobs plus
//! `SPEC_FULL.md` §2's configuration layer).

/// An inclusive-exclusive `[begin, end)` window of the operand stack's top,
/// expressed as a byte count from the stack top, that the translator may
/// assume is safe to address without a re-check (`spec.md` §4.4's
/// "stack-top window" knobs) — or `None` when the window is disabled for
/// that value kind, forcing the baseline (un-fused, pop-based) op for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackWindow {
    pub begin: u32,
    pub end: u32,
}

impl StackWindow {
    pub const fn new(begin: u32, end: u32) -> Self {
        Self { begin, end }
    }

    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.begin && offset < self.end
    }
}

/// Per-compilation translator options (`spec.md` §4.9).
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Whether the translator should target the tail-call ABI rather than
    /// the byref-loop fallback. Always `false` on stable Rust — recorded
    /// in `DESIGN.md` as the Open Question this crate settles permanently
    /// rather than per-build, since stable Rust has no guaranteed tail
    /// call primitive.
    pub is_tail_call: bool,
    pub i32_window: Option<StackWindow>,
    pub i64_window: Option<StackWindow>,
    pub f32_window: Option<StackWindow>,
    pub f64_window: Option<StackWindow>,
    /// Always disabled: SIMD/`v128` is out of scope (`spec.md` Non-goals).
    pub v128_window: Option<StackWindow>,
    /// Identifies the module currently being translated, threaded through
    /// diagnostics and trap frames (`spec.md` §4.9).
    pub curr_wasm_id: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            is_tail_call: false,
            i32_window: Some(StackWindow::new(0, 2)),
            i64_window: Some(StackWindow::new(0, 2)),
            f32_window: Some(StackWindow::new(0, 2)),
            f64_window: Some(StackWindow::new(0, 2)),
            v128_window: None,
            curr_wasm_id: 0,
        }
    }
}

/// Engine-wide configuration (`SPEC_FULL.md` §2).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Reserved for a future fuel-metering pass; unused today (`spec.md`
    /// Non-goals excludes metering, but the teacher's own `Config` carries
    /// analogous dormant fields, so this one is kept for shape parity
    /// rather than added ad hoc).
    pub fuel_metering: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { fuel_metering: None }
    }
}
