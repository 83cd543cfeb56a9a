//! The dispatch engine (C6) and its op semantics (C4).

pub mod dispatch;
mod ops;
