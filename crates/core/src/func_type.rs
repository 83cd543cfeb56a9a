#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

use crate::ValType;

/// A function signature: an ordered `params` sequence followed by an
/// ordered `results` sequence (`spec.md` §3).
///
/// Owned once, by the module's type table; every other use (the translator,
/// the import dispatch cache, `call_indirect`'s type check) holds a `&FuncType`
/// view into that storage rather than cloning the sequences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuncType {
    params: Box<[ValType]>,
    results: Box<[ValType]>,
}

impl FuncType {
    pub fn new(params: impl IntoIterator<Item = ValType>, results: impl IntoIterator<Item = ValType>) -> Self {
        Self {
            params: params.into_iter().collect::<Vec<_>>().into_boxed_slice(),
            results: results.into_iter().collect::<Vec<_>>().into_boxed_slice(),
        }
    }

    pub fn params(&self) -> &[ValType] {
        &self.params
    }

    pub fn results(&self) -> &[ValType] {
        &self.results
    }

    /// Total packed byte size of `params`, per the ABI packing rule of
    /// `spec.md` §4.1.
    pub fn param_bytes(&self) -> usize {
        self.params.iter().map(|k| k.size()).sum()
    }

    /// Total packed byte size of `results`.
    pub fn result_bytes(&self) -> usize {
        self.results.iter().map(|k| k.size()).sum()
    }
}
