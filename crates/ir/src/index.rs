use core::fmt;

macro_rules! index_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            pub const fn from_u32(value: u32) -> Self {
                Self(value)
            }

            pub const fn to_u32(self) -> u32 {
                self.0
            }

            pub const fn to_usize(self) -> usize {
                self.0 as usize
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                Self(value as u32)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

index_newtype!(
    /// Dense, load-order identifier of a loaded module (`spec.md` §3, §9).
    ModuleId
);
index_newtype!(
    /// Index of a function within a module's combined import+local space,
    /// as used in direct-call immediates and trap frames.
    FuncIdx
);
index_newtype!(
    /// Index into a module's type table.
    TypeIdx
);
index_newtype!(
    /// Index into a module's table vector.
    TableIdx
);
index_newtype!(
    /// Byte offset into a compiled function's packed locals frame
    /// (`local_offset` immediate, `spec.md` §4.4). Never negative.
    LocalOffset
);
index_newtype!(
    /// Index into a compiled function's `ops` record vector; stands in for
    /// the spec's pointer-sized `label_ip` immediate (see `DESIGN.md` for
    /// why this crate threads instructions via an index rather than a raw
    /// pointer into a byte stream).
    InstrIdx
);
