//! Arena indices for the semantic model.
//!
//! Every entity the model owns lives in a `Vec` on
//! [`SemanticModel`](super::SemanticModel) and is referred to by one of
//! these 4-byte handles. Handles are never reused within a session, which
//! keeps identity stable for as long as the entity is reachable.

use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(pub(crate) u32);

        impl $name {
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// A namespace, type, member, parameter, local, instance or sentinel.
    SymbolId,
    "sym"
);
arena_id!(
    /// A lexical scope attached to a tree node.
    ScopeId,
    "scope"
);
arena_id!(
    /// One syntactic occurrence binding a node to a symbol.
    DeclId,
    "decl"
);
arena_id!(
    /// A compilation unit: a source project or a referenced binary.
    AssemblyId,
    "asm"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_debug_format() {
        assert_eq!(format!("{:?}", SymbolId::from_raw(7)), "sym#7");
        assert_eq!(format!("{:?}", ScopeId::from_raw(1)), "scope#1");
        assert_eq!(format!("{:?}", DeclId::from_raw(0)), "decl#0");
        assert_eq!(format!("{:?}", AssemblyId::from_raw(2)), "asm#2");
    }

    #[test]
    fn test_ids_are_small() {
        assert_eq!(std::mem::size_of::<SymbolId>(), 4);
        assert_eq!(std::mem::size_of::<Option<SymbolId>>(), 8);
    }
}
