//! Error types.
//!
//! Failing to find a name is not an error here: resolution answers with a
//! sentinel symbol. [`ResolveError`] is reserved for callers breaking the
//! contract (asking about files, scopes or declarations that do not exist).

use smol_str::SmolStr;
use thiserror::Error;

use crate::base::FileId;
use crate::syntax::NodeRef;

use super::ids::{AssemblyId, DeclId, ScopeId};
use super::symbols::Sentinel;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown file {0}")]
    UnknownFile(FileId),

    #[error("node {0:?} does not exist in its file")]
    UnknownNode(NodeRef),

    #[error("no scope encloses node {0:?}")]
    MissingScope(NodeRef),

    #[error("scope {0:?} does not exist")]
    UnknownScope(ScopeId),

    #[error("declaration {0:?} does not exist")]
    UnknownDeclaration(DeclId),

    #[error("unknown assembly {0:?}")]
    UnknownAssembly(AssemblyId),

    #[error("an assembly named `{0}` is already registered")]
    DuplicateAssembly(SmolStr),
}

/// User-facing failure classes, reported as diagnostics.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ResolutionErrorKind {
    UnresolvedSymbol,
    AmbiguousOverload,
    InvalidDeclaration,
    RecursiveResolution,
    ForeignImportFailure,
}

impl ResolutionErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ResolutionErrorKind::UnresolvedSymbol => "E0001",
            ResolutionErrorKind::AmbiguousOverload => "E0002",
            ResolutionErrorKind::InvalidDeclaration => "E0003",
            ResolutionErrorKind::RecursiveResolution => "E0004",
            ResolutionErrorKind::ForeignImportFailure => "E0005",
        }
    }

    /// The failure class a sentinel result stands for. `this`/`base` misuse
    /// has its own diagnostic and maps to `None`.
    pub fn from_sentinel(sentinel: Sentinel) -> Option<Self> {
        match sentinel {
            Sentinel::Unknown | Sentinel::UnknownType | Sentinel::UnresolvedMethod => {
                Some(ResolutionErrorKind::UnresolvedSymbol)
            }
            Sentinel::AmbiguousMethod => Some(ResolutionErrorKind::AmbiguousOverload),
            Sentinel::ThisInStaticMember | Sentinel::BaseInStaticMember => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResolveError::UnknownFile(FileId::new(3));
        assert_eq!(err.to_string(), "unknown file file#3");
    }

    #[test]
    fn test_sentinel_classification() {
        assert_eq!(
            ResolutionErrorKind::from_sentinel(Sentinel::AmbiguousMethod),
            Some(ResolutionErrorKind::AmbiguousOverload)
        );
        assert_eq!(ResolutionErrorKind::from_sentinel(Sentinel::ThisInStaticMember), None);
        assert_eq!(ResolutionErrorKind::RecursiveResolution.code(), "E0004");
    }
}
