//! Semantic model: symbols, scopes and resolution.
//!
//! Everything hangs off one [`SemanticModel`]:
//! - the symbol graph and declaration table ([`Symbol`], [`Declaration`])
//! - lexical scopes attached to tree nodes ([`Scope`], [`Lookup`])
//! - foreign types imported from referenced binaries ([`MetadataProvider`])
//! - constructed generic types, overload resolution and node resolution
//!
//! Resolution answers with sentinel symbols instead of failing; see
//! [`Sentinel`]. [`ResolveError`] is reserved for misuse of the API.

mod builtins;
mod collect;
mod completion;
mod declarations;
mod diagnostics;
mod directory;
mod display;
mod error;
mod foreign;
mod generics;
mod ids;
mod input;
pub mod metadata;
mod model;
mod overload;
mod resolve;
mod scope;
mod symbols;

pub use builtins::{CORE_LIBRARY, PREDEFINED_TYPES, core_library, keyword_full_name};
pub use completion::CompletionRequest;
pub use declarations::{DeclKind, Declaration};
pub use diagnostics::{
    Diagnostic, DiagnosticCollector, RelatedInfo, SemanticChecker, Severity, check_file, codes,
};
pub use directory::{Assembly, Directory};
pub use error::{ResolutionErrorKind, ResolveError};
pub use generics::Substitution;
pub use ids::{AssemblyId, DeclId, ScopeId, SymbolId};
pub use input::{SourceFile, SourceRoot};
pub use metadata::{MetadataAssembly, MetadataBuilder, MetadataProvider};
pub use model::{ImportFailure, ResolutionStats, SemanticModel};
pub use overload::{CallArgument, OverloadResolution};
pub use scope::{Import, Lookup, Scope, ScopeKind};
pub use symbols::{
    AccessMask, Accessibility, BindingFlags, Modifiers, Origin, ResolveState, Sentinel, Shape, Symbol,
    SymbolKind, member_key, split_arity,
};
