//! # symgraph
//!
//! Semantic symbol resolution and type system for C#-shaped source trees.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! ide      → editor queries (hover, completion, goto-definition, inlay hints)
//!   ↓
//! project  → configuration, workspace loading, textual declaration search
//!   ↓
//! hir      → semantic model: symbols, scopes, foreign imports, resolution
//!   ↓
//! syntax   → logos lexer, arena syntax tree, reference parser
//!   ↓
//! base     → primitives (FileId, text positions)
//! ```

/// Foundation types: FileId, text ranges, line/column mapping
pub mod base;

/// Semantic model: symbol graph, scopes, generics, overloads, resolution
pub mod hir;

/// Editor-facing queries over the semantic model
pub mod ide;

/// Project configuration and workspace loading
pub mod project;

/// Tokens, syntax tree and the bundled parser
pub mod syntax;

pub use base::{FileId, LineCol, LineIndex, TextRange, TextSize};
pub use hir::{ResolveError, SemanticModel, SymbolId};
pub use ide::AnalysisHost;
pub use project::ProjectConfig;
