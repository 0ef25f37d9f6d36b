//! Editor-facing queries.
//!
//! [`AnalysisHost`] owns a [`SemanticModel`](crate::hir::SemanticModel) and
//! answers position-based requests (resolve, hover, completion,
//! goto-definition, inlay hints, diagnostics). Results use the crate's own
//! types; converting them to a protocol is left to the caller.
//!
//! ```ignore
//! use symgraph::base::LineCol;
//! use symgraph::ide::AnalysisHost;
//!
//! let mut host = AnalysisHost::default();
//! let file = host.set_file_text("a.cs", "class A { int x; }");
//! let hover = host.hover(file, LineCol::new(0, 14))?;
//! ```

mod analysis;
mod completion;
mod hover;
mod inlay_hints;

pub use analysis::AnalysisHost;
pub use completion::{CompletionItem, CompletionKind};
pub use hover::HoverResult;
pub use inlay_hints::{InlayHint, InlayHintKind};
