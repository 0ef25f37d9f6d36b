//! Project setup: configuration, loading source trees from disk, and the
//! textual search used when a symbol has no source declaration.

mod config;
mod text_search;
mod workspace_loader;

pub use config::ProjectConfig;
pub use text_search::{DeclarationSite, TextMatch, TextSearch, WorkspaceTextSearch, find_declarations};
pub use workspace_loader::{LoadError, WorkspaceLoader};
