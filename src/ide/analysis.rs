use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::base::{FileId, LineCol, TextRange, TextSize};
use crate::hir::{
    AssemblyId, Diagnostic, MetadataProvider, ResolveError, SemanticModel, SymbolId, check_file,
};
use crate::project::{
    DeclarationSite, LoadError, ProjectConfig, TextMatch, TextSearch, WorkspaceLoader,
    find_declarations,
};
use crate::syntax::SyntaxTree;

use super::completion::{CompletionItem, completions_at};
use super::hover::{HoverResult, hover};
use super::inlay_hints::{InlayHint, inlay_hints};

struct NoTextSearch;

impl TextSearch for NoTextSearch {
    fn search(&self, _word: &str) -> Vec<TextMatch> {
        Vec::new()
    }
}

/// Owns the semantic model for an editing session and answers
/// position-based queries against it.
///
/// Positions are 0-based line/column pairs. A position past the end of its
/// line or file answers "nothing there" rather than an error; unknown files
/// are errors.
pub struct AnalysisHost {
    model: SemanticModel,
    text_search: Box<dyn TextSearch>,
}

impl AnalysisHost {
    pub fn new(config: ProjectConfig) -> Self {
        Self {
            model: SemanticModel::new(config),
            text_search: Box::new(NoTextSearch),
        }
    }

    /// Uses `search` for goto-definition on symbols without a source
    /// declaration.
    pub fn with_text_search(mut self, search: impl TextSearch + 'static) -> Self {
        self.text_search = Box::new(search);
        self
    }

    pub fn model(&self) -> &SemanticModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut SemanticModel {
        &mut self.model
    }

    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        self.model.files().find_by_path(path)
    }

    // ========================================================================
    // INPUTS
    // ========================================================================

    /// Adds the file to the main assembly, or replaces its text when the
    /// path is already known.
    pub fn set_file_text(&mut self, path: impl Into<PathBuf>, text: &str) -> FileId {
        let path = path.into();
        if let Some(file) = self.model.files().find_by_path(&path) {
            // The id came from the model, so the update cannot miss.
            if self.model.update_file(file, text).is_ok() {
                return file;
            }
        }
        self.model.add_file(path, text)
    }

    pub fn remove_file(&mut self, file: FileId) -> Result<(), ResolveError> {
        self.model.remove_file(file)
    }

    /// Edits a file's tree in place. The model's version is bumped so every
    /// cached resolution is recomputed on next use. Subtrees grafted by the
    /// edit must be registered with [`SemanticModel::index_subtree`].
    pub fn apply_edit<R>(
        &mut self,
        file: FileId,
        edit: impl FnOnce(&mut SyntaxTree) -> R,
    ) -> Result<R, ResolveError> {
        self.model.edit_tree(file, edit)
    }

    /// Registers a referenced binary and makes the main assembly reference
    /// it, whatever the configured reference list says.
    pub fn add_reference(&mut self, provider: Rc<dyn MetadataProvider>) -> Result<AssemblyId, ResolveError> {
        let id = self.model.add_foreign_assembly(provider)?;
        let main = self.model.main_assembly();
        self.model.add_reference(main, id)?;
        Ok(id)
    }

    /// Loads every source file below `root` into the main assembly.
    pub fn load_directory(&mut self, root: &Path) -> Result<Vec<FileId>, LoadError> {
        let loader = WorkspaceLoader::new(self.model.config());
        let main = self.model.main_assembly();
        loader.load_directory(root, &mut self.model, main)
    }

    /// Starts a fresh session with the same configuration.
    pub fn reset(&mut self) {
        debug!("resetting analysis host");
        self.model.reset();
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    fn offset(&self, file: FileId, pos: LineCol) -> Result<Option<TextSize>, ResolveError> {
        let source = self.model.file(file).ok_or(ResolveError::UnknownFile(file))?;
        Ok(source.line_index.offset(pos))
    }

    /// Symbol denoted by the token at `pos`.
    pub fn resolve_at(&mut self, file: FileId, pos: LineCol) -> Result<Option<SymbolId>, ResolveError> {
        match self.offset(file, pos)? {
            Some(offset) => self.model.resolve_at(file, offset),
            None => Ok(None),
        }
    }

    /// Type of the token at `pos`.
    pub fn type_at(&mut self, file: FileId, pos: LineCol) -> Result<Option<SymbolId>, ResolveError> {
        match self.offset(file, pos)? {
            Some(offset) => self.model.type_at(file, offset),
            None => Ok(None),
        }
    }

    pub fn completions_at(&mut self, file: FileId, pos: LineCol) -> Result<Vec<CompletionItem>, ResolveError> {
        match self.offset(file, pos)? {
            Some(offset) => completions_at(&mut self.model, file, offset),
            None => Ok(Vec::new()),
        }
    }

    pub fn goto_definition(&mut self, file: FileId, pos: LineCol) -> Result<Vec<DeclarationSite>, ResolveError> {
        let Some(sym) = self.resolve_at(file, pos)? else {
            return Ok(Vec::new());
        };
        if self.model.symbol(sym).is_sentinel() {
            return Ok(Vec::new());
        }
        Ok(find_declarations(&self.model, sym, self.text_search.as_ref()))
    }

    pub fn hover(&mut self, file: FileId, pos: LineCol) -> Result<Option<HoverResult>, ResolveError> {
        match self.offset(file, pos)? {
            Some(offset) => hover(&mut self.model, file, offset),
            None => Ok(None),
        }
    }

    pub fn inlay_hints(&mut self, file: FileId, range: Option<TextRange>) -> Result<Vec<InlayHint>, ResolveError> {
        inlay_hints(&mut self.model, file, range)
    }

    pub fn diagnostics(&mut self, file: FileId) -> Result<Vec<Diagnostic>, ResolveError> {
        check_file(&mut self.model, file)
    }
}

impl Default for AnalysisHost {
    fn default() -> Self {
        Self::new(ProjectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{SymbolKind, codes};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_file_text_replaces_existing() {
        let mut host = AnalysisHost::default();
        let first = host.set_file_text("a.cs", "class A {}");
        let second = host.set_file_text("a.cs", "class B {}");
        assert_eq!(first, second);
        let global = host.model().global_namespace();
        assert!(host.model().symbol(global).member("A").is_none());
        assert!(host.model().symbol(global).member("B").is_some());
    }

    #[test]
    fn test_hover_on_field_use() {
        let mut host = AnalysisHost::default();
        let file = host.set_file_text("a.cs", "class C {\n    int count;\n    int M() { return count; }\n}");
        let hover = host.hover(file, LineCol::new(2, 22)).unwrap().unwrap();
        assert_eq!(hover.contents, "(field) int C.count");
        assert_eq!(hover.documentation_key.as_deref(), Some("F:C.count"));
        assert_eq!(hover.start, LineCol::new(2, 21));
    }

    #[test]
    fn test_goto_definition_local() {
        let mut host = AnalysisHost::default();
        let file = host.set_file_text("a.cs", "class C {\n    void M() { int x = 1; x = 2; }\n}");
        let sites = host.goto_definition(file, LineCol::new(1, 26)).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].start, LineCol::new(1, 19));
    }

    #[test]
    fn test_completions_after_this() {
        let mut host = AnalysisHost::default();
        let file = host.set_file_text(
            "a.cs",
            "class C {\n    int count;\n    static int total;\n    void M() { this. }\n}",
        );
        let items = host.completions_at(file, LineCol::new(3, 20)).unwrap();
        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"count"));
        assert!(labels.contains(&"M"));
        assert!(!labels.contains(&"total"));
    }

    #[test]
    fn test_diagnostics_and_unknown_file() {
        let mut host = AnalysisHost::default();
        let file = host.set_file_text("a.cs", "class C { Missing m; }");
        let diagnostics = host.diagnostics(file).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some(codes::UNRESOLVED_SYMBOL));

        host.remove_file(file).unwrap();
        assert!(matches!(host.diagnostics(file), Err(ResolveError::UnknownFile(f)) if f == file));
    }

    #[test]
    fn test_reset_clears_files() {
        let mut host = AnalysisHost::default();
        let file = host.set_file_text("a.cs", "class C {}");
        host.reset();
        assert!(host.model().file(file).is_none());
        assert_eq!(host.resolve_at(file, LineCol::new(0, 6)), Err(ResolveError::UnknownFile(file)));
    }

    #[test]
    fn test_type_at_literal() {
        let mut host = AnalysisHost::default();
        let file = host.set_file_text("a.cs", "class C { object o = 1.5f; }");
        let ty = host.type_at(file, LineCol::new(0, 21)).unwrap().unwrap();
        assert_eq!(host.model().symbol(ty).kind, SymbolKind::Struct);
        assert_eq!(host.model_mut().display_type(ty), "float");
    }
}
