//! Diagnostics: resolution failures reported against source ranges.
//!
//! Resolution itself never fails; it answers with sentinels. The
//! [`SemanticChecker`] walks a file, resolves every reference and turns
//! sentinel outcomes, colliding declarations and failed foreign imports into
//! [`Diagnostic`]s.

use std::sync::Arc;

use crate::base::{FileId, LineCol, TextRange};
use crate::syntax::{NodeId, NodeRef, Rule, SyntaxTree, TokenKind};

use super::error::{ResolutionErrorKind, ResolveError};
use super::ids::SymbolId;
use super::model::SemanticModel;
use super::symbols::{Sentinel, SymbolKind};

// ============================================================================
// DIAGNOSTIC TYPES
// ============================================================================

/// Severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Severity {
    /// Convert to LSP severity number.
    pub fn to_lsp(&self) -> u32 {
        match self {
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Info => 3,
            Severity::Hint => 4,
        }
    }
}

/// A diagnostic message with location.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub file: FileId,
    pub range: TextRange,
    /// Start of `range` (0-indexed line and column).
    pub start: LineCol,
    pub end: LineCol,
    pub severity: Severity,
    /// Error/warning code (e.g., "E0001").
    pub code: Option<Arc<str>>,
    pub message: Arc<str>,
    pub related: Vec<RelatedInfo>,
}

/// Related information for a diagnostic.
#[derive(Clone, Debug)]
pub struct RelatedInfo {
    pub file: FileId,
    pub range: TextRange,
    pub message: Arc<str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(file: FileId, range: TextRange, message: impl Into<Arc<str>>) -> Self {
        Self {
            file,
            range,
            start: LineCol::default(),
            end: LineCol::default(),
            severity: Severity::Error,
            code: None,
            message: message.into(),
            related: Vec::new(),
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(file: FileId, range: TextRange, message: impl Into<Arc<str>>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(file, range, message)
        }
    }

    /// Set the line/column span for this diagnostic.
    pub fn with_span(mut self, start: LineCol, end: LineCol) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Set the error code.
    pub fn with_code(mut self, code: impl Into<Arc<str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add related information.
    pub fn with_related(mut self, info: RelatedInfo) -> Self {
        self.related.push(info);
        self
    }
}

// ============================================================================
// DIAGNOSTIC CODES
// ============================================================================

/// Diagnostic codes for resolution failures.
pub mod codes {
    /// Name, member or overload not found.
    pub const UNRESOLVED_SYMBOL: &str = "E0001";
    /// More than one overload fits equally well.
    pub const AMBIGUOUS_OVERLOAD: &str = "E0002";
    /// Declaration collides with a member of another kind.
    pub const INVALID_DECLARATION: &str = "E0003";
    /// A type that depends on itself.
    pub const RECURSIVE_RESOLUTION: &str = "E0004";
    /// Metadata of a referenced binary could not be imported.
    pub const FOREIGN_IMPORT_FAILURE: &str = "E0005";
    /// `this` or `base` inside a static member.
    pub const THIS_IN_STATIC_MEMBER: &str = "E0006";
    /// Same member declared twice.
    pub const DUPLICATE_DEFINITION: &str = "E0007";
}

// ============================================================================
// DIAGNOSTIC COLLECTOR
// ============================================================================

/// Collects diagnostics during semantic analysis.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn diagnostics_for_file(&self, file: FileId) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.file == file).collect()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning).count()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Take all diagnostics, leaving the collector empty.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }
}

// ============================================================================
// SEMANTIC CHECKER
// ============================================================================

/// Resolves the references of files and reports what failed.
pub struct SemanticChecker<'a> {
    model: &'a mut SemanticModel,
    collector: DiagnosticCollector,
}

impl<'a> SemanticChecker<'a> {
    pub fn new(model: &'a mut SemanticModel) -> Self {
        Self {
            model,
            collector: DiagnosticCollector::new(),
        }
    }

    /// Check every reference and declaration of a file. A failing reference
    /// never stops the walk.
    pub fn check_file(&mut self, file: FileId) -> Result<(), ResolveError> {
        let tree = self.model.tree(file).ok_or(ResolveError::UnknownFile(file))?;
        let Some(root) = tree.root() else {
            return Ok(());
        };
        let failures_before = self.model.import_failures().len();

        for node in tree.descendants(root) {
            let at = NodeRef::new(file, node);
            match tree.rule(node) {
                Some(Rule::ThisAccess | Rule::BaseAccess) => self.check_this(&tree, at),
                Some(Rule::ArgumentList) => self.check_creation(&tree, at),
                None => self.check_leaf(&tree, at),
                Some(_) => {}
            }
        }
        self.check_declarations(&tree, file);
        self.check_import_failures(&tree, file, failures_before);
        Ok(())
    }

    fn report(&mut self, tree: &SyntaxTree, at: NodeRef, code: &str, message: String, severity: Severity) {
        let range = tree.range(at.node).unwrap_or_default();
        let (start, end) = match self.model.file(at.file) {
            Some(source) => source.line_index.range(range),
            None => (LineCol::default(), LineCol::default()),
        };
        let diagnostic = match severity {
            Severity::Error => Diagnostic::error(at.file, range, message),
            _ => Diagnostic {
                severity,
                ..Diagnostic::warning(at.file, range, message)
            },
        };
        self.collector.add(diagnostic.with_span(start, end).with_code(code));
    }

    fn check_leaf(&mut self, tree: &SyntaxTree, leaf: NodeRef) {
        let Some(token) = tree.token(leaf.node) else {
            return;
        };
        if token.kind != TokenKind::Identifier || self.model.declaration_at(leaf).is_some() {
            return;
        }
        let Some(parent) = tree.parent(leaf.node) else {
            return;
        };
        if !is_reference_position(tree, parent, leaf.node) {
            return;
        }
        // An implicit `var` fails only when its initializer does.
        if token.is("var") && tree.rule(parent) == Some(Rule::TypeNameSegment) {
            return;
        }
        if tree.rule(parent) == Some(Rule::MemberAccess) {
            let receiver = tree.children(parent).first().copied();
            if let Some(receiver) = receiver {
                let target = self.model.resolve_node(NodeRef::new(leaf.file, receiver));
                if self.model.is_sentinel(target) {
                    return;
                }
            }
        }
        let name = token.text.clone();
        let resolved = self.model.resolve_node(leaf);
        let Some(sentinel) = self.model.symbol(resolved).sentinel else {
            return;
        };
        match ResolutionErrorKind::from_sentinel(sentinel) {
            Some(ResolutionErrorKind::AmbiguousOverload) => self.report_ambiguous(tree, leaf, &name),
            Some(kind) => {
                let message = match sentinel {
                    Sentinel::UnresolvedMethod => format!("no overload of '{name}' takes these arguments"),
                    _ => format!("cannot resolve '{name}'"),
                };
                self.report(tree, leaf, kind.code(), message, Severity::Error);
            }
            None => {}
        }
    }

    fn report_ambiguous(&mut self, tree: &SyntaxTree, leaf: NodeRef, name: &str) {
        // Candidates are recorded against the invocation node.
        let call = tree
            .ancestors(leaf.node)
            .find(|&a| tree.rule(a) == Some(Rule::InvocationExpression))
            .map(|call| NodeRef::new(leaf.file, call));
        let candidates: Vec<SymbolId> = call
            .map(|c| self.model.ambiguity_candidates(c).to_vec())
            .unwrap_or_default();
        let range = tree.range(leaf.node).unwrap_or_default();
        let (start, end) = match self.model.file(leaf.file) {
            Some(source) => source.line_index.range(range),
            None => (LineCol::default(), LineCol::default()),
        };
        let mut diagnostic = Diagnostic::error(leaf.file, range, format!("call to '{name}' is ambiguous"))
            .with_span(start, end)
            .with_code(codes::AMBIGUOUS_OVERLOAD);
        for candidate in candidates {
            let signature = self.model.tooltip_text(candidate);
            if let Some((file, range)) = self.declaration_site(candidate) {
                diagnostic = diagnostic.with_related(RelatedInfo {
                    file,
                    range,
                    message: Arc::from(format!("candidate: {signature}")),
                });
            }
        }
        self.collector.add(diagnostic);
    }

    fn declaration_site(&self, sym: SymbolId) -> Option<(FileId, TextRange)> {
        let root = self.model.definition_root(sym);
        let decl = *self.model.valid_declarations(root).first()?;
        let name_leaf = self.model.declaration(decl)?.name_leaf;
        let range = self.model.file(name_leaf.file)?.tree.range(name_leaf.node)?;
        Some((name_leaf.file, range))
    }

    fn check_this(&mut self, tree: &SyntaxTree, at: NodeRef) {
        let resolved = self.model.resolve_node(at);
        let keyword = match self.model.symbol(resolved).sentinel {
            Some(Sentinel::ThisInStaticMember) => "this",
            Some(Sentinel::BaseInStaticMember) => "base",
            _ => return,
        };
        self.report(
            tree,
            at,
            codes::THIS_IN_STATIC_MEMBER,
            format!("'{keyword}' is not available in a static member"),
            Severity::Error,
        );
    }

    /// `new T(args)` and attribute arguments: the constructor call.
    fn check_creation(&mut self, tree: &SyntaxTree, list: NodeRef) {
        let Some(parent) = tree.parent(list.node) else {
            return;
        };
        if !matches!(tree.rule(parent), Some(Rule::ObjectCreation | Rule::Attribute)) {
            return;
        }
        let Some(reference) = tree.find_child(parent, Rule::TypeReference) else {
            return;
        };
        let ty = self.model.resolve_node(NodeRef::new(list.file, reference));
        if self.model.is_sentinel(ty) {
            // Reported on the type name itself.
            return;
        }
        let resolved = self.model.resolve_node(list);
        let at = NodeRef::new(list.file, reference);
        let name = self.model.display_name(ty);
        match self.model.symbol(resolved).sentinel {
            Some(Sentinel::UnresolvedMethod) => self.report(
                tree,
                at,
                codes::UNRESOLVED_SYMBOL,
                format!("no constructor of '{name}' takes these arguments"),
                Severity::Error,
            ),
            Some(Sentinel::AmbiguousMethod) => self.report(
                tree,
                at,
                codes::AMBIGUOUS_OVERLOAD,
                format!("constructor call of '{name}' is ambiguous"),
                Severity::Error,
            ),
            _ => {}
        }
    }

    fn check_declarations(&mut self, tree: &SyntaxTree, file: FileId) {
        let duplicates: Vec<_> = self
            .model
            .duplicate_declarations()
            .iter()
            .copied()
            .filter(|(decl, _)| self.model.is_declaration_valid(*decl))
            .filter(|(decl, _)| self.model.declaration(*decl).is_some_and(|d| d.node.file == file))
            .collect();
        for (decl, existing) in duplicates {
            let Some(declaration) = self.model.declaration(decl) else {
                continue;
            };
            let name_leaf = declaration.name_leaf;
            let name = declaration.name.clone();
            let same_kind = self.model.symbol(existing).kind == declaration.kind.symbol_kind()
                || self.model.symbol(existing).kind == SymbolKind::MethodGroup;
            let (code, message) = if same_kind {
                (codes::DUPLICATE_DEFINITION, format!("'{name}' is already defined"))
            } else {
                let kind = self.model.symbol(existing).kind.display();
                (codes::INVALID_DECLARATION, format!("'{name}' conflicts with a {kind} of the same name"))
            };
            self.report(tree, name_leaf, code, message, Severity::Error);
            if let Some((file, range)) = self.declaration_site(existing) {
                if let Some(last) = self.collector.diagnostics.last_mut() {
                    last.related.push(RelatedInfo {
                        file,
                        range,
                        message: Arc::from(format!("previous definition of '{name}'")),
                    });
                }
            }
        }

        let decls = self.model.file_decls.get(&file).cloned().unwrap_or_default();
        for decl in decls {
            if !self.model.is_declaration_valid(decl) {
                continue;
            }
            let Some(declaration) = self.model.declaration(decl) else {
                continue;
            };
            let (Some(symbol), name_leaf, name) = (declaration.symbol, declaration.name_leaf, declaration.name.clone())
            else {
                continue;
            };
            if !matches!(self.model.symbol(symbol).kind, SymbolKind::Local | SymbolKind::Field) {
                continue;
            }
            self.model.type_of(symbol);
            if self.model.is_recursive(symbol) {
                self.report(
                    tree,
                    name_leaf,
                    codes::RECURSIVE_RESOLUTION,
                    format!("the type of '{name}' depends on itself"),
                    Severity::Error,
                );
            }
        }
    }

    fn check_import_failures(&mut self, tree: &SyntaxTree, file: FileId, before: usize) {
        let failures: Vec<_> = self.model.import_failures()[before..].to_vec();
        let Some(root) = tree.root() else {
            return;
        };
        for failure in failures {
            self.report(
                tree,
                NodeRef::new(file, root),
                codes::FOREIGN_IMPORT_FAILURE,
                format!("could not import {} from '{}'", failure.what, failure.assembly),
                Severity::Warning,
            );
        }
    }

    /// Get the collected diagnostics.
    pub fn finish(self) -> Vec<Diagnostic> {
        self.collector.diagnostics
    }
}

/// Whether an identifier leaf under `parent` is a reference worth checking.
fn is_reference_position(tree: &SyntaxTree, parent: NodeId, leaf: NodeId) -> bool {
    match tree.rule(parent) {
        Some(Rule::SimpleName | Rule::MemberAccess | Rule::TypeNameSegment | Rule::MemberInitializer) => true,
        // Only namespaces of `using` directives; alias names are declarations.
        Some(Rule::QualifiedName) => tree
            .parent(parent)
            .is_some_and(|p| tree.rule(p) == Some(Rule::UsingDirective)),
        Some(Rule::Argument) => {
            let children = tree.children(parent);
            children.first() == Some(&leaf)
                && children
                    .get(1)
                    .and_then(|&c| tree.token(c))
                    .is_some_and(|t| t.is(":"))
        }
        _ => false,
    }
}

/// Check a file and return diagnostics.
pub fn check_file(model: &mut SemanticModel, file: FileId) -> Result<Vec<Diagnostic>, ResolveError> {
    let mut checker = SemanticChecker::new(model);
    checker.check_file(file)?;
    Ok(checker.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes_of(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().filter_map(|d| d.code.as_deref()).collect()
    }

    #[test]
    fn test_diagnostic_with_code() {
        let diag = Diagnostic::error(FileId::new(0), TextRange::default(), "test").with_code(codes::UNRESOLVED_SYMBOL);
        assert_eq!(diag.code.as_deref(), Some("E0001"));
        assert_eq!(ResolutionErrorKind::AmbiguousOverload.code(), codes::AMBIGUOUS_OVERLOAD);
    }

    #[test]
    fn test_collector_counts() {
        let mut collector = DiagnosticCollector::new();
        collector.add(Diagnostic::error(FileId::new(0), TextRange::default(), "error 1"));
        collector.add(Diagnostic::error(FileId::new(1), TextRange::default(), "error 2"));
        collector.add(Diagnostic::warning(FileId::new(0), TextRange::default(), "warning 1"));

        assert_eq!(collector.error_count(), 2);
        assert_eq!(collector.warning_count(), 1);
        assert!(collector.has_errors());
        assert_eq!(collector.diagnostics_for_file(FileId::new(0)).len(), 2);
    }

    #[test]
    fn test_severity_to_lsp() {
        assert_eq!(Severity::Error.to_lsp(), 1);
        assert_eq!(Severity::Hint.to_lsp(), 4);
    }

    #[test]
    fn test_unresolved_name_is_reported_once() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "class C { void M() { Missing = 1; } }");
        let diagnostics = check_file(&mut model, file).unwrap();
        assert_eq!(codes_of(&diagnostics), vec![codes::UNRESOLVED_SYMBOL]);
        assert!(diagnostics[0].message.contains("Missing"));
        assert_eq!(diagnostics[0].start, LineCol::new(0, 21));
    }

    #[test]
    fn test_valid_file_has_no_diagnostics() {
        let mut model = SemanticModel::default();
        let file = model.add_file(
            "a.cs",
            "using System; class C { int f; void M(int x) { f = x; var s = f.ToString(); } }",
        );
        let diagnostics = check_file(&mut model, file).unwrap();
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn test_ambiguous_and_static_this() {
        let mut model = SemanticModel::default();
        let file = model.add_file(
            "a.cs",
            "class C { void F(int a, long b) {} void F(long a, int b) {} static void S() { this.ToString(); } void M() { F(1, 1); } }",
        );
        let diagnostics = check_file(&mut model, file).unwrap();
        let codes = codes_of(&diagnostics);
        assert!(codes.contains(&codes::THIS_IN_STATIC_MEMBER));
        assert!(codes.contains(&codes::AMBIGUOUS_OVERLOAD));
        let ambiguous = diagnostics
            .iter()
            .find(|d| d.code.as_deref() == Some(codes::AMBIGUOUS_OVERLOAD))
            .unwrap();
        assert_eq!(ambiguous.related.len(), 2);
    }

    #[test]
    fn test_duplicates_and_recursive_locals() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "class C { int f; int f; void M() { var x = x; } }");
        let diagnostics = check_file(&mut model, file).unwrap();
        let codes = codes_of(&diagnostics);
        assert!(codes.contains(&codes::DUPLICATE_DEFINITION));
        assert!(codes.contains(&codes::RECURSIVE_RESOLUTION));
    }
}
