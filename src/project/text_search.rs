//! Declaration sites, with a textual fallback for symbols the model has no
//! source declaration for (foreign types, or files that were never loaded).

use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::base::{FileId, LineCol, TextRange};
use crate::hir::{SemanticModel, Shape, SymbolId, SymbolKind, split_arity};

use super::ProjectConfig;

/// One occurrence of a word in a file. Positions are 0-based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMatch {
    pub path: PathBuf,
    pub line: u32,
    pub col: u32,
    /// The whole line the match sits on.
    pub line_text: String,
}

/// Whole-word search over files outside the semantic model.
pub trait TextSearch {
    fn search(&self, word: &str) -> Vec<TextMatch>;
}

/// [`TextSearch`] over the source files below a directory.
pub struct WorkspaceTextSearch {
    root: PathBuf,
    extensions: Vec<String>,
}

impl WorkspaceTextSearch {
    pub fn new(root: impl Into<PathBuf>, config: &ProjectConfig) -> Self {
        Self {
            root: root.into(),
            extensions: config.extensions.clone(),
        }
    }

    fn wants(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

impl TextSearch for WorkspaceTextSearch {
    fn search(&self, word: &str) -> Vec<TextMatch> {
        let mut matches = Vec::new();
        if word.is_empty() {
            return matches;
        }
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "text search skipped an entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.wants(entry.path()) {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            for (line_no, line) in text.lines().enumerate() {
                for col in word_occurrences(line, word) {
                    matches.push(TextMatch {
                        path: entry.path().to_path_buf(),
                        line: line_no as u32,
                        col: col as u32,
                        line_text: line.to_string(),
                    });
                }
            }
        }
        trace!(word, hits = matches.len(), "text search");
        matches
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte offsets of `word` in `line` that are not part of a longer word.
fn word_occurrences(line: &str, word: &str) -> Vec<usize> {
    line.match_indices(word)
        .filter(|&(at, _)| {
            let before = line[..at].chars().next_back();
            let after = line[at + word.len()..].chars().next();
            !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
        })
        .map(|(at, _)| at)
        .collect()
}

/// Where a symbol is declared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclarationSite {
    pub path: PathBuf,
    /// Set for declarations the model indexed.
    pub file: Option<FileId>,
    pub range: Option<TextRange>,
    pub start: LineCol,
    pub end: LineCol,
    /// Found by text search rather than through the model.
    pub textual: bool,
}

/// Declaration sites of `symbol`.
///
/// Constructed generics and their members map back to their definitions and
/// method groups expand to their overloads. When the model holds no source
/// declaration, `search` is asked for lines that look like one.
pub fn find_declarations(
    model: &SemanticModel,
    symbol: SymbolId,
    search: &dyn TextSearch,
) -> Vec<DeclarationSite> {
    let mut targets = Vec::new();
    let definition = definition_of(model, symbol);
    if model.symbol(definition).kind == SymbolKind::MethodGroup {
        targets.extend_from_slice(model.symbol(definition).overloads());
    } else {
        targets.push(definition);
    }

    let mut sites = Vec::new();
    for &target in &targets {
        for decl_id in model.valid_declarations(target) {
            let Some(decl) = model.declaration(decl_id) else { continue };
            let Some(source) = model.file(decl.name_leaf.file) else { continue };
            let Some(range) = source.tree.range(decl.name_leaf.node) else { continue };
            let (start, end) = source.line_index.range(range);
            sites.push(DeclarationSite {
                path: source.path.clone(),
                file: Some(decl.name_leaf.file),
                range: Some(range),
                start,
                end,
                textual: false,
            });
        }
    }
    if !sites.is_empty() {
        return sites;
    }

    let sym = model.symbol(definition);
    if sym.is_sentinel() {
        return sites;
    }
    let (name, kind) = match sym.kind {
        SymbolKind::Constructor => match sym.parent {
            Some(owner) => (model.symbol(owner).name.clone(), SymbolKind::Constructor),
            None => return sites,
        },
        kind => (sym.name.clone(), kind),
    };
    let name = split_arity(&name).0;
    debug!(name, ?kind, "no source declaration, falling back to text search");

    for hit in search.search(name) {
        if !looks_like_declaration(&hit.line_text, hit.col as usize, name, kind) {
            continue;
        }
        let end_col = hit.col + name.len() as u32;
        sites.push(DeclarationSite {
            path: hit.path,
            file: None,
            range: None,
            start: LineCol::new(hit.line, hit.col),
            end: LineCol::new(hit.line, end_col),
            textual: true,
        });
    }
    sites
}

fn definition_of(model: &SemanticModel, mut sym: SymbolId) -> SymbolId {
    for _ in 0..model.config().max_base_depth {
        match model.symbol(sym).shape {
            Shape::Constructed { generic, .. } | Shape::Member { generic, .. } => sym = generic,
            _ => break,
        }
    }
    sym
}

/// Heuristic check that the word at `col` declares `name` as a `kind`.
fn looks_like_declaration(line: &str, col: usize, name: &str, kind: SymbolKind) -> bool {
    let before = line[..col].trim_end();
    let previous = before
        .rsplit(|c: char| !is_word_char(c))
        .next()
        .unwrap_or_default();
    let after = line[col + name.len()..].trim_start();
    let next = after.chars().next();

    match kind {
        SymbolKind::Namespace => before.split_whitespace().next() == Some("namespace"),
        SymbolKind::Class | SymbolKind::Struct | SymbolKind::Interface | SymbolKind::Enum => {
            matches!(previous, "class" | "struct" | "interface" | "enum")
        }
        SymbolKind::Delegate => before.split_whitespace().any(|w| w == "delegate"),
        SymbolKind::Constructor => {
            next == Some('(') && !before.ends_with('.') && previous != "new"
        }
        _ => {
            let ends_with_word = before
                .chars()
                .next_back()
                .is_some_and(|c| is_word_char(c) || matches!(c, '>' | ']' | '?'));
            ends_with_word
                && !matches!(previous, "new" | "return" | "using" | "throw" | "typeof")
                && matches!(next, Some('(' | ';' | '=' | '{' | '<' | ',' | ')') | None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::MetadataBuilder;
    use crate::hir::metadata::ForeignTypeInfo;
    use std::fs;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[test]
    fn test_word_occurrences() {
        assert_eq!(word_occurrences("Foo FooBar Foo.x _Foo", "Foo"), vec![0, 11]);
        assert!(word_occurrences("", "Foo").is_empty());
    }

    #[test]
    fn test_looks_like_declaration() {
        assert!(looks_like_declaration("public class Widget : Base", 13, "Widget", SymbolKind::Class));
        assert!(!looks_like_declaration("var w = new Widget();", 12, "Widget", SymbolKind::Class));
        assert!(looks_like_declaration("    int Count;", 8, "Count", SymbolKind::Field));
        assert!(!looks_like_declaration("    return Count;", 11, "Count", SymbolKind::Field));
        assert!(looks_like_declaration("namespace A.B {", 10, "A", SymbolKind::Namespace));
    }

    #[test]
    fn test_source_declaration_found_through_model() {
        let mut model = SemanticModel::new(ProjectConfig::default());
        let file = model.add_file("a.cs", "class A {}\nclass B { A a; }");
        let global = model.global_namespace();
        let a = model.symbol(global).member("A").unwrap();

        let dir = TempDir::new().unwrap();
        let search = WorkspaceTextSearch::new(dir.path(), &ProjectConfig::default());
        let sites = find_declarations(&model, a, &search);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].file, Some(file));
        assert_eq!(sites[0].start, LineCol::new(0, 6));
        assert!(!sites[0].textual);
    }

    #[test]
    fn test_foreign_type_falls_back_to_text() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Widget.cs"),
            "namespace Lib {\n    public class Widget {}\n}\n// Widget is great\n",
        )
        .unwrap();

        let mut model = SemanticModel::new(ProjectConfig::default());
        let mut lib = MetadataBuilder::new("Lib");
        lib.add_type(ForeignTypeInfo::class("Lib", "Widget"));
        model.add_foreign_assembly(Rc::new(lib.finish())).unwrap();
        let file = model.add_file("use.cs", "using Lib; class C { Widget w; }");

        let text = model.file(file).unwrap().text.clone();
        let offset = text.find("Widget").unwrap() as u32;
        let widget = model.resolve_at(file, offset.into()).unwrap().unwrap();
        assert_eq!(model.symbol(widget).kind, SymbolKind::Class);

        let search = WorkspaceTextSearch::new(dir.path(), &ProjectConfig::default());
        let sites = find_declarations(&model, widget, &search);
        assert_eq!(sites.len(), 1);
        assert!(sites[0].textual);
        assert_eq!(sites[0].start, LineCol::new(1, 17));
        assert_eq!(sites[0].path.file_name().unwrap(), "Widget.cs");
    }
}
