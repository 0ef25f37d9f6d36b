//! Analysis host over a workspace on disk
//!
//! Loads a temporary directory of sources, then drives editor queries and
//! the textual declaration fallback through `AnalysisHost`.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use symgraph::base::LineCol;
use symgraph::hir::metadata::{ForeignMemberInfo, ForeignTypeInfo, ForeignTypeRef};
use symgraph::hir::{MetadataBuilder, Severity, SymbolKind, codes};
use symgraph::ide::{AnalysisHost, CompletionKind, InlayHintKind};
use symgraph::project::{LoadError, ProjectConfig, WorkspaceTextSearch};
use tempfile::TempDir;

fn write(dir: &Path, rel: &str, text: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "src/Shapes.cs",
        "namespace Shapes {\n    public class Shape {\n        public int Sides;\n        public virtual int Area() { return 0; }\n    }\n}\n",
    );
    write(
        dir.path(),
        "src/App.cs",
        "using Shapes;\nclass App {\n    void Run() {\n        var s = new Shape();\n        var n = s.Sides;\n        s.\n    }\n}\n",
    );
    write(dir.path(), "README.md", "class NotSource {}");
    dir
}

#[test]
fn test_load_directory_and_query() {
    let dir = workspace();
    let mut host = AnalysisHost::default();
    let files = host.load_directory(dir.path()).unwrap();
    assert_eq!(files.len(), 2);

    let app = host.file_id(&dir.path().join("src/App.cs")).unwrap();

    // `Sides` in `s.Sides`
    let sides = host.resolve_at(app, LineCol::new(4, 20)).unwrap().unwrap();
    assert_eq!(host.model().symbol(sides).kind, SymbolKind::Field);

    let ty = host.type_at(app, LineCol::new(4, 12)).unwrap().unwrap();
    assert_eq!(host.model_mut().display_type(ty), "int");

    let sites = host.goto_definition(app, LineCol::new(4, 20)).unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].path, dir.path().join("src/Shapes.cs"));
    assert_eq!(sites[0].start, LineCol::new(2, 19));
}

#[test]
fn test_member_completion_in_loaded_file() {
    let dir = workspace();
    let mut host = AnalysisHost::default();
    host.load_directory(dir.path()).unwrap();
    let app = host.file_id(&dir.path().join("src/App.cs")).unwrap();

    let items = host.completions_at(app, LineCol::new(5, 10)).unwrap();
    let sides = items.iter().find(|i| i.label == "Sides").expect("Sides offered");
    assert_eq!(sides.kind, CompletionKind::Field);
    assert!(items.iter().any(|i| i.label == "Area" && i.kind == CompletionKind::Method));
    assert!(items.iter().any(|i| i.label == "ToString"));
}

#[test]
fn test_inlay_hints_for_var_locals() {
    let dir = workspace();
    let mut host = AnalysisHost::default();
    host.load_directory(dir.path()).unwrap();
    let app = host.file_id(&dir.path().join("src/App.cs")).unwrap();

    let labels: Vec<_> = host
        .inlay_hints(app, None)
        .unwrap()
        .into_iter()
        .filter(|h| h.kind == InlayHintKind::Type)
        .map(|h| (h.line, h.label))
        .collect();
    assert_eq!(labels, vec![(3, ": Shape".to_string()), (4, ": int".to_string())]);
}

#[test]
fn test_unreadable_file_is_reported_and_others_load() {
    let dir = workspace();
    fs::write(dir.path().join("src/Broken.cs"), [0xff, 0xfe, 0x00]).unwrap();
    let mut host = AnalysisHost::default();
    let err = host.load_directory(dir.path()).unwrap_err();
    let errors = match err {
        LoadError::Files(errors) => errors,
        other => panic!("expected per-file errors, got {other}"),
    };
    assert_eq!(errors.len(), 1);
    assert!(host.file_id(&dir.path().join("src/App.cs")).is_some());
}

#[test]
fn test_goto_foreign_type_uses_text_search() {
    let sources = TempDir::new().unwrap();
    write(
        sources.path(),
        "Gadgets/Gadget.cs",
        "namespace Gadgets\n{\n    public sealed class Gadget\n    {\n    }\n}\n",
    );

    let mut lib = MetadataBuilder::new("Gadgets");
    let gadget = lib.add_type(ForeignTypeInfo::class("Gadgets", "Gadget").with_sealed());
    lib.add_member(
        gadget,
        ForeignMemberInfo::property("Name", ForeignTypeRef::external("mscorlib", "System.String")),
    );

    let config = ProjectConfig::default();
    let search = WorkspaceTextSearch::new(sources.path(), &config);
    let mut host = AnalysisHost::new(config).with_text_search(search);
    host.add_reference(Rc::new(lib.finish())).unwrap();
    let file = host.set_file_text("main.cs", "using Gadgets;\nclass C { Gadget g; }");

    let sites = host.goto_definition(file, LineCol::new(1, 11)).unwrap();
    assert_eq!(sites.len(), 1);
    assert!(sites[0].textual);
    assert_eq!(sites[0].start, LineCol::new(2, 24));

    let hover = host.hover(file, LineCol::new(1, 11)).unwrap().unwrap();
    assert_eq!(hover.documentation_key.as_deref(), Some("T:Gadgets.Gadget"));
}

#[test]
fn test_edit_cycle_updates_diagnostics() {
    let mut host = AnalysisHost::default();
    let file = host.set_file_text("a.cs", "class C { void M() { Missing(); } }");
    let diagnostics = host.diagnostics(file).unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Error);
    assert_eq!(diagnostics[0].code.as_deref(), Some(codes::UNRESOLVED_SYMBOL));

    host.set_file_text("a.cs", "class C { void M() { Missing(); } void Missing() {} }");
    assert!(host.diagnostics(file).unwrap().is_empty());
}
