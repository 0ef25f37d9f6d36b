//! Inlay hints: inferred types of `var` locals and parameter names at
//! call sites.

use crate::base::{FileId, TextRange, TextSize};
use crate::hir::{Modifiers, ResolveError, SemanticModel, SymbolKind};
use crate::syntax::{NodeId, NodeRef, Rule, SyntaxTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlayHintKind {
    /// Type annotation hint (e.g., `: int`)
    Type,
    /// Parameter name hint (e.g., `count:`)
    Parameter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlayHint {
    /// Line where the hint should appear (0-indexed)
    pub line: u32,
    /// Column where the hint should appear (0-indexed)
    pub col: u32,
    pub label: String,
    pub kind: InlayHintKind,
    pub padding_left: bool,
    pub padding_right: bool,
}

/// Hints for `file`, optionally limited to those positioned inside `range`.
pub(crate) fn inlay_hints(
    model: &mut SemanticModel,
    file: FileId,
    range: Option<TextRange>,
) -> Result<Vec<InlayHint>, ResolveError> {
    let source = model.file(file).ok_or(ResolveError::UnknownFile(file))?;
    let tree = source.tree.clone();
    let line_index = source.line_index.clone();
    let Some(root) = tree.root() else {
        return Ok(Vec::new());
    };

    let mut hints = Vec::new();
    for node in tree.descendants(root) {
        match tree.rule(node) {
            Some(Rule::LocalVariableDeclaration) => {
                let Some(reference) = tree.find_child(node, Rule::TypeReference) else { continue };
                if !model.is_implicit_type(&tree, file, reference) {
                    continue;
                }
                for declarator in tree.find_children(node, Rule::VariableDeclarator) {
                    if let Some(name) = tree.find_identifier(declarator) {
                        hints.extend(type_hint(model, &tree, file, name));
                    }
                }
            }
            Some(Rule::ForeachStatement) => {
                let Some(reference) = tree.find_child(node, Rule::TypeReference) else { continue };
                if !model.is_implicit_type(&tree, file, reference) {
                    continue;
                }
                if let Some(name) = tree.find_identifier(node) {
                    hints.extend(type_hint(model, &tree, file, name));
                }
            }
            Some(Rule::ArgumentList) => hints.extend(parameter_hints(model, &tree, file, node)),
            _ => {}
        }
    }

    let hints = hints
        .into_iter()
        .filter(|(offset, _)| range.is_none_or(|r| r.contains_inclusive(*offset)))
        .map(|(offset, mut hint)| {
            let pos = line_index.line_col(offset);
            hint.line = pos.line;
            hint.col = pos.col;
            hint
        })
        .collect();
    Ok(hints)
}

fn type_hint(
    model: &mut SemanticModel,
    tree: &SyntaxTree,
    file: FileId,
    name: NodeId,
) -> Option<(TextSize, InlayHint)> {
    let decl = model.declaration_at(NodeRef::new(file, name))?;
    let local = model.declaration(decl)?.symbol()?;
    let ty = model.type_of(local);
    if model.symbol(ty).is_sentinel() {
        return None;
    }
    let label = format!(": {}", model.display_type(ty));
    let end = tree.token(name)?.range.end();
    Some((
        end,
        InlayHint {
            line: 0,
            col: 0,
            label,
            kind: InlayHintKind::Type,
            padding_left: false,
            padding_right: false,
        },
    ))
}

fn parameter_hints(
    model: &mut SemanticModel,
    tree: &SyntaxTree,
    file: FileId,
    list: NodeId,
) -> Vec<(TextSize, InlayHint)> {
    let mut hints = Vec::new();
    for argument in tree.find_children(list, Rule::Argument) {
        // Named arguments already spell the parameter.
        if tree.find_token(argument, ":").is_some() {
            continue;
        }
        let Some(parameter) = model.argument_parameter(tree, file, argument) else { continue };
        let symbol = model.symbol(parameter);
        if symbol.kind != SymbolKind::Parameter || symbol.modifiers.contains(Modifiers::PARAMS) {
            continue;
        }
        let name = symbol.name.clone();
        // `Add(count)` needs no `count:` hint.
        if tree.text(argument) == name.as_str() {
            continue;
        }
        let Some(start) = tree.range(argument).map(|r| r.start()) else { continue };
        hints.push((
            start,
            InlayHint {
                line: 0,
                col: 0,
                label: format!("{name}:"),
                kind: InlayHintKind::Parameter,
                padding_left: false,
                padding_right: true,
            },
        ));
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectConfig;

    #[test]
    fn test_var_type_hint() {
        let mut model = SemanticModel::new(ProjectConfig::default());
        let file = model.add_file("a.cs", "class C {\n    void M() { var n = 1; int m = 2; }\n}");
        let hints = inlay_hints(&mut model, file, None).unwrap();
        let types: Vec<_> = hints.iter().filter(|h| h.kind == InlayHintKind::Type).collect();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].label, ": int");
        assert_eq!((types[0].line, types[0].col), (1, 20));
    }

    #[test]
    fn test_parameter_hints_skip_named_and_matching() {
        let mut model = SemanticModel::new(ProjectConfig::default());
        let text = "class C {\n    void F(int count, int size) {}\n    void M(int size) { F(1, size); F(count: 2, size: 3); }\n}";
        let file = model.add_file("a.cs", text);
        let hints = inlay_hints(&mut model, file, None).unwrap();
        let labels: Vec<_> = hints
            .iter()
            .filter(|h| h.kind == InlayHintKind::Parameter)
            .map(|h| h.label.as_str())
            .collect();
        assert_eq!(labels, vec!["count:"]);
    }
}
