//! Completion items at a cursor position.

use rustc_hash::FxHashSet;

use crate::base::{FileId, TextSize};
use crate::hir::{CompletionRequest, ResolveError, SemanticModel, SymbolKind, split_arity};
use crate::syntax::{NodeId, NodeRef, Rule, SyntaxTree, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionKind {
    Namespace,
    Class,
    Struct,
    Interface,
    Enum,
    EnumMember,
    Delegate,
    TypeParameter,
    Field,
    Constant,
    Property,
    Event,
    Method,
    Constructor,
    Variable,
}

impl CompletionKind {
    pub fn from_symbol_kind(kind: SymbolKind) -> Self {
        match kind {
            SymbolKind::Namespace => Self::Namespace,
            SymbolKind::Class => Self::Class,
            SymbolKind::Struct => Self::Struct,
            SymbolKind::Interface => Self::Interface,
            SymbolKind::Enum => Self::Enum,
            SymbolKind::EnumMember => Self::EnumMember,
            SymbolKind::Delegate => Self::Delegate,
            SymbolKind::TypeParameter => Self::TypeParameter,
            SymbolKind::Field => Self::Field,
            SymbolKind::ConstantField => Self::Constant,
            SymbolKind::Property | SymbolKind::Indexer => Self::Property,
            SymbolKind::Event => Self::Event,
            SymbolKind::Method | SymbolKind::MethodGroup => Self::Method,
            SymbolKind::Constructor => Self::Constructor,
            SymbolKind::Parameter | SymbolKind::Local | SymbolKind::Instance | SymbolKind::Error => {
                Self::Variable
            }
        }
    }

    /// LSP `CompletionItemKind` number.
    pub fn to_lsp(self) -> u32 {
        match self {
            Self::Method => 2,
            Self::Constructor => 4,
            Self::Field => 5,
            Self::Variable => 6,
            Self::Class => 7,
            Self::Interface => 8,
            Self::Namespace => 9,
            Self::Property => 10,
            Self::Enum => 13,
            Self::Constant => 21,
            Self::EnumMember => 20,
            Self::Struct => 22,
            Self::Event => 23,
            Self::Delegate => 3,
            Self::TypeParameter => 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
    /// Tooltip text of the symbol.
    pub detail: String,
}

/// Last live leaf ending at or before `offset`.
fn leaf_before(tree: &SyntaxTree, offset: TextSize) -> Option<NodeId> {
    let root = tree.root()?;
    tree.descendants(root)
        .into_iter()
        .filter_map(|n| tree.token(n).map(|t| (n, t.range)))
        .take_while(|(_, range)| range.start() < offset)
        .filter(|(_, range)| range.end() <= offset)
        .last()
        .map(|(n, _)| n)
}

fn previous_sibling(tree: &SyntaxTree, node: NodeId) -> Option<NodeId> {
    let parent = tree.parent(node)?;
    let index = tree.child_index(node);
    index.checked_sub(1).and_then(|i| tree.child(parent, i))
}

fn in_using_directive(tree: &SyntaxTree, node: NodeId) -> Option<NodeId> {
    tree.ancestors(node)
        .find(|&a| tree.rule(a) == Some(Rule::UsingDirective))
}

fn is_qualifier_rule(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::SimpleName
            | Rule::QualifiedName
            | Rule::TypeReference
            | Rule::TypeNameSegment
            | Rule::PredefinedType
            | Rule::MemberAccess
            | Rule::InvocationExpression
            | Rule::ElementAccess
            | Rule::ThisAccess
            | Rule::BaseAccess
            | Rule::ParenthesizedExpression
            | Rule::ObjectCreation
            | Rule::Literal
    )
}

/// Largest expression or name ending at the leaf just before `dot`. A
/// dangling `.` is not part of the expression it follows, so this walks the
/// text rather than the dot's parent.
fn qualifier_before(tree: &SyntaxTree, dot: NodeId) -> Option<NodeId> {
    let start = tree.token(dot)?.range.start();
    let leaf = leaf_before(tree, start)?;
    let mut anchor = leaf;
    for ancestor in tree.ancestors(leaf) {
        let fits = tree.rule(ancestor).is_some_and(is_qualifier_rule)
            && tree.last_leaf(ancestor) == Some(leaf);
        if !fits {
            break;
        }
        anchor = ancestor;
    }
    Some(anchor)
}

/// Picks the request and anchor node for a cursor: after `x.` (or while
/// typing the name after it) members of `x`, inside a `using` directive
/// namespaces, anywhere else the visible names.
fn classify(tree: &SyntaxTree, offset: TextSize) -> Option<(CompletionRequest, NodeId)> {
    let leaf = leaf_before(tree, offset)?;
    let token = tree.token(leaf)?;
    let dot = if token.is(".") {
        Some(leaf)
    } else if token.kind == TokenKind::Identifier && token.range.end() == offset {
        previous_sibling(tree, leaf).filter(|&p| tree.token(p).is_some_and(|t| t.is(".")))
    } else {
        None
    };

    if let Some(dot) = dot {
        let qualifier = qualifier_before(tree, dot)?;
        if in_using_directive(tree, qualifier).is_some() {
            return Some((CompletionRequest::Namespace, qualifier));
        }
        return Some((CompletionRequest::Member, qualifier));
    }
    if let Some(directive) = in_using_directive(tree, leaf) {
        return Some((CompletionRequest::Namespace, directive));
    }
    Some((CompletionRequest::Scope, leaf))
}

pub(crate) fn completions_at(
    model: &mut SemanticModel,
    file: FileId,
    offset: TextSize,
) -> Result<Vec<CompletionItem>, ResolveError> {
    let source = model.file(file).ok_or(ResolveError::UnknownFile(file))?;
    let origin = source.assembly;
    let tree = source.tree.clone();
    let Some((request, anchor)) = classify(&tree, offset) else {
        return Ok(Vec::new());
    };

    let mut found = FxHashSet::default();
    model.completions(request, NodeRef::new(file, anchor), &mut found, origin)?;

    let mut items: Vec<CompletionItem> = found
        .into_iter()
        .map(|sym| {
            let symbol = model.symbol(sym);
            let kind = CompletionKind::from_symbol_kind(symbol.kind);
            let label = split_arity(&symbol.name).0.to_string();
            CompletionItem {
                label,
                kind,
                detail: model.tooltip_text(sym),
            }
        })
        .collect();
    items.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.detail.cmp(&b.detail)));
    items.dedup();
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn offset_of(text: &str, marker: &str) -> TextSize {
        TextSize::from((text.find(marker).unwrap() + marker.len()) as u32)
    }

    #[test]
    fn test_classify_member_after_dot() {
        let text = "class C { void M() { this. } }";
        let tree = parse(text);
        let (request, anchor) = classify(&tree, offset_of(text, "this.")).unwrap();
        assert_eq!(request, CompletionRequest::Member);
        assert_eq!(tree.text(anchor), "this");
    }

    #[test]
    fn test_classify_using_directive() {
        let text = "using System.";
        let tree = parse(text);
        let (request, anchor) = classify(&tree, offset_of(text, "System.")).unwrap();
        assert_eq!(request, CompletionRequest::Namespace);
        assert_eq!(tree.text(anchor), "System");
    }

    #[test]
    fn test_classify_scope() {
        let text = "class C { void M() { int x = 1; } }";
        let tree = parse(text);
        let (request, _) = classify(&tree, offset_of(text, "= ")).unwrap();
        assert_eq!(request, CompletionRequest::Scope);
    }

    #[test]
    fn test_completion_kind_lsp_numbers() {
        assert_eq!(CompletionKind::from_symbol_kind(SymbolKind::Local), CompletionKind::Variable);
        assert_eq!(CompletionKind::Method.to_lsp(), 2);
        assert_eq!(CompletionKind::Class.to_lsp(), 7);
    }
}
