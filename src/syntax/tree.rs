//! Arena syntax tree.
//!
//! Nodes live in a flat `Vec` and are addressed by [`NodeId`]. Ids are
//! append-only: editing a tree never reuses an id, so side tables keyed by
//! `NodeId` (scopes, declarations, memoized references) can go stale but
//! never alias a different node. A node is *live* while its parent chain
//! still reaches the root.

use smol_str::SmolStr;

use crate::base::{FileId, TextRange, TextSize};

// ============================================================================
// IDENTIFIERS
// ============================================================================

#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node qualified by the file whose tree owns it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug)]
pub struct NodeRef {
    pub file: FileId,
    pub node: NodeId,
}

impl NodeRef {
    #[inline]
    pub const fn new(file: FileId, node: NodeId) -> Self {
        Self { file, node }
    }
}

// ============================================================================
// TOKENS AND RULES
// ============================================================================

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TokenKind {
    Identifier,
    Keyword,
    IntegerLiteral,
    RealLiteral,
    StringLiteral,
    CharLiteral,
    Punct,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: SmolStr,
    pub range: TextRange,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<SmolStr>, range: TextRange) -> Self {
        Self {
            kind,
            text: text.into(),
            range,
        }
    }

    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }
}

/// Grammar production of an interior node.
///
/// Child layouts, as produced by [`crate::syntax::parse`]:
///
/// ```text
/// UsingDirective      using QualifiedName ;
/// UsingAlias          using Ident = TypeReference ;
/// NamespaceDeclaration namespace QualifiedName NamespaceBody
/// ClassDeclaration    AttributeSection* Modifiers? class Ident TypeParameterList? BaseList? ClassBody
/// MethodDeclaration   AttributeSection* Modifiers? TypeReference Ident TypeParameterList? FormalParameterList (Block | ;)
/// FieldDeclaration    AttributeSection* Modifiers? TypeReference VariableDeclarator (, VariableDeclarator)* ;
/// TypeReference       (PredefinedType | TypeNameSegment (. TypeNameSegment)*) ?? RankSpecifier*
/// MemberAccess        expr . Ident TypeArgumentList?
/// InvocationExpression expr ArgumentList
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Rule {
    CompilationUnit,
    UsingDirective,
    UsingAlias,
    QualifiedName,
    NamespaceDeclaration,
    NamespaceBody,
    AttributeSection,
    Attribute,
    Modifiers,
    ClassDeclaration,
    StructDeclaration,
    InterfaceDeclaration,
    EnumDeclaration,
    EnumBody,
    EnumMember,
    DelegateDeclaration,
    TypeParameterList,
    TypeParameter,
    BaseList,
    ClassBody,
    FieldDeclaration,
    VariableDeclarator,
    PropertyDeclaration,
    IndexerDeclaration,
    EventDeclaration,
    AccessorList,
    Accessor,
    MethodDeclaration,
    ConstructorDeclaration,
    ConstructorInitializer,
    FormalParameterList,
    FormalParameter,
    TypeReference,
    PredefinedType,
    TypeNameSegment,
    TypeArgumentList,
    RankSpecifier,
    Block,
    LocalVariableDeclaration,
    ExpressionStatement,
    ReturnStatement,
    IfStatement,
    WhileStatement,
    ForeachStatement,
    EmptyStatement,
    Literal,
    SimpleName,
    MemberAccess,
    InvocationExpression,
    ArgumentList,
    Argument,
    ElementAccess,
    ObjectCreation,
    ArrayCreation,
    ArraySizes,
    ArrayInitializer,
    ObjectInitializer,
    MemberInitializer,
    CollectionInitializer,
    ElementInitializer,
    CastExpression,
    TypeofExpression,
    SizeofExpression,
    DefaultValueExpression,
    AsExpression,
    IsExpression,
    ThisAccess,
    BaseAccess,
    ParenthesizedExpression,
    UnaryExpression,
    PostfixExpression,
    BinaryExpression,
    AssignmentExpression,
    ConditionalExpression,
    LambdaExpression,
    LambdaParameter,
    QueryExpression,
    FromClause,
    LetClause,
    WhereClause,
    SelectClause,
    Error,
}

impl Rule {
    pub fn is_type_declaration(self) -> bool {
        matches!(
            self,
            Rule::ClassDeclaration
                | Rule::StructDeclaration
                | Rule::InterfaceDeclaration
                | Rule::EnumDeclaration
                | Rule::DelegateDeclaration
        )
    }

    pub fn is_member_declaration(self) -> bool {
        matches!(
            self,
            Rule::FieldDeclaration
                | Rule::PropertyDeclaration
                | Rule::IndexerDeclaration
                | Rule::EventDeclaration
                | Rule::MethodDeclaration
                | Rule::ConstructorDeclaration
        )
    }
}

// ============================================================================
// TREE
// ============================================================================

#[derive(Clone, Debug)]
enum Payload {
    Node { rule: Rule, children: Vec<NodeId> },
    Leaf(Token),
}

#[derive(Clone, Debug)]
struct Entry {
    payload: Payload,
    parent: Option<NodeId>,
    index: u32,
}

#[derive(Clone, Debug, Default)]
pub struct SyntaxTree {
    entries: Vec<Entry>,
    root: Option<NodeId>,
}

impl SyntaxTree {
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of ids ever allocated, live or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: NodeId) -> Option<&Entry> {
        self.entries.get(id.index())
    }

    pub fn rule(&self, id: NodeId) -> Option<Rule> {
        match &self.entry(id)?.payload {
            Payload::Node { rule, .. } => Some(*rule),
            Payload::Leaf(_) => None,
        }
    }

    pub fn token(&self, id: NodeId) -> Option<&Token> {
        match &self.entry(id)?.payload {
            Payload::Leaf(token) => Some(token),
            Payload::Node { .. } => None,
        }
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.token(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id)?.parent
    }

    pub fn child_index(&self, id: NodeId) -> usize {
        self.entry(id).map_or(0, |e| e.index as usize)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.entry(id).map(|e| &e.payload) {
            Some(Payload::Node { children, .. }) => children,
            _ => &[],
        }
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    /// Children that are not error-recovery nodes.
    pub fn num_valid_nodes(&self, id: NodeId) -> usize {
        self.children(id)
            .iter()
            .filter(|&&c| self.rule(c) != Some(Rule::Error))
            .count()
    }

    pub fn find_child(&self, id: NodeId, rule: Rule) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.rule(c) == Some(rule))
    }

    pub fn find_children(&self, id: NodeId, rule: Rule) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| self.rule(c) == Some(rule))
    }

    /// First direct leaf child with the given text.
    pub fn find_token(&self, id: NodeId, text: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.token(c).is_some_and(|t| t.is(text)))
    }

    /// First direct identifier leaf.
    pub fn find_identifier(&self, id: NodeId) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.token(c).is_some_and(|t| t.kind == TokenKind::Identifier))
    }

    pub fn first_leaf(&self, id: NodeId) -> Option<NodeId> {
        if self.is_leaf(id) {
            return Some(id);
        }
        self.children(id).iter().find_map(|&c| self.first_leaf(c))
    }

    pub fn last_leaf(&self, id: NodeId) -> Option<NodeId> {
        if self.is_leaf(id) {
            return Some(id);
        }
        self.children(id).iter().rev().find_map(|&c| self.last_leaf(c))
    }

    /// Parent chain, nearest first. Does not include `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        if self.root == Some(id) {
            return true;
        }
        match self.ancestors(id).last() {
            Some(top) => self.root == Some(top),
            None => false,
        }
    }

    pub fn range(&self, id: NodeId) -> Option<TextRange> {
        let start = self.token(self.first_leaf(id)?)?.range.start();
        let end = self.token(self.last_leaf(id)?)?.range.end();
        Some(TextRange::new(start, end.max(start)))
    }

    /// Leaf texts concatenated without separators, e.g. `List<int>`.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.token(id) {
            Some(token) => out.push_str(&token.text),
            None => {
                for &c in self.children(id) {
                    self.collect_text(c, out);
                }
            }
        }
    }

    /// Pre-order walk of the subtree rooted at `id`, `id` included.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// Live leaf covering `offset`. At a boundary between two tokens the
    /// one starting at `offset` wins.
    pub fn leaf_at(&self, offset: TextSize) -> Option<NodeId> {
        let mut node = self.root?;
        loop {
            if self.is_leaf(node) {
                return Some(node);
            }
            node = self.children(node).iter().copied().find(|&c| {
                self.range(c)
                    .is_some_and(|r| r.start() <= offset && offset < r.end())
            })?;
        }
    }

    // ------------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------------

    fn alloc(&mut self, payload: Payload, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.entries.len() as u32);
        let index = parent.map_or(0, |p| self.children(p).len() as u32);
        self.entries.push(Entry {
            payload,
            parent,
            index,
        });
        if let Some(p) = parent {
            self.children_mut(p).push(id);
        }
        id
    }

    fn children_mut(&mut self, id: NodeId) -> &mut Vec<NodeId> {
        match &mut self.entries[id.index()].payload {
            Payload::Node { children, .. } => children,
            Payload::Leaf(_) => unreachable!("leaves have no children"),
        }
    }

    fn reindex_children(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        for (i, c) in children.into_iter().enumerate() {
            self.entries[c.index()].index = i as u32;
        }
    }

    /// Unlinks `id` from its parent. The subtree stays allocated but is no
    /// longer live. Returns `false` if the node was already detached.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        self.children_mut(parent).retain(|&c| c != id);
        self.entries[id.index()].parent = None;
        self.reindex_children(parent);
        true
    }

    /// Deep-copies `source_node` of `source` into this tree as child `index`
    /// of `parent` and returns the id of the copy.
    pub fn graft(
        &mut self,
        parent: NodeId,
        index: usize,
        source: &SyntaxTree,
        source_node: NodeId,
    ) -> Option<NodeId> {
        if self.rule(parent).is_none() {
            return None;
        }
        let copy = self.copy_subtree(source, source_node, None)?;
        let children = self.children_mut(parent);
        let at = index.min(children.len());
        children.insert(at, copy);
        self.entries[copy.index()].parent = Some(parent);
        self.reindex_children(parent);
        Some(copy)
    }

    fn copy_subtree(
        &mut self,
        source: &SyntaxTree,
        node: NodeId,
        parent: Option<NodeId>,
    ) -> Option<NodeId> {
        match &source.entry(node)?.payload {
            Payload::Leaf(token) => Some(self.alloc(Payload::Leaf(token.clone()), parent)),
            Payload::Node { rule, children } => {
                let id = self.alloc(
                    Payload::Node {
                        rule: *rule,
                        children: Vec::new(),
                    },
                    parent,
                );
                for &c in children {
                    self.copy_subtree(source, c, Some(id))?;
                }
                Some(id)
            }
        }
    }

    /// Swaps `old` for a copy of `source_node`, returning the copy.
    pub fn replace(
        &mut self,
        old: NodeId,
        source: &SyntaxTree,
        source_node: NodeId,
    ) -> Option<NodeId> {
        let parent = self.parent(old)?;
        let index = self.child_index(old);
        self.detach(old);
        self.graft(parent, index, source, source_node)
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Position to wrap already-emitted children into a new node later.
#[derive(Copy, Clone, Debug)]
pub struct Checkpoint {
    parent: Option<NodeId>,
    child_count: usize,
}

/// Incremental, stack-based construction of a [`SyntaxTree`].
#[derive(Debug, Default)]
pub struct TreeBuilder {
    tree: SyntaxTree,
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_node(&mut self, rule: Rule) -> NodeId {
        let parent = self.stack.last().copied();
        let id = self.tree.alloc(
            Payload::Node {
                rule,
                children: Vec::new(),
            },
            parent,
        );
        if parent.is_none() && self.tree.root.is_none() {
            self.tree.root = Some(id);
        }
        self.stack.push(id);
        id
    }

    pub fn token(&mut self, token: Token) -> NodeId {
        let parent = self.stack.last().copied();
        self.tree.alloc(Payload::Leaf(token), parent)
    }

    pub fn finish_node(&mut self) {
        self.stack.pop();
    }

    pub fn checkpoint(&self) -> Checkpoint {
        let parent = self.stack.last().copied();
        Checkpoint {
            parent,
            child_count: parent.map_or(0, |p| self.tree.children(p).len()),
        }
    }

    /// Opens `rule` and moves every child emitted since `checkpoint` into it.
    pub fn start_node_at(&mut self, checkpoint: Checkpoint, rule: Rule) -> NodeId {
        let Some(parent) = checkpoint.parent else {
            return self.start_node(rule);
        };
        let moved: Vec<NodeId> = self.tree.children_mut(parent).split_off(checkpoint.child_count);
        let id = self.tree.alloc(
            Payload::Node {
                rule,
                children: moved.clone(),
            },
            Some(parent),
        );
        for (i, c) in moved.into_iter().enumerate() {
            let entry = &mut self.tree.entries[c.index()];
            entry.parent = Some(id);
            entry.index = i as u32;
        }
        self.stack.push(id);
        id
    }

    pub fn finish(mut self) -> SyntaxTree {
        self.stack.clear();
        self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(text: &str, start: u32) -> Token {
        let len = text.len() as u32;
        Token::new(
            TokenKind::Identifier,
            text,
            TextRange::new(start.into(), (start + len).into()),
        )
    }

    fn sample() -> (SyntaxTree, NodeId, NodeId) {
        let mut b = TreeBuilder::new();
        b.start_node(Rule::CompilationUnit);
        let first = b.start_node(Rule::SimpleName);
        b.token(ident("a", 0));
        b.finish_node();
        let second = b.start_node(Rule::SimpleName);
        b.token(ident("b", 2));
        b.finish_node();
        b.finish_node();
        (b.finish(), first, second)
    }

    #[test]
    fn test_builder_links_parents_and_indices() {
        let (tree, first, second) = sample();
        let root = tree.root().unwrap();
        assert_eq!(tree.rule(root), Some(Rule::CompilationUnit));
        assert_eq!(tree.children(root), &[first, second]);
        assert_eq!(tree.child_index(second), 1);
        assert_eq!(tree.parent(first), Some(root));
        assert_eq!(tree.num_valid_nodes(root), 2);
        assert_eq!(tree.text(root), "ab");
    }

    #[test]
    fn test_checkpoint_wraps_previous_children() {
        let mut b = TreeBuilder::new();
        b.start_node(Rule::CompilationUnit);
        let cp = b.checkpoint();
        b.start_node(Rule::SimpleName);
        b.token(ident("x", 0));
        b.finish_node();
        let wrapper = b.start_node_at(cp, Rule::MemberAccess);
        b.token(ident("y", 2));
        b.finish_node();
        b.finish_node();
        let tree = b.finish();
        let root = tree.root().unwrap();
        assert_eq!(tree.children(root), &[wrapper]);
        assert_eq!(tree.children(wrapper).len(), 2);
        assert_eq!(tree.rule(tree.child(wrapper, 0).unwrap()), Some(Rule::SimpleName));
    }

    #[test]
    fn test_detach_makes_subtree_dead() {
        let (mut tree, first, second) = sample();
        let leaf = tree.first_leaf(first).unwrap();
        assert!(tree.is_live(leaf));
        assert!(tree.detach(first));
        assert!(!tree.is_live(first));
        assert!(!tree.is_live(leaf));
        assert!(tree.is_live(second));
        assert_eq!(tree.child_index(second), 0);
        assert!(!tree.detach(first));
    }

    #[test]
    fn test_graft_copies_with_fresh_ids() {
        let (mut tree, first, _) = sample();
        let (other, other_first, _) = sample();
        let root = tree.root().unwrap();
        let before = tree.len();
        let copy = tree.graft(root, 0, &other, other_first).unwrap();
        assert!(copy.index() >= before);
        assert_eq!(tree.children(root)[0], copy);
        assert_eq!(tree.child_index(first), 1);
        assert!(tree.is_live(copy));
    }

    #[test]
    fn test_leaf_at_offset() {
        let (tree, _, second) = sample();
        let leaf = tree.leaf_at(TextSize::from(2)).unwrap();
        assert_eq!(tree.parent(leaf), Some(second));
        assert!(tree.leaf_at(TextSize::from(1)).is_none());
    }
}
