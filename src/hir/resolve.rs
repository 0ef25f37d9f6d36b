//! Node resolution.
//!
//! [`SemanticModel::resolve_node`] maps any node of a live tree to the
//! symbol it denotes: identifier leaves to the declared or referenced
//! symbol, type references to types, invocations to the chosen overload and
//! other expressions to an instance of their type. Results are memoized per
//! node and stamped with the model version; a node reached again while it is
//! still being resolved yields `Unknown`.
//!
//! [`SemanticModel::type_of`] is the companion query for symbols. Declared
//! types come from the declaration's type reference; `var` locals, foreach
//! and query variables and untyped lambda parameters are inferred.

use std::rc::Rc;

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::{debug, error, trace};

use crate::base::{FileId, TextSize};
use crate::syntax::lexer::decode_identifier;
use crate::syntax::{NodeId, NodeRef, Rule, SyntaxTree, TokenKind};

use super::builtins::binary_numeric_promotion;
use super::declarations::{DeclKind, Declaration};
use super::error::ResolveError;
use super::ids::{AssemblyId, ScopeId, SymbolId};
use super::model::SemanticModel;
use super::overload::{CallArgument, OverloadResolution};
use super::scope::{Lookup, ScopeKind};
use super::symbols::{MemoProbe, Modifiers, ResolveState, Sentinel, Shape, SymbolKind};

// ============================================================================
// TREE HELPERS
// ============================================================================

/// Children that are nodes rather than tokens.
fn node_children(tree: &SyntaxTree, node: NodeId) -> Vec<NodeId> {
    tree.children(node)
        .iter()
        .copied()
        .filter(|&c| !tree.is_leaf(c))
        .collect()
}

fn last_node_child(tree: &SyntaxTree, node: NodeId) -> Option<NodeId> {
    tree.children(node).iter().rev().copied().find(|&c| !tree.is_leaf(c))
}

/// First node child following the token `text`.
fn node_after(tree: &SyntaxTree, node: NodeId, text: &str) -> Option<NodeId> {
    let children = tree.children(node);
    let token = children
        .iter()
        .position(|&c| tree.token(c).is_some_and(|t| t.is(text)))?;
    children[token + 1..].iter().copied().find(|&c| !tree.is_leaf(c))
}

fn identifier_text(tree: &SyntaxTree, node: NodeId) -> Option<SmolStr> {
    let leaf = tree.find_identifier(node)?;
    tree.token(leaf).map(|t| SmolStr::new(decode_identifier(&t.text)))
}

/// `name` of a `name: value` argument.
fn argument_name(tree: &SyntaxTree, argument: NodeId) -> Option<SmolStr> {
    let children = tree.children(argument);
    let (&first, &second) = (children.first()?, children.get(1)?);
    let is_colon = tree.token(second).is_some_and(|t| t.is(":"));
    let name = tree.token(first).filter(|t| t.kind == TokenKind::Identifier)?;
    is_colon.then(|| SmolStr::new(decode_identifier(&name.text)))
}

fn rank_of(tree: &SyntaxTree, specifier: NodeId) -> u32 {
    1 + tree
        .children(specifier)
        .iter()
        .filter(|&&c| tree.token(c).is_some_and(|t| t.is(",")))
        .count() as u32
}

fn type_argument_nodes(tree: &SyntaxTree, node: NodeId) -> Vec<NodeId> {
    tree.find_child(node, Rule::TypeArgumentList)
        .map(|list| tree.find_children(list, Rule::TypeReference).collect())
        .unwrap_or_default()
}

fn has_modifier(tree: &SyntaxTree, node: NodeId, keywords: &[&str]) -> bool {
    tree.find_child(node, Rule::Modifiers).is_some_and(|mods| {
        tree.children(mods)
            .iter()
            .any(|&leaf| tree.token(leaf).is_some_and(|t| keywords.iter().any(|k| t.is(k))))
    })
}

impl SemanticModel {
    // ========================================================================
    // ENTRY POINTS
    // ========================================================================

    /// Symbol denoted by `node`. Never fails: nodes that do not resolve give
    /// a sentinel.
    pub fn resolve_node(&mut self, node: NodeRef) -> SymbolId {
        let version = self.version;
        let memo = self.references.get(&node).copied().unwrap_or_default();
        match memo.probe(version) {
            MemoProbe::Hit(symbol) => {
                self.stats.memo_hits += 1;
                return symbol;
            }
            MemoProbe::Cycle => {
                self.stats.cycle_guards += 1;
                debug!(?node, "cyclic node resolution");
                return self.sentinel(Sentinel::Unknown);
            }
            MemoProbe::Miss => {}
        }
        if memo.state == ResolveState::Done {
            self.stats.stale_recomputes += 1;
        }
        self.stats.resolutions += 1;
        self.references.entry(node).or_default().begin();
        let result = self.compute_node(node);
        self.references.entry(node).or_default().finish(version, result);
        trace!(?node, ?result, "resolved node");
        result
    }

    /// [`SemanticModel::resolve_node`] with an explicit context for
    /// identifier leaves: looked up as a member of `member_of`, or from
    /// `scope` (the enclosing scope by default), with `type_arg_count` type
    /// arguments. Other nodes resolve as usual.
    pub fn resolve_node_in(
        &mut self,
        node: NodeRef,
        scope: Option<ScopeId>,
        member_of: Option<SymbolId>,
        type_arg_count: Option<usize>,
    ) -> Result<SymbolId, ResolveError> {
        let tree = self.checked_tree(node)?;
        let name = tree
            .token(node.node)
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| SmolStr::new(decode_identifier(&t.text)));
        let Some(name) = name else {
            return Ok(self.resolve_node(node));
        };
        if scope.is_none() && member_of.is_none() && type_arg_count.is_none() {
            return Ok(self.resolve_node(node));
        }
        let arity = type_arg_count.unwrap_or(0);
        if let Some(owner) = member_of {
            let found = self.find_member(owner, &name, arity, false);
            return Ok(found.unwrap_or_else(|| self.sentinel(Sentinel::Unknown)));
        }
        let scope = match scope {
            Some(scope) if self.scope(scope).is_none() => {
                error!(?scope, "resolution requested in a scope that does not exist");
                return Err(ResolveError::UnknownScope(scope));
            }
            Some(scope) => scope,
            None => self.enclosing_scope(node).ok_or_else(|| {
                error!(?node, "no scope encloses the node");
                ResolveError::MissingScope(node)
            })?,
        };
        let lookup = Lookup::new(&name, self.requesting_assembly(node.file))
            .with_arity(arity)
            .at(self.start_of(node));
        let found = self.lookup(scope, &lookup);
        Ok(found.unwrap_or_else(|| self.sentinel(Sentinel::Unknown)))
    }

    /// Resolves the token covering `offset`.
    pub fn resolve_at(&mut self, file: FileId, offset: TextSize) -> Result<Option<SymbolId>, ResolveError> {
        let tree = self.tree(file).ok_or_else(|| {
            error!(file = file.0, "resolution requested for an unknown file");
            ResolveError::UnknownFile(file)
        })?;
        Ok(tree
            .leaf_at(offset)
            .map(|leaf| self.resolve_node(NodeRef::new(file, leaf))))
    }

    /// Type of the token covering `offset`: the type of the symbol it
    /// denotes.
    pub fn type_at(&mut self, file: FileId, offset: TextSize) -> Result<Option<SymbolId>, ResolveError> {
        Ok(self.resolve_at(file, offset)?.map(|sym| self.type_of(sym)))
    }

    /// Type of an expression or type node.
    pub fn type_of_node(&mut self, node: NodeRef) -> SymbolId {
        let sym = self.resolve_node(node);
        self.type_of(sym)
    }

    /// Type of a symbol: the declared or inferred type of a value, the
    /// return type of a method, the owner of a constructor, the symbol
    /// itself for types. `UnknownType` when there is none, including when
    /// the type depends on itself.
    pub fn type_of(&mut self, sym: SymbolId) -> SymbolId {
        let unknown = self.sentinel(Sentinel::UnknownType);
        let symbol = self.symbol(sym);
        if symbol.is_sentinel() {
            return unknown;
        }
        if let Shape::Instance { ty } = symbol.shape {
            return ty;
        }
        if symbol.kind.is_type() {
            return sym;
        }
        match symbol.kind {
            SymbolKind::Namespace | SymbolKind::MethodGroup | SymbolKind::Error => return unknown,
            SymbolKind::Constructor => return symbol.parent.unwrap_or(unknown),
            SymbolKind::EnumMember if !symbol.origin.is_foreign() => return symbol.parent.unwrap_or(unknown),
            _ => {}
        }

        let version = self.version;
        match symbol.type_memo.probe(version) {
            MemoProbe::Hit(ty) => return ty,
            MemoProbe::Cycle => {
                self.stats.cycle_guards += 1;
                self.recursive.insert(sym);
                debug!(symbol = ?sym, "type depends on itself");
                return unknown;
            }
            MemoProbe::Miss => {}
        }
        self.symbol_mut(sym).type_memo.begin();
        let ty = self.compute_type(sym).unwrap_or(unknown);
        self.symbol_mut(sym).type_memo.finish(version, ty);
        ty
    }

    /// Whether computing the type of `sym` ran into itself.
    pub fn is_recursive(&self, sym: SymbolId) -> bool {
        self.recursive.contains(&sym)
    }

    fn checked_tree(&self, node: NodeRef) -> Result<Rc<SyntaxTree>, ResolveError> {
        let Some(tree) = self.tree(node.file) else {
            error!(file = node.file.0, "resolution requested for an unknown file");
            return Err(ResolveError::UnknownFile(node.file));
        };
        if node.node.index() >= tree.len() {
            error!(?node, "resolution requested for a node outside its tree");
            return Err(ResolveError::UnknownNode(node));
        }
        Ok(tree)
    }

    fn requesting_assembly(&self, file: FileId) -> AssemblyId {
        self.files.get(file).map_or(self.main_assembly, |f| f.assembly)
    }

    fn start_of(&self, node: NodeRef) -> TextSize {
        self.files
            .get(node.file)
            .and_then(|f| f.tree.range(node.node))
            .map_or(TextSize::from(u32::MAX), |r| r.start())
    }

    fn unknown(&self) -> SymbolId {
        self.sentinel(Sentinel::Unknown)
    }

    fn instance_of_builtin(&mut self, keyword: &str) -> SymbolId {
        let ty = self.builtin_type(keyword);
        self.instance_of(ty)
    }

    fn instance_of_node(&mut self, node: NodeRef) -> SymbolId {
        let ty = self.type_of_node(node);
        self.instance_of(ty)
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    fn compute_node(&mut self, node: NodeRef) -> SymbolId {
        let unknown = self.unknown();
        let Some(tree) = self.tree(node.file) else {
            return unknown;
        };
        if node.node.index() >= tree.len() || !tree.is_live(node.node) {
            return unknown;
        }
        if tree.is_leaf(node.node) {
            return self.resolve_leaf(&tree, node);
        }
        let Some(rule) = tree.rule(node.node) else {
            return unknown;
        };
        let at = |n: NodeId| NodeRef::new(node.file, n);
        let result = match rule {
            Rule::TypeReference => Some(self.resolve_type_reference(&tree, node)),
            Rule::TypeNameSegment => Some(self.resolve_type_segment(&tree, node)),
            Rule::PredefinedType => tree
                .first_leaf(node.node)
                .and_then(|leaf| tree.token(leaf))
                .map(|t| self.builtin_type(&t.text)),
            Rule::QualifiedName => self.resolve_qualified_name(&tree, node, None),
            Rule::Literal => tree.first_leaf(node.node).and_then(|leaf| tree.token(leaf)).map(|token| {
                let ty = self.literal_type(token);
                self.instance_of(ty)
            }),
            Rule::SimpleName => self.resolve_simple_name(&tree, node),
            Rule::MemberAccess => self.resolve_member_access(&tree, node),
            Rule::InvocationExpression => Some(self.resolve_invocation(&tree, node)),
            Rule::ElementAccess => self.resolve_element_access(&tree, node),
            Rule::ArgumentList => self.resolve_constructor_call(&tree, node),
            Rule::Argument | Rule::ParenthesizedExpression => {
                last_node_child(&tree, node.node).map(|inner| self.resolve_node(at(inner)))
            }
            Rule::ObjectCreation => tree.find_child(node.node, Rule::TypeReference).map(|reference| {
                let ty = self.resolve_node(at(reference));
                self.instance_of(ty)
            }),
            Rule::ArrayCreation => self.resolve_array_creation(&tree, node),
            Rule::MemberInitializer => self.resolve_member_initializer(&tree, node),
            Rule::CastExpression | Rule::DefaultValueExpression | Rule::AsExpression => tree
                .find_child(node.node, Rule::TypeReference)
                .map(|reference| self.instance_of_node(at(reference))),
            Rule::TypeofExpression => self.type_by_full_name("System.Type").map(|ty| self.instance_of(ty)),
            Rule::SizeofExpression => Some(self.instance_of_builtin("int")),
            Rule::IsExpression => Some(self.instance_of_builtin("bool")),
            Rule::ThisAccess => Some(self.resolve_this(node, false)),
            Rule::BaseAccess => Some(self.resolve_this(node, true)),
            Rule::UnaryExpression => self.resolve_unary(&tree, node),
            Rule::PostfixExpression | Rule::AssignmentExpression => tree
                .children(node.node)
                .first()
                .map(|&operand| self.instance_of_node(at(operand))),
            Rule::BinaryExpression => self.resolve_binary(&tree, node),
            Rule::ConditionalExpression => {
                let branches = node_children(&tree, node.node);
                let types: Vec<SymbolId> = branches
                    .iter()
                    .skip(1)
                    .map(|&b| self.type_of_node(at(b)))
                    .collect();
                self.common_type(&types).map(|ty| self.instance_of(ty))
            }
            Rule::QueryExpression => self.resolve_query(&tree, node),
            Rule::Attribute => tree
                .find_child(node.node, Rule::TypeReference)
                .map(|reference| self.resolve_node(at(reference))),
            _ => None,
        };
        result.unwrap_or(unknown)
    }

    fn resolve_leaf(&mut self, tree: &SyntaxTree, leaf: NodeRef) -> SymbolId {
        let unknown = self.unknown();
        if let Some(decl) = self.declaration_at(leaf) {
            let symbol = self.declaration(decl).and_then(|d| d.symbol);
            if let Some(symbol) = symbol.filter(|_| self.is_declaration_valid(decl)) {
                return symbol;
            }
        }
        let (Some(parent), Some(token)) = (tree.parent(leaf.node), tree.token(leaf.node)) else {
            return unknown;
        };
        let parent_ref = NodeRef::new(leaf.file, parent);
        let is_identifier = token.kind == TokenKind::Identifier;
        match tree.rule(parent) {
            Some(Rule::SimpleName | Rule::MemberAccess) if is_identifier => {
                let call = tree
                    .parent(parent)
                    .filter(|&p| tree.rule(p) == Some(Rule::InvocationExpression))
                    .filter(|&p| tree.children(p).first() == Some(&parent));
                if let Some(call) = call {
                    let chosen = self.resolve_node(NodeRef::new(leaf.file, call));
                    let symbol = self.symbol(chosen);
                    let is_call_outcome = matches!(
                        symbol.sentinel,
                        Some(Sentinel::UnresolvedMethod | Sentinel::AmbiguousMethod)
                    );
                    if is_call_outcome || (symbol.kind.is_method() && !symbol.is_sentinel()) {
                        return chosen;
                    }
                }
                self.resolve_node(parent_ref)
            }
            Some(Rule::TypeNameSegment | Rule::MemberInitializer) if is_identifier => self.resolve_node(parent_ref),
            Some(Rule::QualifiedName) if is_identifier => self
                .resolve_qualified_name(tree, parent_ref, Some(leaf.node))
                .unwrap_or(unknown),
            Some(Rule::Argument) if is_identifier => {
                let name = SmolStr::new(decode_identifier(&token.text));
                self.resolve_argument_name(tree, parent_ref, &name).unwrap_or(unknown)
            }
            Some(Rule::UsingAlias) if is_identifier => match tree.find_child(parent, Rule::TypeReference) {
                Some(target) => self.resolve_node(NodeRef::new(leaf.file, target)),
                None => unknown,
            },
            Some(Rule::ConstructorInitializer) if token.is("base") || token.is("this") => {
                match tree.find_child(parent, Rule::ArgumentList) {
                    Some(list) => self.resolve_node(NodeRef::new(leaf.file, list)),
                    None => unknown,
                }
            }
            Some(Rule::PredefinedType | Rule::Literal | Rule::ThisAccess | Rule::BaseAccess) => {
                self.resolve_node(parent_ref)
            }
            _ => unknown,
        }
    }

    // ========================================================================
    // NAMES AND TYPES
    // ========================================================================

    fn resolve_qualified_name(&mut self, tree: &SyntaxTree, name: NodeRef, until: Option<NodeId>) -> Option<SymbolId> {
        let scope = self.enclosing_scope(name)?;
        let requesting = self.requesting_assembly(name.file);
        let position = self.start_of(name);
        let segments: Vec<NodeId> = tree
            .children(name.node)
            .iter()
            .copied()
            .filter(|&c| tree.token(c).is_some_and(|t| t.kind == TokenKind::Identifier))
            .collect();
        let mut current: Option<SymbolId> = None;
        for segment in segments {
            let text = tree.token(segment).map(|t| SmolStr::new(decode_identifier(&t.text)))?;
            let lookup = Lookup::new(&text, requesting).at(position).types_only();
            let found = match current {
                None => self.lookup(scope, &lookup.without_imports()),
                Some(ns) if self.symbol(ns).kind == SymbolKind::Namespace => self.lookup_namespace_member(ns, &lookup),
                Some(ty) => self.find_member(ty, &text, 0, true),
            }?;
            current = Some(found);
            if until == Some(segment) {
                break;
            }
        }
        current
    }

    fn resolve_type_reference(&mut self, tree: &SyntaxTree, reference: NodeRef) -> SymbolId {
        let unknown_type = self.sentinel(Sentinel::UnknownType);
        let n = reference.node;
        let head = match tree.find_child(n, Rule::PredefinedType) {
            Some(predefined) => Some(predefined),
            None => tree.find_children(n, Rule::TypeNameSegment).last(),
        };
        let Some(head) = head else {
            return unknown_type;
        };
        let mut ty = self.resolve_node(NodeRef::new(reference.file, head));
        if self.is_sentinel(ty) || !self.symbol(ty).kind.is_type() {
            return unknown_type;
        }
        if tree.find_token(n, "?").is_some() && !self.is_reference_type(ty) {
            ty = self.nullable_of(ty);
        }
        let ranks: Vec<u32> = tree
            .find_children(n, Rule::RankSpecifier)
            .map(|r| rank_of(tree, r))
            .collect();
        for rank in ranks.into_iter().rev() {
            ty = self.array_of(ty, rank);
        }
        ty
    }

    fn resolve_type_segment(&mut self, tree: &SyntaxTree, segment: NodeRef) -> SymbolId {
        let unknown_type = self.sentinel(Sentinel::UnknownType);
        let (Some(name), Some(reference)) = (identifier_text(tree, segment.node), tree.parent(segment.node)) else {
            return unknown_type;
        };
        let type_args = type_argument_nodes(tree, segment.node);
        let arity = type_args.len();
        let requesting = self.requesting_assembly(segment.file);
        let segments: Vec<NodeId> = tree.find_children(reference, Rule::TypeNameSegment).collect();
        let index = segments.iter().position(|&s| s == segment.node).unwrap_or(0);
        let is_last = index + 1 == segments.len();
        let in_attribute = tree.parent(reference).and_then(|p| tree.rule(p)) == Some(Rule::Attribute);

        let found = if index == 0 {
            let found = self.lookup_at(segment, &name, arity, true);
            if found.is_none() && name == "var" && arity == 0 && segments.len() == 1 {
                return self
                    .implicitly_typed_variable(tree, segment.file, reference)
                    .unwrap_or(unknown_type);
            }
            found
        } else {
            let owner = self.resolve_node(NodeRef::new(segment.file, segments[index - 1]));
            if self.is_sentinel(owner) {
                return unknown_type;
            }
            let mut found = self.member_type(owner, &name, arity, requesting);
            if found.is_none() && in_attribute && is_last && !name.ends_with("Attribute") {
                found = self.member_type(owner, &format!("{name}Attribute"), arity, requesting);
            }
            found
        };
        match found {
            Some(found) => self.apply_type_arguments(segment.file, found, &type_args),
            None => unknown_type,
        }
    }

    /// Type or namespace `name` inside a namespace or type.
    fn member_type(&mut self, owner: SymbolId, name: &str, arity: usize, requesting: AssemblyId) -> Option<SymbolId> {
        if self.symbol(owner).kind == SymbolKind::Namespace {
            let lookup = Lookup::new(name, requesting).with_arity(arity).types_only();
            self.lookup_namespace_member(owner, &lookup)
        } else {
            self.find_member(owner, name, arity, true)
        }
    }

    fn apply_type_arguments(&mut self, file: FileId, found: SymbolId, type_args: &[NodeId]) -> SymbolId {
        if type_args.is_empty() {
            return found;
        }
        let kind = self.symbol(found).kind;
        if !kind.is_type() || kind == SymbolKind::TypeParameter {
            return found;
        }
        let args: Vec<SymbolId> = type_args
            .iter()
            .map(|&a| self.resolve_node(NodeRef::new(file, a)))
            .collect();
        self.construct_type(found, &args)
    }

    /// The inferred type behind a `var` type reference.
    fn implicitly_typed_variable(&mut self, tree: &SyntaxTree, file: FileId, reference: NodeId) -> Option<SymbolId> {
        let owner = tree.parent(reference)?;
        let name_leaf = match tree.rule(owner)? {
            Rule::LocalVariableDeclaration => {
                let declarator = tree.find_child(owner, Rule::VariableDeclarator)?;
                tree.find_identifier(declarator)?
            }
            Rule::ForeachStatement | Rule::FromClause | Rule::LambdaParameter => tree.find_identifier(owner)?,
            _ => return None,
        };
        let decl = self.declaration_at(NodeRef::new(file, name_leaf))?;
        let symbol = self.declaration(decl)?.symbol?;
        Some(self.type_of(symbol))
    }

    fn resolve_simple_name(&mut self, tree: &SyntaxTree, node: NodeRef) -> Option<SymbolId> {
        let name = identifier_text(tree, node.node)?;
        if let Some(member) = self.attribute_property(tree, node, &name) {
            return Some(member);
        }
        let type_args = type_argument_nodes(tree, node.node);
        let found = self.lookup_at(node, &name, type_args.len(), false)?;
        Some(self.apply_type_arguments(node.file, found, &type_args))
    }

    /// `Name` in `[Attr(Name = value)]` names a member of the attribute type.
    fn attribute_property(&mut self, tree: &SyntaxTree, node: NodeRef, name: &str) -> Option<SymbolId> {
        let assignment = tree.parent(node.node)?;
        if tree.rule(assignment) != Some(Rule::AssignmentExpression) || tree.children(assignment).first() != Some(&node.node) {
            return None;
        }
        let argument = tree.parent(assignment).filter(|&a| tree.rule(a) == Some(Rule::Argument))?;
        let list = tree.parent(argument)?;
        let attribute = tree.parent(list).filter(|&a| tree.rule(a) == Some(Rule::Attribute))?;
        let ty = self.resolve_node(NodeRef::new(node.file, attribute));
        if self.is_sentinel(ty) {
            return None;
        }
        self.find_member(ty, name, 0, false)
    }

    fn resolve_member_access(&mut self, tree: &SyntaxTree, node: NodeRef) -> Option<SymbolId> {
        let receiver = *tree.children(node.node).first()?;
        let name = identifier_text(tree, node.node)?;
        let type_args = type_argument_nodes(tree, node.node);
        let arity = type_args.len();
        let target = self.resolve_node(NodeRef::new(node.file, receiver));
        if self.is_sentinel(target) {
            return None;
        }
        let kind = self.symbol(target).kind;
        let found = if kind == SymbolKind::Namespace {
            let lookup = Lookup::new(&name, self.requesting_assembly(node.file)).with_arity(arity);
            self.lookup_namespace_member(target, &lookup)
        } else if kind.is_type() && kind != SymbolKind::TypeParameter {
            self.find_member(target, &name, arity, false)
        } else {
            let ty = self.type_of(target);
            if self.is_sentinel(ty) {
                return None;
            }
            self.find_member(ty, &name, arity, false)
        }?;
        Some(self.apply_type_arguments(node.file, found, &type_args))
    }

    // ========================================================================
    // CALLS
    // ========================================================================

    fn call_arguments(&mut self, tree: &SyntaxTree, file: FileId, list: NodeId) -> Vec<CallArgument> {
        let mut args = Vec::new();
        for argument in tree.find_children(list, Rule::Argument) {
            let ty = match last_node_child(tree, argument) {
                // Lambdas take their type from the parameter they bind to.
                Some(expr) if tree.rule(expr) == Some(Rule::LambdaExpression) => self.unknown(),
                Some(expr) => self.type_of_node(NodeRef::new(file, expr)),
                None => self.sentinel(Sentinel::UnknownType),
            };
            args.push(CallArgument {
                name: argument_name(tree, argument),
                ty,
            });
        }
        args
    }

    fn resolve_invocation(&mut self, tree: &SyntaxTree, call: NodeRef) -> SymbolId {
        self.ambiguities.remove(&call);
        let unknown = self.unknown();
        let (Some(&callee), Some(list)) = (
            tree.children(call.node).first(),
            tree.find_child(call.node, Rule::ArgumentList),
        ) else {
            return unknown;
        };
        let args = self.call_arguments(tree, call.file, list);
        let type_args: Vec<SymbolId> = type_argument_nodes(tree, callee)
            .into_iter()
            .map(|a| self.resolve_node(NodeRef::new(call.file, a)))
            .collect();
        let target = self.resolve_node(NodeRef::new(call.file, callee));
        let target_kind = self.symbol(target).kind;

        let outcome = if self.is_sentinel(target) {
            match self.resolve_extension_call(tree, call.file, callee, &args, &type_args) {
                Some(outcome) => outcome,
                None => return unknown,
            }
        } else if matches!(target_kind, SymbolKind::MethodGroup | SymbolKind::Method) {
            match self.resolve_overload(target, &args, &type_args) {
                OverloadResolution::Unresolved => self
                    .resolve_extension_call(tree, call.file, callee, &args, &type_args)
                    .unwrap_or(OverloadResolution::Unresolved),
                outcome => outcome,
            }
        } else {
            // Invoking a value of delegate type.
            let ty = self.type_of(target);
            return self.delegate_signature(ty).unwrap_or(unknown);
        };
        self.call_outcome(call, outcome)
    }

    fn call_outcome(&mut self, call: NodeRef, outcome: OverloadResolution) -> SymbolId {
        match outcome {
            OverloadResolution::Resolved(method) => method,
            OverloadResolution::Ambiguous(candidates) => {
                debug!(?call, candidates = candidates.len(), "ambiguous call");
                self.ambiguities.insert(call, candidates);
                self.sentinel(Sentinel::AmbiguousMethod)
            }
            OverloadResolution::Unresolved => {
                debug!(?call, "no applicable overload");
                self.sentinel(Sentinel::UnresolvedMethod)
            }
        }
    }

    /// `receiver.Name(args)` as a call of an extension method visible at
    /// the call site, with the receiver as first argument.
    fn resolve_extension_call(
        &mut self,
        tree: &SyntaxTree,
        file: FileId,
        callee: NodeId,
        args: &[CallArgument],
        type_args: &[SymbolId],
    ) -> Option<OverloadResolution> {
        if tree.rule(callee) != Some(Rule::MemberAccess) {
            return None;
        }
        let receiver = *tree.children(callee).first()?;
        let name = identifier_text(tree, callee)?;
        let receiver = self.resolve_node(NodeRef::new(file, receiver));
        let kind = self.symbol(receiver).kind;
        if self.is_sentinel(receiver) || kind.is_type() || matches!(kind, SymbolKind::Namespace | SymbolKind::MethodGroup) {
            return None;
        }
        let receiver_type = self.type_of(receiver);
        if self.is_sentinel(receiver_type) {
            return None;
        }
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(CallArgument::positional(receiver_type));
        full_args.extend(args.iter().cloned());
        for level in self.extension_levels(NodeRef::new(file, callee), &name) {
            match self.resolve_among(&level, &full_args, type_args) {
                OverloadResolution::Unresolved => continue,
                outcome => {
                    trace!(name = %name, "resolved extension method");
                    return Some(outcome);
                }
            }
        }
        None
    }

    /// Extension methods named `name`, grouped by how close their namespace
    /// is to `at`: each namespace scope contributes its namespace (and the
    /// enclosing ones) and the namespaces it imports before `at`.
    fn extension_levels(&mut self, at: NodeRef, name: &str) -> Vec<Vec<SymbolId>> {
        let Some(scope) = self.enclosing_scope(at) else {
            return Vec::new();
        };
        let position = self.start_of(at);
        let mut seen = FxHashSet::default();
        let mut levels = Vec::new();
        for scope_id in self.scope_chain(scope) {
            let Some(scope) = self.scope(scope_id) else {
                continue;
            };
            if scope.kind != ScopeKind::Namespace {
                continue;
            }
            let owner = scope.owner;
            let imports: Vec<NodeRef> = scope
                .imports()
                .iter()
                .filter(|i| i.position <= position)
                .map(|i| i.target)
                .collect();

            let mut namespaces = Vec::new();
            let mut current = owner;
            while let Some(ns) = current {
                if seen.insert(ns) {
                    namespaces.push(ns);
                }
                current = self.symbol(ns).parent;
            }
            for import in imports {
                let target = self.resolve_node(import);
                if self.symbol(target).kind == SymbolKind::Namespace && seen.insert(target) {
                    namespaces.push(target);
                }
            }

            let mut level = Vec::new();
            for ns in namespaces {
                for ty in self.namespace_types(ns) {
                    let symbol = self.symbol(ty);
                    if symbol.kind != SymbolKind::Class || !symbol.is_static() || !symbol.type_parameters.is_empty() {
                        continue;
                    }
                    let Some(member) = self.find_own_member(ty, name, 0) else {
                        continue;
                    };
                    for method in self.methods_of(member) {
                        let first = self.symbol(method).parameters.first().copied();
                        if first.is_some_and(|p| self.symbol(p).modifiers.contains(Modifiers::THIS)) {
                            level.push(method);
                        }
                    }
                }
            }
            if !level.is_empty() {
                levels.push(level);
            }
        }
        levels
    }

    /// Whether `method`, chosen for the invocation `call`, was called as an
    /// extension on a receiver value.
    fn is_extension_call(&mut self, tree: &SyntaxTree, file: FileId, call: NodeId, method: SymbolId) -> bool {
        let root = self.definition_root(method);
        let first = self.symbol(root).parameters.first().copied();
        if !first.is_some_and(|p| self.symbol(p).modifiers.contains(Modifiers::THIS)) {
            return false;
        }
        let Some(&callee) = tree.children(call).first() else {
            return false;
        };
        if tree.rule(callee) != Some(Rule::MemberAccess) {
            return false;
        }
        let Some(&receiver) = tree.children(callee).first() else {
            return false;
        };
        let receiver = self.resolve_node(NodeRef::new(file, receiver));
        let kind = self.symbol(receiver).kind;
        !(kind.is_type() || kind == SymbolKind::Namespace)
    }

    /// Method or constructor that the argument list of a call binds to.
    fn call_target(&mut self, tree: &SyntaxTree, file: FileId, list: NodeId) -> Option<SymbolId> {
        let call = tree.parent(list)?;
        let method = match tree.rule(call)? {
            Rule::InvocationExpression => self.resolve_node(NodeRef::new(file, call)),
            Rule::ObjectCreation | Rule::Attribute | Rule::ConstructorInitializer => {
                self.resolve_node(NodeRef::new(file, list))
            }
            _ => return None,
        };
        let symbol = self.symbol(method);
        (!symbol.is_sentinel() && symbol.kind.is_method()).then_some(method)
    }

    fn resolve_argument_name(&mut self, tree: &SyntaxTree, argument: NodeRef, name: &str) -> Option<SymbolId> {
        if argument_name(tree, argument.node).as_deref() != Some(name) {
            return None;
        }
        let list = tree.parent(argument.node)?;
        let method = self.call_target(tree, argument.file, list)?;
        self.symbol(method)
            .parameters
            .iter()
            .copied()
            .find(|&p| self.symbol(p).name == name)
    }

    /// Constructor chosen for `new T(...)`, an attribute or a
    /// `: base(...)`/`: this(...)` initializer. A type without declared
    /// constructors answers a call without arguments with itself.
    fn resolve_constructor_call(&mut self, tree: &SyntaxTree, list: NodeRef) -> Option<SymbolId> {
        self.ambiguities.remove(&list);
        let parent = tree.parent(list.node)?;
        let ty = match tree.rule(parent)? {
            Rule::ObjectCreation | Rule::Attribute => {
                let reference = tree.find_child(parent, Rule::TypeReference)?;
                self.resolve_node(NodeRef::new(list.file, reference))
            }
            Rule::ConstructorInitializer => {
                let scope = self.enclosing_scope(NodeRef::new(list.file, parent))?;
                let own = self.scope_type(scope)?;
                if tree.find_token(parent, "base").is_some() {
                    self.base_type(own)?
                } else {
                    own
                }
            }
            _ => return None,
        };
        if self.is_sentinel(ty) {
            return None;
        }
        let args = self.call_arguments(tree, list.file, list.node);
        let Some(constructors) = self.find_own_member(ty, ".ctor", 0) else {
            return Some(if args.is_empty() {
                ty
            } else {
                self.sentinel(Sentinel::UnresolvedMethod)
            });
        };
        let outcome = self.resolve_overload(constructors, &args, &[]);
        Some(self.call_outcome(list, outcome))
    }

    fn resolve_element_access(&mut self, tree: &SyntaxTree, node: NodeRef) -> Option<SymbolId> {
        let receiver = *tree.children(node.node).first()?;
        let ty = self.type_of_node(NodeRef::new(node.file, receiver));
        if self.is_sentinel(ty) {
            return None;
        }
        if let Shape::Array { element, .. } = self.symbol(ty).shape {
            return Some(self.instance_of(element));
        }
        self.find_member(ty, "Item", 0, false)
    }

    // ========================================================================
    // CREATION AND INITIALIZERS
    // ========================================================================

    fn resolve_array_creation(&mut self, tree: &SyntaxTree, node: NodeRef) -> Option<SymbolId> {
        let n = node.node;
        let ty = match tree.find_child(n, Rule::TypeReference) {
            Some(reference) => {
                let element = self.resolve_node(NodeRef::new(node.file, reference));
                match tree.find_child(n, Rule::ArraySizes) {
                    Some(sizes) => {
                        let trailing: Vec<u32> = tree
                            .find_children(n, Rule::RankSpecifier)
                            .map(|r| rank_of(tree, r))
                            .collect();
                        let mut ty = element;
                        for rank in trailing.into_iter().rev() {
                            ty = self.array_of(ty, rank);
                        }
                        let rank = node_children(tree, sizes).len().max(1) as u32;
                        if self.is_sentinel(element) {
                            return None;
                        }
                        self.array_of(ty, rank)
                    }
                    None => element,
                }
            }
            None => {
                let rank = tree.find_child(n, Rule::RankSpecifier).map_or(1, |r| rank_of(tree, r));
                let initializer = tree.find_child(n, Rule::ArrayInitializer)?;
                let mut types = Vec::new();
                self.initializer_types(tree, node.file, initializer, &mut types);
                let element = self.common_type(&types)?;
                self.array_of(element, rank)
            }
        };
        if self.is_sentinel(ty) {
            return None;
        }
        Some(self.instance_of(ty))
    }

    /// Element types of an array initializer, nested initializers flattened.
    fn initializer_types(&mut self, tree: &SyntaxTree, file: FileId, initializer: NodeId, out: &mut Vec<SymbolId>) {
        for child in node_children(tree, initializer) {
            if tree.rule(child) == Some(Rule::ArrayInitializer) {
                self.initializer_types(tree, file, child, out);
            } else {
                out.push(self.type_of_node(NodeRef::new(file, child)));
            }
        }
    }

    /// The type among `types` that every other one converts to. `null` and
    /// unknown types take no part unless nothing else is left.
    pub fn common_type(&mut self, types: &[SymbolId]) -> Option<SymbolId> {
        let mut candidates: Vec<SymbolId> = Vec::new();
        for &ty in types {
            let ty = self.strip_instance(ty);
            if ty != self.null_type && !self.is_sentinel(ty) && !candidates.contains(&ty) {
                candidates.push(ty);
            }
        }
        if candidates.is_empty() {
            return types.first().map(|&t| self.strip_instance(t));
        }
        'outer: for &candidate in &candidates {
            for &other in &candidates {
                if !self.is_implicitly_convertible(other, candidate) {
                    continue 'outer;
                }
            }
            return Some(candidate);
        }
        None
    }

    fn resolve_member_initializer(&mut self, tree: &SyntaxTree, node: NodeRef) -> Option<SymbolId> {
        let name = identifier_text(tree, node.node)?;
        let initializer = tree.parent(node.node)?;
        let owner = tree.parent(initializer)?;
        let ty = match tree.rule(owner)? {
            Rule::ObjectCreation => {
                let reference = tree.find_child(owner, Rule::TypeReference)?;
                self.resolve_node(NodeRef::new(node.file, reference))
            }
            Rule::MemberInitializer => {
                let member = self.resolve_node(NodeRef::new(node.file, owner));
                self.type_of(member)
            }
            _ => return None,
        };
        if self.is_sentinel(ty) {
            return None;
        }
        self.find_member(ty, &name, 0, false)
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    /// `this` and `base` inside the nearest member body. Inside a static
    /// member they resolve to the corresponding sentinel.
    fn resolve_this(&mut self, node: NodeRef, is_base: bool) -> SymbolId {
        let unknown = self.unknown();
        let Some(scope) = self.enclosing_scope(node) else {
            return unknown;
        };
        if self.in_static_member(node, scope) {
            return self.sentinel(if is_base {
                Sentinel::BaseInStaticMember
            } else {
                Sentinel::ThisInStaticMember
            });
        }
        let Some(ty) = self.scope_type(scope) else {
            return unknown;
        };
        let target = if is_base {
            match self.base_type(ty) {
                Some(base) => base,
                None => return unknown,
            }
        } else {
            ty
        };
        self.instance_of(target)
    }

    fn in_static_member(&self, node: NodeRef, scope: ScopeId) -> bool {
        for scope_id in self.scope_chain(scope) {
            let Some(scope) = self.scope(scope_id) else {
                continue;
            };
            match scope.kind {
                ScopeKind::MethodBody | ScopeKind::AccessorBody { .. } => {
                    return scope.owner.is_some_and(|owner| self.symbol(owner).is_static());
                }
                ScopeKind::TypeBody => break,
                _ => {}
            }
        }
        // Field initializers have no body scope.
        let Some(tree) = self.tree(node.file) else {
            return false;
        };
        tree.ancestors(node.node)
            .find(|&a| tree.rule(a).is_some_and(Rule::is_member_declaration))
            .is_some_and(|member| has_modifier(&tree, member, &["static", "const"]))
    }

    fn resolve_unary(&mut self, tree: &SyntaxTree, node: NodeRef) -> Option<SymbolId> {
        let operator = tree.token(*tree.children(node.node).first()?)?.text.clone();
        let operand = last_node_child(tree, node.node)?;
        if operator == "!" {
            return Some(self.instance_of_builtin("bool"));
        }
        let ty = self.type_of_node(NodeRef::new(node.file, operand));
        let promoted = match operator.as_str() {
            "-" | "+" | "~" => self
                .builtin_keyword(ty)
                .and_then(|k| binary_numeric_promotion(k, k))
                .map(|k| self.builtin_type(k)),
            _ => None,
        };
        Some(self.instance_of(promoted.unwrap_or(ty)))
    }

    fn resolve_binary(&mut self, tree: &SyntaxTree, node: NodeRef) -> Option<SymbolId> {
        let children = tree.children(node.node);
        let left = *children.first()?;
        let right = *children.last()?;
        let operator = children
            .iter()
            .find_map(|&c| tree.token(c).map(|t| t.text.clone()))?;
        if matches!(operator.as_str(), "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||") {
            return Some(self.instance_of_builtin("bool"));
        }
        let left_type = self.type_of_node(NodeRef::new(node.file, left));
        let right_type = self.type_of_node(NodeRef::new(node.file, right));
        if operator == "??" {
            let result = match self.symbol(left_type).shape {
                Shape::Nullable { underlying } => underlying,
                _ if self.is_sentinel(left_type) || left_type == self.null_type => right_type,
                _ => left_type,
            };
            return Some(self.instance_of(result));
        }
        let left_keyword = self.builtin_keyword(left_type);
        let right_keyword = self.builtin_keyword(right_type);
        if operator == "+" && (left_keyword == Some("string") || right_keyword == Some("string")) {
            return Some(self.instance_of_builtin("string"));
        }
        let result = match (left_keyword, right_keyword) {
            (Some("bool"), Some("bool")) if matches!(operator.as_str(), "&" | "|" | "^") => self.builtin_type("bool"),
            (Some(l), Some(_)) if matches!(operator.as_str(), "<<" | ">>") => {
                binary_numeric_promotion(l, l).map_or(left_type, |k| self.builtin_type(k))
            }
            (Some(l), Some(r)) => binary_numeric_promotion(l, r).map_or(left_type, |k| self.builtin_type(k)),
            _ => left_type,
        };
        Some(self.instance_of(result))
    }

    fn resolve_query(&mut self, tree: &SyntaxTree, node: NodeRef) -> Option<SymbolId> {
        let select = tree.find_child(node.node, Rule::SelectClause)?;
        let projection = last_node_child(tree, select)?;
        let element = self.type_of_node(NodeRef::new(node.file, projection));
        let enumerable = self.generic_type_by_name("System.Collections.Generic", "IEnumerable", 1)?;
        let ty = self.construct_type(enumerable, &[element]);
        Some(self.instance_of(ty))
    }

    // ========================================================================
    // TYPES OF SYMBOLS
    // ========================================================================

    fn compute_type(&mut self, sym: SymbolId) -> Option<SymbolId> {
        match self.symbol(sym).shape.clone() {
            Shape::Member { generic, .. } | Shape::Constructed { generic, .. } => {
                let declared = self.type_of(generic);
                let context = self.substitution_context(sym);
                return Some(self.substitute(declared, &context));
            }
            Shape::ImplicitValue { owner } => return Some(self.type_of(owner)),
            Shape::DelegateInvoke { delegate } => {
                let decl = self.valid_declarations(delegate).first().copied()?;
                let decl = self.declaration(decl)?.clone();
                return self.declared_type(&decl);
            }
            _ => {}
        }
        if self.symbol(sym).origin.is_foreign() {
            return self.foreign_symbol_type(sym);
        }
        let decl = self.valid_declarations(sym).first().copied()?;
        let decl = self.declaration(decl)?.clone();
        self.declared_type(&decl)
    }

    fn declared_type(&mut self, decl: &Declaration) -> Option<SymbolId> {
        let file = decl.node.file;
        let tree = self.tree(file)?;
        let node = decl.node.node;
        let at = |n: NodeId| NodeRef::new(file, n);
        match decl.kind {
            DeclKind::Field | DeclKind::Constant => {
                let field = tree.parent(node)?;
                let reference = tree.find_child(field, Rule::TypeReference)?;
                Some(self.resolve_node(at(reference)))
            }
            DeclKind::Local => self.local_type(&tree, file, node),
            DeclKind::Parameter if tree.rule(node) == Some(Rule::LambdaParameter) => {
                match tree.find_child(node, Rule::TypeReference) {
                    Some(reference) => Some(self.resolve_node(at(reference))),
                    None => self.lambda_parameter_type(&tree, file, node),
                }
            }
            DeclKind::Parameter
            | DeclKind::Property
            | DeclKind::Indexer
            | DeclKind::Event
            | DeclKind::Method
            | DeclKind::Delegate => {
                let reference = tree.find_child(node, Rule::TypeReference)?;
                Some(self.resolve_node(at(reference)))
            }
            _ => None,
        }
    }

    /// `var` unless a type named `var` is in scope.
    pub(crate) fn is_implicit_type(&mut self, tree: &SyntaxTree, file: FileId, reference: NodeId) -> bool {
        tree.text(reference) == "var" && self.lookup_at(NodeRef::new(file, reference), "var", 0, true).is_none()
    }

    fn local_type(&mut self, tree: &SyntaxTree, file: FileId, node: NodeId) -> Option<SymbolId> {
        let at = |n: NodeId| NodeRef::new(file, n);
        match tree.rule(node)? {
            Rule::VariableDeclarator => {
                let declaration = tree.parent(node)?;
                let reference = tree.find_child(declaration, Rule::TypeReference)?;
                if !self.is_implicit_type(tree, file, reference) {
                    return Some(self.resolve_node(at(reference)));
                }
                let initializer = node_after(tree, node, "=")?;
                let ty = self.type_of_node(at(initializer));
                (ty != self.null_type).then_some(ty)
            }
            Rule::ForeachStatement => {
                let reference = tree.find_child(node, Rule::TypeReference)?;
                if !self.is_implicit_type(tree, file, reference) {
                    return Some(self.resolve_node(at(reference)));
                }
                let collection = node_after(tree, node, "in")?;
                let ty = self.type_of_node(at(collection));
                self.element_type(ty)
            }
            Rule::FromClause => {
                if let Some(reference) = tree.find_child(node, Rule::TypeReference) {
                    return Some(self.resolve_node(at(reference)));
                }
                let source = node_after(tree, node, "in")?;
                let ty = self.type_of_node(at(source));
                self.element_type(ty)
            }
            Rule::LetClause => {
                let value = node_after(tree, node, "=")?;
                Some(self.type_of_node(at(value)))
            }
            _ => None,
        }
    }

    fn lambda_parameter_type(&mut self, tree: &SyntaxTree, file: FileId, parameter: NodeId) -> Option<SymbolId> {
        let lambda = tree.parent(parameter)?;
        let index = tree
            .find_children(lambda, Rule::LambdaParameter)
            .position(|p| p == parameter)?;
        let delegate = self.lambda_target(tree, file, lambda)?;
        let invoke = self.delegate_signature(delegate)?;
        let parameter = self.symbol(invoke).parameters.get(index).copied()?;
        Some(self.type_of(parameter))
    }

    /// Parameter an argument binds to: by name when named, by position
    /// otherwise, with trailing arguments landing on a `params` parameter.
    /// The receiver of an extension call occupies the first parameter.
    pub(crate) fn argument_parameter(&mut self, tree: &SyntaxTree, file: FileId, argument: NodeId) -> Option<SymbolId> {
        let list = tree.parent(argument)?;
        let call = tree.parent(list)?;
        let method = self.call_target(tree, file, list)?;
        let mut index = tree.find_children(list, Rule::Argument).position(|a| a == argument)?;
        if tree.rule(call) == Some(Rule::InvocationExpression) && self.is_extension_call(tree, file, call, method) {
            index += 1;
        }
        let parameters = self.symbol(method).parameters.clone();
        match argument_name(tree, argument) {
            Some(name) => parameters.iter().copied().find(|&p| self.symbol(p).name == name),
            None => parameters.get(index).or(parameters.last()).copied(),
        }
    }

    /// Delegate type a lambda converts to, from where it appears.
    fn lambda_target(&mut self, tree: &SyntaxTree, file: FileId, lambda: NodeId) -> Option<SymbolId> {
        let parent = tree.parent(lambda)?;
        let at = |n: NodeId| NodeRef::new(file, n);
        match tree.rule(parent)? {
            Rule::ParenthesizedExpression => self.lambda_target(tree, file, parent),
            Rule::CastExpression => {
                let reference = tree.find_child(parent, Rule::TypeReference)?;
                Some(self.resolve_node(at(reference)))
            }
            Rule::VariableDeclarator => {
                let decl = self.declaration_at(at(tree.find_identifier(parent)?))?;
                let symbol = self.declaration(decl)?.symbol?;
                Some(self.type_of(symbol))
            }
            Rule::AssignmentExpression => {
                let target = *tree.children(parent).first()?;
                (target != lambda).then(|| self.type_of_node(at(target)))
            }
            Rule::Argument => {
                let parameter = self.argument_parameter(tree, file, parent)?;
                let ty = self.type_of(parameter);
                let is_params = self.symbol(parameter).modifiers.contains(Modifiers::PARAMS);
                if is_params && self.delegate_signature(ty).is_none() {
                    return self.element_type(ty);
                }
                Some(ty)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::symbols::Origin;

    /// The `nth` leaf spelled `text`.
    fn leaf(model: &SemanticModel, file: FileId, text: &str, nth: usize) -> NodeRef {
        let tree = model.tree(file).unwrap();
        let node = tree
            .descendants(tree.root().unwrap())
            .into_iter()
            .filter(|&n| tree.token(n).is_some_and(|t| t.is(text)))
            .nth(nth)
            .unwrap_or_else(|| panic!("no leaf `{text}` #{nth}"));
        NodeRef::new(file, node)
    }

    fn node(model: &SemanticModel, file: FileId, rule: Rule, nth: usize) -> NodeRef {
        let tree = model.tree(file).unwrap();
        let node = tree
            .descendants(tree.root().unwrap())
            .into_iter()
            .filter(|&n| tree.rule(n) == Some(rule))
            .nth(nth)
            .unwrap_or_else(|| panic!("no {rule:?} #{nth}"));
        NodeRef::new(file, node)
    }

    fn type_name(model: &mut SemanticModel, ty: SymbolId) -> String {
        model.display_type(ty)
    }

    #[test]
    fn test_literal_suffixes() {
        let mut model = SemanticModel::default();
        let file = model.add_file(
            "a.cs",
            "class C { void M() { var a = 1; var b = 1u; var c = 1L; var d = 1UL; var e = 1.5; var f = 1.5f; var g = 2m; var h = \"s\"; } }",
        );
        let expected = ["int", "uint", "long", "ulong", "double", "float", "decimal", "string"];
        for (name, keyword) in ["a", "b", "c", "d", "e", "f", "g", "h"].into_iter().zip(expected) {
            let local = model.resolve_node(leaf(&model, file, name, 0));
            let ty = model.type_of(local);
            assert_eq!(ty, model.builtin_type(keyword), "type of {name}");
        }
    }

    #[test]
    fn test_this_in_static_member() {
        let mut model = SemanticModel::default();
        let file = model.add_file(
            "a.cs",
            "class C { int f; static void S() { this.f = 1; } void I() { this.f = 2; base.ToString(); } }",
        );
        let in_static = model.resolve_node(node(&model, file, Rule::ThisAccess, 0));
        assert_eq!(in_static, model.sentinel(Sentinel::ThisInStaticMember));
        let in_instance = model.resolve_node(node(&model, file, Rule::ThisAccess, 1));
        assert_eq!(model.symbol(in_instance).kind, SymbolKind::Instance);
        let base = model.resolve_node(node(&model, file, Rule::BaseAccess, 0));
        let object = model.object_type();
        assert_eq!(model.type_of(base), object);
    }

    #[test]
    fn test_self_referencing_local_is_unknown() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "class C { void M() { var x = x; } }");
        let x = model.resolve_node(leaf(&model, file, "x", 0));
        assert_eq!(model.type_of(x), model.sentinel(Sentinel::UnknownType));
        assert!(model.is_recursive(x));
        assert!(model.stats().cycle_guards > 0);
    }

    #[test]
    fn test_stale_memo_is_recomputed() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "class C { int f; void M() { f = 1; } }");
        let reference = leaf(&model, file, "f", 1);
        let first = model.resolve_node(reference);
        assert_eq!(model.resolve_node(reference), first);
        assert_eq!(model.stats().memo_hits, 1);

        model.edit_tree(file, |_| ()).unwrap();
        assert_eq!(model.resolve_node(reference), first);
        assert!(model.stats().stale_recomputes >= 1);
    }

    #[test]
    fn test_member_access_through_constructed_receiver() {
        let mut model = SemanticModel::default();
        let file = model.add_file(
            "a.cs",
            "using System.Collections.Generic; class C { void M() { var xs = new List<string>(); var n = xs[0].Length; } }",
        );
        let n = model.resolve_node(leaf(&model, file, "n", 0));
        let ty = model.type_of(n);
        assert_eq!(type_name(&mut model, ty), "int");
        let length = model.resolve_node(leaf(&model, file, "Length", 0));
        assert!(matches!(model.symbol(length).origin, Origin::ForeignMember { .. }));
    }

    #[test]
    fn test_named_argument_resolves_to_parameter() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "class C { void F(int a, int b) {} void M() { F(b: 1, a: 2); } }");
        let b = model.resolve_node(leaf(&model, file, "b", 1));
        assert_eq!(model.symbol(b).kind, SymbolKind::Parameter);
        assert_eq!(model.symbol(b).name, "b");
    }

    #[test]
    fn test_extension_method_on_list() {
        let mut model = SemanticModel::default();
        let file = model.add_file(
            "a.cs",
            "using System.Collections.Generic; using System.Linq; \
             class C { void M(List<string> xs) { var head = xs.First(); var lengths = xs.Select(s => s.Length); } }",
        );
        let first = model.resolve_node(leaf(&model, file, "First", 0));
        assert_eq!(model.symbol(first).kind, SymbolKind::Method);
        let head = model.resolve_node(leaf(&model, file, "head", 0));
        let head_type = model.type_of(head);
        assert_eq!(head_type, model.builtin_type("string"));
        let s = model.resolve_node(leaf(&model, file, "s", 1));
        let ty = model.type_of(s);
        assert_eq!(ty, model.builtin_type("string"));
    }

    #[test]
    fn test_constructor_initializer_and_object_initializer() {
        let mut model = SemanticModel::default();
        let file = model.add_file(
            "a.cs",
            "class B { public B(int x) {} } class D : B { public int P { get; set; } public D() : base(1) {} \
             static D Make() { return new D { P = 2 }; } }",
        );
        let ctor = model.resolve_node(leaf(&model, file, "base", 0));
        assert_eq!(model.symbol(ctor).kind, SymbolKind::Constructor);
        let p = model.resolve_node(leaf(&model, file, "P", 1));
        assert_eq!(model.symbol(p).kind, SymbolKind::Property);
    }

    #[test]
    fn test_resolve_node_in_contract_errors() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "class C {}");
        let c = leaf(&model, file, "C", 0);
        let bogus = ScopeId::from_raw(999);
        assert_eq!(
            model.resolve_node_in(c, Some(bogus), None, None),
            Err(ResolveError::UnknownScope(bogus))
        );
        let missing = FileId::new(42);
        assert_eq!(
            model.resolve_node_in(NodeRef::new(missing, c.node), None, None, None),
            Err(ResolveError::UnknownFile(missing))
        );
    }
}
