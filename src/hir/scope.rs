//! Lexical scopes and name lookup through the scope chain.
//!
//! Scopes are attached to tree nodes by the collector. A scope's parent is
//! the scope of its nearest ancestor node that has one, so the chain always
//! mirrors the current shape of the tree. Each scope kind answers a lookup
//! from its own tables and defers to its parent on a miss.

use smol_str::SmolStr;

use crate::base::TextSize;
use crate::syntax::NodeRef;

use super::ids::{AssemblyId, ScopeId, SymbolId};
use super::model::SemanticModel;
use super::symbols::{Shape, Symbol, SymbolKind};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ScopeKind {
    /// Compilation unit or namespace body; owner is the namespace.
    Namespace,
    /// Members of a type, inherited members, then type parameters.
    TypeBody,
    /// Parameters, then type parameters of a method, constructor or indexer.
    MethodBody,
    /// `value` in setters and event accessors.
    AccessorBody { is_getter: bool },
    /// Locals of a block, lambda, foreach or query.
    LocalBlock,
    /// Retries unresolved names with an `Attribute` suffix.
    Attribute,
    /// Base type list: the type's own parameters, not its members.
    BaseList,
}

/// A `using Namespace;` directive, visible from its own end onwards.
#[derive(Copy, Clone, Debug)]
pub struct Import {
    pub target: NodeRef,
    pub position: TextSize,
}

#[derive(Clone, Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub node: NodeRef,
    pub owner: Option<SymbolId>,
    pub assembly: AssemblyId,
    pub(crate) locals: Vec<SymbolId>,
    /// `using Alias = Type;` directives: alias name and target type reference.
    pub(crate) aliases: Vec<(SmolStr, NodeRef)>,
    pub(crate) imports: Vec<Import>,
}

impl Scope {
    pub fn locals(&self) -> &[SymbolId] {
        &self.locals
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }
}

/// A name to look up, with the context it is looked up from.
#[derive(Clone, Debug)]
pub struct Lookup<'a> {
    pub name: &'a str,
    pub arity: usize,
    /// Offset of the reference; `using` directives after it are ignored.
    pub position: TextSize,
    pub type_only: bool,
    pub requesting: AssemblyId,
    /// Set while resolving the target of a `using` directive.
    pub(crate) skip_imports: bool,
}

impl<'a> Lookup<'a> {
    pub fn new(name: &'a str, requesting: AssemblyId) -> Self {
        Self {
            name,
            arity: 0,
            position: TextSize::from(u32::MAX),
            type_only: false,
            requesting,
            skip_imports: false,
        }
    }

    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    pub fn at(mut self, position: TextSize) -> Self {
        self.position = position;
        self
    }

    pub fn types_only(mut self) -> Self {
        self.type_only = true;
        self
    }

    pub(crate) fn without_imports(mut self) -> Self {
        self.skip_imports = true;
        self
    }

    fn accepts(&self, symbol: &Symbol) -> bool {
        !self.type_only || symbol.kind.is_type() || symbol.kind == SymbolKind::Namespace
    }
}

impl SemanticModel {
    pub(crate) fn add_scope(
        &mut self,
        kind: ScopeKind,
        node: NodeRef,
        owner: Option<SymbolId>,
        assembly: AssemblyId,
    ) -> ScopeId {
        let id = ScopeId::from_raw(self.scopes.len() as u32);
        self.scopes.push(Scope {
            kind,
            node,
            owner,
            assembly,
            locals: Vec::new(),
            aliases: Vec::new(),
            imports: Vec::new(),
        });
        self.node_scopes.insert(node, id);
        id
    }

    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> Option<&mut Scope> {
        self.scopes.get_mut(id.index())
    }

    /// Scope of the nearest ancestor node carrying one.
    pub fn scope_parent(&self, scope: ScopeId) -> Option<ScopeId> {
        let node = self.scope(scope)?.node;
        let tree = &self.files.get(node.file)?.tree;
        tree.ancestors(node.node)
            .find_map(|a| self.node_scopes.get(&NodeRef::new(node.file, a)).copied())
    }

    /// Innermost scope containing `node`, the node's own scope included.
    pub fn enclosing_scope(&self, node: NodeRef) -> Option<ScopeId> {
        if let Some(&scope) = self.node_scopes.get(&node) {
            return Some(scope);
        }
        let tree = &self.files.get(node.file)?.tree;
        tree.ancestors(node.node)
            .find_map(|a| self.node_scopes.get(&NodeRef::new(node.file, a)).copied())
    }

    /// The scope and its ancestors, innermost first.
    pub fn scope_chain(&self, scope: ScopeId) -> Vec<ScopeId> {
        std::iter::successors(Some(scope), |&s| self.scope_parent(s)).collect()
    }

    /// Nearest owning symbol up the chain (locals belong to the member
    /// whose body declares them).
    pub(crate) fn scope_owner(&self, scope: ScopeId) -> Option<SymbolId> {
        self.scope_chain(scope)
            .into_iter()
            .find_map(|s| self.scope(s).and_then(|s| s.owner))
    }

    /// Namespace of the nearest namespace scope at or above `scope`.
    pub(crate) fn scope_namespace(&self, scope: ScopeId) -> Option<SymbolId> {
        self.scope_chain(scope).into_iter().find_map(|s| {
            let scope = self.scope(s)?;
            (scope.kind == ScopeKind::Namespace).then_some(scope.owner).flatten()
        })
    }

    /// Type whose body encloses `scope`, if any.
    pub(crate) fn scope_type(&self, scope: ScopeId) -> Option<SymbolId> {
        self.scope_chain(scope).into_iter().find_map(|s| {
            let scope = self.scope(s)?;
            (scope.kind == ScopeKind::TypeBody).then_some(scope.owner).flatten()
        })
    }

    /// Resolves a name from `scope` outwards. `None` means not found.
    pub fn lookup(&mut self, scope: ScopeId, lookup: &Lookup<'_>) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(scope_id) = current {
            let scope = self.scope(scope_id)?.clone();
            let found = match scope.kind {
                ScopeKind::Namespace => self.lookup_in_namespace_scope(scope_id, &scope, lookup),
                ScopeKind::TypeBody => self.lookup_in_type_body(&scope, lookup),
                ScopeKind::MethodBody => self.lookup_in_method_body(&scope, lookup),
                ScopeKind::AccessorBody { is_getter } => {
                    let is_value = !is_getter && lookup.name == "value" && lookup.arity == 0 && !lookup.type_only;
                    match scope.owner {
                        Some(owner) if is_value => Some(self.implicit_value(owner)),
                        _ => None,
                    }
                }
                ScopeKind::LocalBlock => self.lookup_local(&scope, lookup),
                ScopeKind::Attribute => {
                    // Whole lookup continues from the parent, then again with the suffix.
                    let parent = self.scope_parent(scope_id)?;
                    let found = self.lookup(parent, lookup);
                    if found.is_some() || lookup.name.ends_with("Attribute") {
                        return found;
                    }
                    let suffixed = format!("{}Attribute", lookup.name);
                    let retry = Lookup {
                        name: &suffixed,
                        arity: lookup.arity,
                        position: lookup.position,
                        type_only: lookup.type_only,
                        requesting: lookup.requesting,
                        skip_imports: lookup.skip_imports,
                    };
                    return self.lookup(parent, &retry);
                }
                ScopeKind::BaseList => self.lookup_type_parameter(scope.owner, lookup),
            };
            if found.is_some() {
                return found;
            }
            current = self.scope_parent(scope_id);
        }
        None
    }

    fn lookup_in_namespace_scope(&mut self, scope_id: ScopeId, scope: &Scope, lookup: &Lookup<'_>) -> Option<SymbolId> {
        if !lookup.skip_imports && lookup.arity == 0 {
            let alias = scope
                .aliases
                .iter()
                .find(|(name, _)| name == lookup.name)
                .map(|&(_, target)| target);
            if let Some(target) = alias {
                let resolved = self.resolve_node(target);
                if !self.is_sentinel(resolved) {
                    return Some(resolved);
                }
            }
        }

        // Namespaces between this one and the parent scope's namespace.
        let stop = self.scope_parent(scope_id).and_then(|p| self.scope_namespace(p));
        let mut namespace = scope.owner;
        while let Some(ns) = namespace {
            if Some(ns) == stop {
                break;
            }
            if let Some(found) = self.lookup_namespace_member(ns, lookup) {
                return Some(found);
            }
            namespace = self.symbol(ns).parent;
        }

        if lookup.skip_imports {
            return None;
        }
        for import in scope.imports.iter().filter(|i| i.position <= lookup.position) {
            let target = self.resolve_node(import.target);
            if self.symbol(target).kind != SymbolKind::Namespace {
                continue;
            }
            // Imports bring in types, never nested namespaces.
            if let Some(found) = self.lookup_namespace_member(target, lookup) {
                if self.symbol(found).kind != SymbolKind::Namespace {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Namespace member filtered by assembly reachability and accessibility.
    pub(crate) fn lookup_namespace_member(&mut self, ns: SymbolId, lookup: &Lookup<'_>) -> Option<SymbolId> {
        let found = self.find_name(ns, lookup.name, lookup.arity, lookup.type_only)?;
        if !lookup.accepts(self.symbol(found)) {
            return None;
        }
        let symbol = self.symbol(found);
        if symbol.kind == SymbolKind::Namespace {
            return Some(found);
        }
        let assembly = symbol.assembly;
        let access = symbol.access;
        if !self.directory.is_referenced(lookup.requesting, assembly) {
            return None;
        }
        if !self.directory.is_accessible_from(access, assembly, lookup.requesting) {
            return None;
        }
        Some(found)
    }

    fn lookup_in_type_body(&mut self, scope: &Scope, lookup: &Lookup<'_>) -> Option<SymbolId> {
        let owner = scope.owner?;
        if let Some(found) = self.find_member(owner, lookup.name, lookup.arity, lookup.type_only) {
            return Some(found);
        }
        self.lookup_type_parameter(Some(owner), lookup)
    }

    fn lookup_type_parameter(&self, owner: Option<SymbolId>, lookup: &Lookup<'_>) -> Option<SymbolId> {
        if lookup.arity != 0 {
            return None;
        }
        let owner = owner?;
        self.symbol(owner)
            .type_parameters
            .iter()
            .copied()
            .find(|&tp| self.symbol(tp).name == lookup.name)
    }

    fn lookup_in_method_body(&mut self, scope: &Scope, lookup: &Lookup<'_>) -> Option<SymbolId> {
        let owner = scope.owner?;
        if !lookup.type_only && lookup.arity == 0 {
            let parameter = self
                .symbol(owner)
                .parameters
                .iter()
                .copied()
                .find(|&p| self.symbol(p).name == lookup.name);
            if let Some(p) = parameter {
                if self.prune(p) {
                    return Some(p);
                }
            }
        }
        self.lookup_type_parameter(Some(owner), lookup)
    }

    fn lookup_local(&mut self, scope: &Scope, lookup: &Lookup<'_>) -> Option<SymbolId> {
        if lookup.type_only || lookup.arity != 0 {
            return None;
        }
        let candidates: Vec<SymbolId> = scope
            .locals
            .iter()
            .copied()
            .filter(|&l| self.symbol(l).name == lookup.name)
            .collect();
        candidates.into_iter().find(|&l| self.prune(l))
    }

    /// The implicit `value` parameter of a setter or event accessor.
    pub(crate) fn implicit_value(&mut self, owner: SymbolId) -> SymbolId {
        if let Some(value) = self.symbol(owner).derived.value_parameter {
            return value;
        }
        let assembly = self.symbol(owner).assembly;
        let value = self.alloc_symbol(
            Symbol::new(SymbolKind::Parameter, "value")
                .with_parent(owner)
                .with_assembly(assembly)
                .with_shape(Shape::ImplicitValue { owner }),
        );
        self.symbol_mut(owner).derived.value_parameter = Some(value);
        value
    }

    /// Convenience lookup of `name` as seen from `node`.
    pub fn lookup_at(&mut self, node: NodeRef, name: &str, arity: usize, type_only: bool) -> Option<SymbolId> {
        let scope = self.enclosing_scope(node)?;
        let requesting = self.files.get(node.file)?.assembly;
        let position = self
            .files
            .get(node.file)
            .and_then(|f| f.tree.range(node.node))
            .map_or(TextSize::from(u32::MAX), |r| r.start());
        let mut lookup = Lookup::new(name, requesting).with_arity(arity).at(position);
        lookup.type_only = type_only;
        self.lookup(scope, &lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Rule;

    fn node_of(model: &SemanticModel, file: crate::base::FileId, rule: Rule, nth: usize) -> NodeRef {
        let tree = model.tree(file).unwrap();
        let node = tree
            .descendants(tree.root().unwrap())
            .into_iter()
            .filter(|&n| tree.rule(n) == Some(rule))
            .nth(nth)
            .unwrap();
        NodeRef::new(file, node)
    }

    #[test]
    fn test_locals_shadow_fields() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "class C { int x; void M() { int x = 1; return; } }");
        let ret = node_of(&model, file, Rule::ReturnStatement, 0);
        let found = model.lookup_at(ret, "x", 0, false).unwrap();
        assert_eq!(model.symbol(found).kind, SymbolKind::Local);
    }

    #[test]
    fn test_scope_chain_follows_tree() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "namespace N { class C { void M(int p) { } } }");
        let block = node_of(&model, file, Rule::Block, 0);
        let scope = model.enclosing_scope(block).unwrap();
        let kinds: Vec<ScopeKind> = model
            .scope_chain(scope)
            .into_iter()
            .map(|s| model.scope(s).unwrap().kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ScopeKind::LocalBlock,
                ScopeKind::MethodBody,
                ScopeKind::TypeBody,
                ScopeKind::Namespace,
                ScopeKind::Namespace,
            ]
        );
        let p = model.lookup_at(block, "p", 0, false).unwrap();
        assert_eq!(model.symbol(p).kind, SymbolKind::Parameter);
    }

    #[test]
    fn test_setter_value_parameter() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "class C { int P { get { return 0; } set { } } }");
        let getter = node_of(&model, file, Rule::Block, 0);
        let setter = node_of(&model, file, Rule::Block, 1);
        assert!(model.lookup_at(getter, "value", 0, false).is_none());
        let value = model.lookup_at(setter, "value", 0, false).unwrap();
        assert!(matches!(model.symbol(value).shape, Shape::ImplicitValue { .. }));
        assert_eq!(model.lookup_at(setter, "value", 0, false), Some(value));
    }

    #[test]
    fn test_type_parameters_visible_in_base_list() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "class B<X> {} class D<T> : B<T> { int T2; }");
        let base_list = node_of(&model, file, Rule::BaseList, 0);
        let t = model.lookup_at(base_list, "T", 0, true).unwrap();
        assert_eq!(model.symbol(t).kind, SymbolKind::TypeParameter);
        assert!(model.lookup_at(base_list, "T2", 0, false).is_none());
    }
}
