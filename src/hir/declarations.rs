//! Declarations and the member tables they populate.
//!
//! A [`Declaration`] ties one name leaf in a tree to a symbol. Declarations
//! with the same kind and key in the same owner merge into one symbol
//! (partial types, namespaces spread over files); methods sharing a name
//! collect into a method group. A declaration whose node has been detached
//! from its tree is invalid, and lookups prune it lazily.

use smol_str::SmolStr;
use tracing::trace;

use crate::syntax::{NodeRef, lexer::decode_identifier};

use super::error::ResolveError;
use super::ids::{DeclId, ScopeId, SymbolId};
use super::model::SemanticModel;
use super::scope::ScopeKind;
use super::symbols::{Accessibility, Modifiers, Origin, Shape, Symbol, SymbolKind, member_key};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DeclKind {
    Namespace,
    Class,
    Struct,
    Interface,
    Enum,
    Delegate,
    TypeParameter,
    Field,
    Constant,
    EnumMember,
    Property,
    Indexer,
    Event,
    Method,
    Constructor,
    Parameter,
    Local,
}

impl DeclKind {
    pub fn symbol_kind(self) -> SymbolKind {
        match self {
            DeclKind::Namespace => SymbolKind::Namespace,
            DeclKind::Class => SymbolKind::Class,
            DeclKind::Struct => SymbolKind::Struct,
            DeclKind::Interface => SymbolKind::Interface,
            DeclKind::Enum => SymbolKind::Enum,
            DeclKind::Delegate => SymbolKind::Delegate,
            DeclKind::TypeParameter => SymbolKind::TypeParameter,
            DeclKind::Field => SymbolKind::Field,
            DeclKind::Constant => SymbolKind::ConstantField,
            DeclKind::EnumMember => SymbolKind::EnumMember,
            DeclKind::Property => SymbolKind::Property,
            DeclKind::Indexer => SymbolKind::Indexer,
            DeclKind::Event => SymbolKind::Event,
            DeclKind::Method => SymbolKind::Method,
            DeclKind::Constructor => SymbolKind::Constructor,
            DeclKind::Parameter => SymbolKind::Parameter,
            DeclKind::Local => SymbolKind::Local,
        }
    }

    fn is_overloadable(self) -> bool {
        matches!(self, DeclKind::Method | DeclKind::Constructor)
    }

    /// Kinds for which a second declaration is not an error.
    fn merges_silently(self, modifiers: Modifiers) -> bool {
        match self {
            DeclKind::Namespace | DeclKind::TypeParameter => true,
            DeclKind::Class | DeclKind::Struct | DeclKind::Interface => {
                modifiers.contains(Modifiers::PARTIAL)
            }
            _ => false,
        }
    }
}

/// One syntactic occurrence binding a name to a symbol.
#[derive(Clone, Debug)]
pub struct Declaration {
    pub kind: DeclKind,
    /// Decoded name (no `@` prefix).
    pub name: SmolStr,
    pub type_parameter_count: usize,
    /// The declaring node (class, method, declarator, ...).
    pub node: NodeRef,
    /// The leaf spelling the name.
    pub name_leaf: NodeRef,
    /// Scope the declaration was registered in.
    pub scope: ScopeId,
    /// Owner overriding the scope's owner, used for namespace segments and
    /// type parameters declared ahead of their owner's body.
    pub owner: Option<SymbolId>,
    pub modifiers: Modifiers,
    pub access: Accessibility,
    pub(crate) symbol: Option<SymbolId>,
}

impl Declaration {
    pub fn new(kind: DeclKind, name: &str, node: NodeRef, name_leaf: NodeRef, scope: ScopeId) -> Self {
        Self {
            kind,
            name: decode_identifier(name).into(),
            type_parameter_count: 0,
            node,
            name_leaf,
            scope,
            owner: None,
            modifiers: Modifiers::empty(),
            access: Accessibility::Public,
            symbol: None,
        }
    }

    pub fn with_type_parameter_count(mut self, count: usize) -> Self {
        self.type_parameter_count = count;
        self
    }

    pub fn with_owner(mut self, owner: SymbolId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_access(mut self, access: Accessibility) -> Self {
        self.access = access;
        self
    }

    pub fn symbol(&self) -> Option<SymbolId> {
        self.symbol
    }

    pub fn key(&self) -> SmolStr {
        if self.kind.is_overloadable() {
            self.name.clone()
        } else {
            member_key(&self.name, self.type_parameter_count)
        }
    }
}

/// Where a declaration's symbol is listed.
enum Slot {
    Local(ScopeId),
    TypeParameter(SymbolId),
    Parameter(SymbolId),
    Member(SymbolId),
}

impl SemanticModel {
    fn slot_for(&self, decl: &Declaration) -> Result<Slot, ResolveError> {
        let scope = self
            .scope(decl.scope)
            .ok_or(ResolveError::UnknownScope(decl.scope))?;
        if scope.kind == ScopeKind::LocalBlock && decl.owner.is_none() {
            return Ok(Slot::Local(decl.scope));
        }
        let owner = decl
            .owner
            .or(scope.owner)
            .ok_or(ResolveError::MissingScope(decl.node))?;
        Ok(match decl.kind {
            DeclKind::TypeParameter => Slot::TypeParameter(owner),
            DeclKind::Parameter => Slot::Parameter(owner),
            DeclKind::Local => Slot::Local(decl.scope),
            _ => Slot::Member(owner),
        })
    }

    fn symbol_for_declaration(&mut self, decl: &Declaration, parent: Option<SymbolId>) -> SymbolId {
        let assembly = self.scope(decl.scope).map(|s| s.assembly);
        let mut symbol = Symbol::new(decl.kind.symbol_kind(), decl.name.clone())
            .with_origin(Origin::Source)
            .with_modifiers(decl.modifiers)
            .with_access(decl.access);
        symbol.parent = parent;
        // Namespaces are shared by every assembly contributing to them.
        if decl.kind != DeclKind::Namespace {
            symbol.assembly = assembly;
        }
        self.alloc_symbol(symbol)
    }

    /// Registers a declaration in the table its scope and kind route it to,
    /// merging it into an existing symbol of the same kind and key.
    pub fn add_declaration(&mut self, mut decl: Declaration) -> Result<(DeclId, SymbolId), ResolveError> {
        let slot = self.slot_for(&decl)?;
        let id = DeclId::from_raw(self.declarations.len() as u32);

        let symbol = match slot {
            Slot::Local(scope) => {
                let sym = self.symbol_for_declaration(&decl, self.scope_owner(scope));
                self.scopes[scope.index()].locals.push(sym);
                sym
            }
            Slot::TypeParameter(owner) => {
                let existing = self
                    .symbol(owner)
                    .type_parameters
                    .iter()
                    .copied()
                    .find(|&tp| self.symbol(tp).name == decl.name);
                match existing {
                    Some(tp) => tp,
                    None => {
                        let position = self.symbol(owner).type_parameters.len() as u32;
                        let sym = self.symbol_for_declaration(&decl, Some(owner));
                        self.symbol_mut(sym).shape = Shape::TypeParameter { position };
                        self.symbol_mut(owner).type_parameters.push(sym);
                        sym
                    }
                }
            }
            Slot::Parameter(owner) => {
                let existing = self
                    .symbol(owner)
                    .parameters
                    .iter()
                    .copied()
                    .find(|&p| self.symbol(p).name == decl.name);
                match existing {
                    Some(p) => p,
                    None => {
                        let sym = self.symbol_for_declaration(&decl, Some(owner));
                        self.symbol_mut(owner).parameters.push(sym);
                        sym
                    }
                }
            }
            Slot::Member(owner) => self.add_member_declaration(id, &decl, owner),
        };

        decl.symbol = Some(symbol);
        let file = decl.node.file;
        self.node_decls.insert(decl.name_leaf, id);
        self.symbol_mut(symbol).declarations.push(id);
        self.declarations.push(Some(decl));
        self.file_decls.entry(file).or_default().push(id);
        Ok((id, symbol))
    }

    fn add_member_declaration(&mut self, id: DeclId, decl: &Declaration, owner: SymbolId) -> SymbolId {
        let key = decl.key();
        let kind = decl.kind.symbol_kind();
        let existing = self.symbol(owner).members.get(&key).copied();

        let Some(existing) = existing else {
            let sym = self.symbol_for_declaration(decl, Some(owner));
            self.symbol_mut(owner).members.insert(key, sym);
            return sym;
        };

        let existing_kind = self.symbol(existing).kind;
        if decl.kind.is_overloadable() {
            match existing_kind {
                SymbolKind::MethodGroup => {
                    let sym = self.symbol_for_declaration(decl, Some(owner));
                    self.symbol_mut(existing).overloads.push(sym);
                    return sym;
                }
                k if k == kind => {
                    let sym = self.symbol_for_declaration(decl, Some(owner));
                    let group = self.alloc_symbol(
                        Symbol::new(SymbolKind::MethodGroup, decl.name.clone())
                            .with_origin(Origin::Source)
                            .with_parent(owner)
                            .with_assembly(self.symbol(existing).assembly),
                    );
                    self.symbol_mut(group).overloads = vec![existing, sym];
                    self.symbol_mut(owner).members.insert(key, group);
                    return sym;
                }
                _ => {}
            }
        } else if existing_kind == kind {
            if !decl.kind.merges_silently(decl.modifiers) {
                self.duplicates.push((id, existing));
            }
            let merged = self.symbol(existing).modifiers | decl.modifiers;
            self.symbol_mut(existing).modifiers = merged;
            return existing;
        }

        trace!(name = %decl.name, "declaration collides with a symbol of another kind");
        self.duplicates.push((id, existing));
        self.symbol_for_declaration(decl, Some(owner))
    }

    /// Removes a declaration. When it was its symbol's last declaration the
    /// symbol leaves its owner's table (an emptied method group goes too).
    pub fn remove_declaration(&mut self, id: DeclId) -> Result<(), ResolveError> {
        self.unbind_declaration(id)?;
        self.bump_version();
        Ok(())
    }

    /// [`SemanticModel::remove_declaration`] without invalidating memoized
    /// results, used for lazy pruning of already-invalid declarations.
    pub(crate) fn unbind_declaration(&mut self, id: DeclId) -> Result<(), ResolveError> {
        let decl = self
            .declarations
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(ResolveError::UnknownDeclaration(id))?;
        if self.node_decls.get(&decl.name_leaf) == Some(&id) {
            self.node_decls.remove(&decl.name_leaf);
        }
        if let Some(ids) = self.file_decls.get_mut(&decl.node.file) {
            ids.retain(|&d| d != id);
        }
        self.duplicates.retain(|&(d, _)| d != id);

        let Some(sym) = decl.symbol else {
            return Ok(());
        };
        self.symbol_mut(sym).declarations.retain(|&d| d != id);
        if self.symbol(sym).declarations.is_empty() && self.symbol(sym).origin == Origin::Source {
            self.detach_symbol(sym, &decl);
        }
        Ok(())
    }

    fn detach_symbol(&mut self, sym: SymbolId, decl: &Declaration) {
        self.symbol_mut(sym).removed = true;
        let Ok(slot) = self.slot_for(decl) else {
            return;
        };
        match slot {
            Slot::Local(scope) => {
                if let Some(s) = self.scopes.get_mut(scope.index()) {
                    s.locals.retain(|&l| l != sym);
                }
            }
            Slot::TypeParameter(owner) => self.symbol_mut(owner).type_parameters.retain(|&t| t != sym),
            Slot::Parameter(owner) => self.symbol_mut(owner).parameters.retain(|&p| p != sym),
            Slot::Member(owner) => {
                let key = decl.key();
                let Some(current) = self.symbol(owner).members.get(&key).copied() else {
                    return;
                };
                if current == sym {
                    self.symbol_mut(owner).members.remove(&key);
                } else if self.symbol(current).kind == SymbolKind::MethodGroup {
                    self.symbol_mut(current).overloads.retain(|&o| o != sym);
                    if self.symbol(current).overloads.is_empty() {
                        self.symbol_mut(current).removed = true;
                        self.symbol_mut(owner).members.remove(&key);
                    }
                }
            }
        }
        trace!(symbol = ?sym, name = %decl.name, "symbol detached");
    }

    /// Whether the declaration's nodes are still attached to their tree.
    pub fn is_declaration_valid(&self, id: DeclId) -> bool {
        let Some(decl) = self.declaration(id) else {
            return false;
        };
        let Some(file) = self.files.get(decl.node.file) else {
            return false;
        };
        file.tree.is_live(decl.node.node) && file.tree.is_live(decl.name_leaf.node)
    }

    /// Source symbols are valid while any declaration is. Constructed
    /// types and members, arrays and nullables follow the symbols they are
    /// built from; other foreign and synthesized symbols always are.
    pub fn is_valid(&self, sym: SymbolId) -> bool {
        let symbol = self.symbol(sym);
        if symbol.removed {
            return false;
        }
        match &symbol.shape {
            Shape::Constructed { generic, args } => {
                return self.is_valid(*generic) && args.iter().all(|&a| self.is_valid(a));
            }
            Shape::Member { owner, generic } => return self.is_valid(*owner) && self.is_valid(*generic),
            Shape::Array { element, .. } => return self.is_valid(*element),
            Shape::Nullable { underlying } => return self.is_valid(*underlying),
            _ => {}
        }
        if symbol.origin != Origin::Source {
            return true;
        }
        match symbol.kind {
            SymbolKind::MethodGroup => symbol.overloads.iter().any(|&o| self.is_valid(o)),
            _ => symbol.declarations.iter().any(|&d| self.is_declaration_valid(d)),
        }
    }

    /// Unbinds the invalid declarations of `sym`. Returns whether the symbol
    /// survives.
    pub(crate) fn prune(&mut self, sym: SymbolId) -> bool {
        if self.is_valid(sym) {
            return true;
        }
        if self.symbol(sym).kind == SymbolKind::MethodGroup {
            for overload in self.symbol(sym).overloads.clone() {
                self.prune(overload);
            }
            return false;
        }
        for decl in self.symbol(sym).declarations.clone() {
            if !self.is_declaration_valid(decl) {
                let _ = self.unbind_declaration(decl);
            }
        }
        false
    }

    /// Looks `name` up in one symbol's own table: a namespace's members
    /// (foreign ones imported on demand) or a type's declared members.
    /// Invalid entries are pruned and reported as missing.
    pub fn find_name(&mut self, owner: SymbolId, name: &str, arity: usize, type_only: bool) -> Option<SymbolId> {
        let name = decode_identifier(name);
        let found = match self.symbol(owner).kind {
            SymbolKind::Namespace => self.namespace_member(owner, &member_key(name, arity)),
            _ => self.find_own_member(owner, name, arity),
        }?;
        let kind = self.symbol(found).kind;
        if type_only && !(kind.is_type() || kind == SymbolKind::Namespace) {
            return None;
        }
        Some(found)
    }

    /// Own member of a type by name and arity, without walking bases.
    /// Generic methods are keyed by bare name, so a miss with `arity > 0`
    /// retries the bare key for methods.
    pub(crate) fn find_own_member(&mut self, ty: SymbolId, name: &str, arity: usize) -> Option<SymbolId> {
        let found = self.own_member_by_key(ty, &member_key(name, arity));
        if found.is_some() || arity == 0 {
            return found;
        }
        self.own_member_by_key(ty, name).filter(|&m| {
            let kind = self.symbol(m).kind;
            kind == SymbolKind::MethodGroup || kind == SymbolKind::Method
        })
    }

    pub(crate) fn own_member_by_key(&mut self, ty: SymbolId, key: &str) -> Option<SymbolId> {
        let host = self.member_host(ty)?;
        let root = self.definition_root(host);
        self.ensure_foreign_members(root, false);
        if key == "Invoke" && self.symbol(root).kind == SymbolKind::Delegate && self.symbol(root).origin == Origin::Source {
            let invoke = self.delegate_invoke(root);
            return Some(if host == root { invoke } else { self.constructed_member(host, invoke) });
        }
        let member = self.symbol(root).members.get(key).copied()?;
        if !self.prune(member) {
            return None;
        }
        if host == root {
            Some(member)
        } else {
            Some(self.constructed_member(host, member))
        }
    }

    /// The type whose member table answers member lookups on `ty`: arrays
    /// use `System.Array`, nullables their `Nullable<T>` construction.
    pub(crate) fn member_host(&mut self, ty: SymbolId) -> Option<SymbolId> {
        match self.symbol(ty).shape {
            Shape::Array { .. } => self.type_by_full_name("System.Array"),
            Shape::Nullable { underlying } => {
                let nullable = self.type_by_full_name("System.Nullable`1")?;
                Some(self.construct_type(nullable, &[underlying]))
            }
            Shape::Instance { ty } => self.member_host(ty),
            _ => Some(ty),
        }
    }

    /// Member lookup through the base chain and then the interfaces.
    pub fn find_member(&mut self, ty: SymbolId, name: &str, arity: usize, type_only: bool) -> Option<SymbolId> {
        let name = decode_identifier(name);
        for candidate in self.supertypes(ty) {
            if let Some(found) = self.find_own_member(candidate, name, arity) {
                let kind = self.symbol(found).kind;
                if type_only && !kind.is_type() {
                    continue;
                }
                return Some(found);
            }
        }
        None
    }

    /// Declarations of `sym`, valid ones only.
    pub fn valid_declarations(&self, sym: SymbolId) -> Vec<DeclId> {
        self.symbol(sym)
            .declarations
            .iter()
            .copied()
            .filter(|&d| self.is_declaration_valid(d))
            .collect()
    }

    /// Declarations whose symbol collided with an existing entry.
    pub fn duplicate_declarations(&self) -> &[(DeclId, SymbolId)] {
        &self.duplicates
    }

    pub fn declaration_at(&self, name_leaf: NodeRef) -> Option<DeclId> {
        self.node_decls.get(&name_leaf).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::symbols::SymbolKind;
    use crate::syntax::Rule;

    fn class_named(model: &SemanticModel, name: &str) -> SymbolId {
        model
            .symbol(model.global_namespace())
            .member(name)
            .unwrap_or_else(|| panic!("no class {name}"))
    }

    #[test]
    fn test_partial_declarations_merge() {
        let mut model = SemanticModel::default();
        model.add_file("a.cs", "partial class P { int a; }");
        model.add_file("b.cs", "partial class P { int b; }");
        let p = class_named(&model, "P");
        assert_eq!(model.symbol(p).declarations().len(), 2);
        assert_eq!(model.symbol(p).member_keys(), vec![SmolStr::new("a"), SmolStr::new("b")]);
        assert!(model.duplicate_declarations().is_empty());
    }

    #[test]
    fn test_overloads_form_a_group() {
        let mut model = SemanticModel::default();
        model.add_file("a.cs", "class C { void F() {} void F(int x) {} }");
        let c = class_named(&model, "C");
        let group = model.symbol(c).member("F").unwrap();
        assert_eq!(model.symbol(group).kind, SymbolKind::MethodGroup);
        assert_eq!(model.symbol(group).overloads().len(), 2);
        for &o in model.symbol(group).overloads() {
            assert_eq!(model.symbol(o).parent, Some(c));
        }
    }

    #[test]
    fn test_kind_collision_is_recorded() {
        let mut model = SemanticModel::default();
        model.add_file("a.cs", "class C { int F; void F() {} }");
        assert_eq!(model.duplicate_declarations().len(), 1);
        let c = class_named(&model, "C");
        let f = model.symbol(c).member("F").unwrap();
        assert_eq!(model.symbol(f).kind, SymbolKind::Field);
    }

    #[test]
    fn test_remove_declaration_empties_group() {
        let mut model = SemanticModel::default();
        model.add_file("a.cs", "class C { void F() {} void F(int x) {} }");
        let c = class_named(&model, "C");
        let group = model.symbol(c).member("F").unwrap();
        let overloads = model.symbol(group).overloads().to_vec();
        for o in overloads {
            let decl = model.symbol(o).declarations()[0];
            model.remove_declaration(decl).unwrap();
        }
        assert!(model.symbol(c).member("F").is_none());
        assert!(!model.is_valid(group));
    }

    #[test]
    fn test_detached_member_is_pruned_on_lookup() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "class C { int x; int y; }");
        let c = class_named(&model, "C");
        let tree = model.tree(file).unwrap();
        let field = tree
            .descendants(tree.root().unwrap())
            .into_iter()
            .find(|&n| tree.rule(n) == Some(Rule::FieldDeclaration))
            .unwrap();
        model.edit_tree(file, |t| t.detach(field)).unwrap();

        assert!(model.find_name(c, "x", 0, false).is_none());
        assert!(model.symbol(c).member("x").is_none());
        assert!(model.find_name(c, "y", 0, false).is_some());
    }

    #[test]
    fn test_find_name_type_only_filter() {
        let mut model = SemanticModel::default();
        model.add_file("a.cs", "class C { int Inner; class Nested {} }");
        let c = class_named(&model, "C");
        assert!(model.find_name(c, "Inner", 0, true).is_none());
        assert!(model.find_name(c, "Nested", 0, true).is_some());
        assert_eq!(model.remove_declaration(DeclId::from_raw(9999)), Err(ResolveError::UnknownDeclaration(DeclId::from_raw(9999))));
    }
}
