//! Completion candidates.
//!
//! [`SemanticModel::completions`] collects the symbols an editor can offer
//! at a node; [`SemanticModel::members_completion_data`] is the member
//! listing underneath it.

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::{error, trace};

use crate::syntax::{NodeRef, Rule};

use super::error::ResolveError;
use super::ids::{AssemblyId, SymbolId};
use super::model::SemanticModel;
use super::scope::ScopeKind;
use super::symbols::{AccessMask, BindingFlags, SymbolKind};

/// What kind of completion is requested at a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompletionRequest {
    /// Every name visible from the node: locals, parameters, members of the
    /// enclosing types, types and namespaces.
    Scope,
    /// Members of the namespace, type or value that `node` denotes, as
    /// after `node.`.
    Member,
    /// Types and namespaces visible from the node.
    Type,
    /// Namespaces only, as inside a `using` directive. `node` is the
    /// qualifier, or the directive itself for top-level namespaces.
    Namespace,
}

impl SemanticModel {
    /// Adds the candidates for `request` at `node` to `into`. Accessibility
    /// is judged from `origin`.
    pub fn completions(
        &mut self,
        request: CompletionRequest,
        node: NodeRef,
        into: &mut FxHashSet<SymbolId>,
        origin: AssemblyId,
    ) -> Result<(), ResolveError> {
        let tree = self.tree(node.file).ok_or_else(|| {
            error!(file = node.file.0, "completion requested for an unknown file");
            ResolveError::UnknownFile(node.file)
        })?;
        if node.node.index() >= tree.len() {
            error!(?node, "completion requested for a node outside its tree");
            return Err(ResolveError::UnknownNode(node));
        }
        if self.directory.get(origin).is_none() {
            return Err(ResolveError::UnknownAssembly(origin));
        }
        let before = into.len();
        match request {
            CompletionRequest::Member => {
                let target = self.resolve_node(node);
                self.member_completions(node, target, into, origin);
            }
            CompletionRequest::Namespace => {
                let qualifier = match tree.rule(node.node) {
                    Some(Rule::UsingDirective | Rule::CompilationUnit) | None => self.global,
                    Some(_) => self.resolve_node(node),
                };
                if self.symbol(qualifier).kind == SymbolKind::Namespace {
                    let flags = BindingFlags::STATIC | BindingFlags::INSTANCE;
                    for member in self.members_completion_data(qualifier, flags, AccessMask::PUBLIC, origin) {
                        if self.symbol(member).kind == SymbolKind::Namespace {
                            into.insert(member);
                        }
                    }
                }
            }
            CompletionRequest::Scope | CompletionRequest::Type => {
                let scope = self.enclosing_scope(node).ok_or_else(|| {
                    error!(?node, "no scope encloses the completion node");
                    ResolveError::MissingScope(node)
                })?;
                let types_only = request == CompletionRequest::Type;
                self.scope_completions(node, scope, types_only, into, origin);
            }
        }
        trace!(?request, added = into.len() - before, "collected completions");
        Ok(())
    }

    fn member_completions(&mut self, node: NodeRef, target: SymbolId, into: &mut FxHashSet<SymbolId>, origin: AssemblyId) {
        if self.is_sentinel(target) {
            return;
        }
        let kind = self.symbol(target).kind;
        let (owner, flags) = if kind == SymbolKind::Namespace {
            (target, BindingFlags::STATIC | BindingFlags::INSTANCE)
        } else if kind.is_type() && kind != SymbolKind::TypeParameter {
            (target, BindingFlags::STATIC)
        } else {
            let ty = self.type_of(target);
            if self.is_sentinel(ty) {
                return;
            }
            (ty, BindingFlags::INSTANCE)
        };
        let mask = self.access_mask_from(node, owner);
        into.extend(self.members_completion_data(owner, flags, mask, origin));
    }

    /// Access levels visible to code at `node` on members of `target`:
    /// private inside the same type, protected inside derived types.
    fn access_mask_from(&mut self, node: NodeRef, target: SymbolId) -> AccessMask {
        let mut mask = AccessMask::PUBLIC;
        let Some(enclosing) = self.enclosing_scope(node).and_then(|s| self.scope_type(s)) else {
            return mask;
        };
        let target_root = self.definition_root(self.strip_instance(target));
        let mut current = Some(enclosing);
        while let Some(ty) = current {
            if self.definition_root(ty) == target_root {
                mask |= AccessMask::PRIVATE;
            }
            current = self.symbol(ty).parent.filter(|&p| self.symbol(p).kind.is_type());
        }
        if self.derives_from(enclosing, target) || mask.contains(AccessMask::PRIVATE) {
            mask |= AccessMask::PROTECTED | AccessMask::PROTECTED_INTERNAL;
        }
        mask
    }

    /// Accessible members of a namespace or type. For types the listing
    /// includes inherited members from the base chain and interfaces, with
    /// members hidden by a more derived one left out. `flags` selects static
    /// and/or instance members; `access_mask` is widened with the internal
    /// levels when `requesting` can see the declaring assembly's internals.
    pub fn members_completion_data(
        &mut self,
        sym: SymbolId,
        flags: BindingFlags,
        access_mask: AccessMask,
        requesting: AssemblyId,
    ) -> Vec<SymbolId> {
        let mut result = Vec::new();
        if self.is_sentinel(sym) {
            return result;
        }
        if self.symbol(sym).kind == SymbolKind::Namespace {
            self.ensure_namespace_indexes();
            let mut members = self.namespace_types(sym);
            let mut namespaces: Vec<SymbolId> = self
                .symbol(sym)
                .members
                .values()
                .copied()
                .filter(|&m| self.symbol(m).kind == SymbolKind::Namespace)
                .collect();
            namespaces.sort();
            members.extend(namespaces);
            for member in members {
                if self.is_valid(member) && self.is_member_visible(member, access_mask, requesting) {
                    result.push(member);
                }
            }
            return result;
        }

        let mut seen: FxHashSet<SmolStr> = FxHashSet::default();
        for candidate in self.supertypes(sym) {
            let Some(host) = self.member_host(candidate) else {
                continue;
            };
            let root = self.definition_root(host);
            self.ensure_foreign_members(root, false);
            for key in self.symbol(root).member_keys() {
                if key == ".ctor" || seen.contains(&key) {
                    continue;
                }
                let Some(member) = self.own_member_by_key(candidate, &key) else {
                    continue;
                };
                if !self.matches_binding(member, flags) || !self.is_member_visible(member, access_mask, requesting) {
                    continue;
                }
                seen.insert(key);
                result.push(member);
            }
        }
        result
    }

    fn matches_binding(&self, member: SymbolId, flags: BindingFlags) -> bool {
        let symbol = self.symbol(member);
        if symbol.kind == SymbolKind::MethodGroup {
            return symbol.overloads.iter().any(|&o| self.matches_binding(o, flags));
        }
        // Nested types are reachable through the type name only.
        let is_static = symbol.is_static() || symbol.kind.is_type() || symbol.kind == SymbolKind::EnumMember;
        if is_static {
            flags.contains(BindingFlags::STATIC)
        } else {
            flags.contains(BindingFlags::INSTANCE)
        }
    }

    fn is_member_visible(&self, member: SymbolId, mask: AccessMask, requesting: AssemblyId) -> bool {
        let symbol = self.symbol(member);
        if symbol.kind == SymbolKind::MethodGroup {
            return symbol
                .overloads
                .iter()
                .any(|&o| self.is_member_visible(o, mask, requesting));
        }
        if symbol.kind == SymbolKind::Namespace {
            return true;
        }
        if !self.directory.is_referenced(requesting, symbol.assembly) {
            return false;
        }
        let mask = self.directory.widen(mask, symbol.assembly, requesting);
        mask.intersects(symbol.access.mask())
    }

    fn scope_completions(
        &mut self,
        node: NodeRef,
        scope: super::ids::ScopeId,
        types_only: bool,
        into: &mut FxHashSet<SymbolId>,
        origin: AssemblyId,
    ) {
        let position = self
            .files
            .get(node.file)
            .and_then(|f| f.tree.range(node.node))
            .map(|r| r.start());
        let accepts = |model: &SemanticModel, sym: SymbolId| {
            let kind = model.symbol(sym).kind;
            !types_only || kind.is_type() || kind == SymbolKind::Namespace
        };
        let mut in_static = false;
        for scope_id in self.scope_chain(scope) {
            let Some(scope) = self.scope(scope_id).cloned() else {
                continue;
            };
            match scope.kind {
                ScopeKind::LocalBlock if !types_only => {
                    for local in scope.locals() {
                        if self.prune(*local) {
                            into.insert(*local);
                        }
                    }
                }
                ScopeKind::MethodBody | ScopeKind::AccessorBody { .. } => {
                    let Some(owner) = scope.owner else {
                        continue;
                    };
                    in_static |= self.symbol(owner).is_static();
                    if !types_only {
                        into.extend(self.symbol(owner).parameters.iter().copied());
                        if scope.kind == (ScopeKind::AccessorBody { is_getter: false }) {
                            let value = self.implicit_value(owner);
                            into.insert(value);
                        }
                    }
                    into.extend(self.symbol(owner).type_parameters.iter().copied());
                }
                ScopeKind::TypeBody => {
                    let Some(owner) = scope.owner else {
                        continue;
                    };
                    let flags = if in_static {
                        BindingFlags::STATIC
                    } else {
                        BindingFlags::STATIC | BindingFlags::INSTANCE
                    };
                    let mask = AccessMask::all();
                    for member in self.members_completion_data(owner, flags, mask, origin) {
                        if accepts(self, member) {
                            into.insert(member);
                        }
                    }
                    into.extend(self.symbol(owner).type_parameters.iter().copied());
                    // Members of an outer type are reached statically.
                    in_static = true;
                }
                ScopeKind::BaseList => {
                    if let Some(owner) = scope.owner {
                        into.extend(self.symbol(owner).type_parameters.iter().copied());
                    }
                }
                ScopeKind::Namespace => {
                    for (_, target) in scope.aliases.iter() {
                        let resolved = self.resolve_node(*target);
                        if !self.is_sentinel(resolved) {
                            into.insert(resolved);
                        }
                    }
                    let flags = BindingFlags::STATIC | BindingFlags::INSTANCE;
                    let mut namespace = scope.owner;
                    while let Some(ns) = namespace {
                        into.extend(self.members_completion_data(ns, flags, AccessMask::PUBLIC, origin));
                        namespace = self.symbol(ns).parent;
                    }
                    let visible = scope
                        .imports()
                        .iter()
                        .filter(|i| position.is_none_or(|p| i.position <= p))
                        .map(|i| i.target)
                        .collect::<Vec<_>>();
                    for import in visible {
                        let target = self.resolve_node(import);
                        if self.symbol(target).kind != SymbolKind::Namespace {
                            continue;
                        }
                        for member in self.members_completion_data(target, flags, AccessMask::PUBLIC, origin) {
                            if self.symbol(member).kind != SymbolKind::Namespace {
                                into.insert(member);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::FileId;

    fn names(model: &SemanticModel, set: &FxHashSet<SymbolId>) -> Vec<String> {
        let mut names: Vec<String> = set.iter().map(|&s| model.symbol(s).name.to_string()).collect();
        names.sort();
        names.dedup();
        names
    }

    fn node(model: &SemanticModel, file: FileId, rule: Rule, nth: usize) -> NodeRef {
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
    fn test_member_completion_respects_static_and_access() {
        let mut model = SemanticModel::default();
        let file = model.add_file(
            "a.cs",
            "class A { public int x; private int hidden; public static int S; public void M() {} } \
             class B { void Use(A a) { a.x = 1; A.S = 2; } }",
        );
        let main = model.main_assembly();
        let receiver = node(&model, file, Rule::SimpleName, 0);
        let mut set = FxHashSet::default();
        model.completions(CompletionRequest::Member, receiver, &mut set, main).unwrap();
        let found = names(&model, &set);
        assert!(found.contains(&"x".to_string()));
        assert!(found.contains(&"M".to_string()));
        assert!(found.contains(&"ToString".to_string()));
        assert!(!found.contains(&"hidden".to_string()));
        assert!(!found.contains(&"S".to_string()));

        let type_receiver = node(&model, file, Rule::SimpleName, 1);
        let mut statics = FxHashSet::default();
        model.completions(CompletionRequest::Member, type_receiver, &mut statics, main).unwrap();
        assert_eq!(names(&model, &statics), vec!["S".to_string()]);
    }

    #[test]
    fn test_scope_completion_sees_locals_and_members() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "class C { int f; void M(int p) { int local = 0; local = p; } }");
        let main = model.main_assembly();
        let at = node(&model, file, Rule::AssignmentExpression, 0);
        let mut set = FxHashSet::default();
        model.completions(CompletionRequest::Scope, at, &mut set, main).unwrap();
        let found = names(&model, &set);
        for expected in ["local", "p", "f", "M", "C", "System"] {
            assert!(found.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_namespace_completion() {
        let mut model = SemanticModel::default();
        let file = model.add_file("a.cs", "using System; class C {}");
        let main = model.main_assembly();
        let using = node(&model, file, Rule::QualifiedName, 0);
        let mut set = FxHashSet::default();
        model.completions(CompletionRequest::Namespace, using, &mut set, main).unwrap();
        let found = names(&model, &set);
        assert!(found.contains(&"Collections".to_string()));
        assert!(set.iter().all(|&s| model.symbol(s).kind == SymbolKind::Namespace));
    }

    #[test]
    fn test_internal_members_need_visibility() {
        let mut model = SemanticModel::default();
        let lib = model.add_source_assembly("Lib", &[]).unwrap();
        let lib_file = model.add_file_to(lib, "lib.cs", "public class P { internal int secret; public int open; }").unwrap();
        let app = model.main_assembly();
        model.add_reference(app, lib).unwrap();
        let class = model.find_name(model.global_namespace(), "P", 0, false).unwrap();
        let from_app = model.members_completion_data(class, BindingFlags::INSTANCE, AccessMask::PUBLIC, app);
        let names: Vec<_> = from_app.iter().map(|&m| model.symbol(m).name.clone()).collect();
        assert!(names.contains(&SmolStr::new("open")));
        assert!(!names.contains(&SmolStr::new("secret")));
        let from_lib = model.members_completion_data(class, BindingFlags::INSTANCE, AccessMask::PUBLIC, lib);
        assert!(from_lib.iter().any(|&m| model.symbol(m).name == "secret"));
        assert!(model.tree(lib_file).is_some());
    }
}
