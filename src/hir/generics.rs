//! Constructed types, substitution and the type hierarchy.
//!
//! A generic definition applied to arguments is a separate symbol with
//! [`Shape::Constructed`], cached on the definition so identical arguments
//! give the identical symbol. Members reached through a constructed owner
//! are wrapped ([`Shape::Member`]) and get their types by substituting the
//! owner's arguments into the definition's types. Arrays, nullables and
//! instances are derived symbols cached the same way.

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::trace;

use crate::syntax::{NodeRef, Rule};

use super::ids::SymbolId;
use super::model::SemanticModel;
use super::symbols::{Accessibility, MemoProbe, Modifiers, Origin, Sentinel, Shape, Symbol, SymbolKind};

/// Type parameter to argument pairs.
pub type Substitution = Vec<(SymbolId, SymbolId)>;

fn signature_key(args: &[SymbolId]) -> SmolStr {
    let parts: Vec<String> = args.iter().map(|a| a.index().to_string()).collect();
    SmolStr::new(parts.join(","))
}

impl SemanticModel {
    /// The uninstantiated definition behind constructed and member-wrapped
    /// symbols.
    pub fn definition_root(&self, sym: SymbolId) -> SymbolId {
        let mut current = sym;
        loop {
            match &self.symbol(current).shape {
                Shape::Constructed { generic, .. } | Shape::Member { generic, .. } => current = *generic,
                _ => return current,
            }
        }
    }

    /// Applies a generic type to arguments. Applying a definition to its own
    /// parameters gives the definition back.
    pub fn construct_type(&mut self, generic: SymbolId, args: &[SymbolId]) -> SymbolId {
        let generic = match &self.symbol(generic).shape {
            Shape::Constructed { generic, .. } => *generic,
            _ => generic,
        };
        let root = self.definition_root(generic);
        let arity = self.symbol(root).type_parameters.len();
        if args.is_empty() || arity != args.len() {
            return generic;
        }
        if generic == root && self.symbol(root).type_parameters.as_slice() == args {
            return root;
        }
        let key = signature_key(args);
        if let Some(&existing) = self.symbol(generic).derived.constructed.get(&key) {
            return existing;
        }
        let source = self.symbol(generic);
        let mut symbol = Symbol::new(source.kind, source.name.clone())
            .with_shape(Shape::Constructed {
                generic,
                args: args.into(),
            })
            .with_modifiers(source.modifiers)
            .with_access(source.access)
            .with_assembly(source.assembly);
        symbol.parent = source.parent;
        let id = self.alloc_symbol(symbol);
        self.symbol_mut(generic).derived.constructed.insert(key, id);
        trace!(generic = ?generic, constructed = ?id, "constructed type");
        id
    }

    /// Applies a generic method to type arguments.
    pub fn construct_method(&mut self, method: SymbolId, args: &[SymbolId]) -> SymbolId {
        let params = self.symbol(method).type_parameters.clone();
        if args.is_empty() || args.len() != params.len() || params.as_slice() == args {
            return method;
        }
        let key = signature_key(args);
        if let Some(&existing) = self.symbol(method).derived.constructed.get(&key) {
            return existing;
        }
        let source = self.symbol(method);
        let mut symbol = Symbol::new(source.kind, source.name.clone())
            .with_shape(Shape::Constructed {
                generic: method,
                args: args.into(),
            })
            .with_modifiers(source.modifiers)
            .with_access(source.access)
            .with_assembly(source.assembly);
        symbol.parent = source.parent;
        let id = self.alloc_symbol(symbol);
        self.symbol_mut(method).derived.constructed.insert(key, id);
        self.wrap_parameters(method, id);
        id
    }

    /// A member of a definition as seen through a constructed owner.
    pub(crate) fn constructed_member(&mut self, owner: SymbolId, member: SymbolId) -> SymbolId {
        if let Some(&existing) = self.symbol(owner).derived.members.get(&member) {
            return existing;
        }
        let source = self.symbol(member);
        let type_parameters = source.type_parameters.clone();
        let symbol = Symbol::new(source.kind, source.name.clone())
            .with_parent(owner)
            .with_shape(Shape::Member { owner, generic: member })
            .with_modifiers(source.modifiers)
            .with_access(source.access)
            .with_assembly(source.assembly);
        let id = self.alloc_symbol(symbol);
        self.symbol_mut(id).type_parameters = type_parameters;
        self.symbol_mut(owner).derived.members.insert(member, id);

        if self.symbol(member).kind == SymbolKind::MethodGroup {
            let mut overloads = Vec::new();
            for overload in self.symbol(member).overloads.clone() {
                if self.is_valid(overload) {
                    overloads.push(self.constructed_member(owner, overload));
                }
            }
            self.symbol_mut(id).overloads = overloads;
        }
        self.wrap_parameters(member, id);
        id
    }

    fn wrap_parameters(&mut self, from: SymbolId, to: SymbolId) {
        for param in self.symbol(from).parameters.clone() {
            let source = self.symbol(param);
            let wrapped = Symbol::new(SymbolKind::Parameter, source.name.clone())
                .with_parent(to)
                .with_shape(Shape::Member { owner: to, generic: param })
                .with_modifiers(source.modifiers)
                .with_assembly(source.assembly);
            let wrapped = self.alloc_symbol(wrapped);
            self.symbol_mut(to).parameters.push(wrapped);
        }
    }

    pub fn array_of(&mut self, element: SymbolId, rank: u32) -> SymbolId {
        let rank = rank.max(1);
        if let Some(&existing) = self.symbol(element).derived.arrays.get(&rank) {
            return existing;
        }
        let source = self.symbol(element);
        let name = format!("{}[{}]", source.name, ",".repeat(rank as usize - 1));
        let symbol = Symbol::new(SymbolKind::Class, name)
            .with_shape(Shape::Array { element, rank })
            .with_modifiers(Modifiers::SEALED)
            .with_assembly(source.assembly);
        let id = self.alloc_symbol(symbol);
        self.symbol_mut(element).derived.arrays.insert(rank, id);
        id
    }

    pub fn nullable_of(&mut self, underlying: SymbolId) -> SymbolId {
        if matches!(self.symbol(underlying).shape, Shape::Nullable { .. }) || self.is_sentinel(underlying) {
            return underlying;
        }
        if let Some(existing) = self.symbol(underlying).derived.nullable {
            return existing;
        }
        let source = self.symbol(underlying);
        let symbol = Symbol::new(SymbolKind::Struct, format!("{}?", source.name))
            .with_shape(Shape::Nullable { underlying })
            .with_modifiers(Modifiers::SEALED)
            .with_assembly(source.assembly);
        let id = self.alloc_symbol(symbol);
        self.symbol_mut(underlying).derived.nullable = Some(id);
        id
    }

    /// The value of an expression whose type is `ty`.
    pub fn instance_of(&mut self, ty: SymbolId) -> SymbolId {
        let symbol = self.symbol(ty);
        if symbol.is_sentinel() || symbol.kind == SymbolKind::Instance {
            return ty;
        }
        if let Some(existing) = symbol.derived.instance {
            return existing;
        }
        let instance = Symbol::new(SymbolKind::Instance, symbol.name.clone())
            .with_shape(Shape::Instance { ty })
            .with_assembly(symbol.assembly);
        let id = self.alloc_symbol(instance);
        self.symbol_mut(ty).derived.instance = Some(id);
        id
    }

    /// The type behind an instance symbol; other symbols are returned as is.
    pub fn strip_instance(&self, sym: SymbolId) -> SymbolId {
        match self.symbol(sym).shape {
            Shape::Instance { ty } => ty,
            _ => sym,
        }
    }

    /// Type arguments in effect for `sym`, innermost first.
    pub fn substitution_context(&self, sym: SymbolId) -> Substitution {
        let mut context = Substitution::new();
        let mut current = Some(sym);
        while let Some(id) = current {
            current = match &self.symbol(id).shape {
                Shape::Constructed { generic, args } => {
                    let root = self.definition_root(*generic);
                    context.extend(
                        self.symbol(root)
                            .type_parameters
                            .iter()
                            .copied()
                            .zip(args.iter().copied()),
                    );
                    Some(*generic)
                }
                Shape::Member { owner, .. } => Some(*owner),
                Shape::Instance { ty } => Some(*ty),
                _ => None,
            };
        }
        context
    }

    /// Replaces type parameters in `ty` according to `context`.
    pub fn substitute(&mut self, ty: SymbolId, context: &[(SymbolId, SymbolId)]) -> SymbolId {
        if context.is_empty() {
            return ty;
        }
        match self.symbol(ty).shape.clone() {
            Shape::TypeParameter { .. } => context
                .iter()
                .find(|&&(param, _)| param == ty)
                .map_or(ty, |&(_, arg)| arg),
            Shape::Constructed { generic, args } => {
                let new_generic = self.substitute(generic, context);
                let new_args: Vec<SymbolId> = args.iter().map(|&a| self.substitute(a, context)).collect();
                if new_generic == generic && *new_args == *args {
                    ty
                } else {
                    self.construct_type(new_generic, &new_args)
                }
            }
            Shape::Member { owner, generic } if self.symbol(ty).kind.is_type() => {
                let new_owner = self.substitute(owner, context);
                if new_owner == owner {
                    ty
                } else if self.definition_root(new_owner) == new_owner {
                    generic
                } else {
                    self.constructed_member(new_owner, generic)
                }
            }
            Shape::Array { element, rank } => {
                let new_element = self.substitute(element, context);
                if new_element == element { ty } else { self.array_of(new_element, rank) }
            }
            Shape::Nullable { underlying } => {
                let new_underlying = self.substitute(underlying, context);
                if new_underlying == underlying { ty } else { self.nullable_of(new_underlying) }
            }
            Shape::Instance { ty: inner } => {
                let new_inner = self.substitute(inner, context);
                self.instance_of(new_inner)
            }
            Shape::Definition if self.symbol(ty).kind.is_type() => {
                let params = self.symbol(ty).type_parameters.clone();
                if !params.iter().any(|p| context.iter().any(|(q, _)| q == p)) {
                    return ty;
                }
                let args: Vec<SymbolId> = params.iter().map(|&p| self.substitute(p, context)).collect();
                self.construct_type(ty, &args)
            }
            _ => ty,
        }
    }

    // ========================================================================
    // HIERARCHY
    // ========================================================================

    /// Direct base type. Interfaces and `object` have none.
    pub fn base_type(&mut self, ty: SymbolId) -> Option<SymbolId> {
        match self.symbol(ty).shape.clone() {
            Shape::Constructed { generic, .. } | Shape::Member { generic, .. } => {
                let base = self.base_type(generic)?;
                let context = self.substitution_context(ty);
                return Some(self.substitute(base, &context));
            }
            Shape::Array { .. } => return self.type_by_full_name("System.Array"),
            Shape::Nullable { .. } => return self.type_by_full_name("System.ValueType"),
            Shape::TypeParameter { .. } => {
                let object = self.object_type();
                return (!self.is_sentinel(object)).then_some(object);
            }
            Shape::Instance { .. } => return None,
            _ => {}
        }
        if self.is_sentinel(ty) || !self.symbol(ty).kind.is_type() {
            return None;
        }
        let none = self.sentinel(Sentinel::Unknown);
        match self.symbol(ty).base_memo.probe(self.version) {
            MemoProbe::Hit(base) => return (base != none).then_some(base),
            MemoProbe::Cycle => {
                self.stats.cycle_guards += 1;
                self.recursive.insert(ty);
                return None;
            }
            MemoProbe::Miss => {}
        }
        self.symbol_mut(ty).base_memo.begin();
        let (base, interfaces) = self.declared_supertypes(ty);
        let version = self.version;
        let symbol = self.symbol_mut(ty);
        symbol.base_memo.finish(version, base.unwrap_or(none));
        symbol.interfaces_memo = Some((version, interfaces));
        base
    }

    /// Directly implemented interfaces.
    pub fn interfaces(&mut self, ty: SymbolId) -> Vec<SymbolId> {
        match self.symbol(ty).shape.clone() {
            Shape::Constructed { generic, .. } | Shape::Member { generic, .. } => {
                let context = self.substitution_context(ty);
                return self
                    .interfaces(generic)
                    .into_iter()
                    .map(|i| self.substitute(i, &context))
                    .collect();
            }
            Shape::Array { element, .. } => {
                return self
                    .generic_type_by_name("System.Collections.Generic", "IEnumerable", 1)
                    .map(|def| self.construct_type(def, &[element]))
                    .into_iter()
                    .collect();
            }
            Shape::Definition => {}
            _ => return Vec::new(),
        }
        let current = |model: &Self| {
            model
                .symbol(ty)
                .interfaces_memo
                .as_ref()
                .filter(|(version, _)| *version == model.version)
                .map(|(_, list)| list.clone())
        };
        if let Some(list) = current(self) {
            return list;
        }
        self.base_type(ty);
        current(self).unwrap_or_default()
    }

    /// Base and interfaces as written, with the implicit defaults.
    fn declared_supertypes(&mut self, ty: SymbolId) -> (Option<SymbolId>, Vec<SymbolId>) {
        if self.symbol(ty).origin.is_foreign() {
            return self.foreign_supertypes(ty);
        }
        let kind = self.symbol(ty).kind;
        let mut base = None;
        let mut interfaces = Vec::new();
        if !matches!(kind, SymbolKind::Enum | SymbolKind::Delegate) {
            for decl in self.valid_declarations(ty) {
                let Some(node) = self.declaration(decl).map(|d| d.node) else {
                    continue;
                };
                let Some(tree) = self.tree(node.file) else {
                    continue;
                };
                let Some(list) = tree.find_child(node.node, Rule::BaseList) else {
                    continue;
                };
                for reference in tree.find_children(list, Rule::TypeReference) {
                    let target = self.resolve_node(NodeRef::new(node.file, reference));
                    if target == ty || self.is_sentinel(target) {
                        continue;
                    }
                    match self.symbol(target).kind {
                        SymbolKind::Interface => {
                            if !interfaces.contains(&target) {
                                interfaces.push(target);
                            }
                        }
                        SymbolKind::Class if kind == SymbolKind::Class && base.is_none() => base = Some(target),
                        _ => {}
                    }
                }
            }
        }
        if base.is_none() {
            base = match kind {
                SymbolKind::Class => Some(self.object_type()),
                SymbolKind::Struct => self.type_by_full_name("System.ValueType"),
                SymbolKind::Enum => self.type_by_full_name("System.Enum"),
                SymbolKind::Delegate => self.type_by_full_name("System.MulticastDelegate"),
                _ => None,
            }
            .filter(|&b| b != ty && !self.is_sentinel(b));
        }
        (base, interfaces)
    }

    /// `ty`, its base chain, then every interface reachable from them,
    /// breadth first. Walks are bounded by the configured depth and stop at
    /// the first repeated type.
    pub fn supertypes(&mut self, ty: SymbolId) -> Vec<SymbolId> {
        let start = self.strip_instance(ty);
        let mut result = vec![start];
        let mut visited = FxHashSet::default();
        visited.insert(start);
        let max_depth = self.config.max_base_depth;

        let mut current = start;
        for _ in 0..max_depth {
            let Some(base) = self.base_type(current) else {
                break;
            };
            if !visited.insert(base) {
                self.stats.cycle_guards += 1;
                self.recursive.insert(start);
                break;
            }
            result.push(base);
            current = base;
        }

        let mut next = 0;
        while next < result.len() && result.len() <= max_depth * 4 {
            for interface in self.interfaces(result[next]) {
                if visited.insert(interface) {
                    result.push(interface);
                }
            }
            next += 1;
        }
        if self.symbol(start).kind == SymbolKind::Interface {
            let object = self.object_type();
            if !self.is_sentinel(object) && visited.insert(object) {
                result.push(object);
            }
        }
        result
    }

    pub fn derives_from(&mut self, ty: SymbolId, other: SymbolId) -> bool {
        self.supertypes(ty).contains(&other)
    }

    /// Like [`SemanticModel::derives_from`], but a generic `target` also
    /// matches a construction of the same definition whose arguments are
    /// compatible; `target` is then replaced by that construction.
    pub fn derives_from_ref(&mut self, ty: SymbolId, target: &mut SymbolId) -> bool {
        let wanted = *target;
        let root = self.definition_root(wanted);
        for candidate in self.supertypes(ty) {
            if candidate == wanted {
                return true;
            }
            if self.definition_root(candidate) == root && self.type_arguments_compatible(candidate, wanted) {
                *target = candidate;
                return true;
            }
        }
        false
    }

    fn type_arguments_compatible(&self, candidate: SymbolId, wanted: SymbolId) -> bool {
        let wanted_args = self.symbol(wanted).type_arguments();
        if wanted_args.is_empty() {
            return true;
        }
        let candidate_args = self.symbol(candidate).type_arguments();
        candidate_args.len() == wanted_args.len()
            && candidate_args.iter().zip(wanted_args).all(|(&c, &w)| {
                c == w || self.symbol(w).kind == SymbolKind::TypeParameter || self.is_sentinel(w) || self.is_sentinel(c)
            })
    }

    /// Element type of an enumerable collection: arrays, `IEnumerable<T>`
    /// implementations, then `object` for non-generic enumerables.
    pub fn element_type(&mut self, collection: SymbolId) -> Option<SymbolId> {
        let collection = self.strip_instance(collection);
        if let Shape::Array { element, .. } = self.symbol(collection).shape {
            return Some(element);
        }
        if let Some(definition) = self.generic_type_by_name("System.Collections.Generic", "IEnumerable", 1) {
            let mut target = definition;
            if self.derives_from_ref(collection, &mut target) {
                if let Some(&element) = self.symbol(target).type_arguments().first() {
                    return Some(element);
                }
            }
        }
        let non_generic = self.type_by_full_name("System.Collections.IEnumerable")?;
        if self.derives_from(collection, non_generic) {
            Some(self.object_type())
        } else {
            None
        }
    }

    /// The `Invoke` method of a source delegate.
    pub(crate) fn delegate_invoke(&mut self, delegate: SymbolId) -> SymbolId {
        if let Some(invoke) = self.symbol(delegate).derived.invoke {
            return invoke;
        }
        let source = self.symbol(delegate);
        let parameters = source.parameters.clone();
        let symbol = Symbol::new(SymbolKind::Method, "Invoke")
            .with_parent(delegate)
            .with_shape(Shape::DelegateInvoke { delegate })
            .with_origin(Origin::Synthetic)
            .with_access(Accessibility::Public)
            .with_modifiers(Modifiers::VIRTUAL)
            .with_assembly(source.assembly);
        let id = self.alloc_symbol(symbol);
        self.symbol_mut(id).parameters = parameters;
        self.symbol_mut(delegate).derived.invoke = Some(id);
        id
    }

    /// The invocation signature of a delegate type, constructed or not.
    pub fn delegate_signature(&mut self, ty: SymbolId) -> Option<SymbolId> {
        let ty = self.strip_instance(ty);
        let root = self.definition_root(ty);
        if self.symbol(root).kind != SymbolKind::Delegate {
            return None;
        }
        let invoke = self.own_member_by_key(ty, "Invoke")?;
        match self.symbol(invoke).kind {
            SymbolKind::MethodGroup => self.symbol(invoke).overloads.first().copied(),
            _ => Some(invoke),
        }
    }

    /// Classes, interfaces, delegates, arrays and `null` accept `null`.
    pub fn is_reference_type(&self, ty: SymbolId) -> bool {
        let symbol = self.symbol(ty);
        match symbol.shape {
            Shape::Array { .. } => true,
            Shape::Nullable { .. } => false,
            _ => matches!(
                symbol.kind,
                SymbolKind::Class | SymbolKind::Interface | SymbolKind::Delegate | SymbolKind::TypeParameter
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(model: &mut SemanticModel, element: &str) -> SymbolId {
        let list = model.type_by_full_name("System.Collections.Generic.List`1").unwrap();
        let element = model.builtin_type(element);
        model.construct_type(list, &[element])
    }

    #[test]
    fn test_construction_is_cached() {
        let mut model = SemanticModel::default();
        let a = list_of(&mut model, "int");
        let b = list_of(&mut model, "int");
        let c = list_of(&mut model, "string");
        assert_eq!(a, b);
        assert_ne!(a, c);
        let list = model.definition_root(a);
        let own = model.symbol(list).type_parameters().to_vec();
        assert_eq!(model.construct_type(list, &own), list);
    }

    #[test]
    fn test_substitution_through_members() {
        let mut model = SemanticModel::default();
        let ints = list_of(&mut model, "int");
        let int = model.builtin_type("int");
        let add = model.find_name(ints, "Add", 0, false).unwrap();
        let param = model.symbol(add).parameters()[0];
        assert_eq!(model.type_of(param), int);
        let to_array = model.find_name(ints, "ToArray", 0, false).unwrap();
        let int_array = model.array_of(int, 1);
        assert_eq!(model.type_of(to_array), int_array);
    }

    #[test]
    fn test_supertypes_substitute_interfaces() {
        let mut model = SemanticModel::default();
        let ints = list_of(&mut model, "int");
        let int = model.builtin_type("int");
        let enumerable = model
            .type_by_full_name("System.Collections.Generic.IEnumerable`1")
            .unwrap();
        let enumerable_of_int = model.construct_type(enumerable, &[int]);
        assert!(model.derives_from(ints, enumerable_of_int));
        let object = model.builtin_type("object");
        assert!(model.derives_from(ints, object));
    }

    #[test]
    fn test_element_types() {
        let mut model = SemanticModel::default();
        let strings = list_of(&mut model, "string");
        let string = model.builtin_type("string");
        let char = model.builtin_type("char");
        let int = model.builtin_type("int");
        let ints = model.array_of(int, 1);
        assert_eq!(model.element_type(strings), Some(string));
        assert_eq!(model.element_type(ints), Some(int));
        assert_eq!(model.element_type(string), Some(char));
        assert_eq!(model.element_type(int), None);
    }

    #[test]
    fn test_cyclic_hierarchy_terminates() {
        let mut model = SemanticModel::default();
        model.add_file("a.cs", "class A : B {} class B : A {}");
        let a = model.symbol(model.global_namespace()).member("A").unwrap();
        let chain = model.supertypes(a);
        assert_eq!(chain.len(), 2);
        assert!(model.stats().cycle_guards > 0);
    }

    #[test]
    fn test_nullable_and_array_caches() {
        let mut model = SemanticModel::default();
        let int = model.builtin_type("int");
        let nullable = model.nullable_of(int);
        assert_eq!(model.nullable_of(int), nullable);
        assert_eq!(model.nullable_of(nullable), nullable);
        assert_eq!(model.symbol(nullable).name, "Int32?");
        let grid = model.array_of(int, 2);
        assert_eq!(model.symbol(grid).name, "Int32[,]");
        assert_ne!(grid, model.array_of(int, 1));
    }
}
