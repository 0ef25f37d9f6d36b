//! Foreign type importer.
//!
//! Types of referenced binaries become symbols on first use. A namespace
//! lookup consults the per-assembly namespace index and imports the matching
//! top-level type; a member lookup on a foreign type imports its members in
//! one pass (public first, non-public when another assembly may see them).
//! Signatures are translated from [`ForeignTypeRef`] trees when the type of
//! a foreign symbol is first asked for.

use std::rc::Rc;

use smol_str::SmolStr;
use tracing::trace;

use super::ids::{AssemblyId, SymbolId};
use super::metadata::{
    ForeignMemberHandle, ForeignMemberInfo, ForeignMemberKind, ForeignTypeHandle, ForeignTypeKind, ForeignTypeRef,
    ForeignVisibility, MetadataProvider,
};
use super::model::SemanticModel;
use super::symbols::{Accessibility, Modifiers, Origin, Sentinel, Shape, Symbol, SymbolKind, member_key};

pub(crate) fn map_visibility(visibility: ForeignVisibility) -> Accessibility {
    match visibility {
        ForeignVisibility::Public => Accessibility::Public,
        ForeignVisibility::Assembly => Accessibility::Internal,
        ForeignVisibility::FamilyOrAssembly => Accessibility::ProtectedInternal,
        ForeignVisibility::Family | ForeignVisibility::FamilyAndAssembly => Accessibility::Protected,
        ForeignVisibility::Private => Accessibility::Private,
    }
}

fn map_type_kind(kind: ForeignTypeKind) -> SymbolKind {
    match kind {
        ForeignTypeKind::Class => SymbolKind::Class,
        ForeignTypeKind::Struct => SymbolKind::Struct,
        ForeignTypeKind::Interface => SymbolKind::Interface,
        ForeignTypeKind::Enum => SymbolKind::Enum,
        ForeignTypeKind::Delegate => SymbolKind::Delegate,
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Pass {
    Public,
    NonPublic,
}

impl Pass {
    fn admits(self, visibility: ForeignVisibility, import_private: bool) -> bool {
        match self {
            Pass::Public => visibility == ForeignVisibility::Public,
            Pass::NonPublic => match visibility {
                ForeignVisibility::Public => false,
                ForeignVisibility::Private => import_private,
                _ => true,
            },
        }
    }
}

impl SemanticModel {
    // ========================================================================
    // NAMESPACES
    // ========================================================================

    /// Builds missing namespace indexes and materializes their namespaces.
    pub(crate) fn ensure_namespace_indexes(&mut self) {
        for assembly in self.directory.foreign_ids() {
            if let Some(index) = self.directory.build_namespace_index(assembly) {
                let mut names: Vec<&SmolStr> = index.keys().collect();
                names.sort();
                for name in names {
                    self.ensure_namespace_path(name);
                }
            }
        }
    }

    /// The namespace symbol for a dotted path, created if missing. Namespaces
    /// reached this way are pinned: they outlive the source declarations
    /// that may share them.
    pub(crate) fn ensure_namespace_path(&mut self, path: &str) -> SymbolId {
        let mut ns = self.global;
        if path.is_empty() {
            return ns;
        }
        for segment in path.split('.') {
            let existing = self
                .symbol(ns)
                .members
                .get(segment)
                .copied()
                .filter(|&s| self.symbol(s).kind == SymbolKind::Namespace);
            ns = match existing {
                Some(s) => {
                    let symbol = self.symbol_mut(s);
                    symbol.origin = Origin::Synthetic;
                    symbol.removed = false;
                    s
                }
                None => {
                    let s = self.alloc_symbol(Symbol::new(SymbolKind::Namespace, segment).with_parent(ns));
                    self.symbol_mut(ns).members.entry(segment.into()).or_insert(s);
                    s
                }
            };
        }
        ns
    }

    /// Dotted name of a namespace symbol; empty for the global namespace.
    pub fn namespace_path(&self, ns: SymbolId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(ns);
        while let Some(id) = current {
            let symbol = self.symbol(id);
            if id == self.global || symbol.kind != SymbolKind::Namespace {
                break;
            }
            segments.push(symbol.name.as_str());
            current = symbol.parent;
        }
        segments.reverse();
        segments.join(".")
    }

    /// Member of a namespace by key, importing a foreign type on first use.
    pub(crate) fn namespace_member(&mut self, ns: SymbolId, key: &str) -> Option<SymbolId> {
        self.ensure_namespace_indexes();
        if let Some(member) = self.symbol(ns).members.get(key).copied() {
            if self.prune(member) {
                return Some(member);
            }
        }
        let path = self.namespace_path(ns);
        for assembly in self.directory.foreign_ids() {
            let Some(index) = self.directory.namespace_index(assembly) else {
                continue;
            };
            let handle = index
                .get(path.as_str())
                .and_then(|types| types.iter().find(|(name, _)| name == key))
                .map(|&(_, handle)| handle);
            if let Some(ty) = handle.and_then(|h| self.import_foreign_type(assembly, h)) {
                return Some(ty);
            }
        }
        None
    }

    /// All types of a namespace, importing the foreign ones.
    pub(crate) fn namespace_types(&mut self, ns: SymbolId) -> Vec<SymbolId> {
        self.ensure_namespace_indexes();
        let path = self.namespace_path(ns);
        for assembly in self.directory.foreign_ids() {
            let Some(index) = self.directory.namespace_index(assembly) else {
                continue;
            };
            if let Some(types) = index.get(path.as_str()) {
                for &(_, handle) in types {
                    self.import_foreign_type(assembly, handle);
                }
            }
        }
        let mut types: Vec<SymbolId> = self
            .symbol(ns)
            .members
            .values()
            .copied()
            .filter(|&m| self.symbol(m).kind.is_type())
            .collect();
        types.retain(|&t| self.is_valid(t));
        types.sort();
        types
    }

    // ========================================================================
    // TYPES
    // ========================================================================

    /// Imports one foreign type (and its declaring types). Repeated imports
    /// return the same symbol.
    pub(crate) fn import_foreign_type(&mut self, assembly: AssemblyId, handle: ForeignTypeHandle) -> Option<SymbolId> {
        if let Some(&existing) = self.foreign_types.get(&(assembly, handle)) {
            return Some(existing);
        }
        let provider = self.directory.provider(assembly)?;
        let Some(info) = provider.type_info(handle) else {
            self.record_import_failure(provider.assembly_name(), format!("type handle {}", handle.0));
            return None;
        };
        let parent = match info.declaring_type {
            Some(outer) => self.import_foreign_type(assembly, outer)?,
            None => self.ensure_namespace_path(&info.namespace),
        };
        if let Some(&existing) = self.foreign_types.get(&(assembly, handle)) {
            return Some(existing);
        }

        let mut modifiers = Modifiers::empty();
        if info.is_abstract && info.is_sealed {
            modifiers |= Modifiers::STATIC;
        } else if info.is_abstract {
            modifiers |= Modifiers::ABSTRACT;
        } else if info.is_sealed {
            modifiers |= Modifiers::SEALED;
        }
        let symbol = Symbol::new(map_type_kind(info.kind), info.name.clone())
            .with_parent(parent)
            .with_origin(Origin::ForeignType { assembly, handle })
            .with_assembly(Some(assembly))
            .with_access(map_visibility(info.visibility))
            .with_modifiers(modifiers);
        let id = self.alloc_symbol(symbol);
        self.foreign_types.insert((assembly, handle), id);

        for (position, name) in info.generic_params.iter().enumerate() {
            let param = Symbol::new(SymbolKind::TypeParameter, name.clone())
                .with_parent(id)
                .with_assembly(Some(assembly))
                .with_shape(Shape::TypeParameter {
                    position: position as u32,
                });
            let param = self.alloc_symbol(param);
            self.symbol_mut(id).type_parameters.push(param);
        }

        let key = info.metadata_name();
        self.symbol_mut(parent).members.entry(key).or_insert(id);
        self.stats.foreign_types_imported += 1;
        trace!(name = %info.name, assembly = provider.assembly_name(), "imported foreign type");
        Some(id)
    }

    /// Whether some source assembly may see `assembly`'s internals.
    fn internals_wanted(&self, assembly: AssemblyId) -> bool {
        self.config.import_private_members
            || self.directory.ids().any(|requesting| {
                requesting != assembly
                    && self.directory.get(requesting).is_some_and(|a| !a.is_foreign())
                    && self.directory.internals_visible(Some(assembly), requesting)
            })
    }

    /// Imports the members and nested types of a foreign type. The public
    /// pass runs once; the non-public pass runs once as well, when forced or
    /// when some source assembly can see the binary's internals.
    pub(crate) fn ensure_foreign_members(&mut self, ty: SymbolId, non_public: bool) {
        let Origin::ForeignType { assembly, handle } = self.symbol(ty).origin else {
            return;
        };
        let state = self.symbol(ty).import_state;
        let wants_non_public = non_public || self.internals_wanted(assembly);
        if state.public && (state.non_public || !wants_non_public) {
            return;
        }
        let Some(provider) = self.directory.provider(assembly) else {
            return;
        };
        if !state.public {
            self.symbol_mut(ty).import_state.public = true;
            self.import_members(ty, assembly, handle, &provider, Pass::Public);
        }
        if wants_non_public && !state.non_public {
            self.symbol_mut(ty).import_state.non_public = true;
            self.import_members(ty, assembly, handle, &provider, Pass::NonPublic);
        }
    }

    fn import_members(
        &mut self,
        ty: SymbolId,
        assembly: AssemblyId,
        handle: ForeignTypeHandle,
        provider: &Rc<dyn MetadataProvider>,
        pass: Pass,
    ) {
        let Some(info) = provider.type_info(handle) else {
            return;
        };
        let import_private = self.config.import_private_members;
        for &nested in &info.nested {
            let admitted = provider
                .type_info(nested)
                .is_some_and(|n| pass.admits(n.visibility, import_private));
            if admitted {
                self.import_foreign_type(assembly, nested);
            }
        }
        for &member in &info.members {
            let Some(member_info) = provider.member_info(member) else {
                self.record_import_failure(provider.assembly_name(), format!("member handle {}", member.0));
                continue;
            };
            if pass.admits(member_info.visibility, import_private) {
                self.import_foreign_member(ty, assembly, member, member_info);
            }
        }
    }

    fn import_foreign_member(
        &mut self,
        owner: SymbolId,
        assembly: AssemblyId,
        handle: ForeignMemberHandle,
        info: &ForeignMemberInfo,
    ) -> SymbolId {
        if let Some(&existing) = self.foreign_members.get(&(assembly, handle)) {
            return existing;
        }
        let owner_kind = self.symbol(owner).kind;
        let (kind, name) = match info.kind {
            ForeignMemberKind::Field => (SymbolKind::Field, info.name.clone()),
            ForeignMemberKind::Constant if owner_kind == SymbolKind::Enum => (SymbolKind::EnumMember, info.name.clone()),
            ForeignMemberKind::Constant => (SymbolKind::ConstantField, info.name.clone()),
            ForeignMemberKind::Property if !info.parameters.is_empty() => (SymbolKind::Indexer, SmolStr::new_static("Item")),
            ForeignMemberKind::Property => (SymbolKind::Property, info.name.clone()),
            ForeignMemberKind::Event => (SymbolKind::Event, info.name.clone()),
            ForeignMemberKind::Method => (SymbolKind::Method, info.name.clone()),
            ForeignMemberKind::Constructor => (SymbolKind::Constructor, SmolStr::new_static(".ctor")),
        };
        let mut modifiers = Modifiers::empty();
        for (set, flag) in [
            (info.is_static || kind == SymbolKind::EnumMember, Modifiers::STATIC),
            (info.is_abstract, Modifiers::ABSTRACT),
            (info.is_virtual, Modifiers::VIRTUAL),
            (info.is_override, Modifiers::OVERRIDE),
        ] {
            if set {
                modifiers |= flag;
            }
        }
        let symbol = Symbol::new(kind, name.clone())
            .with_parent(owner)
            .with_origin(Origin::ForeignMember { assembly, handle })
            .with_assembly(Some(assembly))
            .with_access(map_visibility(info.visibility))
            .with_modifiers(modifiers);
        let id = self.alloc_symbol(symbol);
        self.foreign_members.insert((assembly, handle), id);

        for (position, param_name) in info.generic_params.iter().enumerate() {
            let param = Symbol::new(SymbolKind::TypeParameter, param_name.clone())
                .with_parent(id)
                .with_assembly(Some(assembly))
                .with_shape(Shape::TypeParameter {
                    position: position as u32,
                });
            let param = self.alloc_symbol(param);
            self.symbol_mut(id).type_parameters.push(param);
        }
        for (index, param) in info.parameters.iter().enumerate() {
            let mut modifiers = Modifiers::empty();
            for (set, flag) in [
                (param.is_params, Modifiers::PARAMS),
                (param.is_optional, Modifiers::OPTIONAL),
                (param.is_ref, Modifiers::REF),
                (param.is_out, Modifiers::OUT),
                (index == 0 && info.is_extension, Modifiers::THIS),
            ] {
                if set {
                    modifiers |= flag;
                }
            }
            let symbol = Symbol::new(SymbolKind::Parameter, param.name.clone())
                .with_parent(id)
                .with_origin(Origin::ForeignParameter {
                    assembly,
                    member: handle,
                    index: index as u32,
                })
                .with_assembly(Some(assembly))
                .with_modifiers(modifiers);
            let symbol = self.alloc_symbol(symbol);
            self.symbol_mut(id).parameters.push(symbol);
        }

        self.insert_foreign_member(owner, id, kind, &name);
        self.stats.foreign_members_imported += 1;
        id
    }

    /// Files an imported member under its key; methods of one name share a
    /// group. A clash with a different kind keeps the first entry.
    fn insert_foreign_member(&mut self, owner: SymbolId, member: SymbolId, kind: SymbolKind, name: &str) {
        let key = if kind.is_method() {
            SmolStr::new(name)
        } else {
            member_key(name, 0)
        };
        let Some(existing) = self.symbol(owner).members.get(&key).copied() else {
            self.symbol_mut(owner).members.insert(key, member);
            return;
        };
        if !kind.is_method() {
            return;
        }
        match self.symbol(existing).kind {
            SymbolKind::MethodGroup => self.symbol_mut(existing).overloads.push(member),
            other if other == kind => {
                let assembly = self.symbol(owner).assembly;
                let group = Symbol::new(SymbolKind::MethodGroup, name)
                    .with_parent(owner)
                    .with_assembly(assembly);
                let group = self.alloc_symbol(group);
                self.symbol_mut(group).overloads = vec![existing, member];
                self.symbol_mut(owner).members.insert(key, group);
            }
            _ => {}
        }
    }

    // ========================================================================
    // SIGNATURES
    // ========================================================================

    /// Translates a signature type. `type_context` supplies class type
    /// parameters, `method_context` method type parameters.
    pub(crate) fn import_type_ref(
        &mut self,
        assembly: AssemblyId,
        ty: &ForeignTypeRef,
        type_context: Option<SymbolId>,
        method_context: Option<SymbolId>,
    ) -> SymbolId {
        let unknown = self.sentinel(Sentinel::UnknownType);
        match ty {
            ForeignTypeRef::Type(handle) => self.import_foreign_type(assembly, *handle).unwrap_or(unknown),
            ForeignTypeRef::External {
                assembly: target,
                full_name,
            } => self.import_external(target, full_name),
            ForeignTypeRef::GenericParam(position) => type_context
                .and_then(|t| self.type_parameter_at(t, *position as usize))
                .unwrap_or(unknown),
            ForeignTypeRef::MethodGenericParam(position) => method_context
                .and_then(|m| self.symbol(m).type_parameters.get(*position as usize).copied())
                .unwrap_or(unknown),
            ForeignTypeRef::Array(element, rank) => {
                let element = self.import_type_ref(assembly, element, type_context, method_context);
                if element == unknown {
                    return unknown;
                }
                self.array_of(element, *rank)
            }
            ForeignTypeRef::Generic(definition, args) => {
                let definition = self.import_type_ref(assembly, definition, type_context, method_context);
                if definition == unknown {
                    return unknown;
                }
                let args: Vec<SymbolId> = args
                    .iter()
                    .map(|a| self.import_type_ref(assembly, a, type_context, method_context))
                    .collect();
                if self.is_nullable_definition(definition) && args.len() == 1 {
                    self.nullable_of(args[0])
                } else {
                    self.construct_type(definition, &args)
                }
            }
        }
    }

    /// Class type parameter by position, searching declaring types outward.
    fn type_parameter_at(&self, ty: SymbolId, position: usize) -> Option<SymbolId> {
        let mut current = Some(self.definition_root(ty));
        while let Some(t) = current {
            let symbol = self.symbol(t);
            if !symbol.kind.is_type() {
                return None;
            }
            if let Some(&param) = symbol.type_parameters.get(position) {
                return Some(param);
            }
            current = symbol.parent;
        }
        None
    }

    fn import_external(&mut self, assembly: &str, full_name: &str) -> SymbolId {
        let cache_key = SmolStr::new(format!("{assembly}|{full_name}"));
        if let Some(&cached) = self.external_types.get(&cache_key) {
            return cached;
        }
        let preferred = self.directory.by_name(assembly);
        let mut candidates: Vec<AssemblyId> = preferred.into_iter().collect();
        candidates.extend(self.directory.foreign_ids().into_iter().filter(|&a| Some(a) != preferred));
        for candidate in candidates {
            let Some(provider) = self.directory.provider(candidate) else {
                continue;
            };
            if let Some(handle) = provider.find_type(full_name) {
                if let Some(ty) = self.import_foreign_type(candidate, handle) {
                    self.external_types.insert(cache_key, ty);
                    return ty;
                }
            }
        }
        self.record_import_failure(assembly, format!("type {full_name}"));
        let unknown = self.sentinel(Sentinel::UnknownType);
        self.external_types.insert(cache_key, unknown);
        unknown
    }

    pub(crate) fn is_nullable_definition(&self, ty: SymbolId) -> bool {
        let symbol = self.symbol(ty);
        symbol.name == "Nullable"
            && symbol.type_parameters.len() == 1
            && symbol.origin.is_foreign()
            && symbol.parent.is_some_and(|p| self.namespace_path(p) == "System")
    }

    /// Declared type of a foreign member or parameter.
    pub(crate) fn foreign_symbol_type(&mut self, sym: SymbolId) -> Option<SymbolId> {
        let symbol = self.symbol(sym);
        let (assembly, member, index) = match symbol.origin {
            Origin::ForeignMember { assembly, handle } => (assembly, handle, None),
            Origin::ForeignParameter { assembly, member, index } => (assembly, member, Some(index as usize)),
            _ => return None,
        };
        let method = match index {
            Some(_) => symbol.parent?,
            None => sym,
        };
        let owner = self.symbol(method).parent;
        if self.symbol(method).kind == SymbolKind::Constructor && index.is_none() {
            return owner;
        }
        let provider = self.directory.provider(assembly)?;
        let info = provider.member_info(member)?;
        let ty = match index {
            Some(i) => &info.parameters.get(i)?.ty,
            None => &info.ty,
        };
        Some(self.import_type_ref(assembly, ty, owner, Some(method)))
    }

    /// Declared base and interfaces of a foreign type.
    pub(crate) fn foreign_supertypes(&mut self, ty: SymbolId) -> (Option<SymbolId>, Vec<SymbolId>) {
        let Origin::ForeignType { assembly, handle } = self.symbol(ty).origin else {
            return (None, Vec::new());
        };
        let Some(provider) = self.directory.provider(assembly) else {
            return (None, Vec::new());
        };
        let Some(info) = provider.type_info(handle) else {
            return (None, Vec::new());
        };
        let unknown = self.sentinel(Sentinel::UnknownType);
        let base = match &info.base {
            Some(base) => Some(self.import_type_ref(assembly, base, Some(ty), None)).filter(|&b| b != unknown),
            None if info.kind == ForeignTypeKind::Interface => None,
            None => {
                let object = self.object_type();
                (object != ty && object != unknown).then_some(object)
            }
        };
        let interfaces = info
            .interfaces
            .iter()
            .map(|i| self.import_type_ref(assembly, i, Some(ty), None))
            .filter(|&i| i != unknown)
            .collect();
        (base, interfaces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::metadata::{ForeignTypeInfo, MetadataBuilder};
    use crate::project::ProjectConfig;

    fn widgets(internals_to: Option<&str>) -> Rc<dyn MetadataProvider> {
        let mut b = MetadataBuilder::new("Widgets");
        if let Some(name) = internals_to {
            b.internals_visible_to(name);
        }
        let int = ForeignTypeRef::external("mscorlib", "System.Int32");
        let ty = b.add_type(ForeignTypeInfo::class("Acme", "Widget"));
        b.add_member(ty, ForeignMemberInfo::property("Size", int.clone()));
        b.add_member(
            ty,
            ForeignMemberInfo::field("secret", int.clone()).with_visibility(ForeignVisibility::Assembly),
        );
        b.add_member(ty, ForeignMemberInfo::method("Resize", int.clone()));
        b.add_member(ty, ForeignMemberInfo::method("Resize", int.clone()).with_param("w", int.clone()));
        b.add_member(
            ty,
            ForeignMemberInfo::property("Item", int.clone()).with_param("index", int.clone()),
        );
        b.add_type(ForeignTypeInfo::class("", "Part").nested_in(ty));
        b.add_type(ForeignTypeInfo::new(ForeignTypeKind::Enum, "Acme", "Color"));
        Rc::new(b.finish())
    }

    #[test]
    fn test_namespace_lookup_imports_once() {
        let mut model = SemanticModel::default();
        model.add_foreign_assembly(widgets(None)).unwrap();
        let acme = model.find_name(model.global_namespace(), "Acme", 0, false).unwrap();
        let widget = model.find_name(acme, "Widget", 0, false).unwrap();
        assert_eq!(model.find_name(acme, "Widget", 0, false), Some(widget));
        assert_eq!(model.symbol(widget).kind, SymbolKind::Class);
        assert_eq!(model.namespace_path(acme), "Acme");
    }

    #[test]
    fn test_members_are_imported_lazily() {
        let mut model = SemanticModel::default();
        model.add_foreign_assembly(widgets(None)).unwrap();
        let widget = model.type_by_full_name("Acme.Widget").unwrap();
        assert!(model.symbol(widget).members.is_empty());

        let resize = model.find_name(widget, "Resize", 0, false).unwrap();
        assert_eq!(model.symbol(resize).kind, SymbolKind::MethodGroup);
        assert_eq!(model.symbol(resize).overloads().len(), 2);
        let indexer = model.find_name(widget, "Item", 0, false).unwrap();
        assert_eq!(model.symbol(indexer).kind, SymbolKind::Indexer);
        assert!(model.find_name(widget, "Part", 0, true).is_some());
        assert!(model.find_name(widget, "secret", 0, false).is_none());

        let size = model.find_name(widget, "Size", 0, false).unwrap();
        let int = model.builtin_type("int");
        assert_eq!(model.foreign_symbol_type(size), Some(int));
    }

    #[test]
    fn test_internal_members_when_visible() {
        let mut model = SemanticModel::new(ProjectConfig::new("Widgets.Tests"));
        model.add_foreign_assembly(widgets(Some("Widgets.Tests"))).unwrap();
        let widget = model.type_by_full_name("Acme.Widget").unwrap();
        let secret = model.find_name(widget, "secret", 0, false).unwrap();
        assert_eq!(model.symbol(secret).access, Accessibility::Internal);
    }

    #[test]
    fn test_missing_external_type_is_recorded() {
        let mut b = MetadataBuilder::new("Broken");
        let ty = b.add_type(ForeignTypeInfo::class("Broken", "Thing"));
        b.add_member(
            ty,
            ForeignMemberInfo::field("gone", ForeignTypeRef::external("Elsewhere", "Nowhere.Missing")),
        );
        let mut model = SemanticModel::default();
        model.add_foreign_assembly(Rc::new(b.finish())).unwrap();
        let thing = model.type_by_full_name("Broken.Thing").unwrap();
        let gone = model.find_name(thing, "gone", 0, false).unwrap();
        let ty = model.foreign_symbol_type(gone).unwrap();
        assert_eq!(model.symbol(ty).sentinel, Some(Sentinel::UnknownType));
        assert_eq!(model.import_failures().len(), 1);
        assert_eq!(model.stats().foreign_import_failures, 1);
    }

    #[test]
    fn test_visibility_mapping() {
        assert_eq!(map_visibility(ForeignVisibility::Assembly), Accessibility::Internal);
        assert_eq!(map_visibility(ForeignVisibility::FamilyOrAssembly), Accessibility::ProtectedInternal);
        assert_eq!(map_visibility(ForeignVisibility::FamilyAndAssembly), Accessibility::Protected);
    }
}
