//! Assembly directory.
//!
//! Registry of compilation units: source assemblies (built from parsed
//! files) and foreign assemblies (backed by a [`MetadataProvider`]). Each
//! foreign assembly carries a lazily built index from namespace name to the
//! top-level types it defines, which is what lets namespace lookups import
//! foreign types on first use.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::ids::AssemblyId;
use super::metadata::{ForeignTypeHandle, MetadataProvider};
use super::symbols::{AccessMask, Accessibility};

/// Namespace full name → (metadata type name, handle).
pub(crate) type NamespaceIndex = FxHashMap<SmolStr, Vec<(SmolStr, ForeignTypeHandle)>>;

pub struct Assembly {
    pub name: SmolStr,
    pub(crate) provider: Option<Rc<dyn MetadataProvider>>,
    pub(crate) references: Vec<AssemblyId>,
    pub(crate) internals_visible_to: Vec<SmolStr>,
    pub(crate) namespace_index: Option<Rc<NamespaceIndex>>,
}

impl Assembly {
    pub fn is_foreign(&self) -> bool {
        self.provider.is_some()
    }

    pub fn references(&self) -> &[AssemblyId] {
        &self.references
    }

    pub fn internals_visible_to(&self) -> &[SmolStr] {
        &self.internals_visible_to
    }
}

impl fmt::Debug for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembly")
            .field("name", &self.name)
            .field("foreign", &self.is_foreign())
            .field("references", &self.references)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct Directory {
    assemblies: Vec<Assembly>,
    by_name: IndexMap<SmolStr, AssemblyId>,
    core: Option<AssemblyId>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an assembly. Returns `None` if the name is taken.
    fn add(&mut self, assembly: Assembly) -> Option<AssemblyId> {
        if self.by_name.contains_key(&assembly.name) {
            return None;
        }
        let id = AssemblyId::from_raw(self.assemblies.len() as u32);
        self.by_name.insert(assembly.name.clone(), id);
        self.assemblies.push(assembly);
        Some(id)
    }

    pub fn add_source(&mut self, name: &str, internals_visible_to: &[SmolStr]) -> Option<AssemblyId> {
        self.add(Assembly {
            name: name.into(),
            provider: None,
            references: Vec::new(),
            internals_visible_to: internals_visible_to.to_vec(),
            namespace_index: None,
        })
    }

    pub fn add_foreign(&mut self, provider: Rc<dyn MetadataProvider>) -> Option<AssemblyId> {
        let name = SmolStr::new(provider.assembly_name());
        let internals = provider.internals_visible_to().to_vec();
        self.add(Assembly {
            name,
            provider: Some(provider),
            references: Vec::new(),
            internals_visible_to: internals,
            namespace_index: None,
        })
    }

    pub(crate) fn set_core(&mut self, id: AssemblyId) {
        self.core = Some(id);
    }

    pub fn core(&self) -> Option<AssemblyId> {
        self.core
    }

    pub fn add_reference(&mut self, from: AssemblyId, to: AssemblyId) {
        if let Some(asm) = self.assemblies.get_mut(from.index()) {
            if from != to && !asm.references.contains(&to) {
                asm.references.push(to);
            }
        }
    }

    pub fn get(&self, id: AssemblyId) -> Option<&Assembly> {
        self.assemblies.get(id.index())
    }

    pub fn by_name(&self, name: &str) -> Option<AssemblyId> {
        self.by_name.get(name).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = AssemblyId> + '_ {
        (0..self.assemblies.len() as u32).map(AssemblyId::from_raw)
    }

    pub fn foreign_ids(&self) -> Vec<AssemblyId> {
        self.ids()
            .filter(|&id| self.get(id).is_some_and(Assembly::is_foreign))
            .collect()
    }

    pub(crate) fn provider(&self, id: AssemblyId) -> Option<Rc<dyn MetadataProvider>> {
        self.get(id)?.provider.clone()
    }

    pub(crate) fn namespace_index(&self, id: AssemblyId) -> Option<Rc<NamespaceIndex>> {
        self.get(id)?.namespace_index.clone()
    }

    /// Builds the namespace index of a foreign assembly if it is missing.
    /// Returns the freshly built index, or `None` if it already existed.
    pub(crate) fn build_namespace_index(&mut self, id: AssemblyId) -> Option<Rc<NamespaceIndex>> {
        let asm = self.assemblies.get_mut(id.index())?;
        if asm.namespace_index.is_some() {
            return None;
        }
        let provider = asm.provider.clone()?;
        let mut index = NamespaceIndex::default();
        for handle in provider.type_handles() {
            let Some(info) = provider.type_info(handle) else {
                continue;
            };
            if info.declaring_type.is_some() {
                continue;
            }
            index
                .entry(info.namespace.clone())
                .or_default()
                .push((info.metadata_name(), handle));
        }
        let index = Rc::new(index);
        asm.namespace_index = Some(index.clone());
        Some(index)
    }

    /// Whether code in `requesting` may see internal members of `declaring`.
    pub fn internals_visible(&self, declaring: Option<AssemblyId>, requesting: AssemblyId) -> bool {
        let Some(declaring) = declaring else {
            return true;
        };
        if declaring == requesting {
            return true;
        }
        match (self.get(declaring), self.get(requesting)) {
            (Some(decl), Some(req)) => decl.internals_visible_to.iter().any(|n| *n == req.name),
            _ => false,
        }
    }

    /// Whether types of `target` are reachable from `from`: itself, the core
    /// library, or a direct reference.
    pub fn is_referenced(&self, from: AssemblyId, target: Option<AssemblyId>) -> bool {
        let Some(target) = target else {
            return true;
        };
        from == target
            || self.core == Some(target)
            || self.get(from).is_some_and(|a| a.references.contains(&target))
    }

    /// Widens `mask` with the internal levels when `requesting` can see
    /// `declaring`'s internals.
    pub fn widen(&self, mask: AccessMask, declaring: Option<AssemblyId>, requesting: AssemblyId) -> AccessMask {
        if self.internals_visible(declaring, requesting) {
            mask | AccessMask::INTERNAL | AccessMask::PROTECTED_INTERNAL
        } else {
            mask
        }
    }

    /// Access check for code outside the declaring type.
    pub fn is_accessible_from(
        &self,
        access: Accessibility,
        declaring: Option<AssemblyId>,
        requesting: AssemblyId,
    ) -> bool {
        match access {
            Accessibility::Public => true,
            Accessibility::Internal | Accessibility::ProtectedInternal => {
                self.internals_visible(declaring, requesting)
            }
            Accessibility::Protected | Accessibility::Private => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::metadata::{ForeignTypeInfo, MetadataBuilder};

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut dir = Directory::new();
        assert!(dir.add_source("App", &[]).is_some());
        assert!(dir.add_source("App", &[]).is_none());
    }

    #[test]
    fn test_internals_visibility() {
        let mut dir = Directory::new();
        let lib = dir.add_source("Lib", &[SmolStr::new("Lib.Tests")]).unwrap();
        let tests = dir.add_source("Lib.Tests", &[]).unwrap();
        let app = dir.add_source("App", &[]).unwrap();
        assert!(dir.internals_visible(Some(lib), lib));
        assert!(dir.internals_visible(Some(lib), tests));
        assert!(!dir.internals_visible(Some(lib), app));
        let widened = dir.widen(AccessMask::PUBLIC, Some(lib), tests);
        assert!(widened.contains(AccessMask::INTERNAL));
        assert_eq!(dir.widen(AccessMask::PUBLIC, Some(lib), app), AccessMask::PUBLIC);
    }

    #[test]
    fn test_namespace_index_is_built_once() {
        let mut b = MetadataBuilder::new("Widgets");
        let outer = b.add_type(ForeignTypeInfo::class("Acme", "Panel"));
        b.add_type(ForeignTypeInfo::class("", "Slot").nested_in(outer));
        b.add_type(ForeignTypeInfo::class("Acme.Util", "Pair").with_generic_params(&["A", "B"]));
        let mut dir = Directory::new();
        let id = dir.add_foreign(Rc::new(b.finish())).unwrap();

        let index = dir.build_namespace_index(id).unwrap();
        assert_eq!(index["Acme"].len(), 1);
        assert_eq!(index["Acme.Util"][0].0, "Pair`2");
        assert!(dir.build_namespace_index(id).is_none());
        assert!(dir.namespace_index(id).is_some());
    }

    #[test]
    fn test_references() {
        let mut dir = Directory::new();
        let app = dir.add_source("App", &[]).unwrap();
        let lib = dir.add_source("Lib", &[]).unwrap();
        let other = dir.add_source("Other", &[]).unwrap();
        dir.add_reference(app, lib);
        dir.add_reference(app, lib);
        assert_eq!(dir.get(app).unwrap().references(), &[lib]);
        assert!(dir.is_referenced(app, Some(lib)));
        assert!(!dir.is_referenced(app, Some(other)));
    }
}
