//! The semantic model: one explicit registry owning every table.
//!
//! Symbols, declarations and scopes live in arenas addressed by ids. Files
//! are parsed into shared trees; indexing a file walks its tree once and
//! registers scopes and declarations (see [`super::collect`]). Everything
//! else (types of symbols, base types, foreign members, resolved references)
//! is computed on demand and memoized against [`SemanticModel::version`].

use std::path::PathBuf;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use tracing::{debug, info};

use crate::base::FileId;
use crate::project::ProjectConfig;
use crate::syntax::{NodeId, NodeRef, SyntaxTree, parse};

use super::builtins;
use super::declarations::Declaration;
use super::directory::Directory;
use super::error::ResolveError;
use super::ids::{AssemblyId, DeclId, ScopeId, SymbolId};
use super::input::{SourceFile, SourceRoot};
use super::metadata::{ForeignMemberHandle, ForeignTypeHandle, MetadataProvider};
use super::scope::Scope;
use super::symbols::{Memo, Origin, Sentinel, Symbol, SymbolKind};

/// Counters describing the work the model has done since the last reset.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    pub resolutions: u64,
    pub memo_hits: u64,
    pub stale_recomputes: u64,
    pub cycle_guards: u64,
    pub foreign_types_imported: u64,
    pub foreign_members_imported: u64,
    pub foreign_import_failures: u64,
}

/// A metadata reference that could not be turned into a symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportFailure {
    pub assembly: SmolStr,
    pub what: String,
}

pub struct SemanticModel {
    pub(crate) config: ProjectConfig,
    pub(crate) files: SourceRoot,
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) declarations: Vec<Option<Declaration>>,
    pub(crate) scopes: Vec<Scope>,
    /// Scope attached to a tree node.
    pub(crate) node_scopes: FxHashMap<NodeRef, ScopeId>,
    /// Declaration whose name is the given leaf.
    pub(crate) node_decls: FxHashMap<NodeRef, DeclId>,
    pub(crate) file_decls: FxHashMap<FileId, Vec<DeclId>>,
    /// Memoized node resolutions.
    pub(crate) references: FxHashMap<NodeRef, Memo>,
    pub(crate) directory: Directory,
    pub(crate) foreign_types: FxHashMap<(AssemblyId, ForeignTypeHandle), SymbolId>,
    pub(crate) foreign_members: FxHashMap<(AssemblyId, ForeignMemberHandle), SymbolId>,
    /// Cross-binary type references by `assembly|full name`.
    pub(crate) external_types: FxHashMap<SmolStr, SymbolId>,
    pub(crate) builtins: FxHashMap<&'static str, SymbolId>,
    pub(crate) sentinels: Vec<SymbolId>,
    pub(crate) null_type: SymbolId,
    pub(crate) global: SymbolId,
    pub(crate) main_assembly: AssemblyId,
    pub(crate) version: u64,
    pub(crate) stats: ResolutionStats,
    /// Tied candidates of call sites that resolved to the ambiguity sentinel.
    pub(crate) ambiguities: FxHashMap<NodeRef, Vec<SymbolId>>,
    /// Declarations that collided with an existing symbol of the same key.
    pub(crate) duplicates: Vec<(DeclId, SymbolId)>,
    /// Symbols whose type depends on itself.
    pub(crate) recursive: FxHashSet<SymbolId>,
    pub(crate) import_failures: Vec<ImportFailure>,
}

impl std::fmt::Debug for SemanticModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticModel")
            .field("files", &self.files.len())
            .field("symbols", &self.symbols.len())
            .field("scopes", &self.scopes.len())
            .field("version", &self.version)
            .finish()
    }
}

impl Default for SemanticModel {
    fn default() -> Self {
        Self::new(ProjectConfig::default())
    }
}

impl SemanticModel {
    /// Creates a session with the core library registered and an empty
    /// main source assembly named after the configuration.
    pub fn new(config: ProjectConfig) -> Self {
        let mut model = Self {
            config,
            files: SourceRoot::new(),
            symbols: Vec::new(),
            declarations: Vec::new(),
            scopes: Vec::new(),
            node_scopes: FxHashMap::default(),
            node_decls: FxHashMap::default(),
            file_decls: FxHashMap::default(),
            references: FxHashMap::default(),
            directory: Directory::new(),
            foreign_types: FxHashMap::default(),
            foreign_members: FxHashMap::default(),
            external_types: FxHashMap::default(),
            builtins: FxHashMap::default(),
            sentinels: Vec::new(),
            null_type: SymbolId::from_raw(0),
            global: SymbolId::from_raw(0),
            main_assembly: AssemblyId::from_raw(0),
            version: 1,
            stats: ResolutionStats::default(),
            ambiguities: FxHashMap::default(),
            duplicates: Vec::new(),
            recursive: FxHashSet::default(),
            import_failures: Vec::new(),
        };
        model.init();
        model
    }

    fn init(&mut self) {
        for sentinel in Sentinel::ALL {
            let mut symbol = Symbol::new(sentinel.kind(), sentinel.name());
            symbol.sentinel = Some(sentinel);
            let id = self.alloc_symbol(symbol);
            self.sentinels.push(id);
        }
        self.null_type = self.alloc_symbol(Symbol::new(SymbolKind::Class, "null"));
        self.global = self.alloc_symbol(Symbol::new(SymbolKind::Namespace, ""));

        let core = self
            .directory
            .add_foreign(Rc::new(builtins::core_library()));
        if let Some(core) = core {
            self.directory.set_core(core);
        }
        let name = self.config.assembly_name.clone();
        let internals = self.config.internals_visible_to.clone();
        if let Some(main) = self.directory.add_source(&name, &internals) {
            self.main_assembly = main;
        }
        debug!(assembly = %name, "semantic model initialized");
    }

    /// Drops every table and starts a fresh session with the same
    /// configuration. Referenced binaries and files must be added again.
    pub fn reset(&mut self) {
        info!(version = self.version, "resetting semantic model");
        *self = Self::new(self.config.clone());
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn stats(&self) -> ResolutionStats {
        self.stats
    }

    /// Monotonic counter advanced by every change to trees or declarations.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn main_assembly(&self) -> AssemblyId {
        self.main_assembly
    }

    pub fn global_namespace(&self) -> SymbolId {
        self.global
    }

    pub fn sentinel(&self, sentinel: Sentinel) -> SymbolId {
        let index = Sentinel::ALL
            .iter()
            .position(|&s| s == sentinel)
            .unwrap_or_default();
        self.sentinels[index]
    }

    pub fn null_type(&self) -> SymbolId {
        self.null_type
    }

    // ========================================================================
    // ARENAS
    // ========================================================================

    pub(crate) fn alloc_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId::from_raw(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub(crate) fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn declaration(&self, id: DeclId) -> Option<&Declaration> {
        self.declarations.get(id.index())?.as_ref()
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.index())
    }

    pub(crate) fn is_sentinel(&self, id: SymbolId) -> bool {
        self.symbol(id).is_sentinel()
    }

    // ========================================================================
    // FILES
    // ========================================================================

    pub fn files(&self) -> &SourceRoot {
        &self.files
    }

    pub fn file(&self, file: FileId) -> Option<&SourceFile> {
        self.files.get(file)
    }

    pub fn tree(&self, file: FileId) -> Option<Rc<SyntaxTree>> {
        self.files.get(file).map(|f| f.tree.clone())
    }

    /// Parses `text` and indexes it into the main assembly.
    pub fn add_file(&mut self, path: impl Into<PathBuf>, text: &str) -> FileId {
        let assembly = self.main_assembly;
        self.add_parsed_file(path, text, parse(text), assembly)
    }

    /// Parses `text` and indexes it into `assembly`.
    pub fn add_file_to(
        &mut self,
        assembly: AssemblyId,
        path: impl Into<PathBuf>,
        text: &str,
    ) -> Result<FileId, ResolveError> {
        if self.directory.get(assembly).is_none_or(|a| a.is_foreign()) {
            return Err(ResolveError::UnknownAssembly(assembly));
        }
        Ok(self.add_parsed_file(path, text, parse(text), assembly))
    }

    /// Indexes a tree parsed elsewhere, for example on a worker thread.
    pub fn add_parsed_file(
        &mut self,
        path: impl Into<PathBuf>,
        text: &str,
        tree: SyntaxTree,
        assembly: AssemblyId,
    ) -> FileId {
        let file = self.files.insert(SourceFile::new(path, text, tree, assembly));
        self.index_file(file);
        self.bump_version();
        file
    }

    /// Replaces a file's text, reparsing and reindexing it.
    pub fn update_file(&mut self, file: FileId, text: &str) -> Result<(), ResolveError> {
        self.unindex_file(file)?;
        let source = self
            .files
            .get_mut(file)
            .ok_or(ResolveError::UnknownFile(file))?;
        *source = SourceFile::new(source.path.clone(), text, parse(text), source.assembly);
        self.index_file(file);
        self.bump_version();
        Ok(())
    }

    pub fn remove_file(&mut self, file: FileId) -> Result<(), ResolveError> {
        self.unindex_file(file)?;
        self.files.remove(file);
        self.bump_version();
        Ok(())
    }

    /// Mutates a file's tree in place (live editing). Declarations under
    /// detached nodes become invalid and are pruned lazily; new subtrees
    /// must be registered with [`SemanticModel::index_subtree`].
    pub fn edit_tree<R>(
        &mut self,
        file: FileId,
        edit: impl FnOnce(&mut SyntaxTree) -> R,
    ) -> Result<R, ResolveError> {
        let source = self
            .files
            .get_mut(file)
            .ok_or(ResolveError::UnknownFile(file))?;
        let result = edit(Rc::make_mut(&mut source.tree));
        self.bump_version();
        Ok(result)
    }

    /// Registers scopes and declarations of a subtree grafted into a live tree.
    pub fn index_subtree(&mut self, file: FileId, node: NodeId) -> Result<(), ResolveError> {
        let tree = self.tree(file).ok_or(ResolveError::UnknownFile(file))?;
        let at = NodeRef::new(file, node);
        let parent = tree.parent(node).ok_or(ResolveError::UnknownNode(at))?;
        let scope = self
            .enclosing_scope(NodeRef::new(file, parent))
            .ok_or(ResolveError::MissingScope(at))?;
        self.collect_subtree(file, node, scope);
        self.bump_version();
        Ok(())
    }

    fn unindex_file(&mut self, file: FileId) -> Result<(), ResolveError> {
        if !self.files.contains(file) {
            return Err(ResolveError::UnknownFile(file));
        }
        let decls = self.file_decls.remove(&file).unwrap_or_default();
        // Members before their owners, so groups and types empty out cleanly.
        for decl in decls.into_iter().rev() {
            let _ = self.unbind_declaration(decl);
        }
        self.node_scopes.retain(|node, _| node.file != file);
        self.node_decls.retain(|node, _| node.file != file);
        self.references.retain(|node, _| node.file != file);
        self.ambiguities.retain(|node, _| node.file != file);
        Ok(())
    }

    // ========================================================================
    // ASSEMBLIES
    // ========================================================================

    /// Registers an additional source assembly that the main assembly references.
    pub fn add_source_assembly(
        &mut self,
        name: &str,
        internals_visible_to: &[&str],
    ) -> Result<AssemblyId, ResolveError> {
        let internals: Vec<SmolStr> = internals_visible_to.iter().map(|s| SmolStr::new(s)).collect();
        let id = self
            .directory
            .add_source(name, &internals)
            .ok_or_else(|| ResolveError::DuplicateAssembly(name.into()))?;
        self.directory.add_reference(self.main_assembly, id);
        self.bump_version();
        Ok(id)
    }

    /// Registers a referenced binary. The main assembly references it when
    /// the configuration lists its name, or when the list is empty.
    pub fn add_foreign_assembly(
        &mut self,
        provider: Rc<dyn MetadataProvider>,
    ) -> Result<AssemblyId, ResolveError> {
        let name = SmolStr::new(provider.assembly_name());
        let id = self
            .directory
            .add_foreign(provider)
            .ok_or_else(|| ResolveError::DuplicateAssembly(name.clone()))?;
        if self.config.references.is_empty() || self.config.references.contains(&name) {
            self.directory.add_reference(self.main_assembly, id);
        }
        debug!(assembly = %name, "registered foreign assembly");
        self.bump_version();
        Ok(id)
    }

    pub fn add_reference(&mut self, from: AssemblyId, to: AssemblyId) -> Result<(), ResolveError> {
        for id in [from, to] {
            if self.directory.get(id).is_none() {
                return Err(ResolveError::UnknownAssembly(id));
            }
        }
        self.directory.add_reference(from, to);
        self.bump_version();
        Ok(())
    }

    /// Ambiguous call sites recorded so far, with their tied candidates.
    pub fn ambiguity_candidates(&self, node: NodeRef) -> &[SymbolId] {
        self.ambiguities.get(&node).map_or(&[], Vec::as_slice)
    }

    pub fn import_failures(&self) -> &[ImportFailure] {
        &self.import_failures
    }

    pub(crate) fn record_import_failure(&mut self, assembly: &str, what: String) {
        self.stats.foreign_import_failures += 1;
        tracing::warn!(assembly, what = %what, "foreign import failed");
        self.import_failures.push(ImportFailure {
            assembly: assembly.into(),
            what,
        });
    }

    pub(crate) fn is_foreign_symbol(&self, id: SymbolId) -> bool {
        matches!(self.symbol(id).origin, Origin::ForeignType { .. } | Origin::ForeignMember { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_model_has_sentinels_and_core() {
        let model = SemanticModel::default();
        for sentinel in Sentinel::ALL {
            let id = model.sentinel(sentinel);
            assert_eq!(model.symbol(id).sentinel, Some(sentinel));
        }
        assert!(model.directory().core().is_some());
        assert_eq!(model.symbol(model.global_namespace()).kind, SymbolKind::Namespace);
    }

    #[test]
    fn test_file_lifecycle_bumps_version() {
        let mut model = SemanticModel::default();
        let v0 = model.version();
        let file = model.add_file("a.cs", "class A {}");
        assert!(model.version() > v0);
        let v1 = model.version();
        model.update_file(file, "class B {}").unwrap();
        assert!(model.version() > v1);
        model.remove_file(file).unwrap();
        assert!(model.file(file).is_none());
        assert_eq!(model.remove_file(file), Err(ResolveError::UnknownFile(file)));
    }

    #[test]
    fn test_reset_clears_files() {
        let mut model = SemanticModel::default();
        model.add_file("a.cs", "class A {}");
        model.reset();
        assert!(model.files().is_empty());
    }

    #[test]
    fn test_duplicate_assembly_is_rejected() {
        let mut model = SemanticModel::default();
        model.add_source_assembly("Lib", &[]).unwrap();
        assert!(matches!(
            model.add_source_assembly("Lib", &[]),
            Err(ResolveError::DuplicateAssembly(_))
        ));
    }
}
