//! Source files known to a semantic model.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::base::{FileId, LineIndex};
use crate::syntax::SyntaxTree;

use super::ids::AssemblyId;

/// One parsed file. The tree is shared so resolution can read it while the
/// model mutates its own tables.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: Arc<str>,
    pub line_index: Rc<LineIndex>,
    pub tree: Rc<SyntaxTree>,
    pub assembly: AssemblyId,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: &str, tree: SyntaxTree, assembly: AssemblyId) -> Self {
        Self {
            path: path.into(),
            text: Arc::from(text),
            line_index: Rc::new(LineIndex::new(text)),
            tree: Rc::new(tree),
            assembly,
        }
    }
}

/// The set of all source files in a session, in insertion order.
#[derive(Clone, Debug, Default)]
pub struct SourceRoot {
    files: IndexMap<FileId, SourceFile>,
    next_id: u32,
}

impl SourceRoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file under a fresh id.
    pub fn insert(&mut self, file: SourceFile) -> FileId {
        let id = FileId::new(self.next_id);
        self.next_id += 1;
        self.files.insert(id, file);
        id
    }

    pub fn remove(&mut self, file: FileId) -> Option<SourceFile> {
        self.files.shift_remove(&file)
    }

    pub fn get(&self, file: FileId) -> Option<&SourceFile> {
        self.files.get(&file)
    }

    pub fn get_mut(&mut self, file: FileId) -> Option<&mut SourceFile> {
        self.files.get_mut(&file)
    }

    pub fn path(&self, file: FileId) -> Option<&Path> {
        self.files.get(&file).map(|f| f.path.as_path())
    }

    pub fn find_by_path(&self, path: &Path) -> Option<FileId> {
        self.files
            .iter()
            .find(|(_, f)| f.path == path)
            .map(|(&id, _)| id)
    }

    pub fn contains(&self, file: FileId) -> bool {
        self.files.contains_key(&file)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &SourceFile)> + '_ {
        self.files.iter().map(|(&id, f)| (id, f))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn file(path: &str) -> SourceFile {
        SourceFile::new(path, "class A {}", parse("class A {}"), AssemblyId::from_raw(0))
    }

    #[test]
    fn test_source_root_basic() {
        let mut root = SourceRoot::new();
        let a = root.insert(file("/src/a.cs"));
        let b = root.insert(file("/src/b.cs"));

        assert_eq!(root.len(), 2);
        assert_ne!(a, b);
        assert!(root.contains(a));
        assert_eq!(root.path(a), Some(Path::new("/src/a.cs")));
        assert_eq!(root.find_by_path(Path::new("/src/b.cs")), Some(b));
    }

    #[test]
    fn test_ids_are_not_reused_after_remove() {
        let mut root = SourceRoot::new();
        let a = root.insert(file("/src/a.cs"));
        assert!(root.remove(a).is_some());
        assert!(!root.contains(a));
        let b = root.insert(file("/src/a.cs"));
        assert_ne!(a, b);
    }
}
