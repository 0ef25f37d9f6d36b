use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::base::FileId;
use crate::hir::{AssemblyId, ResolveError, SemanticModel};
use crate::syntax::{SyntaxTree, parse};

use super::ProjectConfig;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("directory not found: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to load {} file(s):\n  {}", .0.len(), join_errors(.0))]
    Files(Vec<LoadError>),
}

fn join_errors(errors: &[LoadError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n  ")
}

/// Loads source files from disk into a [`SemanticModel`].
///
/// Reading and parsing run on the rayon pool; indexing happens afterwards on
/// the calling thread, in path order, since the model is single-threaded.
pub struct WorkspaceLoader {
    extensions: Vec<String>,
}

impl WorkspaceLoader {
    pub fn new(config: &ProjectConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
        }
    }

    fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }

    /// Source files under `root`, sorted.
    pub fn collect_paths(&self, root: &Path) -> Result<Vec<PathBuf>, LoadError> {
        if !root.is_dir() {
            return Err(LoadError::NotADirectory(root.to_path_buf()));
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry?;
            if entry.file_type().is_file() && self.is_source_file(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Loads every source file under `root` into `assembly`.
    ///
    /// Files that fail to read are collected into [`LoadError::Files`]; the
    /// others stay loaded. Paths already known to the model are updated in
    /// place.
    pub fn load_directory(
        &self,
        root: &Path,
        model: &mut SemanticModel,
        assembly: AssemblyId,
    ) -> Result<Vec<FileId>, LoadError> {
        check_assembly(model, assembly)?;
        let paths = self.collect_paths(root)?;
        debug!(root = %root.display(), files = paths.len(), "loading workspace");

        let parsed: Vec<Result<(PathBuf, String, SyntaxTree), LoadError>> =
            paths.into_par_iter().map(read_and_parse).collect();

        let mut loaded = Vec::new();
        let mut errors = Vec::new();
        for result in parsed {
            match result {
                Ok((path, text, tree)) => loaded.push(install(model, path, &text, tree, assembly)?),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable source file");
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            Ok(loaded)
        } else {
            Err(LoadError::Files(errors))
        }
    }

    /// Loads a single file into `assembly`.
    pub fn load_file(
        &self,
        path: &Path,
        model: &mut SemanticModel,
        assembly: AssemblyId,
    ) -> Result<FileId, LoadError> {
        check_assembly(model, assembly)?;
        let (path, text, tree) = read_and_parse(path.to_path_buf())?;
        install(model, path, &text, tree, assembly)
    }
}

impl Default for WorkspaceLoader {
    fn default() -> Self {
        Self::new(&ProjectConfig::default())
    }
}

fn check_assembly(model: &SemanticModel, assembly: AssemblyId) -> Result<(), LoadError> {
    if model.directory().get(assembly).is_none_or(|a| a.is_foreign()) {
        return Err(ResolveError::UnknownAssembly(assembly).into());
    }
    Ok(())
}

fn read_and_parse(path: PathBuf) -> Result<(PathBuf, String, SyntaxTree), LoadError> {
    let text = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
        path: path.clone(),
        source,
    })?;
    let tree = parse(&text);
    Ok((path, text, tree))
}

fn install(
    model: &mut SemanticModel,
    path: PathBuf,
    text: &str,
    tree: SyntaxTree,
    assembly: AssemblyId,
) -> Result<FileId, LoadError> {
    match model.files().find_by_path(&path) {
        Some(file) => {
            model.update_file(file, text)?;
            Ok(file)
        }
        None => Ok(model.add_parsed_file(path, text, tree, assembly)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, text: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_collect_paths_filters_extensions() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.cs", "class A {}");
        write(dir.path(), "nested/b.cs", "class B {}");
        write(dir.path(), "notes.txt", "class C {}");

        let loader = WorkspaceLoader::default();
        let paths = loader.collect_paths(dir.path()).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.cs", "b.cs"]);
    }

    #[test]
    fn test_load_directory_indexes_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.cs", "namespace N { class A {} }");
        write(dir.path(), "b.cs", "namespace N { class B : A {} }");

        let mut model = SemanticModel::new(ProjectConfig::default());
        let main = model.main_assembly();
        let files = WorkspaceLoader::default()
            .load_directory(dir.path(), &mut model, main)
            .unwrap();
        assert_eq!(files.len(), 2);

        let global = model.global_namespace();
        let ns = model.symbol(global).member("N").unwrap();
        assert!(model.symbol(ns).member("A").is_some());
        assert!(model.symbol(ns).member("B").is_some());
    }

    #[test]
    fn test_reload_updates_existing_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.cs", "class A {}");

        let mut model = SemanticModel::new(ProjectConfig::default());
        let main = model.main_assembly();
        let loader = WorkspaceLoader::default();
        let first = loader.load_file(&dir.path().join("a.cs"), &mut model, main).unwrap();

        write(dir.path(), "a.cs", "class Renamed {}");
        let second = loader.load_file(&dir.path().join("a.cs"), &mut model, main).unwrap();
        assert_eq!(first, second);
        assert_eq!(model.files().len(), 1);
        let global = model.global_namespace();
        assert!(model.symbol(global).member("Renamed").is_some());
    }

    #[test]
    fn test_missing_directory() {
        let mut model = SemanticModel::new(ProjectConfig::default());
        let main = model.main_assembly();
        let err = WorkspaceLoader::default()
            .load_directory(Path::new("/definitely/not/here"), &mut model, main)
            .unwrap_err();
        assert!(matches!(err, LoadError::NotADirectory(_)));
    }

    #[test]
    fn test_rejects_unknown_assembly() {
        let dir = TempDir::new().unwrap();
        let mut model = SemanticModel::new(ProjectConfig::default());
        let err = WorkspaceLoader::default()
            .load_directory(dir.path(), &mut model, AssemblyId(999))
            .unwrap_err();
        assert!(matches!(err, LoadError::Resolve(ResolveError::UnknownAssembly(_))));
    }
}
