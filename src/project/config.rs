//! Project configuration.

use smol_str::SmolStr;

/// Settings for the main source assembly of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProjectConfig {
    /// Name of the assembly the source files compile into.
    pub assembly_name: SmolStr,
    /// Names of referenced binaries. References to names that are never
    /// registered are ignored.
    pub references: Vec<SmolStr>,
    /// Assemblies allowed to see this project's internal members.
    pub internals_visible_to: Vec<SmolStr>,
    /// File extensions picked up by the workspace loader, without the dot.
    pub extensions: Vec<String>,
    /// Import private members of referenced binaries as well.
    pub import_private_members: bool,
    /// Upper bound on base-type chain walks, guarding cyclic hierarchies.
    pub max_base_depth: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            assembly_name: SmolStr::new_static("Main"),
            references: Vec::new(),
            internals_visible_to: Vec::new(),
            extensions: vec!["cs".to_string()],
            import_private_members: false,
            max_base_depth: 64,
        }
    }
}

impl ProjectConfig {
    pub fn new(assembly_name: &str) -> Self {
        Self {
            assembly_name: assembly_name.into(),
            ..Self::default()
        }
    }

    pub fn with_reference(mut self, name: &str) -> Self {
        self.references.push(name.into());
        self
    }

    pub fn with_internals_visible_to(mut self, name: &str) -> Self {
        self.internals_visible_to.push(name.into());
        self
    }

    /// Whether `path` has one of the configured source extensions.
    pub fn is_source_file(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_default_config() {
        let config = ProjectConfig::default();
        assert_eq!(config.assembly_name, "Main");
        assert_eq!(config.max_base_depth, 64);
        assert!(config.is_source_file(Path::new("src/a.cs")));
        assert!(!config.is_source_file(Path::new("src/a.txt")));
        assert!(!config.is_source_file(Path::new("README")));
    }

    #[test]
    fn test_builder_methods() {
        let config = ProjectConfig::new("App")
            .with_reference("Lib")
            .with_internals_visible_to("App.Tests");
        assert_eq!(config.references, vec![SmolStr::new("Lib")]);
        assert_eq!(config.internals_visible_to, vec![SmolStr::new("App.Tests")]);
    }
}
