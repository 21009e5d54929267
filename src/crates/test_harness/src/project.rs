use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::HarnessResult;

/// Read-only view of the project under test.
pub trait ProjectContext {
    /// Absolute project root; relative options are resolved against it.
    fn base_dir(&self) -> &Path;

    /// Directories searched for test sources.
    fn test_source_roots(&self) -> Vec<PathBuf>;

    /// Main source directories, added to the child classpath so the toolchain can read sources.
    fn compile_source_roots(&self) -> Vec<PathBuf>;

    /// Project test classpath in declaration order.
    fn test_classpath(&self) -> Vec<PathBuf>;

    /// Resolve a possibly relative path against the project root.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }
}

/// Make `path` absolute against the process working directory.
///
/// Unlike `canonicalize`, the path does not need to exist and symlinks are
/// left alone.
pub fn absolute_path(path: &Path) -> HarnessResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::path::absolute(path)?)
}

/// Statically described project layout, usually read from the `[project]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectLayout {
    pub base_dir: PathBuf,
    pub test_source_roots: Vec<PathBuf>,
    pub compile_source_roots: Vec<PathBuf>,
    pub test_classpath: Vec<PathBuf>,
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            test_source_roots: vec![PathBuf::from("src/test/java")],
            compile_source_roots: vec![PathBuf::from("src/main/java")],
            test_classpath: vec![
                PathBuf::from("target/test-classes"),
                PathBuf::from("target/classes"),
            ],
        }
    }
}

impl ProjectLayout {
    /// Default Maven-style layout rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_test_source_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.test_source_roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_compile_source_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.compile_source_roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_test_classpath<I, P>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.test_classpath = entries.into_iter().map(Into::into).collect();
        self
    }

    fn resolve_all(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths.iter().map(|path| self.resolve(path)).collect()
    }
}

impl ProjectContext for ProjectLayout {
    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn test_source_roots(&self) -> Vec<PathBuf> {
        self.resolve_all(&self.test_source_roots)
    }

    fn compile_source_roots(&self) -> Vec<PathBuf> {
        self.resolve_all(&self.compile_source_roots)
    }

    fn test_classpath(&self) -> Vec<PathBuf> {
        self.resolve_all(&self.test_classpath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_anchors_relative_paths_at_cwd() {
        let cwd = std::env::current_dir().unwrap();
        let resolved = absolute_path(Path::new("target/www-test")).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, cwd.join("target/www-test"));
        assert_eq!(
            absolute_path(Path::new("/opt/gwt")).unwrap(),
            PathBuf::from("/opt/gwt")
        );
    }

    #[test]
    fn default_layout_is_relative_to_its_base() {
        let layout = ProjectLayout::new("/work/app");
        assert_eq!(
            layout.test_source_roots(),
            vec![PathBuf::from("/work/app/src/test/java")]
        );
        assert_eq!(
            layout.resolve(Path::new("target/www-test")),
            PathBuf::from("/work/app/target/www-test")
        );
    }
}
