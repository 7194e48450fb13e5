//! Explicit handle to the working tree
//!
//! Every component resolves suggestion paths through a `ProjectRoot` rather
//! than the process working directory, so tests can point the whole pipeline
//! at a scratch directory.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Default cache directory name under the project root.
pub const CACHE_DIR: &str = ".cosmos";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoot {
    root: PathBuf,
}

/// A suggestion path resolved against the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// The path exactly as the suggestion named it.
    pub original: PathBuf,
    /// Where the file lives on disk.
    pub absolute: PathBuf,
    /// Where a copy of the file lives inside a backup directory: the relative
    /// path for project files, the base name for everything else.
    pub backup_relative: PathBuf,
    /// Absolute, or relative but climbing above the root with `..`
    pub outside_root: bool,
}

impl ProjectRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Canonicalize `root` first. Used by the CLI, where `.` is the default.
    pub fn open(root: &Path) -> io::Result<Self> {
        Ok(Self::new(root.canonicalize()?))
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn default_cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    /// Absolute paths stay absolute; everything else is taken relative to the
    /// project root.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn resolve(&self, path: &Path) -> ResolvedPath {
        let inside = if path.is_absolute() {
            None
        } else {
            normalize_relative(path)
        };
        let outside_root = inside.is_none();
        let backup_relative = inside.unwrap_or_else(|| {
            path.file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("root"))
        });

        ResolvedPath {
            original: path.to_path_buf(),
            absolute: self.absolute(path),
            backup_relative,
            outside_root,
        }
    }
}

/// Drop `.` components and fold `..` into the path. Returns `None` when the
/// path climbs above the root.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_mirrors_layout() {
        let root = ProjectRoot::new("/work/repo");
        let resolved = root.resolve(Path::new("src/app/main.py"));
        assert_eq!(resolved.absolute, PathBuf::from("/work/repo/src/app/main.py"));
        assert_eq!(resolved.backup_relative, PathBuf::from("src/app/main.py"));
        assert_eq!(resolved.original, PathBuf::from("src/app/main.py"));
    }

    #[test]
    fn test_absolute_path_uses_base_name() {
        let root = ProjectRoot::new("/work/repo");
        let resolved = root.resolve(Path::new("/etc/tool/settings.toml"));
        assert_eq!(resolved.absolute, PathBuf::from("/etc/tool/settings.toml"));
        assert_eq!(resolved.backup_relative, PathBuf::from("settings.toml"));
        assert!(resolved.outside_root);
    }

    #[test]
    fn test_escaping_relative_path_is_outside_root() {
        let root = ProjectRoot::new("/work/repo");
        let resolved = root.resolve(Path::new("../../outside.txt"));
        assert!(resolved.outside_root);
        assert_eq!(resolved.backup_relative, PathBuf::from("outside.txt"));
        assert_eq!(
            resolved.absolute,
            PathBuf::from("/work/repo/../../outside.txt")
        );

        let resolved = root.resolve(Path::new("a/../../sibling.txt"));
        assert!(resolved.outside_root);
        assert_eq!(resolved.backup_relative, PathBuf::from("sibling.txt"));
    }

    #[test]
    fn test_dot_components_fold_inside_root() {
        let root = ProjectRoot::new("/work/repo");
        let resolved = root.resolve(Path::new("./a/./b.txt"));
        assert!(!resolved.outside_root);
        assert_eq!(resolved.backup_relative, PathBuf::from("a/b.txt"));

        let resolved = root.resolve(Path::new("a/tmp/../b.txt"));
        assert!(!resolved.outside_root);
        assert_eq!(resolved.backup_relative, PathBuf::from("a/b.txt"));
    }
}
