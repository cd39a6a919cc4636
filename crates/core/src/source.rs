//! Declaration source access.
//!
//! The loader never touches `std::fs` directly; it goes through a
//! [`SourceProvider`] so declaration sets can be composed from memory in
//! tests and embedders.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

pub trait SourceProvider {
    /// Read the declaration text stored at `path`.
    fn read(&self, path: &Path) -> io::Result<String>;

    /// Resolve an `imports` entry relative to the importing file's directory.
    fn resolve(&self, base: &Path, import: &str) -> io::Result<PathBuf>;

    /// Canonical form of `path`, used for cycle detection and the
    /// root-directory sandbox check.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Reads declaration files from disk.
pub struct FileSystemProvider;

impl SourceProvider for FileSystemProvider {
    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn resolve(&self, base: &Path, import: &str) -> io::Result<PathBuf> {
        Ok(base.join(import))
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        path.canonicalize()
    }
}

/// Serves declaration files from a path → text map.
#[derive(Default)]
pub struct InMemoryProvider {
    files: HashMap<PathBuf, String>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.files.insert(lexical_normalize(path.as_ref()), text.into());
        self
    }

    fn is_known_dir(&self, dir: &Path) -> bool {
        self.files.keys().any(|f| f.starts_with(dir))
    }
}

impl SourceProvider for InMemoryProvider {
    fn read(&self, path: &Path) -> io::Result<String> {
        let key = lexical_normalize(path);
        self.files.get(&key).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no in-memory file {}", key.display()),
            )
        })
    }

    fn resolve(&self, base: &Path, import: &str) -> io::Result<PathBuf> {
        Ok(lexical_normalize(&base.join(import)))
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let key = lexical_normalize(path);
        if self.files.contains_key(&key) || self.is_known_dir(&key) {
            Ok(key)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no in-memory path {}", key.display()),
            ))
        }
    }
}

/// Drop `.` components and fold `..` into its parent without touching disk.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(parts.last(), Some(Component::Normal(_))) {
                    parts.pop();
                } else {
                    parts.push(component);
                }
            }
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}
