//! Where grammar text comes from.
//!
//! `@IMPORT Lang FROM "path"` is resolved through a [`SourceProvider`], so
//! the registry can load an import graph from disk or from memory in tests.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

pub trait SourceProvider {
    fn read_source(&self, path: &Path) -> Result<String, io::Error>;

    /// Resolve an import path relative to the importing grammar's directory.
    fn resolve_import(&self, base: &Path, import: &str) -> Result<PathBuf, io::Error>;

    /// Stable identity of a path, used for import cycle detection.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, io::Error>;
}

/// Reads grammars through `std::fs`.
pub struct FileSystemProvider;

impl SourceProvider for FileSystemProvider {
    fn read_source(&self, path: &Path) -> Result<String, io::Error> {
        std::fs::read_to_string(path)
    }

    fn resolve_import(&self, base: &Path, import: &str) -> Result<PathBuf, io::Error> {
        Ok(base.join(import))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, io::Error> {
        path.canonicalize()
    }
}

/// Grammar sources keyed by normalized path.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProvider {
    files: HashMap<PathBuf, String>,
}

impl InMemoryProvider {
    pub fn new(files: HashMap<PathBuf, String>) -> Self {
        let files = files
            .into_iter()
            .map(|(path, text)| (normalize_path(&path), text))
            .collect();
        Self { files }
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, text: &str) -> Self {
        self.files
            .insert(normalize_path(path.as_ref()), text.to_string());
        self
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                components.pop();
            }
            other => components.push(other),
        }
    }
    components.iter().collect()
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no grammar registered at {}", path.display()),
    )
}

impl SourceProvider for InMemoryProvider {
    fn read_source(&self, path: &Path) -> Result<String, io::Error> {
        let normalized = normalize_path(path);
        self.files
            .get(&normalized)
            .cloned()
            .ok_or_else(|| not_found(&normalized))
    }

    fn resolve_import(&self, base: &Path, import: &str) -> Result<PathBuf, io::Error> {
        Ok(normalize_path(&base.join(import)))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, io::Error> {
        let normalized = normalize_path(path);
        if self.files.keys().any(|k| k.starts_with(&normalized)) {
            Ok(normalized)
        } else {
            Err(not_found(&normalized))
        }
    }
}
