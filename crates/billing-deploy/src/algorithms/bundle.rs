//! # Code Bundle
//!
//! Deterministic deployment archive of one function: its entry file at the
//! archive root plus the contents of a dependency directory.
//!
//! Files are sorted by archive path before encoding, so the same inputs
//! always produce the same bytes and the same `code_sha256`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::{BundleError, ProcessingFunction};
use crate::ports::BundleSource;

/// Archive format version written into every bundle.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Encoded archive layout.
#[derive(Debug, Serialize, Deserialize)]
struct Archive {
    version: u32,
    entry: String,
    files: Vec<(String, Vec<u8>)>,
}

/// An encoded deployment bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBundle {
    entry: String,
    bytes: Vec<u8>,
    sha256: String,
    file_count: usize,
}

impl CodeBundle {
    /// Archive path of the entry file.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Encoded archive.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Archive size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Hex SHA-256 of the archive.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Number of files in the archive.
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Decode the archive back into `(path, contents)` pairs.
    pub fn files(&self) -> Result<Vec<(String, Vec<u8>)>, BundleError> {
        let archive: Archive = bincode::deserialize(&self.bytes)
            .map_err(|e| BundleError::Encoding(e.to_string()))?;
        Ok(archive.files)
    }
}

/// Collects files into a `CodeBundle`.
#[derive(Debug, Default)]
pub struct BundleBuilder {
    entry: Option<String>,
    files: BTreeMap<String, Vec<u8>>,
}

impl BundleBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the entry file at the archive root.
    pub fn entry(mut self, file_name: &str, contents: Vec<u8>) -> Result<Self, BundleError> {
        let path = normalize(file_name)?;
        if path.contains('/') {
            return Err(BundleError::InvalidPath(file_name.to_string()));
        }
        self.insert(path.clone(), contents)?;
        self.entry = Some(path);
        Ok(self)
    }

    /// Add one file under `archive_path`.
    pub fn file(mut self, archive_path: &str, contents: Vec<u8>) -> Result<Self, BundleError> {
        let path = normalize(archive_path)?;
        self.insert(path, contents)?;
        Ok(self)
    }

    /// Read the entry file from disk.
    pub fn entry_from_path(self, path: &Path) -> Result<Self, BundleError> {
        let contents = read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BundleError::InvalidPath(path.display().to_string()))?;
        self.entry(file_name, contents)
    }

    /// Add every file below `dir`, keyed by its path relative to `dir`.
    pub fn directory(mut self, dir: &Path) -> Result<Self, BundleError> {
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let listing = fs::read_dir(&current).map_err(|e| io_error(&current, e))?;
            for item in listing {
                let item = item.map_err(|e| io_error(&current, e))?;
                let path = item.path();
                let file_type = item.file_type().map_err(|e| io_error(&path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let relative = path
                        .strip_prefix(dir)
                        .map_err(|_| BundleError::InvalidPath(path.display().to_string()))?;
                    let archive_path = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    let contents = read(&path)?;
                    self = self.file(&archive_path, contents)?;
                }
            }
        }
        Ok(self)
    }

    /// Encode the archive and hash it.
    pub fn build(self) -> Result<CodeBundle, BundleError> {
        let entry = self.entry.ok_or(BundleError::MissingEntry)?;
        let file_count = self.files.len();
        let archive = Archive {
            version: BUNDLE_FORMAT_VERSION,
            entry: entry.clone(),
            files: self.files.into_iter().collect(),
        };
        let bytes = bincode::serialize(&archive).map_err(|e| BundleError::Encoding(e.to_string()))?;
        let sha256 = hex::encode(Sha256::digest(&bytes));

        debug!(entry = %entry, files = file_count, size = bytes.len(), sha256 = %sha256, "Bundle built");
        Ok(CodeBundle {
            entry,
            bytes,
            sha256,
            file_count,
        })
    }

    fn insert(&mut self, path: String, contents: Vec<u8>) -> Result<(), BundleError> {
        if self.files.contains_key(&path) {
            return Err(BundleError::DuplicatePath(path));
        }
        self.files.insert(path, contents);
        Ok(())
    }
}

/// Reject absolute and parent-escaping paths; normalize separators.
fn normalize(archive_path: &str) -> Result<String, BundleError> {
    let invalid = || BundleError::InvalidPath(archive_path.to_string());
    let unified = archive_path.replace('\\', "/");
    let mut parts = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(invalid)?.to_string()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid())
            }
        }
    }
    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts.join("/"))
}

fn read(path: &Path) -> Result<Vec<u8>, BundleError> {
    fs::read(path).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> BundleError {
    BundleError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Bundles functions from a source directory and an optional dependency
/// directory shared by all functions.
#[derive(Debug, Clone)]
pub struct DirectoryBundleSource {
    source_dir: PathBuf,
    deps_dir: Option<PathBuf>,
}

impl DirectoryBundleSource {
    /// Create a source.
    pub fn new(source_dir: impl Into<PathBuf>, deps_dir: Option<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            deps_dir,
        }
    }
}

impl BundleSource for DirectoryBundleSource {
    fn bundle_for(&self, function: ProcessingFunction) -> Result<CodeBundle, BundleError> {
        let mut builder =
            BundleBuilder::new().entry_from_path(&self.source_dir.join(function.entry_file()))?;
        if let Some(deps) = &self.deps_dir {
            builder = builder.directory(deps)?;
        }
        builder.build()
    }
}
