use async_trait::async_trait;
use globset::GlobBuilder;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Directories that hold dependencies or build output and are never walked
pub const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "target",
    "dist",
    "build",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    "coverage",
    ".next",
];

/// Upper bound on entries visited by a single listing
pub const MAX_WALK_ENTRIES: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Path is outside the working directory: {0}")]
    OutsideRoot(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryInfo {
    pub path: String,
    pub files: Vec<String>,
    pub directories: Vec<String>,
}

/// File operations scoped to a working root. Paths are relative to the root
/// unless absolute, and may never resolve outside of it.
#[async_trait]
pub trait FileSystem: Send + Sync {
    fn root(&self) -> &Path;

    async fn read(&self, path: &str) -> Result<String, FsError>;

    async fn write(&self, path: &str, content: &str) -> Result<(), FsError>;

    async fn delete(&self, path: &str) -> Result<(), FsError>;

    /// Paths relative to the root matching a glob pattern, sorted
    async fn list(&self, pattern: &str) -> Result<Vec<String>, FsError>;

    async fn directory_info(&self, path: &str) -> Result<DirectoryInfo, FsError>;
}

/// Lexically resolve `.` and `..` without touching the filesystem, so paths
/// that don't exist yet can still be checked against the root.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| IGNORED_DIRS.contains(&name))
            .unwrap_or(false)
}

fn io_error(path: &str, err: std::io::Error) -> FsError {
    match err.kind() {
        std::io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
        _ => FsError::Io(format!("{}: {}", path, err)),
    }
}

/// The local disk, rooted at a working directory
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, FsError> {
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|e| io_error(&root.as_ref().display().to_string(), e))?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let requested = Path::new(path);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root.join(requested)
        };
        let normalized = normalize_path(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(FsError::OutsideRoot(path.to_string()));
        }
        Ok(normalized)
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn walk(&self, pattern: &str) -> Result<Vec<String>, FsError> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| FsError::InvalidPattern(e.to_string()))?
            .compile_matcher();

        let mut matches: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| !is_ignored(entry))
            .filter_map(|entry| entry.ok())
            .take(MAX_WALK_ENTRIES)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| self.relative(entry.path()))
            .filter(|relative| matcher.is_match(relative))
            .collect();
        matches.sort();
        Ok(matches)
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn read(&self, path: &str) -> Result<String, FsError> {
        let resolved = self.resolve(path)?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), FsError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(path, e))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn delete(&self, path: &str) -> Result<(), FsError> {
        let resolved = self.resolve(path)?;
        tokio::fs::remove_file(&resolved)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn list(&self, pattern: &str) -> Result<Vec<String>, FsError> {
        let this = self.clone();
        let pattern = pattern.to_string();
        tokio::task::spawn_blocking(move || this.walk(&pattern))
            .await
            .map_err(|e| FsError::Io(e.to_string()))?
    }

    async fn directory_info(&self, path: &str) -> Result<DirectoryInfo, FsError> {
        let resolved = self.resolve(path)?;
        let mut entries = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| io_error(path, e))?;

        let mut files = Vec::new();
        let mut directories = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(path, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await.map_err(|e| io_error(path, e))?;
            if file_type.is_dir() {
                directories.push(name);
            } else {
                files.push(name);
            }
        }
        files.sort();
        directories.sort();

        Ok(DirectoryInfo {
            path: resolved.display().to_string(),
            files,
            directories,
        })
    }
}
