use crate::shared::glob_match;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("path has no usable form: {path}")]
    InvalidPath { path: String },
    #[error("resolved path is outside allowed roots: {path}")]
    PathNotAllowed { path: String },
    #[error("path does not exist: {path}")]
    NotFound { path: String },
    #[error("path is not a file: {path}")]
    NotAFile { path: String },
    #[error("path is not a directory: {path}")]
    NotADirectory { path: String },
    #[error("read disabled by sandbox policy")]
    ReadNotAllowed,
    #[error("write disabled by sandbox policy")]
    WriteNotAllowed,
    #[error("delete disabled by sandbox policy")]
    DeleteNotAllowed,
    #[error("file size {size} exceeds max_read_bytes {limit}")]
    ReadTooLarge { size: u64, limit: u64 },
    #[error("content size {size} exceeds max_write_bytes {limit}")]
    WriteTooLarge { size: u64, limit: u64 },
    #[error("directory has {count} entries, over max_list_entries {limit}")]
    ListLimitExceeded { count: usize, limit: usize },
    #[error("search visited more than max_visited {limit} entries")]
    SearchLimitExceeded { limit: usize },
    #[error("sandbox io failure at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SandboxError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath { .. } => "invalid_path",
            Self::PathNotAllowed { .. } => "path_not_allowed",
            Self::NotFound { .. } => "not_found",
            Self::NotAFile { .. } => "not_a_file",
            Self::NotADirectory { .. } => "not_a_directory",
            Self::ReadNotAllowed => "read_not_allowed",
            Self::WriteNotAllowed => "write_not_allowed",
            Self::DeleteNotAllowed => "delete_not_allowed",
            Self::ReadTooLarge { .. } => "read_too_large",
            Self::WriteTooLarge { .. } => "write_too_large",
            Self::ListLimitExceeded { .. } => "list_limit_exceeded",
            Self::SearchLimitExceeded { .. } => "search_limit_exceeded",
            Self::Io { .. } => "io_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub allowed_roots: Vec<PathBuf>,
    pub allow_read: bool,
    pub allow_write: bool,
    pub allow_delete: bool,
    pub max_read_bytes: u64,
    pub max_write_bytes: u64,
    pub max_list_entries: usize,
    pub max_visited: usize,
}

impl SandboxConfig {
    pub fn read_only(allowed_roots: Vec<PathBuf>) -> Self {
        Self {
            allowed_roots,
            allow_read: true,
            allow_write: false,
            allow_delete: false,
            max_read_bytes: 1_000_000,
            max_write_bytes: 1_000_000,
            max_list_entries: 1_000,
            max_visited: 20_000,
        }
    }

    pub fn with_write(mut self, allow_write: bool) -> Self {
        self.allow_write = allow_write;
        self
    }

    pub fn with_delete(mut self, allow_delete: bool) -> Self {
        self.allow_delete = allow_delete;
        self
    }
}

/// Path-scoped filesystem access. Roots are canonicalized once at
/// construction and immutable afterwards; the sandbox is safe to share
/// across tasks.
#[derive(Debug, Clone)]
pub struct Sandbox {
    roots: Vec<PathBuf>,
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        let mut roots = Vec::new();
        for root in &config.allowed_roots {
            let canonical = fs::canonicalize(root).map_err(|source| SandboxError::Io {
                path: root.display().to_string(),
                source,
            })?;
            roots.push(canonical);
        }
        roots.sort();
        if roots.is_empty() {
            return Err(SandboxError::InvalidPath {
                path: "<no allowed roots>".to_string(),
            });
        }
        Ok(Self { roots, config })
    }

    fn contained(&self, candidate: &Path) -> bool {
        self.roots.iter().any(|root| candidate.starts_with(root))
    }

    /// Join against the primary root, fully resolve (symlinks followed
    /// for existing targets; non-existent targets resolve their parent
    /// strictly), then check lexical containment.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf, SandboxError> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.roots[0].join(path)
        };

        if joined.exists() {
            let canonical = fs::canonicalize(&joined).map_err(|source| SandboxError::Io {
                path: joined.display().to_string(),
                source,
            })?;
            if !self.contained(&canonical) {
                return Err(SandboxError::PathNotAllowed {
                    path: path.display().to_string(),
                });
            }
            return Ok(canonical);
        }

        let Some(file_name) = joined.file_name() else {
            return Err(SandboxError::InvalidPath {
                path: path.display().to_string(),
            });
        };
        let Some(parent) = joined.parent() else {
            return Err(SandboxError::InvalidPath {
                path: path.display().to_string(),
            });
        };
        let canonical_parent = fs::canonicalize(parent).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SandboxError::NotFound {
                    path: path.display().to_string(),
                }
            } else {
                SandboxError::Io {
                    path: parent.display().to_string(),
                    source,
                }
            }
        })?;
        if !self.contained(&canonical_parent) {
            return Err(SandboxError::PathNotAllowed {
                path: path.display().to_string(),
            });
        }
        Ok(canonical_parent.join(file_name))
    }

    pub fn read_text(&self, path: &Path) -> Result<Value, SandboxError> {
        // Containment is decided before any policy flag: an out-of-root
        // path fails with path_not_allowed regardless of the read flag.
        let resolved = self.resolve(path)?;
        if !self.config.allow_read {
            return Err(SandboxError::ReadNotAllowed);
        }
        if !resolved.exists() {
            return Err(SandboxError::NotFound {
                path: path.display().to_string(),
            });
        }
        if !resolved.is_file() {
            return Err(SandboxError::NotAFile {
                path: path.display().to_string(),
            });
        }
        let size = resolved
            .metadata()
            .map_err(|source| SandboxError::Io {
                path: resolved.display().to_string(),
                source,
            })?
            .len();
        if size > self.config.max_read_bytes {
            return Err(SandboxError::ReadTooLarge {
                size,
                limit: self.config.max_read_bytes,
            });
        }
        let content = fs::read_to_string(&resolved).map_err(|source| SandboxError::Io {
            path: resolved.display().to_string(),
            source,
        })?;
        Ok(json!({
            "path": resolved.display().to_string(),
            "content": content,
            "size": size,
        }))
    }

    pub fn write_text(&self, path: &Path, content: &str) -> Result<Value, SandboxError> {
        let resolved = self.resolve(path)?;
        if !self.config.allow_write {
            return Err(SandboxError::WriteNotAllowed);
        }
        let size = content.len() as u64;
        if size > self.config.max_write_bytes {
            return Err(SandboxError::WriteTooLarge {
                size,
                limit: self.config.max_write_bytes,
            });
        }
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|source| SandboxError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        fs::write(&resolved, content).map_err(|source| SandboxError::Io {
            path: resolved.display().to_string(),
            source,
        })?;
        Ok(json!({
            "path": resolved.display().to_string(),
            "size": size,
        }))
    }

    pub fn delete_path(&self, path: &Path) -> Result<Value, SandboxError> {
        let resolved = self.resolve(path)?;
        if !self.config.allow_delete {
            return Err(SandboxError::DeleteNotAllowed);
        }
        if !resolved.exists() {
            return Err(SandboxError::NotFound {
                path: path.display().to_string(),
            });
        }
        if !resolved.is_file() {
            return Err(SandboxError::NotAFile {
                path: path.display().to_string(),
            });
        }
        fs::remove_file(&resolved).map_err(|source| SandboxError::Io {
            path: resolved.display().to_string(),
            source,
        })?;
        Ok(json!({ "path": resolved.display().to_string() }))
    }

    pub fn list_dir(&self, path: &Path) -> Result<Value, SandboxError> {
        let resolved = self.resolve(path)?;
        if !self.config.allow_read {
            return Err(SandboxError::ReadNotAllowed);
        }
        if !resolved.exists() {
            return Err(SandboxError::NotFound {
                path: path.display().to_string(),
            });
        }
        if !resolved.is_dir() {
            return Err(SandboxError::NotADirectory {
                path: path.display().to_string(),
            });
        }
        let mut entries = Vec::new();
        let listing = fs::read_dir(&resolved).map_err(|source| SandboxError::Io {
            path: resolved.display().to_string(),
            source,
        })?;
        for entry in listing {
            let entry = entry.map_err(|source| SandboxError::Io {
                path: resolved.display().to_string(),
                source,
            })?;
            entries.push(entry.file_name().to_string_lossy().into_owned());
        }
        if entries.len() > self.config.max_list_entries {
            return Err(SandboxError::ListLimitExceeded {
                count: entries.len(),
                limit: self.config.max_list_entries,
            });
        }
        entries.sort();
        Ok(json!({
            "path": resolved.display().to_string(),
            "entries": entries,
        }))
    }

    pub fn file_info(&self, path: &Path) -> Result<Value, SandboxError> {
        let resolved = self.resolve(path)?;
        if !self.config.allow_read {
            return Err(SandboxError::ReadNotAllowed);
        }
        if !resolved.exists() {
            return Err(SandboxError::NotFound {
                path: path.display().to_string(),
            });
        }
        let metadata = resolved.metadata().map_err(|source| SandboxError::Io {
            path: resolved.display().to_string(),
            source,
        })?;
        let item_type = if metadata.is_file() {
            "file"
        } else if metadata.is_dir() {
            "directory"
        } else {
            "other"
        };
        let modified_epoch = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|duration| duration.as_secs())
            .unwrap_or(0);
        Ok(json!({
            "path": resolved.display().to_string(),
            "type": item_type,
            "size": metadata.len(),
            "modified_epoch": modified_epoch,
        }))
    }

    /// Deterministic glob search under `root`: depth-first with sorted
    /// children, an entry-visit cap, and lexicographically sorted output
    /// of `/`-separated relative paths.
    pub fn search(
        &self,
        root: &Path,
        pattern: &str,
        max_results: usize,
    ) -> Result<Value, SandboxError> {
        let resolved_root = self.resolve(root)?;
        if !self.config.allow_read {
            return Err(SandboxError::ReadNotAllowed);
        }
        if !resolved_root.exists() {
            return Err(SandboxError::NotFound {
                path: root.display().to_string(),
            });
        }
        if !resolved_root.is_dir() {
            return Err(SandboxError::NotADirectory {
                path: root.display().to_string(),
            });
        }

        let mut visited = 0_usize;
        let mut matched = Vec::new();
        let mut truncated = false;
        let mut stack = vec![resolved_root.clone()];

        while let Some(current) = stack.pop() {
            let mut children = Vec::new();
            let listing = fs::read_dir(&current).map_err(|source| SandboxError::Io {
                path: current.display().to_string(),
                source,
            })?;
            for entry in listing {
                let entry = entry.map_err(|source| SandboxError::Io {
                    path: current.display().to_string(),
                    source,
                })?;
                children.push(entry.path());
            }
            children.sort();

            for child in &children {
                visited += 1;
                if visited > self.config.max_visited {
                    return Err(SandboxError::SearchLimitExceeded {
                        limit: self.config.max_visited,
                    });
                }

                let rel = child
                    .strip_prefix(&resolved_root)
                    .map_err(|_| SandboxError::InvalidPath {
                        path: child.display().to_string(),
                    })?
                    .components()
                    .map(|part| part.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");

                if glob_match(pattern, &rel) {
                    if matched.len() < max_results {
                        matched.push(rel);
                    } else {
                        truncated = true;
                    }
                }

                if child.is_dir() && !child.is_symlink() {
                    stack.push(child.clone());
                }
            }
        }

        matched.sort();
        Ok(json!({
            "root": resolved_root.display().to_string(),
            "pattern": pattern,
            "matches": matched,
            "count": matched.len(),
            "truncated": truncated,
        }))
    }
}
