use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DataPathError {
    #[error("failed to create data path {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
    pub episodic_db: PathBuf,
    pub working_state_dir: PathBuf,
    pub semantic_db: PathBuf,
    pub semantic_index: PathBuf,
    pub archives_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub audit_log: PathBuf,
}

impl DataPaths {
    pub fn from_data_root(data_root: &Path) -> Self {
        let root = data_root.to_path_buf();
        Self {
            episodic_db: root.join("episodic/trace.db"),
            working_state_dir: root.join("working_state"),
            semantic_db: root.join("semantic/metadata.db"),
            semantic_index: root.join("semantic/index.ann"),
            archives_dir: root.join("archives"),
            logs_dir: root.join("logs"),
            audit_log: root.join("logs/security_audit.jsonl"),
            root,
        }
    }

    pub fn required_directories(&self) -> Vec<PathBuf> {
        vec![
            self.root.clone(),
            self.root.join("episodic"),
            self.working_state_dir.clone(),
            self.root.join("semantic"),
            self.archives_dir.clone(),
            self.logs_dir.clone(),
        ]
    }
}

pub fn bootstrap_data_paths(paths: &DataPaths) -> Result<(), DataPathError> {
    for path in paths.required_directories() {
        fs::create_dir_all(&path).map_err(|source| DataPathError::CreateDir {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}
