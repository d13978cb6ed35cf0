use crate::shared::atomic_write_file;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum WorkingStateError {
    #[error("invalid task id: {0}")]
    InvalidTaskId(String),
    #[error("failed to read working state {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse working state {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write working state {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode working state {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("task `{task_id}` not found")]
    TaskNotFound { task_id: String },
}

impl WorkingStateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTaskId(_) => "invalid_argument",
            Self::TaskNotFound { .. } => "not_found",
            _ => "io_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingStateDoc {
    pub task_id: String,
    pub goal: String,
    pub status: String,
    #[serde(default)]
    pub turn: u64,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub messages: Vec<TranscriptMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_graph: Option<Value>,
    pub updated_at: String,
}

impl WorkingStateDoc {
    pub fn new(task_id: &str, goal: &str, next_steps: Vec<String>) -> Self {
        Self {
            task_id: task_id.to_string(),
            goal: goal.to_string(),
            status: "INIT".to_string(),
            turn: 0,
            current_step: 0,
            completed_steps: Vec::new(),
            next_steps,
            messages: Vec::new(),
            workflow_graph: None,
            updated_at: now_rfc3339(),
        }
    }
}

/// One JSON document per task; saves go through write-temp-then-rename so
/// concurrent readers always see a fully written document.
pub struct WorkingStateStore {
    base_dir: PathBuf,
    archive_dir: PathBuf,
    max_messages: usize,
}

impl WorkingStateStore {
    pub fn new(base_dir: &Path, archive_dir: &Path, max_messages: usize) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            archive_dir: archive_dir.to_path_buf(),
            max_messages: max_messages.max(1),
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    fn sanitize_task_id(task_id: &str) -> Result<&str, WorkingStateError> {
        crate::shared::validate_task_id(task_id).map_err(WorkingStateError::InvalidTaskId)?;
        Ok(task_id)
    }

    fn working_file(&self, task_id: &str) -> Result<PathBuf, WorkingStateError> {
        let safe = Self::sanitize_task_id(task_id)?;
        Ok(self.base_dir.join(format!("{safe}.json")))
    }

    fn archive_file(&self, task_id: &str) -> Result<PathBuf, WorkingStateError> {
        let safe = Self::sanitize_task_id(task_id)?;
        Ok(self.archive_dir.join(format!("{safe}.json")))
    }

    pub fn load(&self, task_id: &str) -> Result<Option<WorkingStateDoc>, WorkingStateError> {
        let path = self.working_file(task_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|source| WorkingStateError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let doc = serde_json::from_str(&raw).map_err(|source| WorkingStateError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(doc))
    }

    pub fn save(&self, doc: &WorkingStateDoc) -> Result<(), WorkingStateError> {
        let path = self.working_file(&doc.task_id)?;
        let mut stamped = doc.clone();
        stamped.updated_at = now_rfc3339();
        let encoded =
            serde_json::to_vec_pretty(&stamped).map_err(|source| WorkingStateError::Encode {
                path: path.display().to_string(),
                source,
            })?;
        atomic_write_file(&path, &encoded).map_err(|source| WorkingStateError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn append_message(
        &self,
        task_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<WorkingStateDoc, WorkingStateError> {
        let mut doc = self
            .load(task_id)?
            .ok_or_else(|| WorkingStateError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        doc.messages.push(TranscriptMessage {
            role,
            content: content.to_string(),
        });
        while doc.messages.len() > self.max_messages {
            doc.messages.remove(0);
        }
        self.save(&doc)?;
        Ok(doc)
    }

    pub fn list_recent_messages(
        &self,
        task_id: &str,
        count: usize,
    ) -> Result<Vec<TranscriptMessage>, WorkingStateError> {
        let doc = self
            .load(task_id)?
            .ok_or_else(|| WorkingStateError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        let skip = doc.messages.len().saturating_sub(count);
        Ok(doc.messages.into_iter().skip(skip).collect())
    }

    /// Snapshot the final task state to `archives/<task_id>.json`. The
    /// working document stays in place so later turns keep the transcript.
    pub fn write_archive(&self, task_id: &str, snapshot: &Value) -> Result<(), WorkingStateError> {
        let path = self.archive_file(task_id)?;
        let encoded =
            serde_json::to_vec_pretty(snapshot).map_err(|source| WorkingStateError::Encode {
                path: path.display().to_string(),
                source,
            })?;
        atomic_write_file(&path, &encoded).map_err(|source| WorkingStateError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load_archive(&self, task_id: &str) -> Result<Option<Value>, WorkingStateError> {
        let path = self.archive_file(task_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|source| WorkingStateError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let value = serde_json::from_str(&raw).map_err(|source| WorkingStateError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(value))
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
