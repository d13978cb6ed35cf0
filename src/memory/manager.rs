use super::episodic::{ActionType, DecisionStatus, EpisodicError, EpisodicLog};
use super::paths::{bootstrap_data_paths, DataPaths};
use super::semantic::{SemanticStore, SemanticStoreError};
use super::working_state::{MessageRole, WorkingStateDoc, WorkingStateError, WorkingStateStore};
use super::TextEmbedder;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum MemoryManagerError {
    #[error(transparent)]
    Paths(#[from] super::paths::DataPathError),
    #[error(transparent)]
    Episodic(#[from] EpisodicError),
    #[error(transparent)]
    Semantic(#[from] SemanticStoreError),
}

/// Single consistent view over the three stores. Holds no state of its
/// own; every caller shares the same handles.
#[derive(Clone)]
pub struct MemoryManager {
    pub episodic: Arc<EpisodicLog>,
    pub working: Arc<WorkingStateStore>,
    pub semantic: Arc<SemanticStore>,
}

impl MemoryManager {
    pub fn new(
        episodic: Arc<EpisodicLog>,
        working: Arc<WorkingStateStore>,
        semantic: Arc<SemanticStore>,
    ) -> Self {
        Self {
            episodic,
            working,
            semantic,
        }
    }

    pub fn open_at(
        paths: &DataPaths,
        embedder: Arc<dyn TextEmbedder>,
        max_transcript_messages: usize,
    ) -> Result<Self, MemoryManagerError> {
        bootstrap_data_paths(paths)?;
        let episodic = Arc::new(EpisodicLog::open(&paths.episodic_db)?);
        let working = Arc::new(WorkingStateStore::new(
            &paths.working_state_dir,
            &paths.archives_dir,
            max_transcript_messages,
        ));
        let semantic = Arc::new(SemanticStore::open(
            &paths.semantic_db,
            &paths.semantic_index,
            embedder,
        )?);
        Ok(Self::new(episodic, working, semantic))
    }

    pub fn record_decision(
        &self,
        task_id: &str,
        action_type: ActionType,
        content: &str,
        status: DecisionStatus,
    ) -> Result<i64, EpisodicError> {
        self.episodic
            .append_decision(task_id, action_type, content, status)
    }

    pub fn record_tool_call(
        &self,
        decision_id: i64,
        tool_name: &str,
        params_json: &str,
        result_json: &str,
    ) -> Result<i64, EpisodicError> {
        self.episodic
            .append_tool_call(decision_id, tool_name, params_json, result_json)
    }

    pub fn append_message(
        &self,
        task_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<WorkingStateDoc, WorkingStateError> {
        self.working.append_message(task_id, role, content)
    }
}
