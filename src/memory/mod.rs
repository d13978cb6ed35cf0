pub mod ann;
pub mod embedding;
pub mod episodic;
pub mod manager;
pub mod paths;
pub mod semantic;
pub mod working_state;

pub use ann::{FlatL2Index, VectorIndex, VectorIndexError};
pub use embedding::{HashingEmbedder, TextEmbedder};
pub use episodic::{
    ActionType, DecisionRecord, DecisionStatus, EpisodicError, EpisodicLog, ToolCallRecord,
};
pub use manager::{MemoryManager, MemoryManagerError};
pub use paths::{bootstrap_data_paths, DataPaths, DataPathError};
pub use semantic::{SemanticHit, SemanticStore, SemanticStoreError};
pub use working_state::{
    MessageRole, TranscriptMessage, WorkingStateDoc, WorkingStateError, WorkingStateStore,
};
