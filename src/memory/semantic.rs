use super::ann::{FlatL2Index, VectorIndex, VectorIndexError};
use super::embedding::TextEmbedder;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum SemanticStoreError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create semantic store parent {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("text has no embeddable content")]
    EmptyText,
    #[error("vector index error: {0}")]
    Index(#[from] VectorIndexError),
    #[error("invalid metadata json for vector {vector_id}: {source}")]
    InvalidMetadata {
        vector_id: i64,
        #[source]
        source: serde_json::Error,
    },
}

impl SemanticStoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyText => "invalid_argument",
            _ => "io_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub vector_id: i64,
    pub text: String,
    pub metadata: Value,
    pub distance: f32,
    pub similarity: f64,
}

/// Vector index plus metadata table. Adds serialize behind the index
/// write lock; searches take a read lock and run concurrently.
pub struct SemanticStore {
    db_path: PathBuf,
    index_path: PathBuf,
    embedder: Arc<dyn TextEmbedder>,
    index: RwLock<FlatL2Index>,
}

impl SemanticStore {
    pub fn open(
        db_path: &Path,
        index_path: &Path,
        embedder: Arc<dyn TextEmbedder>,
    ) -> Result<Self, SemanticStoreError> {
        for path in [db_path, index_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|source| SemanticStoreError::CreateParent {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
            index_path: index_path.to_path_buf(),
            embedder,
            index: RwLock::new(FlatL2Index::new()),
        };
        store.ensure_schema()?;

        let loaded = store.load_index_from_file();
        if !loaded {
            store.rebuild_index_from_db()?;
            store.persist_index_best_effort();
        }
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, SemanticStoreError> {
        Connection::open(&self.db_path).map_err(|source| SemanticStoreError::Open {
            path: self.db_path.display().to_string(),
            source,
        })
    }

    fn ensure_schema(&self) -> Result<(), SemanticStoreError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS embeddings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    text TEXT NOT NULL,
                    metadata TEXT NOT NULL,
                    vector_id INTEGER NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_embeddings_vector_id
                    ON embeddings(vector_id);
                ",
            )
            .map_err(|source| SemanticStoreError::Sql { source })?;
        Ok(())
    }

    /// A loaded file must parse, carry the embedder's dimension, and hold
    /// at least as many vectors as the metadata table references.
    fn load_index_from_file(&self) -> bool {
        if !self.index_path.exists() {
            return false;
        }
        let loaded = match FlatL2Index::load(&self.index_path) {
            Ok(index) => index,
            Err(_) => return false,
        };
        if let Some(dimension) = loaded.dimension() {
            if dimension != self.embedder.dimension() {
                return false;
            }
        }
        let stored_rows = match self.count_rows() {
            Ok(count) => count,
            Err(_) => return false,
        };
        if loaded.len() < stored_rows {
            return false;
        }
        let mut guard = self.index.write().unwrap_or_else(|e| e.into_inner());
        *guard = loaded;
        true
    }

    fn count_rows(&self) -> Result<usize, SemanticStoreError> {
        let connection = self.connect()?;
        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .map_err(|source| SemanticStoreError::Sql { source })?;
        Ok(count as usize)
    }

    fn rebuild_index_from_db(&self) -> Result<(), SemanticStoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT text, vector_id FROM embeddings ORDER BY vector_id ASC")
            .map_err(|source| SemanticStoreError::Sql { source })?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|source| SemanticStoreError::Sql { source })?;

        let mut rebuilt = FlatL2Index::new();
        for row in rows {
            let (text, _vector_id) = row.map_err(|source| SemanticStoreError::Sql { source })?;
            let vector = self
                .embedder
                .embed(&text)
                .unwrap_or_else(|| vec![0.0; self.embedder.dimension()]);
            rebuilt.add(&vector)?;
        }

        let mut guard = self.index.write().unwrap_or_else(|e| e.into_inner());
        *guard = rebuilt;
        Ok(())
    }

    fn persist_index_best_effort(&self) {
        let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
        let _ = guard.save(&self.index_path);
    }

    /// Insert text plus metadata; the in-memory index and the metadata row
    /// agree after a successful return (a failed row insert rolls the
    /// vector back out of the index).
    pub fn add(&self, text: &str, metadata: &Value) -> Result<i64, SemanticStoreError> {
        let vector = self
            .embedder
            .embed(text)
            .ok_or(SemanticStoreError::EmptyText)?;

        let mut guard = self.index.write().unwrap_or_else(|e| e.into_inner());
        let previous_len = guard.len();
        let vector_id = guard.add(&vector)? as i64;

        let metadata_json = metadata.to_string();
        let insert = self.connect().and_then(|connection| {
            connection
                .execute(
                    "INSERT INTO embeddings (text, metadata, vector_id) VALUES (?1, ?2, ?3)",
                    params![text, metadata_json, vector_id],
                )
                .map_err(|source| SemanticStoreError::Sql { source })
        });
        if let Err(err) = insert {
            guard.truncate(previous_len);
            return Err(err);
        }

        let _ = guard.save(&self.index_path);
        Ok(vector_id)
    }

    /// Similarity search over the whole store, ordered by
    /// `(-similarity, vector_id)`. An empty store returns no hits.
    pub fn search_text(&self, query: &str, top_k: usize) -> Result<Vec<SemanticHit>, SemanticStoreError> {
        let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
        if guard.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let Some(query_vector) = self.embedder.embed(query) else {
            return Ok(Vec::new());
        };

        let raw_hits = guard.search(&query_vector, top_k)?;
        drop(guard);
        if raw_hits.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self.load_rows_for(&raw_hits)?;
        let mut out = Vec::new();
        for (vector_id, distance) in raw_hits {
            let Some((text, metadata_json)) = rows.get(&(vector_id as i64)) else {
                continue;
            };
            let metadata = serde_json::from_str(metadata_json).map_err(|source| {
                SemanticStoreError::InvalidMetadata {
                    vector_id: vector_id as i64,
                    source,
                }
            })?;
            out.push(SemanticHit {
                vector_id: vector_id as i64,
                text: text.clone(),
                metadata,
                distance,
                similarity: l2_distance_to_similarity(distance),
            });
        }

        out.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.vector_id.cmp(&b.vector_id))
        });
        Ok(out)
    }

    pub fn len(&self) -> usize {
        let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load_rows_for(
        &self,
        hits: &[(u64, f32)],
    ) -> Result<BTreeMap<i64, (String, String)>, SemanticStoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT text, metadata FROM embeddings WHERE vector_id = ?1")
            .map_err(|source| SemanticStoreError::Sql { source })?;

        let mut out = BTreeMap::new();
        for (vector_id, _) in hits {
            let row = statement
                .query_row(params![*vector_id as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map(Some)
                .or_else(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(SemanticStoreError::Sql { source: other }),
                })?;
            if let Some(row) = row {
                out.insert(*vector_id as i64, row);
            }
        }
        Ok(out)
    }
}

/// Canonical similarity mapping: `1 / (1 + L2_distance)`, clamped into
/// [0, 1].
pub fn l2_distance_to_similarity(distance: f32) -> f64 {
    let distance = f64::from(distance);
    if !distance.is_finite() {
        return 0.0;
    }
    let clamped = distance.max(0.0);
    (1.0 / (1.0 + clamped)).clamp(0.0, 1.0)
}
