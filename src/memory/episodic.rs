use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum EpisodicError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create episodic database parent {path}: {source}")]
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
    #[error("search query must be non-empty")]
    EmptyQuery,
    #[error("invalid action type `{value}` in database")]
    InvalidActionType { value: String },
    #[error("invalid decision status `{value}` in database")]
    InvalidStatus { value: String },
}

impl EpisodicError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "invalid_argument",
            Self::InvalidActionType { .. } | Self::InvalidStatus { .. } => "invalid_argument",
            _ => "io_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Plan,
    Node,
    Tool,
    Validate,
    Archive,
    Error,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Node => "node",
            Self::Tool => "tool",
            Self::Validate => "validate",
            Self::Archive => "archive",
            Self::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EpisodicError> {
        match raw {
            "plan" => Ok(Self::Plan),
            "node" => Ok(Self::Node),
            "tool" => Ok(Self::Tool),
            "validate" => Ok(Self::Validate),
            "archive" => Ok(Self::Archive),
            "error" => Ok(Self::Error),
            other => Err(EpisodicError::InvalidActionType {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionStatus {
    Ok,
    Err,
}

impl DecisionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Err => "err",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EpisodicError> {
        match raw {
            "ok" => Ok(Self::Ok),
            "err" => Ok(Self::Err),
            other => Err(EpisodicError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord {
    pub id: i64,
    pub task_id: String,
    pub action_type: ActionType,
    pub content: String,
    pub status: DecisionStatus,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub id: i64,
    pub decision_id: i64,
    pub tool_name: String,
    pub params: String,
    pub result: String,
    pub timestamp: String,
}

/// Append-only decision/tool-call/validation log. Writers serialize on a
/// process-local mutex on top of SQLite's own transaction; there is no
/// update or delete surface.
pub struct EpisodicLog {
    db_path: PathBuf,
    write_lock: Mutex<()>,
}

impl EpisodicLog {
    pub fn open(db_path: &Path) -> Result<Self, EpisodicError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| EpisodicError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let log = Self {
            db_path: db_path.to_path_buf(),
            write_lock: Mutex::new(()),
        };
        log.ensure_schema()?;
        Ok(log)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, EpisodicError> {
        let connection = Connection::open(&self.db_path).map_err(|source| EpisodicError::Open {
            path: self.db_path.display().to_string(),
            source,
        })?;
        connection
            .execute_batch("PRAGMA foreign_keys=ON; PRAGMA synchronous=FULL;")
            .map_err(|source| EpisodicError::Sql { source })?;
        Ok(connection)
    }

    fn ensure_schema(&self) -> Result<(), EpisodicError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS decisions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    task_id TEXT NOT NULL,
                    action_type TEXT NOT NULL,
                    content TEXT NOT NULL,
                    status TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tool_calls (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    decision_id INTEGER NOT NULL,
                    tool_name TEXT NOT NULL,
                    params TEXT NOT NULL,
                    result TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    FOREIGN KEY(decision_id) REFERENCES decisions(id)
                );

                CREATE TABLE IF NOT EXISTS validations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    decision_id INTEGER NOT NULL,
                    validator_type TEXT NOT NULL,
                    result TEXT NOT NULL,
                    notes TEXT NOT NULL,
                    FOREIGN KEY(decision_id) REFERENCES decisions(id)
                );

                CREATE INDEX IF NOT EXISTS idx_decisions_task_id
                    ON decisions(task_id);
                CREATE INDEX IF NOT EXISTS idx_decisions_action_type
                    ON decisions(action_type);
                CREATE INDEX IF NOT EXISTS idx_decisions_id_desc
                    ON decisions(id DESC);
                CREATE INDEX IF NOT EXISTS idx_tool_calls_decision_id
                    ON tool_calls(decision_id);
                CREATE INDEX IF NOT EXISTS idx_tool_calls_tool_name
                    ON tool_calls(tool_name);
                CREATE INDEX IF NOT EXISTS idx_tool_calls_id_desc
                    ON tool_calls(id DESC);
                ",
            )
            .map_err(|source| EpisodicError::Sql { source })?;
        Ok(())
    }

    pub fn append_decision(
        &self,
        task_id: &str,
        action_type: ActionType,
        content: &str,
        status: DecisionStatus,
    ) -> Result<i64, EpisodicError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let connection = self.connect()?;
        connection
            .execute(
                "INSERT INTO decisions (timestamp, task_id, action_type, content, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    now_rfc3339(),
                    task_id,
                    action_type.as_str(),
                    content,
                    status.as_str()
                ],
            )
            .map_err(|source| EpisodicError::Sql { source })?;
        Ok(connection.last_insert_rowid())
    }

    pub fn append_tool_call(
        &self,
        decision_id: i64,
        tool_name: &str,
        params_json: &str,
        result_json: &str,
    ) -> Result<i64, EpisodicError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let connection = self.connect()?;
        connection
            .execute(
                "INSERT INTO tool_calls (decision_id, tool_name, params, result, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![decision_id, tool_name, params_json, result_json, now_rfc3339()],
            )
            .map_err(|source| EpisodicError::Sql { source })?;
        Ok(connection.last_insert_rowid())
    }

    pub fn append_validation(
        &self,
        decision_id: i64,
        validator_type: &str,
        result: &str,
        notes: &str,
    ) -> Result<i64, EpisodicError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let connection = self.connect()?;
        connection
            .execute(
                "INSERT INTO validations (decision_id, validator_type, result, notes)
                 VALUES (?1, ?2, ?3, ?4)",
                params![decision_id, validator_type, result, notes],
            )
            .map_err(|source| EpisodicError::Sql { source })?;
        Ok(connection.last_insert_rowid())
    }

    pub fn search_decisions(
        &self,
        query: &str,
        task_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, EpisodicError> {
        if query.trim().is_empty() {
            return Err(EpisodicError::EmptyQuery);
        }
        let needle = like_needle(query);
        let connection = self.connect()?;

        let mut out = Vec::new();
        match task_id {
            Some(task_id) => {
                let mut statement = connection
                    .prepare(
                        "SELECT id, task_id, action_type, content, status, timestamp
                         FROM decisions
                         WHERE task_id = ?1
                           AND LOWER(content) LIKE ?2 ESCAPE '\\'
                         ORDER BY id DESC
                         LIMIT ?3",
                    )
                    .map_err(|source| EpisodicError::Sql { source })?;
                let rows = statement
                    .query_map(params![task_id, needle, limit as i64], map_decision_row)
                    .map_err(|source| EpisodicError::Sql { source })?;
                for row in rows {
                    out.push(decode_decision(
                        row.map_err(|source| EpisodicError::Sql { source })?,
                    )?);
                }
            }
            None => {
                let mut statement = connection
                    .prepare(
                        "SELECT id, task_id, action_type, content, status, timestamp
                         FROM decisions
                         WHERE LOWER(content) LIKE ?1 ESCAPE '\\'
                         ORDER BY id DESC
                         LIMIT ?2",
                    )
                    .map_err(|source| EpisodicError::Sql { source })?;
                let rows = statement
                    .query_map(params![needle, limit as i64], map_decision_row)
                    .map_err(|source| EpisodicError::Sql { source })?;
                for row in rows {
                    out.push(decode_decision(
                        row.map_err(|source| EpisodicError::Sql { source })?,
                    )?);
                }
            }
        }
        Ok(out)
    }

    pub fn search_tool_calls(
        &self,
        query: &str,
        task_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ToolCallRecord>, EpisodicError> {
        if query.trim().is_empty() {
            return Err(EpisodicError::EmptyQuery);
        }
        let needle = like_needle(query);
        let connection = self.connect()?;

        let mut out = Vec::new();
        match task_id {
            Some(task_id) => {
                let mut statement = connection
                    .prepare(
                        "SELECT t.id, t.decision_id, t.tool_name, t.params, t.result, t.timestamp
                         FROM tool_calls t
                         JOIN decisions d ON d.id = t.decision_id
                         WHERE d.task_id = ?1
                           AND (LOWER(t.tool_name) LIKE ?2 ESCAPE '\\'
                             OR LOWER(t.params) LIKE ?2 ESCAPE '\\'
                             OR LOWER(t.result) LIKE ?2 ESCAPE '\\')
                         ORDER BY t.id DESC
                         LIMIT ?3",
                    )
                    .map_err(|source| EpisodicError::Sql { source })?;
                let rows = statement
                    .query_map(params![task_id, needle, limit as i64], map_tool_call_row)
                    .map_err(|source| EpisodicError::Sql { source })?;
                for row in rows {
                    out.push(row.map_err(|source| EpisodicError::Sql { source })?);
                }
            }
            None => {
                let mut statement = connection
                    .prepare(
                        "SELECT id, decision_id, tool_name, params, result, timestamp
                         FROM tool_calls
                         WHERE LOWER(tool_name) LIKE ?1 ESCAPE '\\'
                            OR LOWER(params) LIKE ?1 ESCAPE '\\'
                            OR LOWER(result) LIKE ?1 ESCAPE '\\'
                         ORDER BY id DESC
                         LIMIT ?2",
                    )
                    .map_err(|source| EpisodicError::Sql { source })?;
                let rows = statement
                    .query_map(params![needle, limit as i64], map_tool_call_row)
                    .map_err(|source| EpisodicError::Sql { source })?;
                for row in rows {
                    out.push(row.map_err(|source| EpisodicError::Sql { source })?);
                }
            }
        }
        Ok(out)
    }

    pub fn list_decisions(&self, task_id: &str) -> Result<Vec<DecisionRecord>, EpisodicError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT id, task_id, action_type, content, status, timestamp
                 FROM decisions
                 WHERE task_id = ?1
                 ORDER BY id ASC",
            )
            .map_err(|source| EpisodicError::Sql { source })?;
        let rows = statement
            .query_map(params![task_id], map_decision_row)
            .map_err(|source| EpisodicError::Sql { source })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(decode_decision(
                row.map_err(|source| EpisodicError::Sql { source })?,
            )?);
        }
        Ok(out)
    }

    pub fn list_tool_calls(&self, decision_id: i64) -> Result<Vec<ToolCallRecord>, EpisodicError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT id, decision_id, tool_name, params, result, timestamp
                 FROM tool_calls
                 WHERE decision_id = ?1
                 ORDER BY id ASC",
            )
            .map_err(|source| EpisodicError::Sql { source })?;
        let rows = statement
            .query_map(params![decision_id], map_tool_call_row)
            .map_err(|source| EpisodicError::Sql { source })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|source| EpisodicError::Sql { source })?);
        }
        Ok(out)
    }
}

type RawDecisionRow = (i64, String, String, String, String, String);

fn map_decision_row(row: &rusqlite::Row<'_>) -> Result<RawDecisionRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_decision(raw: RawDecisionRow) -> Result<DecisionRecord, EpisodicError> {
    let (id, task_id, action_type_raw, content, status_raw, timestamp) = raw;
    Ok(DecisionRecord {
        id,
        task_id,
        action_type: ActionType::parse(&action_type_raw)?,
        content,
        status: DecisionStatus::parse(&status_raw)?,
        timestamp,
    })
}

fn map_tool_call_row(row: &rusqlite::Row<'_>) -> Result<ToolCallRecord, rusqlite::Error> {
    Ok(ToolCallRecord {
        id: row.get(0)?,
        decision_id: row.get(1)?,
        tool_name: row.get(2)?,
        params: row.get(3)?,
        result: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

fn like_needle(query: &str) -> String {
    let escaped = query
        .trim()
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
