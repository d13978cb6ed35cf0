use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TASK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// New task identity: `task-` followed by 10 lowercase hex characters.
pub fn generate_task_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = TASK_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(counter.to_le_bytes());
    let digest = hasher.finalize();

    let mut suffix = String::with_capacity(10);
    for byte in digest.iter().take(5) {
        suffix.push_str(&format!("{byte:02x}"));
    }
    format!("task-{suffix}")
}

pub fn validate_task_id(raw: &str) -> Result<(), String> {
    if raw.is_empty() {
        return Err("task id must be non-empty".to_string());
    }
    if raw
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Ok(());
    }
    Err("task id must use only ASCII letters, digits, '-' or '_'".to_string())
}
