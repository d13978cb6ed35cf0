use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Replace `path` in one step: content lands in a hashed `.part`
/// sibling, is flushed to disk, then renamed over the target. A
/// concurrent reader sees either the previous document or the new one,
/// never a torn write. The staging file is removed if any step fails.
pub fn atomic_write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => return Err(std::io::Error::other("path has no parent")),
    };
    fs::create_dir_all(parent)?;

    let staging = staging_sibling(parent, path);
    if let Err(err) = fill_staging(&staging, content) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }
    if let Err(err) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }
    flush_directory(parent)
}

/// Staging sibling `<name>.<digest8>.part`. The digest covers the pid, a
/// process-local counter and the clock, so concurrent writers of the
/// same target never collide on a staging name.
fn staging_sibling(parent: &Path, path: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let token = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(token.to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    let tag = hasher
        .finalize()
        .iter()
        .take(4)
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();

    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("write");
    parent.join(format!("{name}.{tag}.part"))
}

/// The staging file must be fully on disk before the rename makes it
/// visible under the target name.
fn fill_staging(staging: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staging)?;
    file.write_all(content)?;
    file.sync_all()
}

/// Persist the rename itself where the platform allows it.
fn flush_directory(parent: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        fs::File::open(parent)?.sync_all()
    }
    #[cfg(not(unix))]
    {
        let _ = parent;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn staging_leftovers(dir: &Path) -> usize {
        fs::read_dir(dir)
            .expect("list dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
            .count()
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("state/doc.json");

        atomic_write_file(&target, b"first").expect("first write");
        atomic_write_file(&target, b"second").expect("second write");

        let content = fs::read_to_string(&target).expect("read back");
        assert_eq!(content, "second");
        assert_eq!(staging_leftovers(target.parent().expect("parent")), 0);
    }

    #[test]
    fn staging_names_are_unique_per_write() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("doc.json");
        let first = staging_sibling(dir.path(), &target);
        let second = staging_sibling(dir.path(), &target);
        assert_ne!(first, second);
        assert!(first.to_string_lossy().ends_with(".part"));
    }

    #[test]
    fn failed_rename_cleans_up_the_staging_file() {
        let dir = tempdir().expect("tempdir");
        // Renaming a file over a non-empty directory fails on every
        // platform; the staging sibling must not survive it.
        let target = dir.path().join("occupied");
        fs::create_dir_all(target.join("child")).expect("occupy target");

        assert!(atomic_write_file(&target, b"content").is_err());
        assert_eq!(staging_leftovers(dir.path()), 0);
    }
}
