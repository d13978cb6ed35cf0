use jarvis_core::tools::{Sandbox, SandboxConfig};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn sandbox_at(root: &Path) -> Sandbox {
    Sandbox::new(SandboxConfig::read_only(vec![root.to_path_buf()])).expect("sandbox")
}

#[test]
fn absolute_path_outside_roots_fails_closed() {
    let dir = tempdir().expect("tempdir");
    let sandbox = sandbox_at(dir.path());

    let err = sandbox
        .read_text(Path::new("/etc/passwd"))
        .expect_err("outside root must fail");
    assert_eq!(err.code(), "path_not_allowed");
}

#[cfg(unix)]
#[test]
fn symlink_escape_is_resolved_and_denied() {
    let dir = tempdir().expect("tempdir");
    let link = dir.path().join("innocent.txt");
    std::os::unix::fs::symlink("/etc/passwd", &link).expect("create symlink");

    let sandbox = sandbox_at(dir.path());
    let err = sandbox
        .read_text(Path::new("innocent.txt"))
        .expect_err("symlink escape must fail");
    assert_eq!(err.code(), "path_not_allowed");
}

#[test]
fn relative_paths_join_the_primary_root() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("notes.txt"), "hello sandbox").expect("seed file");

    let sandbox = sandbox_at(dir.path());
    let result = sandbox.read_text(Path::new("notes.txt")).expect("read");
    assert_eq!(result["content"], "hello sandbox");
    assert_eq!(result["size"], 13);
}

#[test]
fn write_and_delete_are_disabled_by_default() {
    let dir = tempdir().expect("tempdir");
    let sandbox = sandbox_at(dir.path());

    let err = sandbox
        .write_text(Path::new("new.txt"), "content")
        .expect_err("write disabled");
    assert_eq!(err.code(), "write_not_allowed");

    let err = sandbox
        .delete_path(Path::new("new.txt"))
        .expect_err("delete disabled");
    assert_eq!(err.code(), "delete_not_allowed");
}

#[test]
fn enabled_write_creates_parents_and_respects_size_cap() {
    let dir = tempdir().expect("tempdir");
    let mut config = SandboxConfig::read_only(vec![dir.path().to_path_buf()]).with_write(true);
    config.max_write_bytes = 8;
    let sandbox = Sandbox::new(config).expect("sandbox");

    let result = sandbox
        .write_text(Path::new("nested/out.txt"), "ok")
        .expect("write");
    assert_eq!(result["size"], 2);
    assert!(dir.path().join("nested/out.txt").exists());

    let err = sandbox
        .write_text(Path::new("nested/big.txt"), "far too large")
        .expect_err("over cap");
    assert_eq!(err.code(), "write_too_large");
}

#[test]
fn read_size_cap_fails_before_reading() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("big.txt"), "a".repeat(64)).expect("seed");

    let mut config = SandboxConfig::read_only(vec![dir.path().to_path_buf()]);
    config.max_read_bytes = 16;
    let sandbox = Sandbox::new(config).expect("sandbox");

    let err = sandbox
        .read_text(Path::new("big.txt"))
        .expect_err("over read cap");
    assert_eq!(err.code(), "read_too_large");
}

#[test]
fn list_dir_is_sorted_and_bounded() {
    let dir = tempdir().expect("tempdir");
    for name in ["zeta.txt", "alpha.txt", "mid.txt"] {
        fs::write(dir.path().join(name), "x").expect("seed");
    }
    let sandbox = sandbox_at(dir.path());
    let listing = sandbox.list_dir(Path::new(".")).expect("list");
    assert_eq!(
        listing["entries"],
        serde_json::json!(["alpha.txt", "mid.txt", "zeta.txt"])
    );

    let mut config = SandboxConfig::read_only(vec![dir.path().to_path_buf()]);
    config.max_list_entries = 2;
    let bounded = Sandbox::new(config).expect("sandbox");
    let err = bounded.list_dir(Path::new(".")).expect_err("over cap");
    assert_eq!(err.code(), "list_limit_exceeded");
}

#[test]
fn search_returns_sorted_relative_paths() {
    let dir = tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("sub/deeper")).expect("dirs");
    for path in ["b.log", "a.log", "sub/c.log", "sub/deeper/d.log", "sub/skip.txt"] {
        fs::write(dir.path().join(path), "x").expect("seed");
    }

    let sandbox = sandbox_at(dir.path());
    let result = sandbox.search(Path::new("."), "*.log", 100).expect("search");
    assert_eq!(
        result["matches"],
        serde_json::json!(["a.log", "b.log", "sub/c.log", "sub/deeper/d.log"])
    );
    assert_eq!(result["truncated"], false);

    let capped = sandbox.search(Path::new("."), "*.log", 2).expect("search");
    assert_eq!(capped["truncated"], true);
    assert_eq!(capped["count"], 2);
}

#[test]
fn search_scan_cap_fails_with_search_limit_exceeded() {
    let dir = tempdir().expect("tempdir");
    for index in 0..12 {
        fs::write(dir.path().join(format!("file-{index:02}.txt")), "x").expect("seed");
    }
    let mut config = SandboxConfig::read_only(vec![dir.path().to_path_buf()]);
    config.max_visited = 5;
    let sandbox = Sandbox::new(config).expect("sandbox");

    let err = sandbox
        .search(Path::new("."), "*.txt", 100)
        .expect_err("over scan cap");
    assert_eq!(err.code(), "search_limit_exceeded");
}

#[test]
fn out_of_root_paths_fail_closed_even_with_reads_disabled() {
    let dir = tempdir().expect("tempdir");
    let mut config = SandboxConfig::read_only(vec![dir.path().to_path_buf()]);
    config.allow_read = false;
    let sandbox = Sandbox::new(config).expect("sandbox");

    // Containment wins over the read flag.
    let err = sandbox
        .read_text(Path::new("/etc/passwd"))
        .expect_err("outside root must fail first");
    assert_eq!(err.code(), "path_not_allowed");
    let err = sandbox
        .list_dir(Path::new("/etc"))
        .expect_err("outside root must fail first");
    assert_eq!(err.code(), "path_not_allowed");
    let err = sandbox
        .file_info(Path::new("/etc/passwd"))
        .expect_err("outside root must fail first");
    assert_eq!(err.code(), "path_not_allowed");
    let err = sandbox
        .search(Path::new("/etc"), "*", 10)
        .expect_err("outside root must fail first");
    assert_eq!(err.code(), "path_not_allowed");
    let err = sandbox
        .write_text(Path::new("/etc/evil.txt"), "x")
        .expect_err("outside root must fail first");
    assert_eq!(err.code(), "path_not_allowed");
    let err = sandbox
        .delete_path(Path::new("/etc/passwd"))
        .expect_err("outside root must fail first");
    assert_eq!(err.code(), "path_not_allowed");

    // In-root paths still hit the disabled-read policy.
    fs::write(dir.path().join("inside.txt"), "x").expect("seed");
    let err = sandbox
        .read_text(Path::new("inside.txt"))
        .expect_err("reads disabled");
    assert_eq!(err.code(), "read_not_allowed");
    let err = sandbox.list_dir(Path::new(".")).expect_err("reads disabled");
    assert_eq!(err.code(), "read_not_allowed");
}

#[cfg(unix)]
#[test]
fn symlink_escape_is_denied_before_the_read_flag_is_consulted() {
    let dir = tempdir().expect("tempdir");
    let link = dir.path().join("innocent.txt");
    std::os::unix::fs::symlink("/etc/passwd", &link).expect("create symlink");

    let mut config = SandboxConfig::read_only(vec![dir.path().to_path_buf()]);
    config.allow_read = false;
    let sandbox = Sandbox::new(config).expect("sandbox");

    let err = sandbox
        .read_text(Path::new("innocent.txt"))
        .expect_err("symlink escape must fail");
    assert_eq!(err.code(), "path_not_allowed");
}

#[test]
fn missing_paths_report_not_found() {
    let dir = tempdir().expect("tempdir");
    let sandbox = sandbox_at(dir.path());
    let err = sandbox
        .read_text(Path::new("ghost.txt"))
        .expect_err("missing file");
    assert_eq!(err.code(), "not_found");

    let err = sandbox
        .file_info(Path::new("ghost/deeper.txt"))
        .expect_err("missing parent");
    assert_eq!(err.code(), "not_found");
}
