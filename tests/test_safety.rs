use droidmut::safety::{self, ArtifactGuard, DirLock};
use droidmut::Error;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn backup_path_format() {
    let path = safety::backup_path(Path::new("/tmp/classes/Net.class"));
    assert_eq!(path, Path::new("/tmp/classes/.Net.class.droidmut.bak"));
}

#[test]
fn backup_path_nested() {
    let path = safety::backup_path(Path::new("/build/classes/com/example/Net.class"));
    assert_eq!(path, Path::new("/build/classes/com/example/.Net.class.droidmut.bak"));
}

#[test]
fn check_interrupted_run_is_empty_when_clean() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Net.class"), "{}").unwrap();
    assert!(safety::check_interrupted_run(dir.path()).is_empty());
}

#[test]
fn check_interrupted_run_finds_nested_backups() {
    let dir = TempDir::new().unwrap();
    let pkg = dir.path().join("com/example");
    std::fs::create_dir_all(&pkg).unwrap();
    let artifact = pkg.join("Net.class");
    let backup = pkg.join(".Net.class.droidmut.bak");
    std::fs::write(&artifact, "mutated").unwrap();
    std::fs::write(&backup, "original").unwrap();

    let found = safety::check_interrupted_run(dir.path());
    assert_eq!(found, vec![(artifact, backup)]);
}

#[test]
fn restore_from_backup_restores_and_cleans() {
    let dir = TempDir::new().unwrap();
    let artifact = dir.path().join("Net.class");
    let backup = dir.path().join(".Net.class.droidmut.bak");
    std::fs::write(&artifact, "mutated").unwrap();
    std::fs::write(&backup, "original").unwrap();

    safety::restore_from_backup(&artifact, &backup).unwrap();
    assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "original");
    assert!(!backup.exists());
}

// --- guard ---

#[test]
fn guard_installs_and_restores() {
    let dir = TempDir::new().unwrap();
    let artifact = dir.path().join("Net.class");
    std::fs::write(&artifact, b"original bytes").unwrap();

    let guard = ArtifactGuard::install(&artifact, b"mutated bytes").unwrap();
    assert_eq!(std::fs::read(&artifact).unwrap(), b"mutated bytes");
    assert!(safety::backup_path(&artifact).exists());
    assert_eq!(guard.path(), artifact);

    guard.restore().unwrap();
    assert_eq!(std::fs::read(&artifact).unwrap(), b"original bytes");
    assert!(!safety::backup_path(&artifact).exists());
}

#[test]
fn guard_restores_on_drop() {
    let dir = TempDir::new().unwrap();
    let artifact = dir.path().join("Net.class");
    std::fs::write(&artifact, b"original bytes").unwrap();

    {
        let _guard = ArtifactGuard::install(&artifact, b"mutated").unwrap();
        assert_eq!(std::fs::read(&artifact).unwrap(), b"mutated");
    }
    assert_eq!(std::fs::read(&artifact).unwrap(), b"original bytes");
}

#[test]
fn guard_restores_when_unwinding() {
    let dir = TempDir::new().unwrap();
    let artifact = dir.path().join("Net.class");
    std::fs::write(&artifact, b"original bytes").unwrap();

    let path = artifact.clone();
    let result = std::panic::catch_unwind(move || {
        let _guard = ArtifactGuard::install(&path, b"mutated").unwrap();
        panic!("test run crashed");
    });
    assert!(result.is_err());
    assert_eq!(std::fs::read(&artifact).unwrap(), b"original bytes");
    assert!(safety::check_interrupted_run(dir.path()).is_empty());
}

#[test]
fn guard_fails_for_missing_artifact() {
    let dir = TempDir::new().unwrap();
    let result = ArtifactGuard::install(&dir.path().join("Missing.class"), b"x");
    assert!(matches!(result, Err(Error::Io { .. })));
}

// --- lock ---

#[test]
fn lock_is_exclusive() {
    let dir = TempDir::new().unwrap();
    let lock = DirLock::acquire(dir.path(), "aaaa0001").unwrap();
    let content = std::fs::read_to_string(dir.path().join(safety::LOCK_FILE)).unwrap();
    assert_eq!(content, "aaaa0001");

    let second = DirLock::acquire(dir.path(), "bbbb0002");
    assert!(matches!(second, Err(Error::Locked(_))));

    drop(lock);
    let _again = DirLock::acquire(dir.path(), "bbbb0002").unwrap();
    let content = std::fs::read_to_string(dir.path().join(safety::LOCK_FILE)).unwrap();
    assert_eq!(content, "bbbb0002");
}

#[test]
fn leftover_lock_file_does_not_block() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(safety::LOCK_FILE), "dead-session-from-a-killed-run").unwrap();

    let _lock = DirLock::acquire(dir.path(), "cccc0003").unwrap();
    let content = std::fs::read_to_string(dir.path().join(safety::LOCK_FILE)).unwrap();
    assert_eq!(content, "cccc0003");
}
