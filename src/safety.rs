use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const BACKUP_SUFFIX: &str = ".droidmut.bak";
pub const LOCK_FILE: &str = ".droidmut.lock";

pub fn backup_path(artifact: &Path) -> PathBuf {
    let mut backup = artifact.to_path_buf();
    let name = format!(
        ".{}{}",
        artifact.file_name().unwrap_or_default().to_string_lossy(),
        BACKUP_SUFFIX
    );
    backup.set_file_name(name);
    backup
}

fn artifact_for_backup(backup: &Path) -> Option<PathBuf> {
    let name = backup.file_name()?.to_str()?;
    let original = name.strip_prefix('.')?.strip_suffix(BACKUP_SUFFIX)?;
    Some(backup.with_file_name(original))
}

/// Backups left behind by an interrupted run, as `(artifact, backup)` pairs.
pub fn check_interrupted_run(classes_dir: &Path) -> Vec<(PathBuf, PathBuf)> {
    let mut found = Vec::new();
    collect_backups(classes_dir, &mut found);
    found.sort();
    found
}

fn collect_backups(dir: &Path, found: &mut Vec<(PathBuf, PathBuf)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_backups(&path, found);
        } else if let Some(artifact) = artifact_for_backup(&path) {
            found.push((artifact, path));
        }
    }
}

pub fn restore_from_backup(artifact: &Path, backup: &Path) -> Result<()> {
    std::fs::copy(backup, artifact).map_err(|e| Error::io(artifact, e))?;
    std::fs::remove_file(backup).map_err(|e| Error::io(backup, e))?;
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// A mutated artifact installed over the original.
///
/// The original bytes are restored when the guard is dropped, whatever the
/// exit path; `restore` does the same but reports failures.
pub struct ArtifactGuard {
    path: PathBuf,
    backup: PathBuf,
    original: Vec<u8>,
    restored: bool,
}

impl ArtifactGuard {
    pub fn install(path: &Path, mutated: &[u8]) -> Result<Self> {
        let original = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let backup = backup_path(path);
        std::fs::write(&backup, &original).map_err(|e| Error::io(&backup, e))?;
        let guard = ArtifactGuard {
            path: path.to_path_buf(),
            backup,
            original,
            restored: false,
        };
        write_atomic(path, mutated)?;
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn restore(mut self) -> Result<()> {
        self.restore_original()
    }

    fn restore_original(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        write_atomic(&self.path, &self.original)?;
        self.restored = true;
        let _ = std::fs::remove_file(&self.backup);
        Ok(())
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore_original() {
            log::error!(
                "could not restore {}: {} (backup kept at {})",
                self.path.display(),
                e,
                self.backup.display()
            );
        }
    }
}

/// Exclusive claim on an artifact directory for one session.
///
/// The claim is an advisory `flock` on `.droidmut.lock`, so the OS drops it
/// when the holding process dies. A lock file left behind by a killed run is
/// simply reused.
#[derive(Debug)]
pub struct DirLock {
    file: File,
}

impl DirLock {
    pub fn acquire(dir: &Path, session_id: &str) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        try_lock_exclusive(&file).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock => Error::Locked(dir.to_path_buf()),
            _ => Error::io(&path, e),
        })?;
        file.set_len(0).map_err(|e| Error::io(&path, e))?;
        file.write_all(session_id.as_bytes())
            .map_err(|e| Error::io(&path, e))?;
        Ok(DirLock { file })
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn try_lock_exclusive(file: &File) -> std::io::Result<()> {
    file.try_lock().map_err(|e| match e {
        std::fs::TryLockError::WouldBlock => std::io::ErrorKind::WouldBlock.into(),
        std::fs::TryLockError::Error(e) => e,
    })
}

impl Drop for DirLock {
    fn drop(&mut self) {
        // Closing the file releases the lock; the file itself stays.
        let _ = self.file.set_len(0);
    }
}
