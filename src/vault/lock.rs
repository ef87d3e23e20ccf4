use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SYNC_LOCK_FILE: &str = "sync.lock";
pub const DAEMON_LOCK_FILE: &str = "watch.daemon.lock";

/// Exclusive advisory lock, released when dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

#[derive(Debug)]
pub enum LockAttempt {
    Acquired(FileLock),
    Contended,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        tracing::debug!(lock = %self.path.display(), "released lock");
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open lock file {}", path.display()))
}

pub fn try_acquire(path: &Path) -> Result<LockAttempt> {
    let file = open_lock_file(path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(LockAttempt::Acquired(FileLock {
            file,
            path: path.to_path_buf(),
        })),
        Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(LockAttempt::Contended),
        Err(err) => {
            Err(err).with_context(|| format!("failed to lock {}", path.display()))
        }
    }
}

/// Like [`try_acquire`], then records this process id in the lock file.
pub fn try_acquire_with_pid(path: &Path) -> Result<LockAttempt> {
    let attempt = try_acquire(path)?;
    if let LockAttempt::Acquired(lock) = &attempt {
        let mut file = &lock.file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("failed to write pid to {}", path.display()))?;
        file.flush()?;
    }
    Ok(attempt)
}

pub fn read_lock_pid(path: &Path) -> Result<u32> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let pid_str = raw
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(str::trim)
        .context("lock file is empty")?;
    pid_str
        .parse::<u32>()
        .with_context(|| format!("invalid pid in lock file: {pid_str}"))
}

#[cfg(test)]
mod tests {
    use super::{LockAttempt, read_lock_pid, try_acquire, try_acquire_with_pid};
    use tempfile::tempdir;

    #[test]
    fn second_acquire_is_contended_until_release() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("state/sync.lock");

        let first = try_acquire(&path).expect("first");
        assert!(matches!(first, LockAttempt::Acquired(_)));
        assert!(matches!(
            try_acquire(&path).expect("second"),
            LockAttempt::Contended
        ));

        drop(first);
        assert!(matches!(
            try_acquire(&path).expect("third"),
            LockAttempt::Acquired(_)
        ));
    }

    #[test]
    fn pid_lock_records_current_process() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("daemon.lock");
        let _lock = try_acquire_with_pid(&path).expect("lock");
        assert_eq!(read_lock_pid(&path).expect("pid"), std::process::id());
    }
}
