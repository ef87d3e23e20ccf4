use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// One archived media item. Content is read on demand, never cached here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified_ns: u128,
}

/// The on-disk media directory. Dotfiles are ignored so in-flight ingest
/// temp files never reach the remote.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<LocalFile>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if let Err(err) = collect_files(root, &path, out) {
                tracing::warn!(dir = %path.display(), "skipping unreadable directory: {err:#}");
            }
            continue;
        }
        // Symlinks to files count as files; a dangling one surfaces as a read error later.
        if file_type.is_symlink() && path.is_dir() {
            continue;
        }
        if !file_type.is_file() && !file_type.is_symlink() {
            continue;
        }
        let Some(relative_path) = relative_key(root, &path) else {
            tracing::warn!(path = %path.display(), "skipping file with non-utf8 path");
            continue;
        };
        out.push(LocalFile {
            relative_path,
            absolute_path: path,
        });
    }
    Ok(())
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))
    }

    pub fn path_for(&self, relative_path: &str) -> PathBuf {
        relative_path
            .split('/')
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    /// Enumerate every file, sorted by relative path. Fails only when the
    /// root itself cannot be read.
    pub fn enumerate(&self) -> Result<Vec<LocalFile>> {
        let mut out = Vec::new();
        collect_files(&self.root, &self.root, &mut out)?;
        out.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(out)
    }

    pub fn read(&self, file: &LocalFile) -> io::Result<Vec<u8>> {
        fs::read(&file.absolute_path)
    }

    pub fn stat(&self, file: &LocalFile) -> io::Result<FileStat> {
        let meta = fs::metadata(&file.absolute_path)?;
        let modified_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(FileStat {
            size: meta.len(),
            modified_ns,
        })
    }

    /// Number of archived files. A missing store counts as zero.
    pub fn count_archived_files(&self) -> Result<usize> {
        if !self.exists() {
            return Ok(0);
        }
        Ok(self.enumerate()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::LocalStore;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn enumerate_walks_subdirectories_and_skips_dotfiles() {
        let tmp = tempdir().expect("tempdir");
        let root = tmp.path().join("media");
        fs::create_dir_all(root.join("2024")).expect("mkdir");
        fs::write(root.join("a.png"), b"a").expect("write a");
        fs::write(root.join("2024/b.gif"), b"b").expect("write b");
        fs::write(root.join(".tmpXYZ"), b"partial").expect("write tmp");

        let store = LocalStore::new(&root);
        let files = store.enumerate().expect("enumerate");
        let keys = files
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["2024/b.gif", "a.png"]);
        assert_eq!(store.path_for("2024/b.gif"), root.join("2024").join("b.gif"));
    }

    #[test]
    fn missing_root_counts_zero_but_fails_enumeration() {
        let tmp = tempdir().expect("tempdir");
        let store = LocalStore::new(tmp.path().join("absent"));
        assert_eq!(store.count_archived_files().expect("count"), 0);
        assert!(store.enumerate().is_err());
    }
}
