use crate::vault::store::FileStat;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    pub local: Option<LocalDigest>,
    pub remote_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDigest {
    pub stat: FileStat,
    pub content_hash: String,
}

/// In-memory record of what each path looked like locally and which remote
/// version token it was last seen with. Tokens belong to `branch` only.
#[derive(Debug, Clone)]
pub struct FingerprintIndex {
    branch: String,
    entries: BTreeMap<String, Fingerprint>,
}

impl FingerprintIndex {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Switching branches invalidates every cached token.
    pub fn retarget(&mut self, branch: &str) {
        if self.branch != branch {
            self.branch = branch.to_string();
            self.entries.clear();
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries
            .get(path)
            .and_then(|entry| entry.remote_token.as_deref())
    }

    pub fn set(&mut self, path: &str, token: impl Into<String>) {
        self.entries.entry(path.to_string()).or_default().remote_token = Some(token.into());
    }

    pub fn record_local(&mut self, path: &str, stat: FileStat, content_hash: impl Into<String>) {
        self.entries.entry(path.to_string()).or_default().local = Some(LocalDigest {
            stat,
            content_hash: content_hash.into(),
        });
    }

    /// Hash recorded for `path`, reusable only while size and mtime are unchanged.
    pub fn cached_hash(&self, path: &str, stat: FileStat) -> Option<&str> {
        let local = self.entries.get(path)?.local.as_ref()?;
        (local.stat == stat).then_some(local.content_hash.as_str())
    }

    /// Forget paths that are no longer in the local store.
    pub fn retain_paths(&mut self, live: &BTreeSet<String>) {
        self.entries.retain(|path, _| live.contains(path));
    }

    pub fn snapshot_hashes(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter_map(|(path, entry)| {
                entry
                    .local
                    .as_ref()
                    .map(|local| (path.clone(), local.content_hash.clone()))
            })
            .collect()
    }
}
