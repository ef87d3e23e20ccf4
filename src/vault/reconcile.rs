use crate::error::{RemoteError, SyncFileError};
use crate::remote::RemoteRepo;
use crate::vault::fingerprint::FingerprintIndex;
use crate::vault::shutdown::ShutdownSignal;
use crate::vault::store::{LocalFile, LocalStore};
use crate::vault::util::sha256_hex;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Manual,
    Scheduled,
}

impl SyncTrigger {
    pub fn label(self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: String,
    pub error: SyncFileError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    PartialFailure(Vec<FileFailure>),
    /// Stopped early. `failures` holds files that failed before the stop.
    Aborted {
        reason: String,
        failures: Vec<FileFailure>,
    },
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Success => "success",
            SyncOutcome::PartialFailure(_) => "partial-failure",
            SyncOutcome::Aborted { .. } => "aborted",
        }
    }
}

/// One reconciler pass.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: usize,
    /// Paths whose remote token moved since this process last saw them.
    pub remote_changed: Vec<String>,
    pub outcome: SyncOutcome,
}

impl SyncRun {
    fn start(trigger: SyncTrigger) -> Self {
        Self {
            trigger,
            started_at: Utc::now(),
            created: Vec::new(),
            updated: Vec::new(),
            unchanged: 0,
            remote_changed: Vec::new(),
            outcome: SyncOutcome::Success,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == SyncOutcome::Success
    }

    pub fn failures(&self) -> &[FileFailure] {
        match &self.outcome {
            SyncOutcome::PartialFailure(failures) => failures,
            SyncOutcome::Aborted { failures, .. } => failures,
            SyncOutcome::Success => &[],
        }
    }

    pub fn counts_line(&self) -> String {
        format!(
            "created={} updated={} unchanged={} failed={}",
            self.created.len(),
            self.updated.len(),
            self.unchanged,
            self.failures().len()
        )
    }
}

impl fmt::Display for SyncRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sync started {} {}: {}",
            self.trigger.label(),
            self.started_at.to_rfc3339(),
            self.outcome.label(),
            self.counts_line()
        )?;
        if let SyncOutcome::Aborted { reason, .. } = &self.outcome {
            write!(f, "\n  reason: {reason}")?;
        }
        for path in &self.remote_changed {
            write!(f, "\n  remote changed outside chatvault: {path}")?;
        }
        for failure in self.failures() {
            write!(f, "\n  failed {}: {}", failure.path, failure.error)?;
        }
        Ok(())
    }
}

/// Converges the remote branch with the local store, one file at a time.
pub struct Reconciler {
    remote: Arc<dyn RemoteRepo>,
    store: LocalStore,
    branch: String,
}

impl Reconciler {
    pub fn new(remote: Arc<dyn RemoteRepo>, store: LocalStore, branch: impl Into<String>) -> Self {
        Self {
            remote,
            store,
            branch: branch.into(),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Per-file errors are collected into the outcome; only an unreadable
    /// store root or a shutdown request aborts the pass.
    pub fn reconcile(
        &self,
        trigger: SyncTrigger,
        index: &mut FingerprintIndex,
        cancel: &ShutdownSignal,
    ) -> SyncRun {
        let mut run = SyncRun::start(trigger);
        if index.branch() != self.branch {
            tracing::info!(
                from = index.branch(),
                to = %self.branch,
                "target branch changed, dropping cached remote tokens"
            );
            index.retarget(&self.branch);
        }

        let files = match self.store.enumerate() {
            Ok(files) => files,
            Err(err) => {
                run.outcome = SyncOutcome::Aborted {
                    reason: format!("local store unavailable: {err:#}"),
                    failures: Vec::new(),
                };
                return run;
            }
        };

        let mut failures = Vec::new();
        for (position, file) in files.iter().enumerate() {
            if cancel.is_triggered() {
                tracing::info!(
                    remaining = files.len() - position,
                    "sync cancelled between files"
                );
                run.outcome = SyncOutcome::Aborted {
                    reason: "cancelled".to_string(),
                    failures,
                };
                return run;
            }
            match self.sync_file(file, index, &mut run.remote_changed) {
                Ok(FileAction::Created) => run.created.push(file.relative_path.clone()),
                Ok(FileAction::Updated) => run.updated.push(file.relative_path.clone()),
                Ok(FileAction::Unchanged) => run.unchanged += 1,
                Err(error) => {
                    tracing::warn!(path = %file.relative_path, "sync failed: {error}");
                    failures.push(FileFailure {
                        path: file.relative_path.clone(),
                        error,
                    });
                }
            }
        }

        let live = files
            .iter()
            .map(|f| f.relative_path.clone())
            .collect::<BTreeSet<_>>();
        index.retain_paths(&live);

        if !failures.is_empty() {
            run.outcome = SyncOutcome::PartialFailure(failures);
        }
        run
    }

    fn sync_file(
        &self,
        file: &LocalFile,
        index: &mut FingerprintIndex,
        remote_changed: &mut Vec<String>,
    ) -> Result<FileAction, SyncFileError> {
        let path = file.relative_path.as_str();
        let local_read = |err: std::io::Error| SyncFileError::LocalRead(err.to_string());
        let stat = self.store.stat(file).map_err(local_read)?;
        let content = self.store.read(file).map_err(local_read)?;
        let local_token = self.remote.content_token(&content);

        let fetched = self.remote.get_file(path, &self.branch);
        if let (Ok(existing), Some(cached)) = (&fetched, index.get(path)) {
            if existing.version_token != cached {
                tracing::warn!(path, "remote file changed outside chatvault");
                remote_changed.push(path.to_string());
            }
        }

        let action = match fetched {
            Err(RemoteError::NotFound) => {
                let token = self.remote.create_file(
                    path,
                    &format!("Add {path}"),
                    &content,
                    &self.branch,
                )?;
                tracing::info!(path, "created on remote");
                index.set(path, token);
                FileAction::Created
            }
            Err(err) => return Err(err.into()),
            Ok(existing) if existing.version_token == local_token => {
                index.set(path, existing.version_token);
                FileAction::Unchanged
            }
            Ok(existing) => {
                let token = self.remote.update_file(
                    path,
                    &format!("Update {path}"),
                    &content,
                    &existing.version_token,
                    &self.branch,
                )?;
                tracing::info!(path, "updated on remote");
                index.set(path, token);
                FileAction::Updated
            }
        };

        index.record_local(path, stat, sha256_hex(&content));
        Ok(action)
    }
}
