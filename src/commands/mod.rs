pub mod count;
pub mod ingest;
pub mod save;
pub mod status;
pub mod stop;
pub mod sync;
pub mod watch;

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ErrorCode;
use crate::remote::github::GitHubRepo;
use crate::vault::config::{self, VaultConfig};
use crate::vault::paths::VaultPaths;
use crate::vault::reconcile::Reconciler;
use crate::vault::scheduler::Scheduler;
use crate::vault::shutdown::ShutdownSignal;
use crate::vault::store::LocalStore;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn coded_issue(&mut self, code: ErrorCode, text: impl AsRef<str>) {
        self.issue(format!("{}: {}", code.as_str(), text.as_ref()));
    }
}

pub fn load_config() -> Result<VaultConfig> {
    config::load_config().context(ErrorCode::E005ConfigInvalid.as_str())
}

/// Returns `None` (after recording the issue) when no remote repo is set.
pub fn build_scheduler(
    paths: &VaultPaths,
    cfg: &VaultConfig,
    shutdown: ShutdownSignal,
    report: &mut CommandReport,
) -> Result<Option<Scheduler>> {
    if cfg.remote.repo.is_empty() {
        report.coded_issue(
            ErrorCode::E003RemoteUnconfigured,
            "set CHATVAULT_REMOTE_REPO or remote.repo to owner/name",
        );
        return Ok(None);
    }
    let remote = Arc::new(GitHubRepo::from_config(cfg)?);
    let reconciler = Reconciler::new(
        remote,
        LocalStore::new(&paths.media_dir),
        cfg.sync.target_branch.clone(),
    );
    Ok(Some(
        Scheduler::new(reconciler, shutdown).with_vault_paths(paths),
    ))
}
