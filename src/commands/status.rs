use anyhow::Result;
use std::env;

use crate::commands::{CommandReport, load_config};
use crate::vault::audit::audit_log_path;
use crate::vault::lock::{self, DAEMON_LOCK_FILE, LockAttempt};
use crate::vault::paths::resolve_paths;
use crate::vault::store::LocalStore;

include!(concat!(env!("OUT_DIR"), "/chatvault_env_allowlist.rs"));

const SECRET_VARS: [&str; 2] = ["CHATVAULT_GITHUB_TOKEN", "CHATVAULT_DISCORD_TOKEN"];

fn env_summary(name: &str) -> Option<String> {
    let value = env::var(name).ok()?;
    if SECRET_VARS.contains(&name) {
        return Some(format!("{name}=<set>"));
    }
    Some(format!("{name}={value}"))
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build={}", env!("BUILD_UUID")));
    report.detail(format!("vault_home={}", paths.vault_home.display()));
    report.detail(format!("media_dir={}", paths.media_dir.display()));
    report.detail(format!("state_dir={}", paths.state_dir.display()));
    report.detail(format!("saved_dir={}", paths.saved_dir.display()));
    report.detail(format!("audit_log={}", audit_log_path(&paths).display()));

    let store = LocalStore::new(&paths.media_dir);
    report.detail(format!("media_dir_exists={}", store.exists()));
    if store.exists() {
        report.detail(format!("archived_files={}", store.count_archived_files()?));
    }

    let daemon_lock = paths.state_dir.join(DAEMON_LOCK_FILE);
    let watcher_running = daemon_lock.exists()
        && matches!(lock::try_acquire(&daemon_lock)?, LockAttempt::Contended);
    report.detail(format!("watcher_running={watcher_running}"));

    match load_config() {
        Ok(cfg) => {
            report.detail(format!("sync.interval_minutes={}", cfg.sync.interval_minutes));
            report.detail(format!("sync.target_branch={}", cfg.sync.target_branch));
            report.detail(format!(
                "sync.request_timeout_secs={}",
                cfg.sync.request_timeout_secs
            ));
            report.detail(format!("sync.run_on_start={}", cfg.sync.run_on_start));
            report.detail(format!("remote.repo={}", cfg.remote.repo));
            report.detail(format!("remote.prefix={}", cfg.remote.prefix));
            report.detail(format!("ingest.channel_id={}", cfg.ingest.channel_id));
            report.detail(format!("ingest.guild_id={}", cfg.ingest.guild_id));
            report.detail(format!(
                "ingest.extensions={}",
                cfg.ingest.extensions.join(",")
            ));
        }
        Err(err) => report.issue(format!("{err:#}")),
    }

    for name in GENERATED_CHATVAULT_ENV_ALLOWLIST {
        if let Some(line) = env_summary(name) {
            report.detail(format!("env {line}"));
        }
    }
    Ok(report)
}
