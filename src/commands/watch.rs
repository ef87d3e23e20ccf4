use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;

use crate::commands::ingest::ingest_once;
use crate::commands::{CommandReport, build_scheduler, load_config};
use crate::error::ErrorCode;
use crate::vault::lock::{self, DAEMON_LOCK_FILE, LockAttempt};
use crate::vault::paths::resolve_paths;
use crate::vault::scheduler::spawn_timer;
use crate::vault::shutdown::{ShutdownSignal, install_signal_handler};

pub fn run(with_ingest: bool) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("watch");

    let lock_path = paths.state_dir.join(DAEMON_LOCK_FILE);
    report.detail(format!("daemon_lock={}", lock_path.display()));
    let _daemon_lock = match lock::try_acquire_with_pid(&lock_path)? {
        LockAttempt::Acquired(held) => held,
        LockAttempt::Contended => {
            let holder = lock::read_lock_pid(&lock_path)
                .map(|pid| pid.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            report.coded_issue(
                ErrorCode::E001Locked,
                format!("another watcher is running (pid {holder})"),
            );
            return Ok(report);
        }
    };

    let shutdown = ShutdownSignal::new();
    let Some(scheduler) = build_scheduler(&paths, &cfg, shutdown.clone(), &mut report)? else {
        return Ok(report);
    };

    let before_tick: Option<Box<dyn FnMut() + Send>> = if with_ingest {
        let channel = cfg.ingest.channel_id.trim().to_string();
        if channel.is_empty() {
            report.coded_issue(
                ErrorCode::E004SourceUnconfigured,
                "--ingest needs CHATVAULT_CHANNEL_ID",
            );
            return Ok(report);
        }
        let hook_paths = paths.clone();
        let hook_cfg = cfg.clone();
        let hook: Box<dyn FnMut() + Send> = Box::new(move || {
            if let Err(err) = ingest_once(&hook_paths, &hook_cfg, &channel) {
                tracing::warn!("ingest before sync failed: {err:#}");
            }
        });
        Some(hook)
    } else {
        None
    };

    install_signal_handler(&shutdown)?;
    let interval = Duration::from_secs(cfg.sync.interval_minutes.saturating_mul(60));
    tracing::info!(
        interval_minutes = cfg.sync.interval_minutes,
        branch = %cfg.sync.target_branch,
        ingest = with_ingest,
        "watcher started"
    );

    let handle = spawn_timer(
        Arc::new(scheduler),
        interval,
        cfg.sync.run_on_start,
        before_tick,
    )?;
    handle
        .join()
        .map_err(|_| anyhow!("sync timer thread panicked"))?;

    report.detail("watcher stopped");
    Ok(report)
}
