use anyhow::Result;

use crate::commands::{CommandReport, build_scheduler, load_config};
use crate::error::ErrorCode;
use crate::vault::paths::resolve_paths;
use crate::vault::reconcile::SyncOutcome;
use crate::vault::shutdown::{ShutdownSignal, install_signal_handler};

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("sync");
    report.detail(format!("media_dir={}", paths.media_dir.display()));
    report.detail(format!(
        "remote={}@{}",
        cfg.remote.repo, cfg.sync.target_branch
    ));

    let shutdown = ShutdownSignal::new();
    let Some(scheduler) = build_scheduler(&paths, &cfg, shutdown.clone(), &mut report)? else {
        return Ok(report);
    };
    install_signal_handler(&shutdown)?;

    let outcome = scheduler.trigger_manual();
    let Some(run) = outcome.run() else {
        report.detail(outcome.to_string());
        return Ok(report);
    };
    report.detail(format!(
        "{} {}: {}",
        run.trigger.label(),
        run.outcome.label(),
        run.counts_line()
    ));
    for path in &run.created {
        report.detail(format!("created {path}"));
    }
    for path in &run.updated {
        report.detail(format!("updated {path}"));
    }
    for path in &run.remote_changed {
        report.detail(format!("remote changed outside chatvault: {path}"));
    }
    if let SyncOutcome::Aborted { reason, .. } = &run.outcome {
        report.coded_issue(ErrorCode::E006SyncDegraded, format!("sync aborted: {reason}"));
    }
    for failure in run.failures() {
        report.issue(format!("failed {}: {}", failure.path, failure.error));
    }
    Ok(report)
}
