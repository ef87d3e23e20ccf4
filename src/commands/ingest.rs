use anyhow::Result;

use crate::chat::discord::DiscordSource;
use crate::commands::{CommandReport, load_config};
use crate::error::ErrorCode;
use crate::vault::audit;
use crate::vault::config::VaultConfig;
use crate::vault::ingest::{IngestOutcome, ingest};
use crate::vault::paths::{VaultPaths, resolve_paths};
use crate::vault::store::LocalStore;

/// One ingest pass, shared with the watcher's pre-tick hook.
pub fn ingest_once(paths: &VaultPaths, cfg: &VaultConfig, channel: &str) -> Result<IngestOutcome> {
    let source = DiscordSource::from_config(cfg)?;
    let store = LocalStore::new(&paths.media_dir);
    let outcome = ingest(&source, channel, &store, &cfg.ingest.extensions)?;

    let status = if outcome.failed.is_empty() && outcome.history_error.is_none() {
        "ok"
    } else {
        "degraded"
    };
    audit::record(
        paths,
        "ingest",
        status,
        &format!(
            "channel={channel} downloaded={} existing={} filtered={} failed={}",
            outcome.downloaded.len(),
            outcome.skipped_existing,
            outcome.skipped_extension,
            outcome.failed.len()
        ),
    );
    Ok(outcome)
}

pub fn run(channel: Option<&str>) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("ingest");

    let channel = channel.unwrap_or(cfg.ingest.channel_id.as_str()).trim().to_string();
    if channel.is_empty() {
        report.coded_issue(
            ErrorCode::E004SourceUnconfigured,
            "pass --channel or set CHATVAULT_CHANNEL_ID",
        );
        return Ok(report);
    }
    report.detail(format!("channel={channel}"));
    report.detail(format!("media_dir={}", paths.media_dir.display()));

    let outcome = ingest_once(&paths, &cfg, &channel)?;
    report.detail(format!("messages_scanned={}", outcome.scanned));
    report.detail(format!("attachments_seen={}", outcome.attachments));
    report.detail(format!("downloaded={}", outcome.downloaded.len()));
    report.detail(format!("skipped_existing={}", outcome.skipped_existing));
    report.detail(format!("skipped_extension={}", outcome.skipped_extension));
    for name in &outcome.downloaded {
        report.detail(format!("saved {name}"));
    }
    for (name, err) in &outcome.failed {
        report.issue(format!("failed {name}: {err}"));
    }
    if let Some(err) = &outcome.history_error {
        report.issue(format!("history read stopped early: {err}"));
    }
    Ok(report)
}
