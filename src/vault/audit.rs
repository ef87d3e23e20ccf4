use crate::vault::paths::VaultPaths;
use crate::vault::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: String,
    pub message: String,
}

pub fn audit_log_path(paths: &VaultPaths) -> std::path::PathBuf {
    paths.logs_dir.join("audit.log")
}

pub fn append_event(paths: &VaultPaths, phase: &str, status: &str, message: &str) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        phase: phase.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = audit_log_path(paths);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Audit writes never fail the caller; a broken log dir is only warned about.
pub fn record(paths: &VaultPaths, phase: &str, status: &str, message: &str) {
    if let Err(err) = append_event(paths, phase, status, message) {
        tracing::warn!(phase, status, "failed to append audit event: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::{append_event, audit_log_path};
    use crate::vault::paths::VaultPaths;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn events_are_appended_as_json_lines() {
        let tmp = tempdir().expect("tempdir");
        let paths = VaultPaths::under(tmp.path());
        append_event(&paths, "sync", "ok", "created=1").expect("first");
        append_event(&paths, "sync", "skipped", "reason=no-changes").expect("second");

        let raw = fs::read_to_string(audit_log_path(&paths)).expect("read audit");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(second["status"], "skipped");
        assert_eq!(second["message"], "reason=no-changes");
    }
}
