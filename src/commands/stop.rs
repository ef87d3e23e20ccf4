use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use crate::commands::CommandReport;
use crate::vault::lock::{self, DAEMON_LOCK_FILE, LockAttempt};
use crate::vault::paths::resolve_paths;
use crate::vault::util::pid_alive;

const STOP_TIMEOUT: Duration = Duration::from_secs(8);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn process_command_line(pid: u32) -> Result<String> {
    let output = Command::new("ps")
        .arg("-p")
        .arg(pid.to_string())
        .arg("-o")
        .arg("command=")
        .output()
        .context("failed to inspect process command line with `ps`")?;
    if !output.status.success() {
        return Ok(String::new());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn looks_like_watcher(command_line: &str) -> bool {
    command_line.contains("chatvault") && command_line.split_whitespace().any(|w| w == "watch")
}

fn send_sigterm(pid: u32) -> Result<()> {
    let status = Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .status()
        .context("failed to send SIGTERM with `kill -TERM`")?;
    if !status.success() && pid_alive(pid) {
        anyhow::bail!("`kill -TERM {pid}` failed and process is still alive");
    }
    Ok(())
}

fn cleanup_lock_file(lock_path: &Path, report: &mut CommandReport) {
    match fs::remove_file(lock_path) {
        Ok(()) => report.detail(format!("removed daemon lock {}", lock_path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => report.detail(format!(
            "failed to remove daemon lock {}: {err}",
            lock_path.display()
        )),
    }
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("stop");
    let paths = resolve_paths()?;
    let lock_path = paths.state_dir.join(DAEMON_LOCK_FILE);
    report.detail(format!("daemon_lock={}", lock_path.display()));

    if !lock_path.exists() {
        report.detail("watcher already stopped (lock file not found)");
        return Ok(report);
    }

    // If the lock can be taken, nobody holds it.
    if let LockAttempt::Acquired(stale) = lock::try_acquire(&lock_path)? {
        drop(stale);
        report.detail("watcher not running");
        cleanup_lock_file(&lock_path, &mut report);
        return Ok(report);
    }

    let pid = match lock::read_lock_pid(&lock_path) {
        Ok(pid) => pid,
        Err(err) => {
            report.issue(format!(
                "failed to read watcher pid from {}: {err:#}",
                lock_path.display()
            ));
            return Ok(report);
        }
    };
    report.detail(format!("daemon_pid={pid}"));

    let command_line = process_command_line(pid)?;
    if !looks_like_watcher(&command_line) {
        report.issue(format!(
            "refusing to stop pid {pid}; not a chatvault watcher: {}",
            if command_line.is_empty() {
                "<unknown>"
            } else {
                command_line.as_str()
            }
        ));
        return Ok(report);
    }

    send_sigterm(pid)?;
    let deadline = Instant::now() + STOP_TIMEOUT;
    while Instant::now() < deadline {
        if !pid_alive(pid) {
            report.detail(format!("stopped watcher pid={pid}"));
            cleanup_lock_file(&lock_path, &mut report);
            return Ok(report);
        }
        thread::sleep(STOP_POLL_INTERVAL);
    }

    report.issue(format!(
        "timed out waiting for watcher pid {pid} to stop after {}s",
        STOP_TIMEOUT.as_secs()
    ));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::looks_like_watcher;

    #[test]
    fn only_watch_invocations_match() {
        assert!(looks_like_watcher("/usr/local/bin/chatvault watch --ingest"));
        assert!(looks_like_watcher("chatvault --verbose watch"));
        assert!(!looks_like_watcher("chatvault sync"));
        assert!(!looks_like_watcher("vim watch.txt"));
    }
}
