use crate::vault::audit;
use crate::vault::fingerprint::FingerprintIndex;
use crate::vault::lock::{self, LockAttempt};
use crate::vault::paths::VaultPaths;
use crate::vault::reconcile::{Reconciler, SyncRun, SyncTrigger};
use crate::vault::shutdown::ShutdownSignal;
use crate::vault::util::sha256_hex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyRunning,
    NoChanges,
}

impl SkipReason {
    pub fn label(self) -> &'static str {
        match self {
            SkipReason::AlreadyRunning => "already running",
            SkipReason::NoChanges => "no changes",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SyncReport {
    Ran(SyncRun),
    Skipped {
        trigger: SyncTrigger,
        reason: SkipReason,
    },
}

impl SyncReport {
    /// A skip is not a failure; only a run with errors is.
    pub fn is_ok(&self) -> bool {
        match self {
            SyncReport::Ran(run) => run.is_success(),
            SyncReport::Skipped { .. } => true,
        }
    }

    pub fn run(&self) -> Option<&SyncRun> {
        match self {
            SyncReport::Ran(run) => Some(run),
            SyncReport::Skipped { .. } => None,
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncReport::Ran(run) => fmt::Display::fmt(run, f),
            SyncReport::Skipped { trigger, reason } => {
                write!(f, "{} sync skipped: {}", trigger.label(), reason.label())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateDecision {
    FirstRun,
    Changed(usize),
    Unchanged,
}

/// Everything a run mutates. Holding the lock is what "a run is in progress" means.
struct RunSlot {
    index: FingerprintIndex,
    last_success: Option<BTreeMap<String, String>>,
}

/// Owns the run slot and drives the reconciler for both trigger kinds.
pub struct Scheduler {
    reconciler: Reconciler,
    slot: Mutex<RunSlot>,
    shutdown: ShutdownSignal,
    process_lock: Option<PathBuf>,
    audit_paths: Option<VaultPaths>,
}

impl Scheduler {
    pub fn new(reconciler: Reconciler, shutdown: ShutdownSignal) -> Self {
        let index = FingerprintIndex::new(reconciler.branch());
        Self {
            reconciler,
            slot: Mutex::new(RunSlot {
                index,
                last_success: None,
            }),
            shutdown,
            process_lock: None,
            audit_paths: None,
        }
    }

    /// Also exclude runs in other processes sharing `paths.state_dir`, and
    /// append every report to the audit log.
    pub fn with_vault_paths(mut self, paths: &VaultPaths) -> Self {
        self.process_lock = Some(paths.state_dir.join(lock::SYNC_LOCK_FILE));
        self.audit_paths = Some(paths.clone());
        self
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn trigger_manual(&self) -> SyncReport {
        self.trigger(SyncTrigger::Manual)
    }

    pub fn trigger_scheduled(&self) -> SyncReport {
        self.trigger(SyncTrigger::Scheduled)
    }

    fn trigger(&self, trigger: SyncTrigger) -> SyncReport {
        let report = self.run_exclusive(trigger);
        self.record(&report);
        report
    }

    fn run_exclusive(&self, trigger: SyncTrigger) -> SyncReport {
        let skipped = |reason| SyncReport::Skipped { trigger, reason };

        let mut slot = match self.slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return skipped(SkipReason::AlreadyRunning),
            // A panicked run leaves the index merely stale, never wrong.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let _process_guard = match &self.process_lock {
            Some(path) => match lock::try_acquire(path) {
                Ok(LockAttempt::Acquired(guard)) => Some(guard),
                Ok(LockAttempt::Contended) => return skipped(SkipReason::AlreadyRunning),
                Err(err) => {
                    tracing::warn!("sync lock unavailable, running unguarded: {err:#}");
                    None
                }
            },
            None => None,
        };

        if trigger == SyncTrigger::Scheduled {
            match self.detect_changes(&mut slot) {
                GateDecision::Unchanged => return skipped(SkipReason::NoChanges),
                GateDecision::Changed(count) => {
                    tracing::info!(changed = count, "local changes detected");
                }
                GateDecision::FirstRun => {
                    tracing::debug!("no successful run yet, syncing");
                }
            }
        }

        let slot = &mut *slot;
        let run = self
            .reconciler
            .reconcile(trigger, &mut slot.index, &self.shutdown);
        if run.is_success() {
            slot.last_success = Some(slot.index.snapshot_hashes());
        }
        SyncReport::Ran(run)
    }

    /// Compare current local hashes with the snapshot of the last successful
    /// run. Size and mtime let unchanged files skip rehashing.
    fn detect_changes(&self, slot: &mut RunSlot) -> GateDecision {
        let Some(previous) = slot.last_success.as_ref() else {
            return GateDecision::FirstRun;
        };
        let store = self.reconciler.store();
        let Ok(files) = store.enumerate() else {
            // Let the reconciler report the unreadable store.
            return GateDecision::Changed(0);
        };

        let mut current = BTreeMap::new();
        for file in &files {
            let Ok(stat) = store.stat(file) else {
                return GateDecision::Changed(1);
            };
            let hash = match slot.index.cached_hash(&file.relative_path, stat) {
                Some(hash) => hash.to_string(),
                None => match store.read(file) {
                    Ok(content) => {
                        let hash = sha256_hex(&content);
                        slot.index.record_local(&file.relative_path, stat, hash.clone());
                        hash
                    }
                    Err(_) => return GateDecision::Changed(1),
                },
            };
            current.insert(file.relative_path.clone(), hash);
        }

        let changed = current
            .iter()
            .filter(|(path, hash)| previous.get(*path) != Some(*hash))
            .count()
            + previous
                .keys()
                .filter(|path| !current.contains_key(*path))
                .count();
        if changed == 0 {
            GateDecision::Unchanged
        } else {
            GateDecision::Changed(changed)
        }
    }

    fn record(&self, report: &SyncReport) {
        let (status, message) = match report {
            SyncReport::Ran(run) if run.is_success() => {
                tracing::info!(trigger = run.trigger.label(), "{}", run.counts_line());
                ("ok", run.counts_line())
            }
            SyncReport::Ran(run) => {
                tracing::warn!(trigger = run.trigger.label(), "{run}");
                let failed = run
                    .failures()
                    .iter()
                    .map(|f| format!("{}: {}", f.path, f.error))
                    .collect::<Vec<_>>();
                let mut message = format!("outcome={} {}", run.outcome.label(), run.counts_line());
                if !failed.is_empty() {
                    message.push_str(&format!(" failures=[{}]", failed.join(" | ")));
                }
                ("degraded", message)
            }
            SyncReport::Skipped { trigger, reason } => {
                tracing::info!(trigger = trigger.label(), "sync skipped: {}", reason.label());
                ("skipped", format!("reason={}", reason.label().replace(' ', "-")))
            }
        };

        if let Some(paths) = &self.audit_paths {
            let trigger = match report {
                SyncReport::Ran(run) => run.trigger,
                SyncReport::Skipped { trigger, .. } => *trigger,
            };
            audit::record(
                paths,
                "sync",
                status,
                &format!("trigger={} {message}", trigger.label()),
            );
        }
    }
}

/// Fires `trigger_scheduled` every `interval` until shutdown. `before_tick`
/// runs first on each tick (e.g. to ingest new media).
pub fn spawn_timer(
    scheduler: Arc<Scheduler>,
    interval: Duration,
    run_on_start: bool,
    mut before_tick: Option<Box<dyn FnMut() + Send>>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("chatvault-timer".to_string())
        .spawn(move || {
            let shutdown = scheduler.shutdown_signal().clone();
            let mut first = true;
            loop {
                let fire_now = first && run_on_start;
                first = false;
                if !fire_now && shutdown.wait_timeout(interval) {
                    break;
                }
                if let Some(hook) = before_tick.as_mut() {
                    hook();
                }
                if shutdown.is_triggered() {
                    break;
                }
                let report = scheduler.trigger_scheduled();
                tracing::debug!("timer tick finished: {report}");
            }
            tracing::info!("sync timer stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::{Scheduler, SkipReason, SyncReport, spawn_timer};
    use crate::remote::memory::{MemoryRepo, RemoteCall};
    use crate::vault::lock::{self, LockAttempt};
    use crate::vault::paths::VaultPaths;
    use crate::vault::reconcile::{Reconciler, SyncTrigger};
    use crate::vault::shutdown::ShutdownSignal;
    use crate::vault::store::LocalStore;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn scheduler(root: &Path, repo: &Arc<MemoryRepo>) -> Scheduler {
        let reconciler = Reconciler::new(repo.clone(), LocalStore::new(root), "main");
        Scheduler::new(reconciler, ShutdownSignal::new())
    }

    #[test]
    fn manual_trigger_during_active_run_is_skipped() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.png"), b"alpha").expect("write a");
        let repo = Arc::new(MemoryRepo::new());
        let gate = repo.install_gate();
        let scheduler = Arc::new(scheduler(tmp.path(), &repo));

        let background = scheduler.clone();
        let handle = thread::spawn(move || background.trigger_scheduled());
        gate.wait_entered();

        let manual = scheduler.trigger_manual();
        assert!(matches!(
            manual,
            SyncReport::Skipped {
                trigger: SyncTrigger::Manual,
                reason: SkipReason::AlreadyRunning
            }
        ));
        assert!(manual.to_string().contains("already running"));

        gate.release();
        let scheduled = handle.join().expect("join");
        assert!(scheduled.is_ok());
        // One pass: a single existence check plus a single create.
        assert_eq!(repo.calls().len(), 2);
    }

    #[test]
    fn scheduled_tick_without_changes_makes_no_remote_calls() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.png"), b"alpha").expect("write a");
        let repo = Arc::new(MemoryRepo::new());
        let scheduler = scheduler(tmp.path(), &repo);

        assert!(scheduler.trigger_scheduled().run().is_some());
        repo.clear_calls();

        let tick = scheduler.trigger_scheduled();
        assert!(matches!(
            tick,
            SyncReport::Skipped {
                reason: SkipReason::NoChanges,
                ..
            }
        ));
        assert!(repo.calls().is_empty());
    }

    #[test]
    fn scheduled_tick_runs_after_new_file_arrives() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.png"), b"alpha").expect("write a");
        let repo = Arc::new(MemoryRepo::new());
        let scheduler = scheduler(tmp.path(), &repo);
        assert!(scheduler.trigger_scheduled().is_ok());

        fs::write(tmp.path().join("b.png"), b"bravo").expect("write b");
        repo.clear_calls();
        let tick = scheduler.trigger_scheduled();
        let run = tick.run().expect("ran");
        assert_eq!(run.created, vec!["b.png".to_string()]);
        assert_eq!(run.unchanged, 1);
    }

    #[test]
    fn scheduled_tick_updates_rewritten_file() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.png"), b"alpha").expect("write a");
        fs::write(tmp.path().join("b.png"), b"bravo").expect("write b");
        let repo = Arc::new(MemoryRepo::new());
        let scheduler = scheduler(tmp.path(), &repo);
        assert!(scheduler.trigger_scheduled().is_ok());

        // Different length, so the stat check cannot reuse the cached hash.
        fs::write(tmp.path().join("a.png"), b"alpha, edited").expect("rewrite a");
        repo.clear_calls();
        let tick = scheduler.trigger_scheduled();
        let run = tick.run().expect("ran");
        assert_eq!(run.updated, vec!["a.png".to_string()]);
        assert_eq!(run.unchanged, 1);
        assert_eq!(
            repo.write_calls(),
            vec![RemoteCall::Update {
                path: "a.png".to_string(),
                expected: MemoryRepo::token_for(b"alpha"),
            }]
        );

        repo.clear_calls();
        assert!(matches!(
            scheduler.trigger_scheduled(),
            SyncReport::Skipped {
                reason: SkipReason::NoChanges,
                ..
            }
        ));
        assert!(repo.calls().is_empty());
    }

    #[test]
    fn failed_run_keeps_gate_open() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.png"), b"alpha").expect("write a");
        let repo = Arc::new(MemoryRepo::new());
        let scheduler = scheduler(tmp.path(), &repo);
        assert!(scheduler.trigger_scheduled().is_ok());

        fs::write(tmp.path().join("b.png"), b"bravo").expect("write b");
        repo.fail_transport("b.png");
        let failed = scheduler.trigger_scheduled();
        assert!(!failed.is_ok());

        // The gate still compares against the last *successful* snapshot.
        let retry = scheduler.trigger_scheduled();
        assert!(retry.run().is_some());
    }

    #[test]
    fn manual_trigger_ignores_change_gate() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.png"), b"alpha").expect("write a");
        let repo = Arc::new(MemoryRepo::new());
        let scheduler = scheduler(tmp.path(), &repo);
        assert!(scheduler.trigger_manual().is_ok());
        repo.clear_calls();

        let again = scheduler.trigger_manual();
        let run = again.run().expect("manual always runs");
        assert_eq!(run.unchanged, 1);
        assert!(repo.write_calls().is_empty());
    }

    #[test]
    fn lock_held_by_another_process_skips_the_run() {
        let tmp = tempdir().expect("tempdir");
        let paths = VaultPaths::under(tmp.path());
        fs::create_dir_all(&paths.media_dir).expect("mkdir media");
        fs::write(paths.media_dir.join("a.png"), b"alpha").expect("write a");
        let repo = Arc::new(MemoryRepo::new());
        let reconciler = Reconciler::new(repo.clone(), LocalStore::new(&paths.media_dir), "main");
        let scheduler = Scheduler::new(reconciler, ShutdownSignal::new()).with_vault_paths(&paths);

        let held = lock::try_acquire(&paths.state_dir.join(lock::SYNC_LOCK_FILE)).expect("lock");
        assert!(matches!(held, LockAttempt::Acquired(_)));
        let report = scheduler.trigger_manual();
        assert!(matches!(
            report,
            SyncReport::Skipped {
                reason: SkipReason::AlreadyRunning,
                ..
            }
        ));
        assert!(repo.calls().is_empty());

        drop(held);
        assert!(scheduler.trigger_manual().run().is_some());
        let audit = fs::read_to_string(paths.logs_dir.join("audit.log")).expect("audit");
        assert!(audit.contains("reason=already-running"));
        assert!(audit.contains("created=1"));
    }

    #[test]
    fn timer_fires_and_stops_on_shutdown() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.png"), b"alpha").expect("write a");
        let repo = Arc::new(MemoryRepo::new());
        let scheduler = Arc::new(scheduler(tmp.path(), &repo));
        let shutdown = scheduler.shutdown_signal().clone();

        let handle = spawn_timer(scheduler.clone(), Duration::from_millis(10), true, None)
            .expect("spawn timer");
        thread::sleep(Duration::from_millis(100));
        shutdown.trigger();
        handle.join().expect("join timer");

        assert_eq!(repo.stored("main", "a.png"), Some(MemoryRepo::token_for(b"alpha")));
        // Later ticks were gated: exactly one existence check and one create.
        assert_eq!(repo.calls().len(), 2);
    }
}
