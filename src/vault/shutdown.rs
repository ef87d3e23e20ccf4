//! Cooperative shutdown for the watcher daemon.
//!
//! One [`ShutdownSignal`] is shared by the timer thread (which sleeps on it)
//! and the reconciler (which checks it between files).

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (flag, cond) = &*self.inner;
        let mut triggered = flag.lock().unwrap_or_else(|p| p.into_inner());
        *triggered = true;
        cond.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleep up to `timeout`; returns `true` as soon as shutdown is requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cond) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut triggered = flag.lock().unwrap_or_else(|p| p.into_inner());
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = cond
                .wait_timeout(triggered, deadline - now)
                .unwrap_or_else(|p| p.into_inner());
            triggered = guard;
        }
        true
    }
}

/// Trigger `signal` on the first Ctrl+C / SIGTERM; a second one force-exits.
pub fn install_signal_handler(signal: &ShutdownSignal) -> Result<()> {
    let count = Arc::new(AtomicU32::new(0));
    let handler_signal = signal.clone();
    ctrlc::set_handler(move || {
        let prev = count.fetch_add(1, Ordering::SeqCst);
        if prev == 0 {
            tracing::info!("received shutdown signal, finishing current file...");
            tracing::info!("press Ctrl+C again to force exit");
            handler_signal.trigger();
        } else {
            tracing::warn!("force exit requested");
            std::process::exit(130);
        }
    })
    .context("failed to install shutdown signal handler")
}
