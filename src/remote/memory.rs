use crate::error::RemoteError;
use crate::remote::{RemoteFile, RemoteRepo};
use crate::vault::shutdown::ShutdownSignal;
use crate::vault::util::sha256_hex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Get(String),
    Create(String),
    Update { path: String, expected: String },
}

/// Blocks `get_file` until released, so a test can hold a run mid-flight.
#[derive(Default)]
pub struct Gate {
    state: Mutex<(bool, bool)>,
    cond: Condvar,
}

impl Gate {
    fn pass(&self) {
        let mut state = self.state.lock().expect("gate lock");
        state.0 = true;
        self.cond.notify_all();
        while !state.1 {
            state = self.cond.wait(state).expect("gate wait");
        }
    }

    pub fn wait_entered(&self) {
        let mut state = self.state.lock().expect("gate lock");
        while !state.0 {
            state = self.cond.wait(state).expect("gate wait");
        }
    }

    pub fn release(&self) {
        let mut state = self.state.lock().expect("gate lock");
        state.1 = true;
        self.cond.notify_all();
    }
}

/// In-memory remote that records every call.
#[derive(Default)]
pub struct MemoryRepo {
    files: Mutex<BTreeMap<(String, String), String>>,
    calls: Mutex<Vec<RemoteCall>>,
    failing: Mutex<BTreeMap<String, RemoteError>>,
    conflicting: Mutex<BTreeSet<String>>,
    gate: Mutex<Option<Arc<Gate>>>,
    shutdown_on_get: Mutex<Option<(String, ShutdownSignal)>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_for(content: &[u8]) -> String {
        format!("mem-{}", sha256_hex(content))
    }

    pub fn seed(&self, branch: &str, path: &str, token: &str) {
        self.files
            .lock()
            .expect("files lock")
            .insert((branch.to_string(), path.to_string()), token.to_string());
    }

    pub fn stored(&self, branch: &str, path: &str) -> Option<String> {
        self.files
            .lock()
            .expect("files lock")
            .get(&(branch.to_string(), path.to_string()))
            .cloned()
    }

    pub fn fail_transport(&self, path: &str) {
        self.fail_with(path, RemoteError::Transport(format!("injected failure for {path}")));
    }

    pub fn fail_with_timeout(&self, path: &str) {
        self.fail_with(path, RemoteError::Timeout);
    }

    fn fail_with(&self, path: &str, err: RemoteError) {
        self.failing
            .lock()
            .expect("failing lock")
            .insert(path.to_string(), err);
    }

    /// Trigger `signal` while `path` is being fetched, as a Ctrl+C mid-run would.
    pub fn shutdown_on_get(&self, path: &str, signal: &ShutdownSignal) {
        *self.shutdown_on_get.lock().expect("shutdown slot") =
            Some((path.to_string(), signal.clone()));
    }

    pub fn conflict_on_write(&self, path: &str) {
        self.conflicting
            .lock()
            .expect("conflicting lock")
            .insert(path.to_string());
    }

    pub fn install_gate(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().expect("gate slot") = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn write_calls(&self) -> Vec<RemoteCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, RemoteCall::Get(_)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    fn log(&self, call: RemoteCall) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn check_failure(&self, path: &str) -> Result<(), RemoteError> {
        match self.failing.lock().expect("failing lock").get(path) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl RemoteRepo for MemoryRepo {
    fn get_file(&self, path: &str, branch: &str) -> Result<RemoteFile, RemoteError> {
        self.log(RemoteCall::Get(path.to_string()));
        let gate = self.gate.lock().expect("gate slot").clone();
        if let Some(gate) = gate {
            gate.pass();
        }
        if let Some((target, signal)) = self.shutdown_on_get.lock().expect("shutdown slot").as_ref() {
            if target == path {
                signal.trigger();
            }
        }
        self.check_failure(path)?;
        self.stored(branch, path)
            .map(|version_token| RemoteFile { version_token })
            .ok_or(RemoteError::NotFound)
    }

    fn create_file(
        &self,
        path: &str,
        _message: &str,
        content: &[u8],
        branch: &str,
    ) -> Result<String, RemoteError> {
        self.log(RemoteCall::Create(path.to_string()));
        if self.stored(branch, path).is_some() {
            return Err(RemoteError::Conflict);
        }
        let token = Self::token_for(content);
        self.seed(branch, path, &token);
        Ok(token)
    }

    fn update_file(
        &self,
        path: &str,
        _message: &str,
        content: &[u8],
        expected_token: &str,
        branch: &str,
    ) -> Result<String, RemoteError> {
        self.log(RemoteCall::Update {
            path: path.to_string(),
            expected: expected_token.to_string(),
        });
        if self
            .conflicting
            .lock()
            .expect("conflicting lock")
            .contains(path)
        {
            return Err(RemoteError::Conflict);
        }
        if self.stored(branch, path).as_deref() != Some(expected_token) {
            return Err(RemoteError::Conflict);
        }
        let token = Self::token_for(content);
        self.seed(branch, path, &token);
        Ok(token)
    }

    fn content_token(&self, content: &[u8]) -> String {
        Self::token_for(content)
    }
}
