use thiserror::Error;

/// Failure reported by a [`crate::remote::RemoteRepo`] call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("not found on remote")]
    NotFound,
    #[error("remote version changed since it was fetched")]
    Conflict,
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure recorded against a single file during a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncFileError {
    #[error("local read failed: {0}")]
    LocalRead(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    E001Locked,
    E002StoreMissing,
    E003RemoteUnconfigured,
    E004SourceUnconfigured,
    E005ConfigInvalid,
    E006SyncDegraded,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002StoreMissing => "E002_STORE_MISSING",
            Self::E003RemoteUnconfigured => "E003_REMOTE_UNCONFIGURED",
            Self::E004SourceUnconfigured => "E004_SOURCE_UNCONFIGURED",
            Self::E005ConfigInvalid => "E005_CONFIG_INVALID",
            Self::E006SyncDegraded => "E006_SYNC_DEGRADED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, RemoteError, SyncFileError};

    #[test]
    fn remote_errors_wrap_transparently() {
        let err = SyncFileError::from(RemoteError::Conflict);
        assert_eq!(err.to_string(), "remote version changed since it was fetched");
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ErrorCode::E001Locked.as_str(), "E001_LOCKED");
        assert_eq!(ErrorCode::E005ConfigInvalid.as_str(), "E005_CONFIG_INVALID");
    }
}
