pub mod github;
#[cfg(test)]
pub mod memory;

use crate::error::RemoteError;

/// What the remote currently stores at a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub version_token: String,
}

/// Path-addressed file store with compare-and-swap writes.
///
/// Implementations own their retry policy; every error that comes back is
/// final for the call that produced it.
pub trait RemoteRepo: Send + Sync {
    fn get_file(&self, path: &str, branch: &str) -> Result<RemoteFile, RemoteError>;

    fn create_file(
        &self,
        path: &str,
        message: &str,
        content: &[u8],
        branch: &str,
    ) -> Result<String, RemoteError>;

    /// Rejected with [`RemoteError::Conflict`] when the stored version is no
    /// longer `expected_token`.
    fn update_file(
        &self,
        path: &str,
        message: &str,
        content: &[u8],
        expected_token: &str,
        branch: &str,
    ) -> Result<String, RemoteError>;

    /// Token this remote would assign to `content`, comparable with
    /// [`RemoteFile::version_token`].
    fn content_token(&self, content: &[u8]) -> String;
}
