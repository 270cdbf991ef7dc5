//! Handler-level error type.

use thiserror::Error;

/// Errors returned by a node handler's `handle` method.
///
/// Every variant is terminal for the execution: the scheduler converts a
/// handler failure into a failed execution and a skip cascade. The
/// variants exist so messages stay precise and tests can assert on the
/// failure class.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Network or transport failure reaching an external system.
    #[error("I/O error: {0}")]
    Io(String),

    /// The code sandbox exceeded its wall-clock budget.
    #[error("code execution timed out after {0}s")]
    CodeTimeout(u64),

    /// The sandboxed script threw or failed to settle.
    #[error("code execution failed: {0}")]
    CodeRuntime(String),

    /// Required process-level configuration is absent.
    #[error("missing configuration: {0}")]
    ConfigMissing(String),

    /// An upstream API answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// OAuth authorization-code exchange was rejected.
    #[error("OAuth code exchange failed: {0}")]
    OAuthExchange(String),

    /// OAuth token refresh was rejected.
    #[error("OAuth token refresh failed: {0}")]
    OAuthRefresh(String),

    /// Credential decryption/encryption failed.
    #[error(transparent)]
    Crypto(#[from] crypto::CryptoError),

    /// The store refused a read or write.
    #[error("store error: {0}")]
    Store(#[from] engine::StoreError),

    /// Node data is unusable (should have been caught by validation).
    #[error("invalid node data: {0}")]
    InvalidData(String),
}

impl From<reqwest::Error> for HandlerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Io(err.to_string())
    }
}
