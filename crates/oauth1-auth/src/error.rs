//! Error types for signing, discovery and credential storage

/// Errors from the OAuth 1.0a engine.
///
/// `DiscoveryFailed` and `Transport` mean the network or remote host is
/// unavailable; `OAuthNotSupported` means the remote answered but lacks the
/// capability. Callers rely on that split to tell "network is down" apart
/// from "this site cannot be connected".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("API discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("site does not support OAuth 1.0a: {0}")]
    OAuthNotSupported(String),

    #[error("signature parameters could not be ordered deterministically")]
    SignatureSortFailure,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("invalid server response: {0}")]
    InvalidServerResponse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("credential store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure came from the network rather than the remote's answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::DiscoveryFailed(_))
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
