//! Error types for the authorization lifecycle

/// Errors from `Connection` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] oauth1_auth::Error),

    #[error("connection is not authorized")]
    NotAuthorized,

    #[error("connection is already authorized; reset it before authorizing again")]
    AlreadyAuthorized,

    #[error("callback does not belong to this connection")]
    IdentityMismatch,

    #[error("callback nonce or token does not match the pending authorization")]
    PossibleManInTheMiddle,

    #[error("consumer key and secret are required")]
    MissingClientKey,
}

impl Error {
    /// The caller has to run the authorization flow again.
    ///
    /// False for transport failures, which may succeed on a plain retry.
    pub fn is_reauthorization_required(&self) -> bool {
        matches!(
            self,
            Error::NotAuthorized | Error::IdentityMismatch | Error::PossibleManInTheMiddle
        )
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Auth(e) if e.is_transport())
    }
}

/// Result alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;
