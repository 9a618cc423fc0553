//! OAuth 1.0a token lifecycle controller
//!
//! `Connection` drives the three-legged flow against one remote API and signs
//! API calls once authorized. All state lives in the injected
//! `CredentialStore`; HTTP goes through the injected `HttpRequester`.
//!
//! ```text
//! Unauthenticated -> TemporaryObtained -> AwaitingUserAuthorization -> Authorized
//!        ^                                                                |
//!        +------------------------------ reset ---------------------------+
//! ```

pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod response;

pub use connection::{CallbackParams, Collaborators, Connection, ConnectionConfig};
pub use error::{Error, Result};
pub use lifecycle::{AuthEvent, AuthState, transition};
pub use response::{ApiResponse, User};
