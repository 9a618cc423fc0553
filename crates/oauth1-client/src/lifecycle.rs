//! Authorization lifecycle state machine
//!
//! Pure transition function, no I/O. The controller derives the current
//! state from the store, asks `transition` whether an event is legal, and
//! only then performs the side effects.
//!
//! ```text
//! Unauthenticated --TemporaryCredentialsIssued--> TemporaryObtained
//! TemporaryObtained --AuthorizationUrlIssued--> AwaitingUserAuthorization
//! AwaitingUserAuthorization --TokenCredentialsIssued--> Authorized
//! AwaitingUserAuthorization --ExchangeRejected--> Unauthenticated
//! AwaitingUserAuthorization --ExchangeInterrupted--> AwaitingUserAuthorization
//! AwaitingUserAuthorization --TemporaryCredentialsIssued--> TemporaryObtained
//! * --Reset--> Unauthenticated
//! ```
//!
//! `TemporaryObtained` only exists between storing the temporary
//! credentials and handing out the authorization URL; it is never derived
//! from durable state.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    TemporaryObtained,
    AwaitingUserAuthorization,
    Authorized,
}

impl AuthState {
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::TemporaryObtained => "temporary_obtained",
            AuthState::AwaitingUserAuthorization => "awaiting_user_authorization",
            AuthState::Authorized => "authorized",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// Request endpoint answered with temporary credentials.
    TemporaryCredentialsIssued,
    /// Authorization URL handed to the caller.
    AuthorizationUrlIssued,
    /// Access endpoint answered with token credentials.
    TokenCredentialsIssued,
    /// Exchange failed after the pending authorization was consumed.
    ExchangeRejected,
    /// Exchange hit a transport error; the pending authorization was restored.
    ExchangeInterrupted,
    Reset,
}

/// Next state, or `None` when `event` is illegal in `state`.
pub fn transition(state: AuthState, event: AuthEvent) -> Option<AuthState> {
    use AuthEvent::*;
    use AuthState::*;

    match (state, event) {
        (_, Reset) => Some(Unauthenticated),

        // A new attempt may replace an abandoned one.
        (Unauthenticated | AwaitingUserAuthorization, TemporaryCredentialsIssued) => {
            Some(TemporaryObtained)
        }

        (TemporaryObtained, AuthorizationUrlIssued) => Some(AwaitingUserAuthorization),

        (AwaitingUserAuthorization, TokenCredentialsIssued) => Some(Authorized),
        (AwaitingUserAuthorization, ExchangeRejected) => Some(Unauthenticated),
        (AwaitingUserAuthorization, ExchangeInterrupted) => Some(AwaitingUserAuthorization),

        _ => None,
    }
}
