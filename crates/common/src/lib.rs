//! Types shared by the OAuth 1.0a connect workspace
//!
//! `Secret` keeps consumer and token secrets out of logs; `Error` covers the
//! configuration failures every binary in the workspace reports the same way.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
