//! Client identity, temporary and token credentials
//!
//! Secrets are wrapped in `common::Secret` so they never show up in `Debug`
//! output or logs. The credential records serialize with their real secrets
//! because the credential store has to persist them.

use common::Secret;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec::parse_form;
use crate::constants::{OAUTH_CALLBACK_CONFIRMED, OAUTH_TOKEN, OAUTH_TOKEN_SECRET};
use crate::error::{Error, Result};

/// Consumer key and secret registered with the remote site.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub consumer_key: String,
    pub consumer_secret: Secret<String>,
}

impl ClientIdentity {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<Secret<String>>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }
}

fn serialize_secret<S: Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose())
}

fn deserialize_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Secret<String>, D::Error> {
    String::deserialize(deserializer).map(Secret::new)
}

/// Parse `oauth_token` / `oauth_token_secret` out of a form-encoded body.
fn token_pair(body: &str, step: &str) -> Result<(String, Secret<String>)> {
    let params = parse_form(body);
    let identifier = params.get_str(OAUTH_TOKEN).unwrap_or_default();
    let secret = params.get_str(OAUTH_TOKEN_SECRET).unwrap_or_default();
    if identifier.is_empty() || secret.is_empty() {
        return Err(Error::InvalidServerResponse(format!(
            "{step} response is missing {OAUTH_TOKEN} or {OAUTH_TOKEN_SECRET}"
        )));
    }
    Ok((identifier.to_owned(), Secret::from(secret)))
}

/// Short-lived credentials from the request endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryCredentials {
    pub identifier: String,
    #[serde(serialize_with = "serialize_secret", deserialize_with = "deserialize_secret")]
    pub secret: Secret<String>,
}

impl TemporaryCredentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<Secret<String>>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    /// Parse the request endpoint's form body.
    ///
    /// `oauth_callback_confirmed`, when present, must be `true`.
    pub fn from_response(body: &str) -> Result<Self> {
        let params = parse_form(body);
        match params.get_str(OAUTH_CALLBACK_CONFIRMED) {
            Some("true") | None => {}
            Some(other) => {
                return Err(Error::InvalidServerResponse(format!(
                    "{OAUTH_CALLBACK_CONFIRMED} was {other:?}"
                )));
            }
        }
        let (identifier, secret) = token_pair(body, "temporary credentials")?;
        Ok(Self { identifier, secret })
    }
}

/// Durable grant from the access endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCredentials {
    pub identifier: String,
    #[serde(serialize_with = "serialize_secret", deserialize_with = "deserialize_secret")]
    pub secret: Secret<String>,
}

impl TokenCredentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<Secret<String>>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    /// Parse the access endpoint's form body. Both fields must be non-empty.
    pub fn from_response(body: &str) -> Result<Self> {
        let (identifier, secret) = token_pair(body, "token credentials")?;
        Ok(Self { identifier, secret })
    }

    /// Only complete credentials count as an authorization.
    pub fn is_valid(&self) -> bool {
        !self.identifier.is_empty() && !self.secret.is_empty()
    }
}

/// An authorization in flight: temporary credentials plus the callback nonce
/// issued with them. Stored and consumed as one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub temporary: TemporaryCredentials,
    pub callback_nonce: String,
    /// Unix seconds.
    pub issued_at: u64,
}
