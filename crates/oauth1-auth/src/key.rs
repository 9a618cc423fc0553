//! Stable identity for one remote API

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const KEY_PREFIX: &str = "apiconnect_";

/// Canonical form of an API base URL.
///
/// Scheme and host are lower-cased, default ports dropped, the trailing `/`
/// trimmed, and query and fragment discarded. Only http and https are accepted.
pub fn canonical_api_url(base_url: &str) -> Result<String> {
    let url = url::Url::parse(base_url.trim())
        .map_err(|e| Error::InvalidUrl(format!("{base_url}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl(format!(
            "{base_url}: scheme must be http or https"
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidUrl(format!("{base_url}: missing host")))?;

    let mut canonical = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        canonical.push_str(&format!(":{port}"));
    }
    canonical.push_str(url.path().trim_end_matches('/'));
    Ok(canonical)
}

/// Namespaces stored credentials and discovery entries for one API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    /// `apiconnect_` + hex SHA-256 of the canonical base URL.
    pub fn for_api(base_url: &str) -> Result<Self> {
        let canonical = canonical_api_url(base_url)?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(Self(format!("{KEY_PREFIX}{}", hex::encode(digest))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConnectionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
