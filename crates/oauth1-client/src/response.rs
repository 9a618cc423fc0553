//! Decoded API responses

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Body of a successful signed request.
///
/// JSON objects and arrays are decoded; anything else (HTML, plain text,
/// bare JSON scalars, empty HEAD bodies) is kept as received.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ApiResponse {
    Json(serde_json::Value),
    Raw(String),
}

impl ApiResponse {
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) if value.is_object() || value.is_array() => ApiResponse::Json(value),
            _ => ApiResponse::Raw(body.to_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ApiResponse::Json(value) => Some(value),
            ApiResponse::Raw(_) => None,
        }
    }
}

/// The authorized user, from `users/me?context=edit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub avatar_urls: BTreeMap<String, String>,
    /// Roles, capabilities, registration date and anything else the site adds.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
