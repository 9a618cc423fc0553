//! Persistent key-value store collaborator
//!
//! The engine keeps all durable state (token credentials, the pending
//! authorization, the last recorded error) and its discovery cache behind
//! `CredentialStore`. Values are JSON strings addressed by connection key,
//! namespace and field name. `take` must be atomic: two concurrent callers
//! may never both receive the same value.
//!
//! `MemoryStore` is the in-process implementation; a file-backed store lives
//! in the command-line service.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::key::ConnectionKey;

/// Field names used by the engine.
pub mod fields {
    pub const TOKEN_CREDENTIALS: &str = "token_credentials";
    pub const PENDING_AUTHORIZATION: &str = "pending_authorization";
    pub const LAST_ERROR: &str = "last_error";
    pub const ENDPOINTS: &str = "endpoints";
}

/// Durable data survives until reset; cache data may be dropped at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Durable,
    Cache,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Durable => "durable",
            Namespace::Cache => "cache",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Pluggable credential and cache storage.
pub trait CredentialStore: Send + Sync {
    fn get<'a>(
        &'a self,
        key: &'a ConnectionKey,
        namespace: Namespace,
        field: &'a str,
    ) -> StoreFuture<'a, Option<String>>;

    fn set<'a>(
        &'a self,
        key: &'a ConnectionKey,
        namespace: Namespace,
        field: &'a str,
        value: String,
    ) -> StoreFuture<'a, ()>;

    /// Atomic get-and-delete.
    fn take<'a>(
        &'a self,
        key: &'a ConnectionKey,
        namespace: Namespace,
        field: &'a str,
    ) -> StoreFuture<'a, Option<String>>;

    /// Delete one field, or the whole namespace when `field` is `None`.
    fn delete<'a>(
        &'a self,
        key: &'a ConnectionKey,
        namespace: Namespace,
        field: Option<&'a str>,
    ) -> StoreFuture<'a, ()>;
}

/// Read and deserialize a JSON value.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn CredentialStore,
    key: &ConnectionKey,
    namespace: Namespace,
    field: &str,
) -> Result<Option<T>> {
    match store.get(key, namespace, field).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value.
pub async fn save_json<T: Serialize>(
    store: &dyn CredentialStore,
    key: &ConnectionKey,
    namespace: Namespace,
    field: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, namespace, field, raw).await
}

/// Atomically take and deserialize a JSON value.
pub async fn take_json<T: DeserializeOwned>(
    store: &dyn CredentialStore,
    key: &ConnectionKey,
    namespace: Namespace,
    field: &str,
) -> Result<Option<T>> {
    match store.take(key, namespace, field).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

type Slot = (ConnectionKey, Namespace);

/// In-memory store. All operations hold one async mutex, so `take` is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<HashMap<Slot, HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields stored under one namespace.
    pub async fn len(&self, key: &ConnectionKey, namespace: Namespace) -> usize {
        let state = self.state.lock().await;
        state
            .get(&(key.clone(), namespace))
            .map_or(0, HashMap::len)
    }
}

impl CredentialStore for MemoryStore {
    fn get<'a>(
        &'a self,
        key: &'a ConnectionKey,
        namespace: Namespace,
        field: &'a str,
    ) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .get(&(key.clone(), namespace))
                .and_then(|fields| fields.get(field).cloned()))
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a ConnectionKey,
        namespace: Namespace,
        field: &'a str,
        value: String,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state
                .entry((key.clone(), namespace))
                .or_default()
                .insert(field.to_owned(), value);
            debug!(key = %key, %namespace, field, "stored value");
            Ok(())
        })
    }

    fn take<'a>(
        &'a self,
        key: &'a ConnectionKey,
        namespace: Namespace,
        field: &'a str,
    ) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            Ok(state
                .get_mut(&(key.clone(), namespace))
                .and_then(|fields| fields.remove(field)))
        })
    }

    fn delete<'a>(
        &'a self,
        key: &'a ConnectionKey,
        namespace: Namespace,
        field: Option<&'a str>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let slot = (key.clone(), namespace);
            match field {
                Some(field) => {
                    if let Some(fields) = state.get_mut(&slot) {
                        fields.remove(field);
                    }
                }
                None => {
                    state.remove(&slot);
                }
            }
            debug!(key = %key, %namespace, field = field.unwrap_or("*"), "deleted value");
            Ok(())
        })
    }
}
