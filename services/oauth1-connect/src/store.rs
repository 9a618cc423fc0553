//! File-backed credential store
//!
//! Keeps every connection's durable and cache namespaces in one JSON file:
//!
//! ```json
//! { "apiconnect_<hash>": { "durable": { "token_credentials": "..." }, "cache": { } } }
//! ```
//!
//! The file is the only state. Reads go to disk every time. Each write takes
//! an exclusive lock on `<path>.lock`, re-reads the file, applies the change
//! and replaces the file with an atomic temp-file + rename at 0600. `take` is
//! therefore atomic across every process sharing the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use oauth1_auth::store::{CredentialStore, Namespace, StoreFuture};
use oauth1_auth::{ConnectionKey, Error, Result};
use tokio::sync::Mutex;
use tracing::{debug, info};

type Fields = HashMap<String, String>;
type Namespaces = HashMap<String, Fields>;
type Contents = HashMap<String, Namespaces>;

/// Credential store persisted to a single JSON file.
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    /// Serializes writers within this process before they contend for the file lock.
    writers: Mutex<()>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// A missing file is a cold start: it is created as `{}`. A file that is
    /// not valid store JSON is an error.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        let store = Self {
            path,
            lock_path: PathBuf::from(lock_path),
            writers: Mutex::new(()),
        };

        let _lock = store.lock_file().await?;
        if store.path.exists() {
            let state = read_contents(&store.path).await?;
            info!(path = %store.path.display(), connections = state.len(), "loaded credential file");
        } else {
            info!(path = %store.path.display(), "credential file not found, starting empty");
            write_atomic(&store.path, &Contents::new()).await?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of connections with any stored data.
    pub async fn connection_count(&self) -> Result<usize> {
        Ok(read_contents(&self.path).await?.len())
    }

    /// Exclusive lock on the sidecar lock file, held until the handle drops.
    async fn lock_file(&self) -> Result<std::fs::File> {
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| Error::Store(format!("credential lock task failed: {e}")))?
        .map_err(|e| Error::Store(format!("locking credential file: {e}")))
    }

    /// Re-read the file under the lock, apply `change`, and write it back.
    async fn update<T>(&self, change: impl FnOnce(&mut Contents) -> T) -> Result<T> {
        let _writer = self.writers.lock().await;
        let _lock = self.lock_file().await?;
        let mut state = read_contents(&self.path).await?;
        let out = change(&mut state);
        state.retain(|_, namespaces| {
            namespaces.retain(|_, fields| !fields.is_empty());
            !namespaces.is_empty()
        });
        write_atomic(&self.path, &state).await?;
        Ok(out)
    }
}

/// Current file contents; a missing file reads as empty.
async fn read_contents(path: &Path) -> Result<Contents> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Contents::new()),
        Err(e) => return Err(Error::Store(format!("reading credential file: {e}"))),
    };
    serde_json::from_str(&contents)
        .map_err(|e| Error::Store(format!("parsing credential file: {e}")))
}

impl CredentialStore for FileStore {
    fn get<'a>(
        &'a self,
        key: &'a ConnectionKey,
        namespace: Namespace,
        field: &'a str,
    ) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let state = read_contents(&self.path).await?;
            Ok(state
                .get(key.as_str())
                .and_then(|namespaces| namespaces.get(namespace.as_str()))
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
            self.update(|state| {
                state
                    .entry(key.as_str().to_owned())
                    .or_default()
                    .entry(namespace.as_str().to_owned())
                    .or_default()
                    .insert(field.to_owned(), value);
            })
            .await?;
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
            self.update(|state| {
                state
                    .get_mut(key.as_str())
                    .and_then(|namespaces| namespaces.get_mut(namespace.as_str()))
                    .and_then(|fields| fields.remove(field))
            })
            .await
        })
    }

    fn delete<'a>(
        &'a self,
        key: &'a ConnectionKey,
        namespace: Namespace,
        field: Option<&'a str>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.update(|state| {
                let Some(namespaces) = state.get_mut(key.as_str()) else {
                    return;
                };
                match field {
                    Some(field) => {
                        if let Some(fields) = namespaces.get_mut(namespace.as_str()) {
                            fields.remove(field);
                        }
                    }
                    None => {
                        namespaces.remove(namespace.as_str());
                    }
                }
            })
            .await?;
            debug!(key = %key, %namespace, field = field.unwrap_or("*"), "deleted value");
            Ok(())
        })
    }
}

/// Write the store to disk atomically.
///
/// Writes to a temp file in the same directory, sets 0600 permissions,
/// then renames over the target.
async fn write_atomic(path: &Path, data: &Contents) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Store(format!("serializing credential file: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Store("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".oauth1-credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Store(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Store(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Store(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credential file");
    Ok(())
}
