//! Persists the most recent failure for `status`
//!
//! `Diagnostics::record` is synchronous, so failures are buffered here and
//! written to the durable `last_error` field once the command finishes.

use std::sync::{Arc, Mutex};

use oauth1_auth::store::{CredentialStore, Namespace, fields, save_json};
use oauth1_auth::{Clock, ConnectionKey, Diagnostics, Failure, TracingDiagnostics};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What `status` reports about the last failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub failure: Failure,
    pub recorded_at: u64,
}

#[derive(Debug)]
enum Pending {
    Record(ConnectionKey, LastError),
    Clear(ConnectionKey),
}

/// Logs failures and remembers them until `persist`.
pub struct LastErrorRecorder {
    clock: Arc<dyn Clock>,
    pending: Mutex<Vec<Pending>>,
}

impl LastErrorRecorder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, event: Pending) {
        match self.pending.lock() {
            Ok(mut pending) => pending.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }

    fn drain(&self) -> Vec<Pending> {
        match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    /// Write buffered records and clears to the store, in order.
    pub async fn persist(&self, store: &dyn CredentialStore) -> oauth1_auth::Result<()> {
        for event in self.drain() {
            match event {
                Pending::Record(key, last_error) => {
                    save_json(store, &key, Namespace::Durable, fields::LAST_ERROR, &last_error)
                        .await?;
                    debug!(key = %key, operation = %last_error.failure.operation, "saved last error");
                }
                Pending::Clear(key) => {
                    store
                        .delete(&key, Namespace::Durable, Some(fields::LAST_ERROR))
                        .await?;
                }
            }
        }
        Ok(())
    }
}

impl Diagnostics for LastErrorRecorder {
    fn record(&self, key: &ConnectionKey, failure: Failure) {
        TracingDiagnostics.record(key, failure.clone());
        let last_error = LastError {
            failure,
            recorded_at: self.clock.now_secs(),
        };
        self.push(Pending::Record(key.clone(), last_error));
    }

    fn clear(&self, key: &ConnectionKey) {
        TracingDiagnostics.clear(key);
        self.push(Pending::Clear(key.clone()));
    }
}
