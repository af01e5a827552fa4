//! Session persistence and expiry.
//!
//! A session is a token plus the wall-clock time it was issued, persisted as
//! two key/value pairs. Both are written and removed together.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use docgate_core::Clock;

pub const TOKEN_KEY: &str = "access_token";
pub const TIMESTAMP_KEY: &str = "token_timestamp";

/// Older builds cached the capability list in storage; it is removed on
/// logout so a stale list can never be read back.
pub const LEGACY_CAPABILITIES_KEY: &str = "accessible_objects";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage lock poisoned")]
    Poisoned,

    #[error("storage io error: {0}")]
    Io(String),

    #[error("storage file is corrupt: {0}")]
    Corrupt(String),
}

/// String key/value persistence (browser local storage or equivalent).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// JSON-file-backed store, rewritten on every mutation.
///
/// A missing file reads as empty.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let raw =
            serde_json::to_string_pretty(entries).map_err(|e| StoreError::Io(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entries = self.load()?;
        f(&mut entries);
        self.save(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.mutate(|entries| {
            entries.remove(key);
        })
    }
}

/// Snapshot of the persisted session.
///
/// Produced by [`SessionStore::get`]. A token without a readable timestamp
/// is possible (foreign or damaged storage) and counts as expired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: Some(token.into()),
            issued_at: Some(issued_at),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// `now - issued_at > max_age`; a missing timestamp is always expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.issued_at {
            Some(issued_at) => now.signed_duration_since(issued_at) > max_age,
            None => true,
        }
    }
}

/// Reads and writes the session pair in a [`KeyValueStore`].
///
/// Never talks to the network.
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, max_age: std::time::Duration) -> Self {
        Self {
            store,
            clock,
            max_age: Duration::from_std(max_age).unwrap_or(Duration::MAX),
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Read the persisted session. Storage errors read as "no session".
    pub fn get(&self) -> Session {
        let token = match self.store.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(err) => {
                tracing::error!(error = %err, "failed to read session token");
                None
            }
        };
        let Some(token) = token else {
            return Session::anonymous();
        };

        let issued_at = match self.store.get(TIMESTAMP_KEY) {
            Ok(Some(raw)) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis),
            Ok(None) => None,
            Err(err) => {
                tracing::error!(error = %err, "failed to read session timestamp");
                None
            }
        };
        if issued_at.is_none() {
            tracing::debug!("session token has no readable timestamp; treating as expired");
        }

        Session {
            token: Some(token),
            issued_at,
        }
    }

    /// Persist a new session issued now.
    pub fn set(&self, token: &str) -> Result<Session, StoreError> {
        self.set_issued_at(token, self.clock.now())
    }

    /// Persist both fields; if the second write fails the first is undone.
    pub fn set_issued_at(&self, token: &str, issued_at: DateTime<Utc>) -> Result<Session, StoreError> {
        self.store
            .set(TIMESTAMP_KEY, &issued_at.timestamp_millis().to_string())?;
        if let Err(err) = self.store.set(TOKEN_KEY, token) {
            let _ = self.store.remove(TIMESTAMP_KEY);
            return Err(err);
        }
        Ok(Session::new(token, issued_at))
    }

    /// Remove the token, the timestamp and any persisted capability list.
    ///
    /// Every key is attempted even if an earlier removal fails.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut first_err = None;
        for key in [TOKEN_KEY, TIMESTAMP_KEY, LEGACY_CAPABILITIES_KEY] {
            if let Err(err) = self.store.remove(key) {
                tracing::error!(key, error = %err, "failed to remove session key");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn is_expired(&self, session: &Session) -> bool {
        session.is_expired_at(self.clock.now(), self.max_age)
    }
}
