use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use exam_core::Clock;
use exam_core::model::SessionRecord;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Key under which the single live session is stored.
pub const SESSION_KEY: &str = "exam_session";

/// Absolute lifetime of a stored session, independent of exam duration.
pub const SESSION_TTL_HOURS: i64 = 24;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted envelope around a `SessionRecord`.
///
/// The envelope carries the coarse absolute expiry; whether the record is
/// still inside its exam window is decided by the session engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub record: SessionRecord,
    pub expires_at: DateTime<Utc>,
}

impl StoredSession {
    #[must_use]
    pub fn wrap(record: SessionRecord) -> Self {
        let expires_at = record.start_instant() + Duration::hours(SESSION_TTL_HOURS);
        Self { record, expires_at }
    }

    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Serialize to the bytes that are written to the backend.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Parse bytes previously produced by [`StoredSession::to_json`].
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the payload is malformed.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Durable key/value slot holding at most one live session.
///
/// Implementations must survive process restarts (except the in-memory one,
/// which exists for tests). Stale envelopes are dropped on `load`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist the record, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError>;

    /// Load the stored record, if one exists and has not passed its TTL.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read or the payload is
    /// corrupt.
    async fn load(&self) -> Result<Option<SessionRecord>, StorageError>;

    /// Remove the stored record. Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// In-memory store for tests and prototyping. Keeps the serialized payload so
/// tests can compare persisted bytes.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    clock: Clock,
    slot: Arc<Mutex<Option<String>>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Raw persisted payload, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn raw(&self) -> Result<Option<String>, StorageError> {
        let guard = self
            .slot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let payload = StoredSession::wrap(record.clone()).to_json()?;
        let mut guard = self
            .slot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = Some(payload);
        Ok(())
    }

    async fn load(&self) -> Result<Option<SessionRecord>, StorageError> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let Some(raw) = guard.as_deref() else {
            return Ok(None);
        };
        let stored = StoredSession::from_json(raw)?;
        if stored.is_stale(self.clock.now()) {
            *guard = None;
            return Ok(None);
        }
        Ok(Some(stored.record))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{RespondentEmail, ShareId};
    use exam_core::time::fixed_now;

    fn record() -> SessionRecord {
        SessionRecord::new(
            ShareId::new("exam1").unwrap(),
            fixed_now(),
            1800,
            vec![1, -1],
            RespondentEmail::parse("a@b.com").unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn save_load_clear() {
        let store = InMemorySessionStore::new().with_clock(Clock::fixed(fixed_now()));
        assert!(store.load().await.unwrap().is_none());

        store.save(&record()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record()));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn envelope_expires_a_day_after_start() {
        let later = fixed_now() + Duration::hours(SESSION_TTL_HOURS);
        let store = InMemorySessionStore::new().with_clock(Clock::fixed(later));
        store.save(&record()).await.unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert!(store.raw().unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_payload_is_a_serialization_error() {
        let store = InMemorySessionStore::new();
        *store.slot.lock().unwrap() = Some("{not json".into());
        assert!(matches!(
            store.load().await,
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<InMemorySessionStore>();
    }
}
