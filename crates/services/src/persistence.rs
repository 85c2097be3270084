use std::sync::Arc;

use exam_core::model::SessionRecord;
use storage::repository::SessionStore;

/// Session store wrapper that never fails its caller.
///
/// The latest record is always kept in memory. When the backend rejects a
/// write the session carries on in memory and the write is retried on the
/// next `save` or `flush`.
pub struct DurableSession {
    store: Arc<dyn SessionStore>,
    current: Option<SessionRecord>,
    dirty: bool,
    clear_pending: bool,
}

impl DurableSession {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            current: None,
            dirty: false,
            clear_pending: false,
        }
    }

    /// Load the stored record. Read failures are treated as "no session".
    pub async fn load(&mut self) -> Option<SessionRecord> {
        match self.store.load().await {
            Ok(record) => {
                self.current.clone_from(&record);
                record
            }
            Err(err) => {
                tracing::warn!(error = %err, "session store unreadable, starting without a saved session");
                None
            }
        }
    }

    /// Remember `record` and try to persist it.
    pub async fn save(&mut self, record: &SessionRecord) {
        self.stage(record);
        self.flush().await;
    }

    /// Remember `record` without writing; the next `flush` persists it.
    pub fn stage(&mut self, record: &SessionRecord) {
        self.current = Some(record.clone());
        self.clear_pending = false;
        self.dirty = true;
    }

    /// Retry any write the backend previously rejected.
    pub async fn flush(&mut self) {
        if self.clear_pending {
            match self.store.clear().await {
                Ok(()) => self.clear_pending = false,
                Err(err) => tracing::warn!(error = %err, "session store clear failed, will retry"),
            }
            return;
        }
        if !self.dirty {
            return;
        }
        let Some(record) = self.current.as_ref() else {
            self.dirty = false;
            return;
        };
        match self.store.save(record).await {
            Ok(()) => self.dirty = false,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    exam_id = %record.exam_id(),
                    "session store write failed, continuing in memory"
                );
            }
        }
    }

    /// Forget the session, in memory and in the backend.
    pub async fn clear(&mut self) {
        self.current = None;
        self.dirty = false;
        self.clear_pending = true;
        self.flush().await;
    }

    /// True while the backend is behind the in-memory copy.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.dirty || self.clear_pending
    }
}
