#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemorySessionStore, SESSION_KEY, SESSION_TTL_HOURS, SessionStore, StorageError,
    StoredSession,
};
pub use sqlite::{SqliteInitError, SqliteSessionStore};
