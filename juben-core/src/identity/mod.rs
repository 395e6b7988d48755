//! User and session identifiers.
//!
//! Ids are created lazily and persisted through a [`KeyValueStore`]. When
//! the store cannot be read or written the ids live in memory for as long
//! as the [`IdentityStore`] does, so generation never fails.

mod storage;

pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const USER_ID_KEY: &str = "juben_user_id";
pub const SESSION_ID_KEY: &str = "juben_session_id";

const USER_PREFIX: &str = "user";
const SESSION_PREFIX: &str = "session";
const RANDOM_SUFFIX_LEN: usize = 9;

/// `<prefix>_<unix millis>_<9 lowercase alphanumerics>`
pub fn generate_id(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        prefix,
        Utc::now().timestamp_millis(),
        &random[..RANDOM_SUFFIX_LEN]
    )
}

#[derive(Default)]
struct Slot {
    value: Option<String>,
    persisted: bool,
}

pub struct IdentityStore {
    store: Arc<dyn KeyValueStore>,
    user: Mutex<Slot>,
    session: Mutex<Slot>,
}

impl IdentityStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            user: Mutex::new(Slot::default()),
            session: Mutex::new(Slot::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn get_or_create_user_id(&self) -> String {
        self.get_or_create(USER_ID_KEY, USER_PREFIX, &self.user)
    }

    pub fn get_or_create_session_id(&self) -> String {
        self.get_or_create(SESSION_ID_KEY, SESSION_PREFIX, &self.session)
    }

    /// Replace the current session id with a fresh one.
    pub fn rotate_session(&self) -> String {
        let session_id = generate_id(SESSION_PREFIX);
        self.adopt(SESSION_ID_KEY, &self.session, session_id.clone());
        info!(session_id = %session_id, "Session rotated");
        session_id
    }

    /// Adopt an id issued by the backend as the current session.
    pub fn set_session_id(&self, session_id: &str) {
        self.adopt(SESSION_ID_KEY, &self.session, session_id.to_string());
        debug!(session_id = %session_id, "Session id adopted");
    }

    fn get_or_create(&self, key: &str, prefix: &str, slot: &Mutex<Slot>) -> String {
        let mut slot = lock(slot);

        match self.store.get_item(key) {
            Ok(Some(existing)) if !existing.trim().is_empty() => {
                slot.value = Some(existing.clone());
                slot.persisted = true;
                existing
            }
            Ok(_) => {
                if let (Some(value), false) = (slot.value.clone(), slot.persisted) {
                    slot.persisted = self.persist(key, &value);
                    return value;
                }

                let id = generate_id(prefix);
                slot.persisted = self.persist(key, &id);
                slot.value = Some(id.clone());
                debug!(key, id = %id, "Identifier created");
                id
            }
            Err(err) => {
                warn!(key, error = %err, "Storage read failed, using in-memory identifier");
                if let Some(value) = &slot.value {
                    return value.clone();
                }

                let id = generate_id(prefix);
                slot.value = Some(id.clone());
                slot.persisted = false;
                id
            }
        }
    }

    fn adopt(&self, key: &str, slot: &Mutex<Slot>, value: String) {
        let mut slot = lock(slot);
        slot.persisted = self.persist(key, &value);
        slot.value = Some(value);
    }

    fn persist(&self, key: &str, value: &str) -> bool {
        match self.store.set_item(key, value) {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "Storage write failed, identifier kept in memory");
                false
            }
        }
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
