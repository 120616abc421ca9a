use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// The last server and session the user was bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedConnection {
    pub address: String,
    pub session_id: String,
}

/// Host-owned key/value store for reconnect preferences.
///
/// Writes are best effort: a store that cannot persist should log and move on.
pub trait SettingsStore: Send + Sync {
    fn last_connection(&self) -> Option<SavedConnection>;
    fn save_connection(&self, connection: &SavedConnection);
}

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    connection: Mutex<Option<SavedConnection>>,
}

impl MemorySettingsStore {
    pub fn new(connection: Option<SavedConnection>) -> Self {
        Self {
            connection: Mutex::new(connection),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn last_connection(&self) -> Option<SavedConnection> {
        self.connection
            .lock()
            .ok()
            .and_then(|connection| connection.clone())
    }

    fn save_connection(&self, connection: &SavedConnection) {
        if let Ok(mut slot) = self.connection.lock() {
            *slot = Some(connection.clone());
        }
    }
}
