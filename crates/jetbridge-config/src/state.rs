use std::path::{Path, PathBuf};

use jetbridge_protocol::{SavedConnection, SettingsStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    last_connection: Option<SavedConnection>,
}

/// [`SettingsStore`] persisted as a small TOML file.
///
/// Reads and writes are best effort: an unreadable file behaves like an empty
/// one and failed writes are only logged.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_state(&self) -> PersistedState {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return PersistedState::default();
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to read jetbridge state");
                return PersistedState::default();
            }
        };
        toml::from_str(&raw).unwrap_or_else(|err| {
            tracing::warn!(path = %self.path.display(), error = %err, "ignoring malformed jetbridge state");
            PersistedState::default()
        })
    }

    fn write_state(&self, state: &PersistedState) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| err.to_string())?;
            }
        }
        let rendered = toml::to_string_pretty(state).map_err(|err| err.to_string())?;
        std::fs::write(&self.path, rendered.as_bytes()).map_err(|err| err.to_string())
    }
}

impl SettingsStore for FileSettingsStore {
    fn last_connection(&self) -> Option<SavedConnection> {
        self.read_state().last_connection
    }

    fn save_connection(&self, connection: &SavedConnection) {
        let mut state = self.read_state();
        state.last_connection = Some(connection.clone());
        if let Err(error) = self.write_state(&state) {
            tracing::warn!(path = %self.path.display(), error = %error, "failed to persist jetbridge state");
        }
    }
}
