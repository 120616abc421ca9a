use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod state;

pub use state::FileSettingsStore;

pub const ENV_JETBRIDGE_CONFIG: &str = "JETBRIDGE_CONFIG";

const DEFAULT_PROVIDER: &str = "provider.opencode";
const PROVIDER_NAMESPACE: &str = "provider";
const LEGACY_PROVIDER_ALIASES: &[(&str, &str)] = &[
    ("opencode", "provider.opencode"),
    ("gemini", "provider.tmux"),
    ("gemini-cli", "provider.tmux"),
    ("gemini_cli", "provider.tmux"),
    ("tmux", "provider.tmux"),
];
const STATE_FILE_NAME: &str = "state.toml";
const LOG_FILE_NAME: &str = "jetbridge.log";
const DEFAULT_PROCESS_PATTERN: &str = "opencode.*--port";
const DEFAULT_AGENT: &str = "plan";
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_DISCOVERY_COMMAND_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_EVENT_BUFFER_CAPACITY: usize = 64;
const DEFAULT_TMUX_BINARY: &str = "tmux";
const DEFAULT_TMUX_SESSION_NAME: &str = "gemini-jetbridge";
const DEFAULT_TMUX_AGENT_COMMAND: &str = "gemini";
const DEFAULT_TMUX_SUBMIT_DELAY_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JetbridgeConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_state_path")]
    pub state_path: String,
    #[serde(default)]
    pub opencode: OpenCodeConfigToml,
    #[serde(default)]
    pub tmux: TmuxConfigToml,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenCodeConfigToml {
    #[serde(default = "default_process_pattern")]
    pub process_pattern: String,
    #[serde(default = "default_agent")]
    pub default_agent: String,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_discovery_command_timeout_ms")]
    pub discovery_command_timeout_ms: u64,
    #[serde(default = "default_event_buffer_capacity")]
    pub event_buffer_capacity: usize,
}

impl Default for OpenCodeConfigToml {
    fn default() -> Self {
        Self {
            process_pattern: default_process_pattern(),
            default_agent: default_agent(),
            probe_timeout_ms: default_probe_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            discovery_command_timeout_ms: default_discovery_command_timeout_ms(),
            event_buffer_capacity: default_event_buffer_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TmuxConfigToml {
    #[serde(default = "default_tmux_binary")]
    pub binary: String,
    #[serde(default = "default_tmux_session_name")]
    pub session_name: String,
    #[serde(default = "default_tmux_agent_command")]
    pub agent_command: String,
    #[serde(default = "default_tmux_submit_delay_ms")]
    pub submit_delay_ms: u64,
}

impl Default for TmuxConfigToml {
    fn default() -> Self {
        Self {
            binary: default_tmux_binary(),
            session_name: default_tmux_session_name(),
            agent_command: default_tmux_agent_command(),
            submit_delay_ms: default_tmux_submit_delay_ms(),
        }
    }
}

impl Default for JetbridgeConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            state_path: default_state_path(),
            opencode: OpenCodeConfigToml::default(),
            tmux: TmuxConfigToml::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCodeRuntimeConfig {
    pub process_pattern: String,
    pub default_agent: String,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
    pub discovery_command_timeout: Duration,
    pub event_buffer_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxRuntimeConfig {
    pub binary: String,
    pub session_name: String,
    pub agent_command: String,
    pub submit_delay: Duration,
}

impl JetbridgeConfig {
    pub fn opencode_runtime(&self) -> OpenCodeRuntimeConfig {
        OpenCodeRuntimeConfig {
            process_pattern: self.opencode.process_pattern.clone(),
            default_agent: self.opencode.default_agent.clone(),
            probe_timeout: Duration::from_millis(self.opencode.probe_timeout_ms),
            request_timeout: Duration::from_millis(self.opencode.request_timeout_ms),
            discovery_command_timeout: Duration::from_millis(
                self.opencode.discovery_command_timeout_ms,
            ),
            event_buffer_capacity: self.opencode.event_buffer_capacity,
        }
    }

    pub fn tmux_runtime(&self) -> TmuxRuntimeConfig {
        TmuxRuntimeConfig {
            binary: self.tmux.binary.clone(),
            session_name: self.tmux.session_name.clone(),
            agent_command: self.tmux.agent_command.clone(),
            submit_delay: Duration::from_millis(self.tmux.submit_delay_ms),
        }
    }

    /// The log file lives next to the state file.
    pub fn log_path(&self) -> PathBuf {
        Path::new(&self.state_path)
            .parent()
            .map(|parent| parent.join(LOG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(LOG_FILE_NAME))
    }

    pub fn settings_store(&self) -> FileSettingsStore {
        FileSettingsStore::new(&self.state_path)
    }
}

pub fn load_from_env() -> Result<JetbridgeConfig, ConfigError> {
    let path = config_path_from_env()?;
    load_from_path(path)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<JetbridgeConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::configuration("Unable to resolve home directory from HOME or USERPROFILE")
    })?;

    Ok(home.join(".config").join("jetbridge").join("config.toml"))
}

fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var(ENV_JETBRIDGE_CONFIG) {
        Ok(raw) => {
            if raw.trim().is_empty() {
                default_config_path()
            } else {
                Ok(raw.into())
            }
        }
        Err(std::env::VarError::NotPresent) => default_config_path(),
        Err(_) => Err(ConfigError::configuration(
            "JETBRIDGE_CONFIG contained invalid UTF-8",
        )),
    }
}

fn default_jetbridge_data_dir() -> PathBuf {
    resolve_data_local_dir().join("jetbridge")
}

fn resolve_data_local_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(path) = std::env::var("LOCALAPPDATA") {
            let path = path.trim();
            if !path.is_empty() {
                return absolutize_path(PathBuf::from(path));
            }
        }
        if let Some(home) = resolve_home_dir() {
            return home.join("AppData").join("Local");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = resolve_home_dir() {
            return home.join("Library").join("Application Support");
        }
    }

    #[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
    {
        if let Ok(path) = std::env::var("XDG_DATA_HOME") {
            let path = path.trim();
            if !path.is_empty() {
                return absolutize_path(PathBuf::from(path));
            }
        }
        if let Some(home) = resolve_home_dir() {
            return home.join(".local").join("share");
        }
    }

    std::env::temp_dir()
}

fn resolve_home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("USERPROFILE")
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
}

fn absolutize_path(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }

    if let Ok(current) = std::env::current_dir() {
        return current.join(path);
    }

    std::env::temp_dir().join(path)
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_owned()
}

fn default_state_path() -> String {
    default_jetbridge_data_dir()
        .join(STATE_FILE_NAME)
        .to_string_lossy()
        .to_string()
}

fn default_process_pattern() -> String {
    DEFAULT_PROCESS_PATTERN.to_owned()
}

fn default_agent() -> String {
    DEFAULT_AGENT.to_owned()
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_discovery_command_timeout_ms() -> u64 {
    DEFAULT_DISCOVERY_COMMAND_TIMEOUT_MS
}

fn default_event_buffer_capacity() -> usize {
    DEFAULT_EVENT_BUFFER_CAPACITY
}

fn default_tmux_binary() -> String {
    DEFAULT_TMUX_BINARY.to_owned()
}

fn default_tmux_session_name() -> String {
    DEFAULT_TMUX_SESSION_NAME.to_owned()
}

fn default_tmux_agent_command() -> String {
    DEFAULT_TMUX_AGENT_COMMAND.to_owned()
}

fn default_tmux_submit_delay_ms() -> u64 {
    DEFAULT_TMUX_SUBMIT_DELAY_MS
}

fn persist_config(path: &Path, config: &JetbridgeConfig) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to serialize JETBRIDGE_CONFIG for {}: {err}",
            path.display()
        ))
    })?;

    std::fs::write(path, rendered.as_bytes()).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to write JETBRIDGE_CONFIG to {}: {err}",
            path.display()
        ))
    })
}

fn load_or_create_config(path: &Path) -> Result<JetbridgeConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        ConfigError::configuration(format!(
                            "Failed to create parent directory {} for JETBRIDGE_CONFIG: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }

            let default_config = JetbridgeConfig::default();
            persist_config(path, &default_config)?;
            tracing::info!(path = %path.display(), "created default jetbridge config");
            return Ok(default_config);
        }
        Err(err) => {
            return Err(ConfigError::configuration(format!(
                "Failed to read JETBRIDGE_CONFIG from {}: {err}",
                path.display()
            )));
        }
    };

    let mut config: JetbridgeConfig = toml::from_str(&raw).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to parse JETBRIDGE_CONFIG from {}: {err}",
            path.display()
        ))
    })?;

    let changed = normalize_config(&mut config)?;
    if changed {
        persist_config(path, &config)?;
    }

    Ok(config)
}

fn normalize_config(config: &mut JetbridgeConfig) -> Result<bool, ConfigError> {
    let mut changed = normalize_provider_selection(&mut config.provider)?;

    if config.state_path.trim().is_empty() {
        config.state_path = default_state_path();
        changed = true;
    }

    changed |= normalize_opencode_config(&mut config.opencode);
    changed |= normalize_tmux_config(&mut config.tmux);
    Ok(changed)
}

pub fn normalize_opencode_config(config: &mut OpenCodeConfigToml) -> bool {
    let mut changed = false;
    changed |= normalize_non_empty_string(&mut config.process_pattern, default_process_pattern());
    changed |= normalize_non_empty_string(&mut config.default_agent, default_agent());
    changed |= clamp_value(&mut config.probe_timeout_ms, 100, 30_000);
    changed |= clamp_value(&mut config.request_timeout_ms, 500, 60_000);
    changed |= clamp_value(&mut config.discovery_command_timeout_ms, 100, 30_000);
    changed |= clamp_value(&mut config.event_buffer_capacity, 1, 4_096);
    changed
}

pub fn normalize_tmux_config(config: &mut TmuxConfigToml) -> bool {
    let mut changed = false;
    changed |= normalize_non_empty_string(&mut config.binary, default_tmux_binary());
    changed |= normalize_non_empty_string(&mut config.session_name, default_tmux_session_name());
    changed |= normalize_non_empty_string(&mut config.agent_command, default_tmux_agent_command());
    changed |= clamp_value(&mut config.submit_delay_ms, 0, 5_000);
    changed
}

fn normalize_provider_selection(value: &mut String) -> Result<bool, ConfigError> {
    let normalized = value.trim().to_ascii_lowercase();
    let canonical = if normalized.is_empty() {
        default_provider()
    } else if let Some((_, key)) = LEGACY_PROVIDER_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
    {
        (*key).to_owned()
    } else {
        normalized
    };
    let expected_prefix = format!("{PROVIDER_NAMESPACE}.");

    if !canonical.starts_with(expected_prefix.as_str()) {
        return Err(ConfigError::configuration(format!(
            "Invalid `provider` value '{canonical}' in JETBRIDGE_CONFIG: provider keys must be namespaced under `{expected_prefix}*` (for example `{DEFAULT_PROVIDER}`)."
        )));
    }
    let suffix = canonical[expected_prefix.len()..].trim();
    if suffix.is_empty()
        || !suffix
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-')
    {
        return Err(ConfigError::configuration(format!(
            "Invalid `provider` value '{canonical}' in JETBRIDGE_CONFIG: expected format `{PROVIDER_NAMESPACE}.<provider_key>` where the key contains only lowercase letters, digits, `_`, or `-`."
        )));
    }

    if *value != canonical {
        *value = canonical;
        return Ok(true);
    }

    Ok(false)
}

fn normalize_non_empty_string(value: &mut String, default: String) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        if *value != default {
            *value = default;
            return true;
        }
        return false;
    }

    if trimmed != value {
        *value = trimmed.to_owned();
        return true;
    }
    false
}

fn clamp_value<T: Ord + Copy>(value: &mut T, min: T, max: T) -> bool {
    let clamped = (*value).clamp(min, max);
    if clamped != *value {
        *value = clamped;
        return true;
    }
    false
}
