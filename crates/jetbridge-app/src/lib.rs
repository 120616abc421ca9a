//! Wiring between configuration and the concrete providers.

use std::sync::Arc;

use async_trait::async_trait;
use backend_opencode::{OpenCodeBackendConfig, OpenCodeProvider};
use backend_tmux::{TmuxBackendConfig, TmuxProvider};
use jetbridge_config::JetbridgeConfig;
use jetbridge_eventbus::{ProviderEventBus, ProviderEventBusConfig};
use jetbridge_protocol::{
    ContextSnapshot, Provider, ProviderError, ProviderKind, ProviderResult, SettingsStore,
};

pub mod cli;

const SUPPORTED_PROVIDER_KEYS: [&str; 2] = [
    ProviderKind::OpenCode.as_key(),
    ProviderKind::Tmux.as_key(),
];

/// The provider selected by configuration.
pub enum JetbridgeProvider {
    OpenCode(OpenCodeProvider),
    Tmux(TmuxProvider),
}

impl JetbridgeProvider {
    fn inner(&self) -> &dyn Provider {
        match self {
            Self::OpenCode(provider) => provider,
            Self::Tmux(provider) => provider,
        }
    }

    pub fn as_opencode(&self) -> Option<&OpenCodeProvider> {
        match self {
            Self::OpenCode(provider) => Some(provider),
            Self::Tmux(_) => None,
        }
    }
}

#[async_trait]
impl Provider for JetbridgeProvider {
    fn kind(&self) -> ProviderKind {
        self.inner().kind()
    }

    fn display_name(&self) -> &str {
        self.inner().display_name()
    }

    async fn connection_desc(&self) -> String {
        self.inner().connection_desc().await
    }

    async fn is_connected(&self) -> bool {
        self.inner().is_connected().await
    }

    async fn reconnect(&self, project_path: Option<&str>) {
        self.inner().reconnect(project_path).await;
    }

    async fn prompt(&self, raw_prompt: &str, snapshot: &ContextSnapshot) {
        self.inner().prompt(raw_prompt, snapshot).await;
    }
}

pub fn supported_provider_keys() -> &'static [&'static str] {
    &SUPPORTED_PROVIDER_KEYS
}

pub fn resolve_provider_kind(provider_key: &str) -> ProviderResult<ProviderKind> {
    ProviderKind::from_key(provider_key)
        .ok_or_else(|| ProviderError::UnknownProviderKey(provider_key.to_owned()))
}

/// A command-line override wins over the configured key unless it is blank.
pub fn resolve_provider_name(cli: Option<&str>, config_value: &str) -> String {
    let normalized = cli.unwrap_or(config_value).trim().to_ascii_lowercase();
    if normalized.is_empty() {
        config_value.to_owned()
    } else {
        normalized
    }
}

pub fn event_bus(config: &JetbridgeConfig) -> ProviderEventBus {
    ProviderEventBus::new(ProviderEventBusConfig {
        buffer_capacity: config.opencode.event_buffer_capacity.max(1),
    })
}

pub fn opencode_backend_config(config: &JetbridgeConfig) -> OpenCodeBackendConfig {
    let runtime = config.opencode_runtime();
    OpenCodeBackendConfig {
        process_pattern: runtime.process_pattern,
        default_agent: runtime.default_agent,
        probe_timeout: runtime.probe_timeout,
        request_timeout: runtime.request_timeout,
        discovery_command_timeout: runtime.discovery_command_timeout,
    }
}

pub fn tmux_backend_config(config: &JetbridgeConfig) -> TmuxBackendConfig {
    let runtime = config.tmux_runtime();
    TmuxBackendConfig {
        binary: runtime.binary,
        session_name: runtime.session_name,
        agent_command: runtime.agent_command,
        submit_delay: runtime.submit_delay,
        ..TmuxBackendConfig::default()
    }
}

pub fn build_opencode_provider(
    config: &JetbridgeConfig,
    bus: ProviderEventBus,
    settings: Arc<dyn SettingsStore>,
) -> OpenCodeProvider {
    OpenCodeProvider::new(opencode_backend_config(config), bus, settings)
}

/// Builds the provider named by `config.provider`.
pub fn build_provider(
    config: &JetbridgeConfig,
    bus: ProviderEventBus,
    settings: Arc<dyn SettingsStore>,
) -> ProviderResult<JetbridgeProvider> {
    build_provider_for_key(&config.provider, config, bus, settings)
}

pub fn build_provider_for_key(
    provider_key: &str,
    config: &JetbridgeConfig,
    bus: ProviderEventBus,
    settings: Arc<dyn SettingsStore>,
) -> ProviderResult<JetbridgeProvider> {
    let provider = match resolve_provider_kind(provider_key)? {
        ProviderKind::OpenCode => {
            JetbridgeProvider::OpenCode(build_opencode_provider(config, bus, settings))
        }
        ProviderKind::Tmux => {
            JetbridgeProvider::Tmux(TmuxProvider::new(tmux_backend_config(config), bus))
        }
    };
    tracing::debug!(provider = provider_key, "built provider");
    Ok(provider)
}
