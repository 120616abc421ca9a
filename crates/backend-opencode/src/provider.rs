use std::sync::Arc;

use async_trait::async_trait;
use jetbridge_eventbus::ProviderEventBus;
use jetbridge_protocol::{
    CommandRunner, ContextSnapshot, ProcessCommandRunner, Provider, ProviderError,
    ProviderEvent, ProviderKind, ProviderResult, SettingsStore,
};

use crate::api::{ServerDescriptor, SessionDescriptor};
use crate::connection::{ActiveConnection, ConnectionManager};
use crate::OpenCodeBackendConfig;

pub const NO_SESSION_MESSAGE: &str = "No connected opencode session";
const DISPLAY_NAME: &str = "OpenCode";

/// [`Provider`] backed by a running `opencode --port` server.
pub struct OpenCodeProvider {
    manager: ConnectionManager,
    bus: ProviderEventBus,
}

impl OpenCodeProvider {
    pub fn new(
        config: OpenCodeBackendConfig,
        bus: ProviderEventBus,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let runner = Arc::new(ProcessCommandRunner::new(config.discovery_command_timeout));
        Self::with_runner(config, bus, settings, runner)
    }

    pub fn with_runner(
        config: OpenCodeBackendConfig,
        bus: ProviderEventBus,
        settings: Arc<dyn SettingsStore>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let manager = ConnectionManager::new(&config, runner, bus.clone(), settings);
        Self { manager, bus }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub async fn available_servers(&self) -> Vec<ServerDescriptor> {
        self.manager.discovery().discover_servers().await
    }

    pub async fn probe_server(&self, address: &str) -> ProviderResult<ServerDescriptor> {
        self.manager
            .discovery()
            .probe_server(address)
            .await
            .ok_or_else(|| {
                ProviderError::NoConnection(format!("no opencode server answers at {address}"))
            })
    }

    pub async fn sessions(&self, address: &str) -> ProviderResult<Vec<SessionDescriptor>> {
        self.manager.registry().list_sessions(address).await
    }

    pub async fn connect(
        &self,
        server: ServerDescriptor,
        session: SessionDescriptor,
    ) -> ActiveConnection {
        self.manager.connect(server, session).await
    }

    pub async fn disconnect(&self) {
        self.manager.disconnect().await;
    }

    /// Like [`Provider::prompt`], also reporting whether opencode accepted it.
    pub async fn send_prompt(&self, raw_prompt: &str, snapshot: &ContextSnapshot) -> bool {
        self.manager.prompt(raw_prompt, snapshot).await
    }
}

#[async_trait]
impl Provider for OpenCodeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenCode
    }

    fn display_name(&self) -> &str {
        DISPLAY_NAME
    }

    async fn connection_desc(&self) -> String {
        self.manager.connection_desc()
    }

    async fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    async fn reconnect(&self, project_path: Option<&str>) {
        if let Err(error) = self.manager.ensure_connected(project_path).await {
            tracing::debug!(error = %error, "opencode reconnect failed");
            self.bus.publish(ProviderEvent::error(NO_SESSION_MESSAGE));
        }
    }

    async fn prompt(&self, raw_prompt: &str, snapshot: &ContextSnapshot) {
        self.manager.prompt(raw_prompt, snapshot).await;
    }
}
