//! Provider that types prompts into an assistant running inside a tmux session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jetbridge_eventbus::ProviderEventBus;
use jetbridge_prompt::render;
use jetbridge_protocol::{
    CommandRunner, ContextSnapshot, ProcessCommandRunner, Provider, ProviderError,
    ProviderEvent, ProviderKind, ProviderResult, DEFAULT_COMMAND_TIMEOUT,
};

pub const DEFAULT_TMUX_BINARY: &str = "tmux";
pub const DEFAULT_SESSION_NAME: &str = "gemini-jetbridge";
pub const DEFAULT_AGENT_COMMAND: &str = "gemini";
pub const DEFAULT_SUBMIT_DELAY: Duration = Duration::from_millis(100);
const DISPLAY_NAME: &str = "gemini-cli";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxBackendConfig {
    pub binary: String,
    pub session_name: String,
    /// Command suggested to the user for starting the session.
    pub agent_command: String,
    pub submit_delay: Duration,
    pub command_timeout: Duration,
}

impl Default for TmuxBackendConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_TMUX_BINARY.to_owned(),
            session_name: DEFAULT_SESSION_NAME.to_owned(),
            agent_command: DEFAULT_AGENT_COMMAND.to_owned(),
            submit_delay: DEFAULT_SUBMIT_DELAY,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// [`Provider`] that injects keystrokes into a named tmux session.
pub struct TmuxProvider {
    config: TmuxBackendConfig,
    runner: Arc<dyn CommandRunner>,
    bus: ProviderEventBus,
}

impl TmuxProvider {
    pub fn new(config: TmuxBackendConfig, bus: ProviderEventBus) -> Self {
        let runner = Arc::new(ProcessCommandRunner::new(config.command_timeout));
        Self::with_runner(config, bus, runner)
    }

    pub fn with_runner(
        config: TmuxBackendConfig,
        bus: ProviderEventBus,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            runner,
            bus,
        }
    }

    pub fn session_name(&self) -> &str {
        &self.config.session_name
    }

    pub async fn has_session(&self) -> bool {
        match self
            .tmux(&["has-session", "-t", self.config.session_name.as_str()])
            .await
        {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!(session = %self.config.session_name, error = %error, "tmux session not available");
                false
            }
        }
    }

    /// Types `text` literally into the session, then presses Enter. Text that
    /// starts with `-` is still typed rather than read as a flag.
    pub async fn send_text(&self, text: &str) -> ProviderResult<()> {
        let session = self.config.session_name.as_str();
        self.tmux(&["send-keys", "-t", session, "-l", "--", text]).await?;
        tokio::time::sleep(self.config.submit_delay).await;
        self.tmux(&["send-keys", "-t", session, "C-m"]).await
    }

    async fn tmux(&self, args: &[&str]) -> ProviderResult<()> {
        let args = args.iter().map(|arg| (*arg).to_owned()).collect::<Vec<_>>();
        let output = self
            .runner
            .run(&self.config.binary, &args)
            .await
            .map_err(|error| {
                ProviderError::DependencyUnavailable(format!(
                    "unable to run {}: {error}",
                    self.config.binary
                ))
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ProviderError::Transport(format!(
            "{} {} exited with {}: {}",
            self.config.binary,
            args.first().map(String::as_str).unwrap_or_default(),
            output.status,
            stderr.trim()
        )))
    }

    fn missing_session_message(&self) -> String {
        let name = &self.config.session_name;
        format!(
            "No tmux session '{name}' found. Start one with: tmux new-session -s {name} '{}'",
            self.config.agent_command
        )
    }
}

#[async_trait]
impl Provider for TmuxProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tmux
    }

    fn display_name(&self) -> &str {
        DISPLAY_NAME
    }

    async fn connection_desc(&self) -> String {
        self.config.session_name.clone()
    }

    async fn is_connected(&self) -> bool {
        self.has_session().await
    }

    async fn reconnect(&self, _project_path: Option<&str>) {
        let name = &self.config.session_name;
        if self.has_session().await {
            self.bus.publish(ProviderEvent::status(format!(
                "Connected to gemini-cli tmux session \"{name}\""
            )));
        } else {
            self.bus.publish(ProviderEvent::error(format!(
                "No gemini-cli tmux session found for \"{name}\""
            )));
        }
    }

    async fn prompt(&self, raw_prompt: &str, snapshot: &ContextSnapshot) {
        if !self.has_session().await {
            self.bus
                .publish(ProviderEvent::indefinite_error(self.missing_session_message()));
            return;
        }

        let root = snapshot.project_path.as_deref().unwrap_or_default();
        let text = render(raw_prompt, root, snapshot);
        if let Err(error) = self.send_text(&text).await {
            tracing::warn!(session = %self.config.session_name, error = %error, "tmux prompt failed");
            self.bus.publish(ProviderEvent::error(format!(
                "Error sending prompt to tmux: {error}"
            )));
        }
    }
}
