use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use jetbridge_eventbus::ProviderEventBus;
use jetbridge_prompt::{extract_agent, render};
use jetbridge_protocol::{
    CommandRunner, ContextSnapshot, ProviderError, ProviderEvent, ProviderResult,
    SavedConnection, SettingsStore,
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{ServerDescriptor, ServerEvent, SessionDescriptor};
use crate::discovery::ServerDiscovery;
use crate::sessions::{find_session, most_recent_session, SessionRegistry};
use crate::transport::{EventFeed, OpenCodeClient};
use crate::OpenCodeBackendConfig;

pub const NO_INSTANCE_MESSAGE: &str = "No running opencode instance found in project path";
pub const PROMPT_REJECTED_MESSAGE: &str = "opencode rejected the prompt";
pub const PROMPT_UNREACHABLE_MESSAGE: &str =
    "Unable to prompt opencode. Is it running in this project's path?";
pub const QUESTION_ASKED_MESSAGE: &str = "OpenCode asked a question";
const NO_CONNECTION_DESC: &str = "none";

/// The server and session a manager is currently bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConnection {
    pub server: ServerDescriptor,
    pub session: SessionDescriptor,
}

impl ActiveConnection {
    pub fn title(&self) -> &str {
        if self.session.title.is_empty() {
            &self.session.id
        } else {
            &self.session.title
        }
    }
}

struct Subscription {
    generation: u64,
    cancel: CancellationToken,
    live: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Subscription {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(error) = self.task.await {
            tracing::debug!(generation = self.generation, error = %error, "subscription task ended abnormally");
        }
    }
}

/// Binding published to readers that must not wait on the state mutex.
#[derive(Debug, Clone, Default)]
struct LinkSnapshot {
    generation: u64,
    active: Option<ActiveConnection>,
}

#[derive(Default)]
struct ConnectionState {
    server: Option<ServerDescriptor>,
    session: Option<SessionDescriptor>,
    subscription: Option<Subscription>,
}

impl ConnectionState {
    fn active(&self) -> Option<ActiveConnection> {
        match (&self.server, &self.session, &self.subscription) {
            (Some(server), Some(session), Some(subscription)) if subscription.is_live() => {
                Some(ActiveConnection {
                    server: server.clone(),
                    session: session.clone(),
                })
            }
            _ => None,
        }
    }

    fn clear(&mut self) {
        self.server = None;
        self.session = None;
        self.subscription = None;
    }
}

/// Owns the binding to one opencode server and session.
///
/// All transitions go through a single async mutex: `ensure_connected`,
/// `connect` and `disconnect` are serialized, and the event subscription only
/// touches the state to clear it when its own stream dies. Status queries read
/// a watch snapshot instead of the mutex, so they never wait on discovery.
///
/// Dropping the manager cancels its subscription task.
pub struct ConnectionManager {
    client: OpenCodeClient,
    discovery: ServerDiscovery,
    registry: SessionRegistry,
    settings: Arc<dyn SettingsStore>,
    bus: ProviderEventBus,
    default_agent: String,
    state: Arc<Mutex<ConnectionState>>,
    snapshot: Arc<watch::Sender<LinkSnapshot>>,
    generations: AtomicU64,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        config: &OpenCodeBackendConfig,
        runner: Arc<dyn CommandRunner>,
        bus: ProviderEventBus,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let client = OpenCodeClient::new(config.request_timeout);
        let discovery = ServerDiscovery::new(
            runner,
            client.clone(),
            config.process_pattern.clone(),
            config.probe_timeout,
        );
        Self {
            registry: SessionRegistry::new(client.clone()),
            client,
            discovery,
            settings,
            bus,
            default_agent: config.default_agent.clone(),
            state: Arc::new(Mutex::new(ConnectionState::default())),
            snapshot: Arc::new(watch::Sender::new(LinkSnapshot::default())),
            generations: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn discovery(&self) -> &ServerDiscovery {
        &self.discovery
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot.borrow().active.is_some()
    }

    pub fn current(&self) -> Option<ActiveConnection> {
        self.snapshot.borrow().active.clone()
    }

    pub fn connection_desc(&self) -> String {
        self.current()
            .map(|active| active.title().to_owned())
            .unwrap_or_else(|| NO_CONNECTION_DESC.to_owned())
    }

    /// Returns the live binding, discovering and connecting when there is none.
    ///
    /// A saved connection is preferred while any discovered server still has
    /// that session. Otherwise the server whose directory is the longest prefix
    /// of `path_hint` is used with its most recently updated session.
    pub async fn ensure_connected(&self, path_hint: Option<&str>) -> ProviderResult<ActiveConnection> {
        let mut state = self.state.lock().await;
        if let Some(active) = state.active() {
            return Ok(active);
        }
        self.teardown_locked(&mut state).await;

        let servers = self.discovery.discover_servers().await;
        if servers.is_empty() {
            return Err(ProviderError::NoConnection(
                "no running opencode server found".to_owned(),
            ));
        }

        if let Some((server, session)) = self.find_saved_connection(&servers).await {
            tracing::debug!(address = %server.address, session_id = %session.id, "reusing saved opencode connection");
            return Ok(self.connect_locked(&mut state, server, session).await);
        }

        let server = nearest_server(&servers, path_hint).cloned().ok_or_else(|| {
            ProviderError::NoConnection(format!(
                "no opencode server serves {}",
                path_hint.unwrap_or_default()
            ))
        })?;
        let sessions = self
            .registry
            .list_sessions(&server.address)
            .await
            .map_err(|error| {
                ProviderError::NoConnection(format!(
                    "unable to list sessions on {}: {error}",
                    server.address
                ))
            })?;
        let session = most_recent_session(&sessions).cloned().ok_or_else(|| {
            ProviderError::NoConnection(format!("no sessions on {}", server.address))
        })?;

        Ok(self.connect_locked(&mut state, server, session).await)
    }

    /// Binds to `server` and `session`, replacing any existing binding.
    pub async fn connect(
        &self,
        server: ServerDescriptor,
        session: SessionDescriptor,
    ) -> ActiveConnection {
        let mut state = self.state.lock().await;
        self.connect_locked(&mut state, server, session).await
    }

    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        self.teardown_locked(&mut state).await;
        tracing::debug!("opencode connection closed");
    }

    /// Expands `raw_prompt` and sends it to the bound session. Failures are
    /// published on the bus; the return value says whether opencode accepted
    /// the prompt.
    pub async fn prompt(&self, raw_prompt: &str, snapshot: &ContextSnapshot) -> bool {
        let active = match self.ensure_connected(snapshot.file_path.as_deref()).await {
            Ok(active) => active,
            Err(error) => {
                tracing::warn!(error = %error, "prompt without opencode connection");
                self.bus.publish(ProviderEvent::error(NO_INSTANCE_MESSAGE));
                return false;
            }
        };

        let agent = extract_agent(raw_prompt, &self.default_agent);
        let text = render(raw_prompt, &active.server.root_path.directory, snapshot);
        tracing::debug!(
            address = %active.server.address,
            session_id = %active.session.id,
            agent = %agent,
            "sending prompt"
        );

        match self
            .client
            .send_prompt_async(
                &active.server.address,
                &active.session.id,
                &text,
                Some(agent.as_str()),
            )
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                self.bus.publish(ProviderEvent::error(PROMPT_REJECTED_MESSAGE));
                false
            }
            Err(error) => {
                tracing::warn!(error = %error, "prompt dispatch failed");
                self.bus.publish(ProviderEvent::error(PROMPT_UNREACHABLE_MESSAGE));
                false
            }
        }
    }

    async fn find_saved_connection(
        &self,
        servers: &[ServerDescriptor],
    ) -> Option<(ServerDescriptor, SessionDescriptor)> {
        let saved = self.settings.last_connection()?;
        let ordered = servers
            .iter()
            .filter(|server| server.address == saved.address)
            .chain(servers.iter().filter(|server| server.address != saved.address));

        for server in ordered {
            match self.registry.list_sessions(&server.address).await {
                Ok(sessions) => {
                    if let Some(session) = find_session(&sessions, &saved.session_id) {
                        return Some((server.clone(), session.clone()));
                    }
                }
                Err(error) => {
                    tracing::debug!(address = %server.address, error = %error, "skipping server while resolving saved session");
                }
            }
        }
        None
    }

    async fn connect_locked(
        &self,
        state: &mut ConnectionState,
        server: ServerDescriptor,
        session: SessionDescriptor,
    ) -> ActiveConnection {
        self.teardown_locked(state).await;

        self.settings.save_connection(&SavedConnection {
            address: server.address.clone(),
            session_id: session.id.clone(),
        });

        let registry = self.registry.clone();
        let address = server.address.clone();
        let session_id = session.id.clone();
        tokio::spawn(async move {
            registry.select_session(&address, &session_id).await;
        });

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let active = ActiveConnection {
            server: server.clone(),
            session: session.clone(),
        };
        // must precede the spawn: a task that dies at once clears its own generation
        self.snapshot.send_replace(LinkSnapshot {
            generation,
            active: Some(active.clone()),
        });
        state.subscription = Some(self.spawn_subscription(generation, &server.address));
        state.server = Some(server);
        state.session = Some(session);

        tracing::info!(
            address = %active.server.address,
            session_id = %active.session.id,
            "connected to opencode session"
        );
        self.bus.publish(ProviderEvent::status(format!(
            "Connected to opencode session \"{}\"",
            active.title()
        )));
        active
    }

    async fn teardown_locked(&self, state: &mut ConnectionState) {
        if let Some(subscription) = state.subscription.take() {
            subscription.shutdown().await;
        }
        state.clear();
        self.snapshot.send_modify(|snapshot| snapshot.active = None);
    }

    fn spawn_subscription(&self, generation: u64, address: &str) -> Subscription {
        let cancel = self.shutdown.child_token();
        let live = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_subscription(
            self.client.subscribe_events(address),
            generation,
            cancel.clone(),
            Arc::clone(&live),
            Arc::clone(&self.state),
            Arc::clone(&self.snapshot),
            self.bus.clone(),
        ));
        Subscription {
            generation,
            cancel,
            live,
            task,
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_subscription(
    mut feed: EventFeed,
    generation: u64,
    cancel: CancellationToken,
    live: Arc<AtomicBool>,
    state: Arc<Mutex<ConnectionState>>,
    snapshot: Arc<watch::Sender<LinkSnapshot>>,
    bus: ProviderEventBus,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            event = feed.next_event() => event,
        };
        match event {
            Some(ServerEvent::InstanceDisposed) => {
                tracing::debug!(address = %feed.address(), "opencode instance disposed");
                break;
            }
            Some(ServerEvent::QuestionAsked) => {
                bus.publish(ProviderEvent::message(QUESTION_ASKED_MESSAGE));
            }
            Some(event) => {
                tracing::trace!(address = %feed.address(), event = ?event, "opencode event");
            }
            None => {
                tracing::debug!(
                    address = %feed.address(),
                    termination = ?feed.termination(),
                    "opencode event stream closed"
                );
                break;
            }
        }
    }

    live.store(false, Ordering::SeqCst);
    snapshot.send_if_modified(|snapshot| {
        let owns_snapshot = snapshot.generation == generation && snapshot.active.is_some();
        if owns_snapshot {
            snapshot.active = None;
        }
        owns_snapshot
    });
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        mut guard = state.lock() => {
            let owns_state = guard
                .subscription
                .as_ref()
                .is_some_and(|subscription| subscription.generation == generation);
            if owns_state {
                guard.clear();
            }
        }
    }
}

/// The server whose root directory is the longest prefix of `path_hint`.
///
/// Without a hint the first server is returned. Servers reporting an empty
/// directory never match a hint.
pub fn nearest_server<'a>(
    servers: &'a [ServerDescriptor],
    path_hint: Option<&str>,
) -> Option<&'a ServerDescriptor> {
    let Some(hint) = path_hint else {
        return servers.first();
    };
    servers
        .iter()
        .filter(|server| {
            let directory = server.root_path.directory.as_str();
            !directory.is_empty() && hint.starts_with(directory)
        })
        .fold(None, |best: Option<&ServerDescriptor>, server| match best {
            Some(current)
                if current.root_path.directory.len() >= server.root_path.directory.len() =>
            {
                Some(current)
            }
            _ => Some(server),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RootPath;

    fn server(address: &str, directory: &str) -> ServerDescriptor {
        ServerDescriptor {
            address: address.to_owned(),
            root_path: RootPath {
                home: "/home/dev".to_owned(),
                state: String::new(),
                config: String::new(),
                worktree: directory.to_owned(),
                directory: directory.to_owned(),
            },
        }
    }

    #[test]
    fn nearest_server_prefers_longest_directory() {
        let servers = vec![server("127.0.0.1:1", "/a"), server("127.0.0.1:2", "/a/b")];
        let nearest = nearest_server(&servers, Some("/a/b/c/file.kt")).expect("nearest");
        assert_eq!(nearest.address, "127.0.0.1:2");
    }

    #[test]
    fn nearest_server_without_hint_uses_first_server() {
        let servers = vec![server("127.0.0.1:1", "/x"), server("127.0.0.1:2", "/y")];
        assert_eq!(
            nearest_server(&servers, None).map(|s| s.address.as_str()),
            Some("127.0.0.1:1")
        );
    }

    #[test]
    fn nearest_server_requires_a_matching_directory() {
        let servers = vec![server("127.0.0.1:1", "/x"), server("127.0.0.1:2", "")];
        assert!(nearest_server(&servers, Some("/y/file.kt")).is_none());
        assert!(nearest_server(&[], None).is_none());
    }

    #[test]
    fn active_connection_title_falls_back_to_session_id() {
        let active = ActiveConnection {
            server: server("127.0.0.1:1", "/x"),
            session: SessionDescriptor {
                id: "ses_1".to_owned(),
                title: String::new(),
                directory: "/x".to_owned(),
                time: Default::default(),
            },
        };
        assert_eq!(active.title(), "ses_1");
    }
}
