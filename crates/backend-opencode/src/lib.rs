//! opencode backend: finds local `opencode --port` servers, binds to one of
//! their sessions, follows the event stream and sends prompts.

use std::time::Duration;

pub mod api;
pub mod connection;
pub mod discovery;
pub mod provider;
pub mod sessions;
pub mod transport;

pub use api::{
    parse_event_line, PromptMessage, PromptPart, RootPath, ServerDescriptor, ServerEvent,
    SessionDescriptor, SessionTime,
};
pub use connection::{
    nearest_server, ActiveConnection, ConnectionManager, NO_INSTANCE_MESSAGE,
    PROMPT_REJECTED_MESSAGE, PROMPT_UNREACHABLE_MESSAGE, QUESTION_ASKED_MESSAGE,
};
pub use discovery::{
    parse_lsof_addresses, parse_pgrep_output, ServerDiscovery, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_PROCESS_PATTERN,
};
pub use provider::{OpenCodeProvider, NO_SESSION_MESSAGE};
pub use sessions::{find_session, most_recent_session, SessionRegistry};
pub use transport::{EventFeed, FeedTermination, OpenCodeClient, DEFAULT_REQUEST_TIMEOUT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCodeBackendConfig {
    pub process_pattern: String,
    pub default_agent: String,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
    pub discovery_command_timeout: Duration,
}

impl Default for OpenCodeBackendConfig {
    fn default() -> Self {
        Self {
            process_pattern: DEFAULT_PROCESS_PATTERN.to_owned(),
            default_agent: jetbridge_prompt::DEFAULT_AGENT.to_owned(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            discovery_command_timeout: jetbridge_protocol::DEFAULT_COMMAND_TIMEOUT,
        }
    }
}
