use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use jetbridge_protocol::{sanitize_error_body, ProviderError, ProviderResult};
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use crate::api::{
    parse_event_line, PromptMessage, RootPath, SelectSessionRequest, ServerEvent,
    SessionDescriptor,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP client for the opencode control API at a `host:port` address.
#[derive(Debug, Clone)]
pub struct OpenCodeClient {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl Default for OpenCodeClient {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl OpenCodeClient {
    pub fn new(request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .no_proxy()
            .build()
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, "falling back to default opencode http client");
                reqwest::Client::new()
            });
        Self {
            client,
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Posts a prompt to a session. `Ok(false)` means the server answered with a
    /// non-success status.
    pub async fn send_prompt_async(
        &self,
        address: &str,
        session_id: &str,
        prompt: &str,
        agent: Option<&str>,
    ) -> ProviderResult<bool> {
        let message = PromptMessage::text(prompt, agent);
        let response = self
            .client
            .post(format!("http://{address}/session/{session_id}/prompt_async"))
            .header(CONTENT_TYPE, "application/json")
            .json(&message)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|error| {
                ProviderError::Transport(format!(
                    "prompt request to {address} failed: {error}"
                ))
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(address, session_id, %status, "prompt accepted");
            return Ok(true);
        }

        let body = sanitize_error_body(response.text().await.unwrap_or_default().as_str());
        tracing::warn!(address, session_id, %status, body, "prompt rejected");
        Ok(false)
    }

    pub async fn get_server_path(&self, address: &str) -> ProviderResult<RootPath> {
        self.get_json(address, "/path", self.request_timeout).await
    }

    /// Like [`Self::get_server_path`] with a caller-chosen timeout, used by
    /// discovery probes.
    pub async fn probe_server_path(
        &self,
        address: &str,
        timeout: Duration,
    ) -> ProviderResult<RootPath> {
        self.get_json(address, "/path", timeout).await
    }

    pub async fn get_sessions(&self, address: &str) -> ProviderResult<Vec<SessionDescriptor>> {
        self.get_json(address, "/session", self.request_timeout).await
    }

    pub async fn select_session(&self, address: &str, session_id: &str) -> ProviderResult<()> {
        let response = self
            .client
            .post(format!("http://{address}/tui/select-session"))
            .json(&SelectSessionRequest { session_id })
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|error| {
                ProviderError::Transport(format!(
                    "select-session request to {address} failed: {error}"
                ))
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = sanitize_error_body(response.text().await.unwrap_or_default().as_str());
            Err(ProviderError::Protocol(format!(
                "select-session on {address} failed with status {status}: {body}"
            )))
        }
    }

    /// Event feed for `GET /event`. The request is only sent on the first
    /// [`EventFeed::next_event`] call.
    pub fn subscribe_events(&self, address: &str) -> EventFeed {
        EventFeed {
            client: self.client.clone(),
            address: address.to_owned(),
            state: FeedState::Pending,
            line_buffer: Vec::new(),
            termination: None,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        address: &str,
        path: &str,
        timeout: Duration,
    ) -> ProviderResult<T> {
        let response = self
            .client
            .get(format!("http://{address}{path}"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|error| {
                ProviderError::Transport(format!("GET {path} on {address} failed: {error}"))
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = sanitize_error_body(response.text().await.unwrap_or_default().as_str());
            return Err(ProviderError::Protocol(format!(
                "GET {path} on {address} failed with status {status}: {body}"
            )));
        }

        let body = response.text().await.map_err(|error| {
            ProviderError::Transport(format!(
                "GET {path} on {address} body read failed: {error}"
            ))
        })?;
        serde_json::from_str(&body).map_err(|error| {
            ProviderError::Protocol(format!(
                "GET {path} on {address} returned an unsupported shape: {error}; body: {}",
                sanitize_error_body(&body)
            ))
        })
    }
}

enum FeedState {
    Pending,
    Streaming(BoxStream<'static, reqwest::Result<Vec<u8>>>),
    Terminated,
}

/// Why an [`EventFeed`] stopped yielding events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedTermination {
    Ended,
    Rejected(String),
    Disconnected(String),
}

/// Lazy, single-use sequence of server events from one SSE connection.
///
/// Once `next_event` returns `None` the feed stays terminated; subscribe again
/// for a fresh connection.
pub struct EventFeed {
    client: reqwest::Client,
    address: String,
    state: FeedState,
    line_buffer: Vec<u8>,
    termination: Option<FeedTermination>,
}

impl EventFeed {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn termination(&self) -> Option<&FeedTermination> {
        self.termination.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, FeedState::Terminated)
    }

    /// Next decoded event, or `None` once the connection is gone.
    ///
    /// Cancel safe: dropping the future between reads loses no buffered lines.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        loop {
            if let Some(line) = self.take_line() {
                if let Some(event) = self.decode(&line) {
                    return Some(event);
                }
                continue;
            }

            match &mut self.state {
                FeedState::Pending => self.open().await,
                FeedState::Streaming(stream) => match stream.next().await {
                    Some(Ok(chunk)) => self.line_buffer.extend_from_slice(&chunk),
                    Some(Err(error)) => {
                        self.terminate(FeedTermination::Disconnected(error.to_string()));
                    }
                    None => self.terminate(FeedTermination::Ended),
                },
                FeedState::Terminated => return self.flush_trailing_line(),
            }
        }
    }

    async fn open(&mut self) {
        let response = self
            .client
            .get(format!("http://{}/event", self.address))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(address = %self.address, "opencode event stream opened");
                let stream = response
                    .bytes_stream()
                    .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                    .boxed();
                self.state = FeedState::Streaming(stream);
            }
            Ok(response) => {
                let status = response.status();
                self.terminate(FeedTermination::Rejected(format!("status {status}")));
            }
            Err(error) => self.terminate(FeedTermination::Disconnected(error.to_string())),
        }
    }

    fn terminate(&mut self, reason: FeedTermination) {
        tracing::debug!(address = %self.address, reason = ?reason, "opencode event stream terminated");
        self.state = FeedState::Terminated;
        self.termination = Some(reason);
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let newline_index = self.line_buffer.iter().position(|byte| *byte == b'\n')?;
        let mut line = self.line_buffer.drain(..=newline_index).collect::<Vec<_>>();
        line.pop();
        if matches!(line.last(), Some(b'\r')) {
            line.pop();
        }
        Some(line)
    }

    fn flush_trailing_line(&mut self) -> Option<ServerEvent> {
        if self.line_buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.line_buffer);
        self.decode(&line)
    }

    fn decode(&self, line: &[u8]) -> Option<ServerEvent> {
        tracing::trace!(address = %self.address, line = %String::from_utf8_lossy(line), "opencode event line");
        match parse_event_line(line) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(
                    address = %self.address,
                    error = %error,
                    line = %sanitize_error_body(&String::from_utf8_lossy(line)),
                    "skipping malformed opencode event"
                );
                None
            }
        }
    }
}
