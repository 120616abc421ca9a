use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filesystem roots reported by `GET /path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootPath {
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub worktree: String,
    pub directory: String,
}

/// One running opencode instance and the project root it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub address: String,
    pub root_path: RootPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionTime {
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub updated: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub directory: String,
    #[serde(default)]
    pub time: SessionTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPart {
    pub text: String,
    #[serde(rename = "type")]
    pub part_type: String,
}

/// Body of `POST /session/{id}/prompt_async`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub parts: Vec<PromptPart>,
    pub agent: Option<String>,
}

impl PromptMessage {
    pub fn text(prompt: &str, agent: Option<&str>) -> Self {
        Self {
            parts: vec![PromptPart {
                text: prompt.to_owned(),
                part_type: "text".to_owned(),
            }],
            agent: agent.map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SelectSessionRequest<'a> {
    #[serde(rename = "sessionID")]
    pub session_id: &'a str,
}

/// Typed view of an opencode bus event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    ServerConnected,
    InstanceDisposed,
    QuestionAsked,
    SessionIdle { session_id: Option<String> },
    Heartbeat,
    Other(String),
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    properties: Value,
}

const DATA_PREFIX: &str = "data:";

/// Decodes one SSE line.
///
/// Returns `Ok(None)` for lines that carry no event (blank lines, comments,
/// `event:`/`id:` fields) and `Err` for a `data:` line whose payload is not a
/// valid event envelope.
pub fn parse_event_line(line: &[u8]) -> Result<Option<ServerEvent>, serde_json::Error> {
    let Ok(line) = std::str::from_utf8(line) else {
        return Ok(None);
    };
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload).trim_end();
    if payload.is_empty() {
        return Ok(None);
    }

    let envelope: EventEnvelope = serde_json::from_str(payload)?;
    Ok(Some(match envelope.event_type.as_str() {
        "server.connected" => ServerEvent::ServerConnected,
        "server.instance.disposed" => ServerEvent::InstanceDisposed,
        "question.asked" => ServerEvent::QuestionAsked,
        "session.idle" => ServerEvent::SessionIdle {
            session_id: envelope
                .properties
                .get("sessionID")
                .and_then(Value::as_str)
                .map(str::to_owned),
        },
        "server.heartbeat" => ServerEvent::Heartbeat,
        _ => ServerEvent::Other(envelope.event_type),
    }))
}
