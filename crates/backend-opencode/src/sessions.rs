use jetbridge_protocol::ProviderResult;

use crate::api::SessionDescriptor;
use crate::transport::OpenCodeClient;

/// Session lookups against one server at a time.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    client: OpenCodeClient,
}

impl SessionRegistry {
    pub fn new(client: OpenCodeClient) -> Self {
        Self { client }
    }

    /// All sessions the server knows about, unfiltered.
    pub async fn list_sessions(&self, address: &str) -> ProviderResult<Vec<SessionDescriptor>> {
        self.client.get_sessions(address).await
    }

    /// Asks the server's TUI to focus a session. Failures are logged only.
    pub async fn select_session(&self, address: &str, session_id: &str) {
        if let Err(error) = self.client.select_session(address, session_id).await {
            tracing::debug!(address, session_id, error = %error, "select-session ignored");
        }
    }
}

/// The session with the latest `time.updated`; the first one wins ties.
pub fn most_recent_session(sessions: &[SessionDescriptor]) -> Option<&SessionDescriptor> {
    sessions.iter().fold(None, |best, session| match best {
        Some(current) if current.time.updated >= session.time.updated => Some(current),
        _ => Some(session),
    })
}

pub fn find_session<'a>(
    sessions: &'a [SessionDescriptor],
    session_id: &str,
) -> Option<&'a SessionDescriptor> {
    sessions.iter().find(|session| session.id == session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SessionTime;

    fn session(id: &str, updated: u64) -> SessionDescriptor {
        SessionDescriptor {
            id: id.to_owned(),
            title: format!("title {id}"),
            directory: "/ws/p1".to_owned(),
            time: SessionTime {
                created: 1,
                updated,
            },
        }
    }

    #[test]
    fn most_recent_session_picks_max_updated() {
        let sessions = vec![session("a", 10), session("b", 30), session("c", 20)];
        assert_eq!(most_recent_session(&sessions).map(|s| s.id.as_str()), Some("b"));
    }

    #[test]
    fn most_recent_session_keeps_first_on_tie() {
        let sessions = vec![session("a", 5), session("b", 5)];
        assert_eq!(most_recent_session(&sessions).map(|s| s.id.as_str()), Some("a"));
        assert!(most_recent_session(&[]).is_none());
    }

    #[test]
    fn find_session_matches_by_id() {
        let sessions = vec![session("a", 1), session("b", 2)];
        assert_eq!(find_session(&sessions, "b").map(|s| s.time.updated), Some(2));
        assert!(find_session(&sessions, "z").is_none());
    }
}
