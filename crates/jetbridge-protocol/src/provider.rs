use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ContextSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    OpenCode,
    Tmux,
}

impl ProviderKind {
    pub const fn as_key(self) -> &'static str {
        match self {
            Self::OpenCode => "provider.opencode",
            Self::Tmux => "provider.tmux",
        }
    }

    pub fn from_key(provider_key: &str) -> Option<Self> {
        match provider_key {
            "provider.opencode" => Some(Self::OpenCode),
            "provider.tmux" => Some(Self::Tmux),
            _ => None,
        }
    }
}

/// Capability the editor layer drives: restore a connection and send prompts.
///
/// Neither `reconnect` nor `prompt` reports failure to the caller. Problems are
/// published as `ProviderEvent::Error` on the provider's event bus so that UI
/// actions can fire and forget.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Human-readable name used in action titles and notifications.
    fn display_name(&self) -> &str;

    /// Short description of the current binding, such as a session title.
    async fn connection_desc(&self) -> String;

    async fn is_connected(&self) -> bool;

    /// Silently restore the previous connection if one can still be resolved.
    async fn reconnect(&self, project_path: Option<&str>);

    /// Expand, route and dispatch a raw prompt captured by the UI.
    async fn prompt(&self, raw_prompt: &str, snapshot: &ContextSnapshot);

    fn provider_key(&self) -> &'static str {
        self.kind().as_key()
    }
}

#[cfg(test)]
mod tests {
    use super::ProviderKind;

    #[test]
    fn provider_keys_roundtrip() {
        for kind in [ProviderKind::OpenCode, ProviderKind::Tmux] {
            assert_eq!(ProviderKind::from_key(kind.as_key()), Some(kind));
        }
    }

    #[test]
    fn provider_key_lookup_rejects_bare_names() {
        assert_eq!(ProviderKind::from_key("opencode"), None);
    }
}
