use serde::{Deserialize, Serialize};

/// Notification published by a provider for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEvent {
    Status(String),
    Message(String),
    Error { message: String, indefinite: bool },
}

impl ProviderEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status(message.into())
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            indefinite: false,
        }
    }

    /// An error that should stay visible until the user dismisses it.
    pub fn indefinite_error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            indefinite: true,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Status(message) | Self::Message(message) => message,
            Self::Error { message, .. } => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
