use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider configuration error: {0}")]
    Configuration(String),
    #[error("provider dependency unavailable: {0}")]
    DependencyUnavailable(String),
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider protocol error: {0}")]
    Protocol(String),
    #[error("no connection available: {0}")]
    NoConnection(String),
    #[error("unknown provider key: {0}")]
    UnknownProviderKey(String),
    #[error("provider internal error: {0}")]
    Internal(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Collapses a response body into a single short line for error messages.
pub fn sanitize_error_body(body: &str) -> String {
    let mut sanitized = body
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect::<String>();
    sanitized = sanitized.split_whitespace().collect::<Vec<_>>().join(" ");
    const MAX_LEN: usize = 240;
    if sanitized.chars().count() > MAX_LEN {
        let truncated = sanitized.chars().take(MAX_LEN).collect::<String>();
        format!("{truncated}...")
    } else {
        sanitized
    }
}
