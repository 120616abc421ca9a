//! Shared contract between the editor layer and assistant providers.

pub mod command;
pub mod context;
pub mod error;
pub mod event;
pub mod provider;
pub mod settings;

pub use command::{CommandRunner, ProcessCommandRunner, DEFAULT_COMMAND_TIMEOUT};
pub use context::ContextSnapshot;
pub use error::{sanitize_error_body, ProviderError, ProviderResult};
pub use event::ProviderEvent;
pub use provider::{Provider, ProviderKind};
pub use settings::{MemorySettingsStore, SavedConnection, SettingsStore};
