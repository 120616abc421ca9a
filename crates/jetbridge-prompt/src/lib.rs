//! Prompt macro expansion and agent routing.
//!
//! Macros are `@`-prefixed tokens the user types into a prompt (`@this`,
//! `@file`, `@a:review`, ...). They are resolved against a [`ContextSnapshot`]
//! before the prompt leaves the editor.
//!
//! [`ContextSnapshot`]: jetbridge_protocol::ContextSnapshot

pub mod agent;
pub mod macros;

pub use agent::{extract_agent, DEFAULT_AGENT};
pub use macros::{expand, relative_path, render, strip, LITERAL_MACROS};
