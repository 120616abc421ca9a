use crate::macros::agent_macro_regex;

pub const DEFAULT_AGENT: &str = "plan";
const BUILD_AGENT: &str = "build";

/// Picks the agent a prompt should be routed to.
///
/// An explicit `@a:<id>` selector wins, then the `@build` macro, then `default`.
pub fn extract_agent(text: &str, default: &str) -> String {
    if let Some(found) = agent_macro_regex().find(text) {
        return found.as_str()["@a:".len()..].to_owned();
    }
    if text.contains("@build") {
        return BUILD_AGENT.to_owned();
    }
    default.to_owned()
}
