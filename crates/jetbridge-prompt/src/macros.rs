use std::sync::OnceLock;

use jetbridge_protocol::ContextSnapshot;
use regex::Regex;

/// Literal macros, longest first so `@these` wins over `@this`.
pub const LITERAL_MACROS: &[&str] = &[
    "@buffer", "@these", "@build", "@file", "@this", "@plan", "@dir",
];

const AGENT_MACRO_PATTERN: &str = r"@a:\w+";

pub(crate) fn agent_macro_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(AGENT_MACRO_PATTERN).expect("agent macro pattern is valid"))
}

/// Resolves `@this`, `@these` and `@file` against the snapshot.
///
/// Matching is case-sensitive and substring based. Text inserted for one macro
/// is never rescanned for another. Reserved macros and `@a:<agent>` selectors
/// are left in place for [`strip`].
pub fn expand(template: &str, root_path: &str, snapshot: &ContextSnapshot) -> String {
    let Some(file_path) = snapshot.file_path.as_deref() else {
        return template.to_owned();
    };
    if !["@this", "@these", "@file"]
        .iter()
        .any(|token| template.contains(token))
    {
        return template.to_owned();
    }

    let relative = relative_path(file_path, root_path);
    let mut result = String::with_capacity(template.len() + relative.len());
    let mut rest = template;
    while let Some(at) = rest.find('@') {
        result.push_str(&rest[..at]);
        rest = &rest[at..];
        match literal_macro_at(rest) {
            Some(token @ ("@these" | "@this")) => {
                result.push('@');
                result.push_str(&relative);
                result.push(' ');
                result.push_str(&snapshot.selection_desc);
                rest = &rest[token.len()..];
            }
            Some(token @ "@file") => {
                result.push('@');
                result.push_str(&relative);
                rest = &rest[token.len()..];
            }
            _ => {
                result.push('@');
                rest = &rest[1..];
            }
        }
    }
    result.push_str(rest);
    result
}

/// Removes every recognized macro token and trims the result.
///
/// Repeats until nothing changes, so `strip(strip(s)) == strip(s)`. Unrelated
/// `@` mentions such as `@README.md` are kept.
pub fn strip(text: &str) -> String {
    remove_macros(text).trim().to_owned()
}

/// Expands context macros and drops every other recognized token.
///
/// Equivalent to `strip(expand(..))` except that paths inserted by the
/// expansion are never stripped, so a file called `file.kt` stays `@file.kt`.
/// The text around insertions is stripped until nothing changes.
pub fn render(template: &str, root_path: &str, snapshot: &ContextSnapshot) -> String {
    let relative = snapshot
        .file_path
        .as_deref()
        .map(|file_path| relative_path(file_path, root_path));

    let mut result = String::with_capacity(template.len());
    let mut pending = String::new();
    let mut rest = template;
    while let Some(at) = rest.find('@') {
        pending.push_str(&rest[..at]);
        rest = &rest[at..];

        let insertion = match (literal_macro_at(rest), relative.as_deref()) {
            (Some(token @ ("@these" | "@this")), Some(relative)) => {
                Some((token, format!("@{relative} {}", snapshot.selection_desc)))
            }
            (Some(token @ "@file"), Some(relative)) => Some((token, format!("@{relative}"))),
            _ => None,
        };
        match insertion {
            Some((token, inserted)) => {
                result.push_str(&remove_macros(&pending));
                pending.clear();
                result.push_str(&inserted);
                rest = &rest[token.len()..];
            }
            None => {
                pending.push('@');
                rest = &rest[1..];
            }
        }
    }
    pending.push_str(rest);
    result.push_str(&remove_macros(&pending));
    result.trim().to_owned()
}

fn remove_macros(text: &str) -> String {
    let mut current = text.to_owned();
    loop {
        let mut next = current.clone();
        for token in LITERAL_MACROS {
            if next.contains(token) {
                next = next.replace(token, "");
            }
        }
        let next = agent_macro_regex().replace_all(&next, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Path of `file_path` relative to `root_path`, or `file_path` unchanged when it
/// lies outside the root.
pub fn relative_path(file_path: &str, root_path: &str) -> String {
    if root_path.is_empty() {
        return file_path.to_owned();
    }
    match file_path.strip_prefix(root_path) {
        Some(relative) => {
            let relative = relative.strip_prefix('/').unwrap_or(relative);
            relative.strip_prefix('\\').unwrap_or(relative).to_owned()
        }
        None => file_path.to_owned(),
    }
}

fn literal_macro_at(text: &str) -> Option<&'static str> {
    LITERAL_MACROS
        .iter()
        .copied()
        .find(|token| text.starts_with(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "/Users/laptop/Code/test/testproject";

    fn caret_at(file: &str, line: u32) -> ContextSnapshot {
        ContextSnapshot::caret(Some(ROOT.to_owned()), Some(file.to_owned()), line, 1)
    }

    #[test]
    fn expand_this_without_selection_uses_line_only() {
        let snapshot = caret_at("/Users/laptop/Code/test/testproject/README.md", 7);
        assert_eq!(expand("@this hi", ROOT, &snapshot), "@README.md L7 hi");
    }

    #[test]
    fn expand_this_with_selection_uses_full_range() {
        let snapshot = ContextSnapshot::selection(
            None,
            Some("/root/project/sub/file.kt".to_owned()),
            (1, 2),
            (3, 4),
        );
        assert_eq!(
            expand("explain @this", "/root/project", &snapshot),
            "explain @sub/file.kt L1:C2-L3:C4"
        );
    }

    #[test]
    fn expand_these_is_not_split_by_this() {
        let snapshot = caret_at("/Users/laptop/Code/test/testproject/src/a.rs", 3);
        assert_eq!(
            expand("fix @these", ROOT, &snapshot),
            "fix @src/a.rs L3"
        );
    }

    #[test]
    fn expand_file_has_no_range() {
        let snapshot = caret_at("/Users/laptop/Code/test/testproject/src/a.rs", 3);
        assert_eq!(expand("read @file", ROOT, &snapshot), "read @src/a.rs");
    }

    #[test]
    fn expand_is_substring_based() {
        let snapshot = caret_at("/Users/laptop/Code/test/testproject/a.rs", 1);
        assert_eq!(expand("x@filey", ROOT, &snapshot), "x@a.rsy");
    }

    #[test]
    fn expand_does_not_rescan_inserted_paths() {
        let snapshot = caret_at("/Users/laptop/Code/test/testproject/file.kt", 2);
        assert_eq!(expand("@this", ROOT, &snapshot), "@file.kt L2");
    }

    #[test]
    fn expand_without_file_leaves_template_untouched() {
        let snapshot = ContextSnapshot::empty(None);
        assert_eq!(expand("@this @file", ROOT, &snapshot), "@this @file");
    }

    #[test]
    fn expand_keeps_agent_selector_and_reserved_macros() {
        let snapshot = caret_at("/Users/laptop/Code/test/testproject/a.rs", 1);
        assert_eq!(
            expand("@a:review @plan @this", ROOT, &snapshot),
            "@a:review @plan @a.rs L1"
        );
    }

    #[test]
    fn strip_removes_literal_and_agent_macros() {
        assert_eq!(strip("  @a:refactor please @build fix @dir "), "please  fix");
    }

    #[test]
    fn strip_keeps_unrecognized_at_mentions() {
        assert_eq!(strip("@README.md"), "@README.md");
        assert_eq!(strip("ping @alice about @a:"), "ping @alice about @a:");
    }

    #[test]
    fn strip_is_idempotent_even_when_removal_forms_new_tokens() {
        for input in ["@@buildbuild x", "@bu@planild", " @a:x@a:y  ", "plain text"] {
            let once = strip(input);
            assert_eq!(strip(&once), once, "input: {input:?}");
        }
        assert_eq!(strip("@@buildbuild x"), "x");
    }

    #[test]
    fn render_expands_and_strips_in_one_pass() {
        let snapshot = caret_at("/Users/laptop/Code/test/testproject/file.kt", 9);
        assert_eq!(
            render("@a:review @build check @this and @file", ROOT, &snapshot),
            "check @file.kt L9 and @file.kt"
        );
    }

    #[test]
    fn render_removes_tokens_formed_by_earlier_removals() {
        let snapshot = caret_at("/Users/laptop/Code/test/testproject/file.kt", 4);
        assert_eq!(render("@@buildbuild x", ROOT, &snapshot), "x");
        assert_eq!(render("@bu@planild @this", ROOT, &snapshot), "@file.kt L4");
        assert_eq!(
            render("@@buildbuild x", ROOT, &snapshot),
            strip(&expand("@@buildbuild x", ROOT, &snapshot))
        );
        assert_eq!(render("@th@fileis", ROOT, &ContextSnapshot::empty(None)), "");
    }

    #[test]
    fn render_drops_context_macros_without_a_file() {
        let snapshot = ContextSnapshot::empty(None);
        assert_eq!(render("@this why?", ROOT, &snapshot), "why?");
    }

    #[test]
    fn relative_path_strips_root_and_separator() {
        assert_eq!(
            relative_path("/root/project/sub/file.kt", "/root/project"),
            "sub/file.kt"
        );
        assert_eq!(
            relative_path("C:\\ws\\proj\\a.kt", "C:\\ws\\proj"),
            "a.kt"
        );
    }

    #[test]
    fn relative_path_outside_root_is_unchanged() {
        assert_eq!(
            relative_path("/elsewhere/file.kt", "/root/project"),
            "/elsewhere/file.kt"
        );
        assert_eq!(relative_path("/ws/a.kt", ""), "/ws/a.kt");
    }
}
