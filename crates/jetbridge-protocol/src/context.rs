use serde::{Deserialize, Serialize};

/// Editor context captured at the moment an action is invoked.
///
/// The host captures this before showing any dialog so the caret and selection
/// cannot drift while the user types. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub project_path: Option<String>,
    pub file_path: Option<String>,
    pub has_selection: bool,
    pub line_start: u32,
    pub column_start: u32,
    pub line_end: u32,
    pub column_end: u32,
    pub selection_desc: String,
}

impl ContextSnapshot {
    /// Snapshot of a caret with no selection.
    pub fn caret(
        project_path: Option<String>,
        file_path: Option<String>,
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            project_path,
            file_path,
            has_selection: false,
            line_start: line,
            column_start: column,
            line_end: line,
            column_end: column,
            selection_desc: format!("L{line}"),
        }
    }

    pub fn selection(
        project_path: Option<String>,
        file_path: Option<String>,
        (line_start, column_start): (u32, u32),
        (line_end, column_end): (u32, u32),
    ) -> Self {
        Self {
            project_path,
            file_path,
            has_selection: true,
            line_start,
            column_start,
            line_end,
            column_end,
            selection_desc: format!("L{line_start}:C{column_start}-L{line_end}:C{column_end}"),
        }
    }

    /// Snapshot with neither a file nor a caret, e.g. a prompt issued from a tool window.
    pub fn empty(project_path: Option<String>) -> Self {
        Self {
            project_path,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ContextSnapshot;

    #[test]
    fn caret_snapshot_describes_line_only() {
        let snapshot = ContextSnapshot::caret(None, Some("/ws/a.rs".to_owned()), 12, 4);
        assert!(!snapshot.has_selection);
        assert_eq!(snapshot.selection_desc, "L12");
    }

    #[test]
    fn selection_snapshot_describes_full_range() {
        let snapshot =
            ContextSnapshot::selection(None, Some("/ws/a.rs".to_owned()), (1, 2), (3, 4));
        assert!(snapshot.has_selection);
        assert_eq!(snapshot.selection_desc, "L1:C2-L3:C4");
    }
}
