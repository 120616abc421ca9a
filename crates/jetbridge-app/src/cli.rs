//! Command-line schema for the `jetbridge` binary.

use clap::{Parser, Subcommand};
use jetbridge_protocol::ContextSnapshot;

#[derive(Parser, Debug)]
#[command(name = "jetbridge")]
#[command(about = "Send editor prompts to a locally running coding assistant")]
#[command(version)]
pub struct Cli {
    /// Provider key overriding the configured one (e.g. provider.tmux)
    #[arg(long, global = true)]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List reachable opencode servers
    Servers,
    /// List the sessions of one opencode server
    Sessions {
        /// Server address as host:port
        address: String,
    },
    /// Bind to a specific opencode server and session
    Connect {
        address: String,
        session_id: String,
        /// Keep printing provider events for this many seconds
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Restore the previous connection, or pick the server nearest to a path
    Reconnect {
        #[arg(long)]
        project: Option<String>,
    },
    /// Expand macros in TEXT and send it to the provider
    Prompt {
        text: String,
        /// File the prompt refers to; enables @this, @these and @file
        #[arg(long)]
        file: Option<String>,
        /// 1-based caret line
        #[arg(long)]
        line: Option<u32>,
        /// Selection as L<line>:C<col>-L<line>:C<col>
        #[arg(long, conflicts_with = "line")]
        selection: Option<String>,
        /// Project root, defaults to the current directory
        #[arg(long)]
        project: Option<String>,
        /// Keep printing provider events for this many seconds
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// List the supported provider keys
    Providers,
}

type Position = (u32, u32);

/// Parses `L1:C2-L3:C4` into start and end positions.
pub fn parse_selection(raw: &str) -> Result<(Position, Position), String> {
    let invalid = || format!("invalid selection '{raw}', expected L<line>:C<col>-L<line>:C<col>");
    let (start, end) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let start = parse_position(start).ok_or_else(invalid)?;
    let end = parse_position(end).ok_or_else(invalid)?;
    if end < start {
        return Err(format!("selection '{raw}' ends before it starts"));
    }
    Ok((start, end))
}

fn parse_position(raw: &str) -> Option<Position> {
    let (line, column) = raw.trim().split_once(':')?;
    let line = line.strip_prefix('L')?.parse::<u32>().ok()?;
    let column = column.strip_prefix('C')?.parse::<u32>().ok()?;
    (line > 0 && column > 0).then_some((line, column))
}

/// The editor context described by prompt flags.
pub fn snapshot_from_args(
    project: Option<String>,
    file: Option<String>,
    line: Option<u32>,
    selection: Option<&str>,
) -> Result<ContextSnapshot, String> {
    match (file, selection) {
        (Some(file), Some(selection)) => {
            let (start, end) = parse_selection(selection)?;
            Ok(ContextSnapshot::selection(project, Some(file), start, end))
        }
        (None, Some(_)) => Err("--selection requires --file".to_owned()),
        (Some(file), None) => Ok(ContextSnapshot::caret(
            project,
            Some(file),
            line.unwrap_or(1),
            1,
        )),
        (None, None) => Ok(ContextSnapshot::empty(project)),
    }
}
