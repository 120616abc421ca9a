use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Runs external utilities (`pgrep`, `lsof`, `tmux`) on behalf of a provider.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<Output>;
}

/// Spawns real processes, killing any that outlive the timeout.
#[derive(Debug, Clone)]
pub struct ProcessCommandRunner {
    timeout: Duration,
}

impl Default for ProcessCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl ProcessCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<Output> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(output) => output,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("`{program}` did not finish within {:?}", self.timeout),
            )),
        }
    }
}
