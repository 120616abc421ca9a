use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::future::join_all;
use jetbridge_protocol::CommandRunner;
use regex::Regex;

use crate::api::ServerDescriptor;
use crate::transport::OpenCodeClient;

pub const DEFAULT_PROCESS_PATTERN: &str = "opencode.*--port";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const PGREP_BINARY: &str = "pgrep";
const LSOF_BINARY: &str = "lsof";
const LOOPBACK_HOST: &str = "127.0.0.1";

fn lsof_address_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"TCP (\*|\d+\.\d+\.\d+\.\d+):(\d+)").expect("lsof address pattern is valid")
    })
}

/// Finds running opencode servers by scanning processes and probing their
/// listening sockets.
#[derive(Clone)]
pub struct ServerDiscovery {
    runner: Arc<dyn CommandRunner>,
    client: OpenCodeClient,
    process_pattern: String,
    probe_timeout: Duration,
}

impl ServerDiscovery {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        client: OpenCodeClient,
        process_pattern: impl Into<String>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            client,
            process_pattern: process_pattern.into(),
            probe_timeout,
        }
    }

    /// Every reachable server. Never fails; missing tools and dead probes only
    /// shrink the result.
    pub async fn discover_servers(&self) -> Vec<ServerDescriptor> {
        let pids = self.find_pids().await;
        if pids.is_empty() {
            tracing::debug!(pattern = %self.process_pattern, "no opencode processes found");
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut addresses = Vec::new();
        for pid in pids {
            for address in self.listening_addresses(pid).await {
                if seen.insert(address.clone()) {
                    addresses.push(address);
                }
            }
        }

        let probes = addresses.iter().map(|address| self.probe_server(address));
        let servers = join_all(probes)
            .await
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        tracing::debug!(count = servers.len(), "opencode discovery finished");
        servers
    }

    /// Resolves one address with `GET /path`, or `None` when nothing answers.
    pub async fn probe_server(&self, address: &str) -> Option<ServerDescriptor> {
        match self
            .client
            .probe_server_path(address, self.probe_timeout)
            .await
        {
            Ok(root_path) => Some(ServerDescriptor {
                address: address.to_owned(),
                root_path,
            }),
            Err(error) => {
                tracing::debug!(address, error = %error, "opencode probe failed");
                None
            }
        }
    }

    async fn find_pids(&self) -> Vec<u32> {
        let args = vec!["-f".to_owned(), self.process_pattern.clone()];
        match self.runner.run(PGREP_BINARY, &args).await {
            Ok(output) if output.status.success() => {
                parse_pgrep_output(&String::from_utf8_lossy(&output.stdout))
            }
            // pgrep exits 1 when nothing matched
            Ok(_) => Vec::new(),
            Err(error) => {
                tracing::warn!(error = %error, "unable to run pgrep");
                Vec::new()
            }
        }
    }

    async fn listening_addresses(&self, pid: u32) -> Vec<String> {
        let pid_arg = pid.to_string();
        let args = [
            "-w",
            "-iTCP",
            "-sTCP:LISTEN",
            "-P",
            "-n",
            "-a",
            "-p",
            pid_arg.as_str(),
        ]
        .iter()
        .map(|arg| (*arg).to_owned())
        .collect::<Vec<_>>();

        match self.runner.run(LSOF_BINARY, &args).await {
            Ok(output) if output.status.success() => {
                parse_lsof_addresses(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                tracing::debug!(pid, status = %output.status, "lsof reported no listeners");
                Vec::new()
            }
            Err(error) => {
                tracing::warn!(pid, error = %error, "unable to run lsof");
                Vec::new()
            }
        }
    }
}

pub fn parse_pgrep_output(stdout: &str) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

/// Listening `host:port` pairs from `lsof -P -n` output. A wildcard bind is
/// reported as loopback.
pub fn parse_lsof_addresses(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.contains("TCP"))
        .filter_map(|line| {
            let captures = lsof_address_regex().captures(line)?;
            let host = match &captures[1] {
                "*" => LOOPBACK_HOST,
                host => host,
            };
            Some(format!("{host}:{}", &captures[2]))
        })
        .collect()
}
