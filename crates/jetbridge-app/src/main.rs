use anyhow::{anyhow, Context, Result};
use backend_opencode::find_session;
use clap::Parser;
use jetbridge_app::cli::{snapshot_from_args, Cli, Command};
use jetbridge_app::{
    build_opencode_provider, build_provider_for_key, event_bus, resolve_provider_name,
    supported_provider_keys,
};
use jetbridge_protocol::{Provider, ProviderEvent, SettingsStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = jetbridge_config::load_from_env()?;
    init_file_logging(&config.log_path())?;

    let bus = event_bus(&config);
    let mut events = bus.subscribe();
    let settings: Arc<dyn SettingsStore> = Arc::new(config.settings_store());
    let provider_key = resolve_provider_name(cli.provider.as_deref(), &config.provider);

    let watch = match cli.command {
        Command::Providers => {
            for key in supported_provider_keys() {
                let marker = if *key == provider_key { "*" } else { " " };
                println!("{marker} {key}");
            }
            None
        }
        Command::Servers => {
            let opencode = build_opencode_provider(&config, bus.clone(), settings);
            for server in opencode.available_servers().await {
                println!("{}\t{}", server.address, server.root_path.directory);
            }
            None
        }
        Command::Sessions { address } => {
            let opencode = build_opencode_provider(&config, bus.clone(), settings);
            for session in opencode.sessions(&address).await? {
                println!(
                    "{}\t{}\t{}",
                    session.id, session.time.updated, session.title
                );
            }
            None
        }
        Command::Connect {
            address,
            session_id,
            watch,
        } => {
            let opencode = build_opencode_provider(&config, bus.clone(), settings);
            let server = opencode.probe_server(&address).await?;
            let sessions = opencode.sessions(&address).await?;
            let session = find_session(&sessions, &session_id)
                .cloned()
                .ok_or_else(|| anyhow!("session {session_id} not found on {address}"))?;
            opencode.connect(server, session).await;
            let errors = report_events(&mut events, watch.map(Duration::from_secs)).await;
            opencode.disconnect().await;
            return finish(errors);
        }
        Command::Reconnect { project } => {
            let provider = build_provider_for_key(&provider_key, &config, bus.clone(), settings)?;
            let project = project.or_else(current_dir);
            provider.reconnect(project.as_deref()).await;
            println!("{}", provider.connection_desc().await);
            None
        }
        Command::Prompt {
            text,
            file,
            line,
            selection,
            project,
            watch,
        } => {
            let provider = build_provider_for_key(&provider_key, &config, bus.clone(), settings)?;
            let snapshot = snapshot_from_args(
                project.or_else(current_dir),
                file,
                line,
                selection.as_deref(),
            )
            .map_err(|message| anyhow!(message))?;
            provider.prompt(&text, &snapshot).await;
            watch.map(Duration::from_secs)
        }
    };

    let errors = report_events(&mut events, watch).await;
    finish(errors)
}

fn finish(errors: usize) -> Result<()> {
    if errors > 0 {
        return Err(anyhow!("provider reported {errors} error(s)"));
    }
    Ok(())
}

fn current_dir() -> Option<String> {
    std::env::current_dir()
        .ok()
        .map(|path| path.to_string_lossy().to_string())
}

/// Prints provider events to stderr and returns how many were errors.
async fn report_events(
    events: &mut broadcast::Receiver<ProviderEvent>,
    watch: Option<Duration>,
) -> usize {
    let mut errors = 0;
    if let Some(watch) = watch {
        let deadline = tokio::time::Instant::now() + watch;
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(event)) => errors += print_event(&event),
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "provider event printer lagged");
                }
                Ok(Err(RecvError::Closed)) | Err(_) => break,
            }
        }
    }
    loop {
        match events.try_recv() {
            Ok(event) => errors += print_event(&event),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "provider event printer lagged");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    errors
}

fn print_event(event: &ProviderEvent) -> usize {
    match event {
        ProviderEvent::Status(message) => eprintln!("jetbridge: {message}"),
        ProviderEvent::Message(message) => eprintln!("jetbridge: {message}"),
        ProviderEvent::Error { message, .. } => {
            eprintln!("jetbridge error: {message}");
            return 1;
        }
    }
    0
}

fn init_file_logging(log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create jetbridge log directory '{}'",
                    parent.display()
                )
            })?;
        }
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open jetbridge log file '{}'", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .init();

    Ok(())
}
