//! Command-line front end for the generation client.
//!
//! Submits one story request (or attaches to an existing task), prints
//! progress as the task advances and the final result as JSON. Ctrl-C
//! cancels the attempt.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tale_client::config::{default_settings_path, load_config};
use tale_client::{
    GenerationRequest, NoAuth, Phase, StaticToken, TaskClient, TokenProvider, UserId, Voice,
};

#[derive(Parser)]
#[command(name = "tale-client", version, about = "Generate story videos from the command line")]
struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a story and follow it to completion
    Generate {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        topic: String,
        #[arg(long, default_value = "female")]
        voice: Voice,
        #[arg(long, default_value = tale_client::tasks::DEFAULT_LANGUAGE)]
        language: String,
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Follow a task that was already submitted
    Follow {
        /// Task ID returned by an earlier submission
        task_id: String,
    },
    /// Print the effective configuration
    Config,
}

fn parse_user_id(raw: String) -> UserId {
    match raw.parse::<i64>() {
        Ok(n) => UserId::Number(n),
        Err(_) => UserId::Text(raw),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings_path = cli.settings.or_else(default_settings_path);
    let mut config = match &settings_path {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => Default::default(),
    };
    config.apply_env().context("applying environment overrides")?;
    info!(base_url = %config.base_url, "loaded settings");

    match cli.command {
        Command::Config => {
            let mut shown = config.clone();
            if shown.api_token.is_some() {
                shown.api_token = Some("***".to_string());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
            Ok(())
        }
        Command::Generate {
            subject,
            topic,
            voice,
            language,
            user_id,
        } => {
            let client = build_client(config)?;
            let request = GenerationRequest {
                subject,
                topic,
                voice,
                language,
                user_id: user_id.map(parse_user_id),
            };
            let mut rx = client.subscribe();
            let submitted = client.submit(request).await;
            if let Some(task_id) = &submitted.task_id {
                eprintln!("task {task_id} submitted");
            }
            watch(&client, &mut rx).await
        }
        Command::Follow { task_id } => {
            let client = build_client(config)?;
            let mut rx = client.subscribe();
            let followed = client.follow(task_id).await;
            if let Some(task_id) = &followed.task_id {
                eprintln!("following task {task_id}");
            }
            watch(&client, &mut rx).await
        }
    }
}

fn build_client(config: tale_client::ClientConfig) -> Result<TaskClient> {
    let auth: Arc<dyn TokenProvider> = match config.api_token.clone() {
        Some(token) => Arc::new(StaticToken(token)),
        None => Arc::new(NoAuth),
    };
    TaskClient::from_config(config, auth).context("invalid configuration")
}

/// Print progress until the attempt settles, then the result or the error.
async fn watch(
    client: &TaskClient,
    rx: &mut tokio::sync::watch::Receiver<tale_client::ClientSession>,
) -> Result<()> {
    let mut last_line = String::new();
    loop {
        let session = rx.borrow_and_update().clone();
        let line = format!("[{:>5.1}%] {}", session.progress, session.status_message);
        if line != last_line && session.phase == Phase::Polling {
            eprintln!("{line}");
            last_line = line;
        }
        if session.phase.is_terminal() {
            break;
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if let Some(remote) = client.cancel() {
                    // The process exits once the loop ends.
                    if tokio::time::timeout(Duration::from_secs(5), remote).await.is_err() {
                        warn!("backend did not confirm the cancellation");
                    }
                }
            }
        }
    }

    let session = client.session();
    match session.phase {
        Phase::Succeeded => {
            if let Some(result) = &session.result {
                if let Some(reason) = &result.unavailable {
                    eprintln!("task finished, but its result is unavailable: {reason}");
                }
                println!("{}", serde_json::to_string_pretty(result)?);
            }
            Ok(())
        }
        _ => {
            let error = session.error.as_deref().unwrap_or("generation did not finish");
            eprintln!("error: {error}");
            std::process::exit(1);
        }
    }
}
