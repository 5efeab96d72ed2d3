//! Interactive CLI driving a [`restsync_mediator::Mediator`] against a
//! local database. Each invocation opens the database, performs one
//! operation, and exits; the persistent drain loop lives in the
//! `restsync-worker` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use restsync_config::MediatorConfig;
use restsync_mediator::{Mediator, MediatorOptions, SendInput, SendOptions};
use restsync_store::Method;
use restsync_util::{BodyInput, HeaderInput, Priority};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "restsync", version, about = "Offline-first HTTP request mediator")]
struct Cli {
    /// Path to a JSON5 configuration file. Falls back to built-in defaults
    /// if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured `db_path`.
    #[arg(long)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a request. Replays it from the queue later if it cannot be
    /// completed now.
    Send(SendArgs),
    /// List entries currently pending in the queue.
    List,
    /// Cancel a pending entry by id.
    Cancel { id: String },
    /// Force an immediate drain attempt.
    SyncNow,
}

#[derive(clap::Args, Debug)]
struct SendArgs {
    url: String,

    #[arg(long, value_enum, default_value_t = MethodArg::Get)]
    method: MethodArg,

    /// Repeatable `Name: Value` header.
    #[arg(long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// Request body, sent as plain text.
    #[arg(long)]
    body: Option<String>,

    #[arg(long, value_enum, default_value_t = PriorityArg::Normal)]
    priority: PriorityArg,

    /// Caller-supplied idempotency id; a UUID is generated if omitted.
    #[arg(long)]
    id: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodArg {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<MethodArg> for Method {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::Get => Method::Get,
            MethodArg::Post => Method::Post,
            MethodArg::Put => Method::Put,
            MethodArg::Patch => Method::Patch,
            MethodArg::Delete => Method::Delete,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PriorityArg {
    High,
    Normal,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::High => Priority::High,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::Low => Priority::Low,
        }
    }
}

fn parse_header(raw: &str) -> (String, String) {
    match raw.split_once(':') {
        Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
        None => (raw.trim().to_string(), String::new()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            MediatorConfig::from_json5(&text)?
        }
        None => MediatorConfig::default(),
    };
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    let mediator = Mediator::new(config, MediatorOptions::default()).await?;

    match cli.command {
        Command::Send(args) => {
            let headers = args.headers.iter().map(|raw| parse_header(raw)).collect();
            let body = match args.body {
                Some(text) => BodyInput::Text(text),
                None => BodyInput::Empty,
            };
            let input = SendInput {
                url: args.url,
                method: args.method.into(),
                headers: HeaderInput::Pairs(headers),
                body,
            };
            let options = SendOptions {
                priority: args.priority.into(),
                id: args.id,
            };
            let response = mediator.send(input, options).await?;
            println!("status: {}", response.status);
            println!("body: {}", String::from_utf8_lossy(&response.body));
        }
        Command::List => {
            for item in mediator.list_queue().await? {
                println!(
                    "{}\t{}\t{}\t{:?}\tretries={}",
                    item.id,
                    item.method.as_str(),
                    item.url,
                    item.priority,
                    item.retry_count
                );
            }
        }
        Command::Cancel { id } => {
            let removed = mediator.cancel_request(&id).await?;
            println!("{removed}");
        }
        Command::SyncNow => {
            mediator.sync_now().await;
            println!("queue_size: {}", mediator.queue_size());
        }
    }

    Ok(())
}
