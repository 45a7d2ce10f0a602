use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tracing::warn;

use tether_client::SessionClient;
use tether_client::api::ApiClient;
use tether_client::config::Configuration;
use tether_client::persistence;
use tether_client::ws::WsClientConfig;
use tether_shared::schemas::Role;

#[derive(Parser)]
#[command(name = "tether", about = "Streaming session client for remote agent backends")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach to a session: stream its state, send stdin lines as messages
    Attach {
        /// Session id (defaults to the most recently used one)
        #[arg(long)]
        session: Option<String>,
        /// Create a new session first
        #[arg(long)]
        create: bool,
    },

    /// Session management
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },

    /// Authentication management
    Auth {
        #[command(subcommand)]
        action: Option<AuthAction>,
    },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List sessions
    List,
    /// Create a new session
    Create {
        #[arg(long)]
        title: Option<String>,
    },
    /// Delete a session
    Delete { id: String },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Show current configuration
    Status,
    /// Enter and save the API token
    Login,
    /// Clear saved credentials
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Attach { session, create } => attach(session, create).await,
        Commands::Sessions { action } => sessions(action).await,
        Commands::Auth { action } => auth(action),
    }
}

fn load_config() -> Result<Configuration> {
    let mut config = Configuration::create()?;
    config.load_with_settings()?;
    Ok(config)
}

async fn attach(session: Option<String>, create: bool) -> Result<()> {
    let config = load_config()?;
    let api = ApiClient::new(&config)?;

    let session_id = if create {
        let created = api.create_session(None, None).await?;
        println!("created session {}", created.id);
        created.id
    } else {
        match session {
            Some(id) => id,
            None => persistence::read_settings(&config.settings_file)?
                .last_session_id
                .context("no session id; pass --session <id> or --create")?,
        }
    };

    persistence::update_settings(&config.settings_file, |s| {
        s.last_session_id = Some(session_id.clone());
    })?;

    let ws_config = WsClientConfig::new(&config.api_url, &config.api_token, &session_id);
    let client = SessionClient::new(ws_config).with_api(api);

    // Print each assistant message once, when the turn it belongs to ends.
    let printed = Mutex::new(HashSet::<String>::new());
    client.on_update(move |state| {
        if state.is_loading {
            return;
        }
        let mut printed = printed.lock().unwrap_or_else(|p| p.into_inner());
        for msg in state.messages() {
            if msg.role == Role::Assistant
                && !msg.content.is_empty()
                && printed.insert(msg.id.clone())
            {
                println!("{}", msg.content);
            }
        }
        if let Some(interrupt) = state.interrupt.as_ref() {
            println!(
                "[session paused: interrupt {} awaiting a decision]",
                interrupt.id
            );
        }
    });

    client.connect().await;
    if !client.wait_ready(Duration::from_secs(10)).await {
        warn!("connection not ready yet; messages will queue until it is");
    }
    match client.load_history().await {
        Ok(count) if count > 0 => println!("loaded {count} messages from history"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to load history"),
    }

    println!("attached to session {session_id}; type a message, Ctrl-D to quit");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if let Err(e) = client.send_user_message(text, Vec::new()).await {
            eprintln!("send failed: {e}");
        }
    }

    client.close().await;
    Ok(())
}

async fn sessions(action: SessionsAction) -> Result<()> {
    let config = load_config()?;
    let api = ApiClient::new(&config)?;

    match action {
        SessionsAction::List => {
            for session in api.list_sessions().await? {
                println!(
                    "{}  {}",
                    session.id,
                    session.title.as_deref().unwrap_or("(untitled)")
                );
            }
        }
        SessionsAction::Create { title } => {
            let session = api.create_session(title.as_deref(), None).await?;
            println!("created {}", session.id);
        }
        SessionsAction::Delete { id } => {
            api.delete_session(&id).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

fn auth(action: Option<AuthAction>) -> Result<()> {
    let config = Configuration::create()?;

    match action {
        Some(AuthAction::Login) => {
            print!("Enter TETHER_API_TOKEN: ");
            io::stdout().flush()?;

            let stdin = io::stdin();
            let token = stdin
                .lock()
                .lines()
                .next()
                .ok_or_else(|| anyhow::anyhow!("no input"))??;
            let token = token.trim().to_string();
            if token.is_empty() {
                anyhow::bail!("token cannot be empty");
            }

            persistence::update_settings(&config.settings_file, |s| {
                s.api_token = Some(token.clone());
            })?;
            println!("\nToken saved to {}", config.settings_file.display());
        }
        Some(AuthAction::Logout) => {
            persistence::update_settings(&config.settings_file, |s| {
                s.api_token = None;
            })?;
            println!("Cleared local credentials.");
            println!("Note: a TETHER_API_TOKEN environment variable will still be used.");
        }
        Some(AuthAction::Status) | None => {
            let settings = persistence::read_settings(&config.settings_file)?;
            let env_token = std::env::var("TETHER_API_TOKEN").is_ok();
            let token_source = if env_token {
                "environment"
            } else if settings.api_token.is_some() {
                "settings file"
            } else {
                "none"
            };

            println!("\ntether status\n");
            println!("  TETHER_API_URL: {}", config.api_url);
            println!(
                "  TETHER_API_TOKEN: {}",
                if env_token || settings.api_token.is_some() {
                    "set"
                } else {
                    "missing"
                }
            );
            println!("  Token source: {token_source}");
            if let Some(last) = settings.last_session_id {
                println!("  Last session: {last}");
            }
        }
    }
    Ok(())
}
