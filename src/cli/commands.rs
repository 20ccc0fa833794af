//! CLI commands

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;

use crate::agent::live_agent;
use crate::config::Config;
use crate::core::AppState;
use crate::monitor::MonitorError;
use crate::session::Content;

#[derive(Parser)]
#[command(name = "livedesk")]
#[command(about = "Live agent transfer bot: query, monitor and inject into hosted agent sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.livedesk/config.yml)
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the agent definition as JSON
    Agent,

    /// Create a session on the deployed agent and stream a prompt into it
    Query {
        /// Prompt to send
        prompt: String,

        /// User id (default from config)
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Monitor a deployed session and echo tool results until Ctrl-C
    Watch {
        /// Session ID
        session_id: String,

        /// User id (default from config)
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Invoke an agent tool against a deployed session
    Tool {
        /// Tool name (live_agent_transfer, date_time_tool, fetch_artwork_title)
        name: String,

        /// Session ID
        #[arg(long)]
        session_id: String,

        /// User id (default from config)
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Run the long-running tool and monitor pattern in-process
    Demo,

    /// Show or edit the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Store the id of a deployed agent engine
    SetEngine {
        /// Reasoning engine id or resource name
        id: String,
    },
}

pub fn run() -> Result<()> {
    let Cli {
        command,
        config: config_file,
    } = Cli::parse();
    let config_path = config_file.as_deref();
    let config = Config::load(config_path)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        match command {
            Commands::Agent => {
                println!("{}", serde_json::to_string_pretty(&live_agent())?);
                Ok(())
            }

            Commands::Query { prompt, user_id } => {
                let user_id = user_id.unwrap_or_else(|| config.user_id.clone());
                let state = AppState::remote(config)?;

                let session = state
                    .store
                    .create_session(&state.config.app_name, &user_id, HashMap::new())
                    .await?;
                println!("Created session: {}", session.id);

                let mut stream = state
                    .sender
                    .stream_query(&user_id, &session.id, Content::text("user", prompt))
                    .await?;
                while let Some(chunk) = stream.next().await {
                    println!("{}", chunk?);
                }
                Ok(())
            }

            Commands::Watch {
                session_id,
                user_id,
            } => {
                let user_id = user_id.unwrap_or_else(|| config.user_id.clone());
                let state = AppState::remote(config)?;
                let session = state.session_ref(&user_id, &session_id);

                state.watch(&session)?;
                println!("Watching session {} (Ctrl-C to stop)", session);

                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to listen for Ctrl-C")?;

                match state.registry.stop(&session_id).await {
                    Ok(snapshot) => println!(
                        "Observed {} events, injected {} messages",
                        snapshot.last_observed_event_count, snapshot.injected_count
                    ),
                    Err(MonitorError::NotRegistered(_)) => {
                        println!("Session {} no longer exists", session)
                    }
                    Err(e) => return Err(e.into()),
                }
                Ok(())
            }

            Commands::Tool {
                name,
                session_id,
                user_id,
            } => {
                let user_id = user_id.unwrap_or_else(|| config.user_id.clone());
                let state = AppState::remote(config)?;
                let session = state.session_ref(&user_id, &session_id);

                println!("{}", state.toolbox.call(&name, &session)?);

                // Give background work and its echo a chance to land.
                state.supervisor.wait_all().await;
                settle(&state).await?;
                state.shutdown().await;
                Ok(())
            }

            Commands::Demo => {
                let state = AppState::local(config)?;
                let created = state
                    .store
                    .create_session(&state.config.app_name, &state.config.user_id, HashMap::new())
                    .await?;
                let session = created.session_ref();

                for tool in ["date_time_tool", "fetch_artwork_title"] {
                    println!("{} -> {}", tool, state.toolbox.call(tool, &session)?);
                }

                state.supervisor.wait_all().await;
                settle(&state).await?;
                state.shutdown().await;

                let finished = state
                    .store
                    .get_session(&session.app_name, &session.user_id, &session.session_id)
                    .await?
                    .context("Demo session disappeared")?;
                for event in &finished.events {
                    println!(
                        "[{}] {}",
                        event.author,
                        event.text().unwrap_or_else(|| "-".to_string())
                    );
                }
                Ok(())
            }

            Commands::Config { command } => match command {
                ConfigCommands::Show => {
                    println!("{}", serde_yaml::to_string(&config)?);
                    Ok(())
                }
                ConfigCommands::SetEngine { id } => {
                    // Environment overrides are not meant to end up on disk.
                    let mut config = Config::load_file(config_path)?;
                    config.set_agent_engine_id(&id);
                    config.save(config_path)?;
                    println!("Updated agent_engine_id to {}", id);
                    Ok(())
                }
            },
        }
    })
}

/// Wait a couple of poll intervals so monitors pick up the latest events
async fn settle(state: &AppState) -> Result<()> {
    let interval = state.config.monitor.to_monitor_config()?.poll_interval();
    tokio::time::sleep(interval * 2 + Duration::from_millis(100)).await;
    Ok(())
}
