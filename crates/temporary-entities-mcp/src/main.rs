//! Temporary Entities MCP server entry point.

use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use temporary_entities::EntitySnapshot;
use temporary_entities_mcp::config::{resolve_manager_config, resolve_state_path, ConfigOverrides};
use temporary_entities_mcp::protocol::ProtocolHandler;
use temporary_entities_mcp::session::{spawn_driver, EntitySession, SnapshotStore};
use temporary_entities_mcp::tools::ToolRegistry;
use temporary_entities_mcp::transport::StdioTransport;

#[derive(Parser)]
#[command(
    name = "temporary-entities-mcp",
    about = "MCP server for temporary entities: countdown timers that clean themselves up",
    version
)]
struct Cli {
    /// Path to the JSON state file.
    #[arg(short, long, global = true)]
    state: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    lifecycle: LifecycleArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Lifecycle tunables, in seconds.
#[derive(Args, Debug, Clone, Copy, Default)]
struct LifecycleArgs {
    /// Entities expected to live shorter than this are not persisted (1-300).
    #[arg(long, global = true)]
    min_persist_duration: Option<u64>,

    /// Period of the cleanup sweep (60-3600).
    #[arg(long, global = true)]
    cleanup_interval: Option<u64>,

    /// Delay before finalized entities are removed (0-300).
    #[arg(long, global = true)]
    finalized_grace_period: Option<u64>,

    /// Age from creation after which paused entities are removed (3600-604800).
    #[arg(long, global = true)]
    inactive_max_age: Option<u64>,
}

impl From<LifecycleArgs> for ConfigOverrides {
    fn from(args: LifecycleArgs) -> Self {
        Self {
            min_persist_duration: args.min_persist_duration,
            cleanup_interval: args.cleanup_interval,
            finalized_grace_period: args.finalized_grace_period,
            inactive_max_age: args.inactive_max_age,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server over stdio (default).
    Serve,

    /// Check a state file and list the entities it would restore.
    Validate,

    /// Print server capabilities as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   temporary-entities-mcp completions bash > ~/.local/share/bash-completion/completions/temporary-entities-mcp
    ///   temporary-entities-mcp completions zsh > ~/.zfunc/_temporary-entities-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = resolve_manager_config(&cli.lifecycle.into())?;
            let state_path = resolve_state_path(cli.state.as_deref());
            tracing::info!("Temporary Entities MCP server");
            tracing::info!("State: {state_path}");

            let mut session = EntitySession::open(&state_path, config)?;
            let events = session.subscribe();
            let wake = session.waker();
            let session = Arc::new(Mutex::new(session));

            let shutdown = Arc::new(Notify::new());
            let driver = spawn_driver(Arc::clone(&session), wake, Arc::clone(&shutdown))?;

            let handler = ProtocolHandler::new(Arc::clone(&session));
            let mut transport = StdioTransport::new(handler).with_events(events);
            let served = transport.run().await;

            shutdown.notify_one();
            if let Err(e) = driver.await {
                tracing::error!("Driver task failed: {e}");
            }
            session.lock().await.close()?;
            served?;
        }

        Commands::Validate => {
            let state_path = resolve_state_path(cli.state.as_deref());
            match SnapshotStore::open(&state_path) {
                Ok(store) => {
                    println!("Valid state file: {state_path}");
                    println!("  Entities: {}", store.len());
                    let mut corrupt = 0;
                    for (id, raw) in store.entries() {
                        match EntitySnapshot::from_value(raw) {
                            Ok(snapshot) => println!("  {id}: {} {}", snapshot.kind.as_str(), snapshot.state),
                            Err(e) => {
                                corrupt += 1;
                                println!("  {id}: corrupt ({e}), would restart as a new timer");
                            }
                        }
                    }
                    if corrupt > 0 {
                        println!("  Corrupt entries: {corrupt}");
                    }
                }
                Err(e) => {
                    eprintln!("Invalid state file: {e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Info => {
            let capabilities = temporary_entities_mcp::types::InitializeResult::default_result();
            let tools = ToolRegistry::list_tools();
            let config = resolve_manager_config(&cli.lifecycle.into())?;
            let info = serde_json::json!({
                "server": capabilities.server_info,
                "protocol_version": capabilities.protocol_version,
                "capabilities": capabilities.capabilities,
                "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": tools.len(),
                "lifecycle": config,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "temporary-entities-mcp", &mut std::io::stdout());
        }
    }

    Ok(())
}
