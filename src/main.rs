//! mcp-manager: start, stop, inspect and sync locally installed MCP servers.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mcp_manager::notifications::Severity;
use mcp_manager::sync::SyncTarget;
use mcp_manager::{CommandOutcome, McpManager, Paths};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "mcp-manager")]
#[command(about = "Manage locally installed Model Context Protocol servers")]
#[command(version)]
struct Cli {
    /// Data directory (defaults to $MCP_MANAGER_HOME or the platform config dir)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether servers are running, with CPU and memory usage
    Status {
        /// Server name; all servers when omitted
        name: Option<String>,
    },

    /// Start a server
    Start { name: String },

    /// Stop a server
    Stop { name: String },

    /// Restart a server
    Restart { name: String },

    /// List installed servers
    List,

    /// Start every installed server
    StartAll,

    /// Stop every installed server
    StopAll,

    /// Uninstall every stopped server, deleting its files
    Clean {
        /// Confirm that installed files should be deleted
        #[arg(long)]
        yes: bool,
    },

    /// Write servers to a host integration's config (claude, cursor, path:<file>)
    Sync {
        target: SyncTarget,

        /// Server names, or `all-servers`
        #[arg(required = true)]
        servers: Vec<String>,
    },

    /// Inspect the notification history
    Notifications {
        #[command(subcommand)]
        action: NotificationsCommand,
    },

    /// Show or change preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsCommand,
    },
}

#[derive(Subcommand)]
enum NotificationsCommand {
    /// Show recent notifications, newest first
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Delete the notification history
    Clear,
}

#[derive(Subcommand)]
enum PrefsCommand {
    /// Print the current preferences
    Show,
    /// Update one or more preferences
    Set {
        #[arg(long)]
        installation_dir: Option<PathBuf>,

        #[arg(long)]
        ask_for_custom_port: Option<bool>,

        /// Enable or disable notifications
        #[arg(long)]
        notifications: Option<bool>,

        #[arg(long)]
        max_history: Option<usize>,

        /// Comma-separated severities to record (info,warning,error)
        #[arg(long, value_delimiter = ',')]
        types: Option<Vec<Severity>>,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let paths = Paths::resolve(cli.data_dir.as_deref())?;
    tracing::debug!(data_dir = %paths.data_dir.display(), "Resolved data directory");
    let mut manager = McpManager::open(paths);

    let outcome = match cli.command {
        Commands::Status { name } => manager.status(name.as_deref()).await,
        Commands::Start { name } => manager.start(&name).await,
        Commands::Stop { name } => manager.stop(&name).await,
        Commands::Restart { name } => manager.restart(&name).await,
        Commands::List => manager.list().await,
        Commands::StartAll => manager.start_all().await,
        Commands::StopAll => manager.stop_all().await,
        Commands::Clean { yes: false } => CommandOutcome::failure(
            "clean deletes the installed files of every stopped server; re-run with --yes",
        ),
        Commands::Clean { yes: true } => manager.clean_stopped_servers().await,
        Commands::Sync { target, servers } => manager.sync(&target, &servers),
        Commands::Notifications { action } => notifications(&manager, action)?,
        Commands::Prefs { action } => prefs(&mut manager, action)?,
    };

    if outcome.success {
        println!("{}", outcome);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{}", outcome);
        Ok(ExitCode::FAILURE)
    }
}

fn notifications(manager: &McpManager, action: NotificationsCommand) -> Result<CommandOutcome> {
    let log = manager.notifications();
    match action {
        NotificationsCommand::List { limit } => {
            let entries = log.list(limit);
            if entries.is_empty() {
                return Ok(CommandOutcome::success("No notifications"));
            }
            let lines: Vec<String> = entries
                .iter()
                .map(|e| {
                    let server = e
                        .server_name
                        .as_deref()
                        .map(|s| format!(" [{}]", s))
                        .unwrap_or_default();
                    format!(
                        "{} {:<7}{} {}",
                        e.timestamp.to_rfc3339(),
                        e.severity,
                        server,
                        e.message
                    )
                })
                .collect();
            Ok(CommandOutcome::success(lines.join("\n")))
        }
        NotificationsCommand::Clear => {
            log.clear()?;
            Ok(CommandOutcome::success("Notification history cleared"))
        }
    }
}

fn prefs(manager: &mut McpManager, action: PrefsCommand) -> Result<CommandOutcome> {
    match action {
        PrefsCommand::Show => Ok(CommandOutcome::success(serde_json::to_string_pretty(
            manager.preferences(),
        )?)),
        PrefsCommand::Set {
            installation_dir,
            ask_for_custom_port,
            notifications,
            max_history,
            types,
        } => {
            manager.update_preferences(|prefs| {
                if let Some(dir) = installation_dir {
                    prefs.installation_dir = dir;
                }
                if let Some(ask) = ask_for_custom_port {
                    prefs.ask_for_custom_port = ask;
                }
                if let Some(enabled) = notifications {
                    prefs.notifications.enabled = enabled;
                }
                if let Some(max) = max_history {
                    prefs.notifications.max_history = max;
                }
                if let Some(types) = types {
                    prefs.notifications.types = types.into_iter().collect();
                }
            })?;
            Ok(CommandOutcome::success("Preferences updated"))
        }
    }
}
