/*!
 # MCP Manager

 A Rust library and command-line tool for managing locally installed
 Model Context Protocol (MCP) servers.

 ## Overview

 MCP Manager provides functionality to:
 - Start, stop and restart server processes that outlive the command that
   launched them
 - Track which servers are running across invocations, repairing stale
   records when a process has exited
 - Report liveness and CPU/memory usage
 - Remove stopped servers together with their installed files
 - Keep host integrations (Claude Desktop, Cursor, ...) in sync with a
   single server registry
 - Keep a bounded history of lifecycle notifications

 ## Basic Usage

 ```no_run
 use mcp_manager::McpManager;
 use mcp_manager::config::Paths;

 #[tokio::main]
 async fn main() -> mcp_manager::Result<()> {
     let manager = McpManager::open(Paths::resolve(None)?);

     let outcome = manager.start("fetch").await;
     println!("{}", outcome);

     println!("{}", manager.status(None).await);
     Ok(())
 }
 ```

 ## License

 This project is licensed under the terms in the LICENSE file.
*/

pub mod config;
pub mod error;
pub mod lock;
pub mod notifications;
pub mod registry;
pub mod server;
pub mod storage;
pub mod sync;

pub use config::{Config, Paths, Preferences, ServerConfig};
pub use error::{Error, Result};
pub use server::{ProcessRecord, ServerStatus};

use lock::StateLock;
use notifications::NotificationLog;
use registry::Registry;
use server::{
    BulkReport, IdentityStore, LifecycleController, LifecycleOptions, ProcessTable, StartOutcome,
    StopOutcome, SystemProcessTable,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use sync::{ConfigSynchronizer, SyncTarget};

/// Outcome of one command: whether it succeeded and what to tell the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

impl CommandOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

const NO_SERVERS: &str = "No MCP servers installed";

/// Entry point for every command.
///
/// Preferences are loaded once when the manager is opened and threaded into
/// the components built for each command. Commands that touch the registry
/// or the identity store run under the state lock.
/// All public methods are instrumented with `tracing` spans.
pub struct McpManager {
    paths: Paths,
    preferences: Preferences,
    processes: Arc<dyn ProcessTable>,
    options: LifecycleOptions,
    lock_timeout: Duration,
}

impl McpManager {
    /// Open the manager rooted at `paths`.
    #[tracing::instrument(skip(paths), fields(data_dir = %paths.data_dir.display()))]
    pub fn open(paths: Paths) -> Self {
        let preferences = Preferences::load(&paths.preferences, &paths.default_installation_dir());
        Self {
            paths,
            preferences,
            processes: Arc::new(SystemProcessTable),
            options: LifecycleOptions::default(),
            lock_timeout: lock::DEFAULT_TIMEOUT,
        }
    }

    /// Replace the OS process facilities, e.g. with a test double.
    pub fn with_process_table(mut self, processes: impl ProcessTable + 'static) -> Self {
        self.processes = Arc::new(processes);
        self
    }

    pub fn with_lifecycle_options(mut self, options: LifecycleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// The notification log configured by the current preferences.
    pub fn notifications(&self) -> NotificationLog {
        NotificationLog::new(&self.paths.notifications, self.preferences.notifications.clone())
    }

    /// A controller over freshly loaded registry and identity documents.
    pub fn controller(&self) -> LifecycleController {
        LifecycleController::new(
            Registry::load(&self.paths.registry),
            IdentityStore::new(&self.paths.identity),
            self.notifications(),
            &self.preferences.installation_dir,
            Arc::clone(&self.processes),
        )
        .with_options(self.options.clone())
    }

    /// Status of one server or all servers.
    #[tracing::instrument(skip(self))]
    pub async fn status(&self, name: Option<&str>) -> CommandOutcome {
        let _lock = match self.lock().await {
            Ok(lock) => lock,
            Err(e) => return CommandOutcome::failure(e.to_string()),
        };
        let controller = self.controller();
        if name.is_none() && controller.registry().is_empty() {
            return CommandOutcome::success(NO_SERVERS);
        }

        match controller.status(name).await {
            Ok(reports) => {
                let lines: Vec<String> = reports
                    .iter()
                    .map(|r| match r.pid {
                        Some(pid) => format!("{}: {} (PID {}) - {}", r.name, r.status, pid, r.health),
                        None => format!("{}: {} - {}", r.name, r.status, r.health),
                    })
                    .collect();
                CommandOutcome::success(lines.join("\n"))
            }
            Err(e) => CommandOutcome::failure(e.to_string()),
        }
    }

    /// Start a server.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn start(&self, name: &str) -> CommandOutcome {
        let _lock = match self.lock().await {
            Ok(lock) => lock,
            Err(e) => return CommandOutcome::failure(e.to_string()),
        };
        match self.controller().start(name).await {
            Ok(outcome) => CommandOutcome::success(describe_start(name, &outcome)),
            Err(e) => CommandOutcome::failure(e.to_string()),
        }
    }

    /// Stop a server.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn stop(&self, name: &str) -> CommandOutcome {
        let _lock = match self.lock().await {
            Ok(lock) => lock,
            Err(e) => return CommandOutcome::failure(e.to_string()),
        };
        match self.controller().stop(name).await {
            Ok(outcome) => stop_outcome(name, outcome),
            Err(e) => CommandOutcome::failure(e.to_string()),
        }
    }

    /// Restart a server.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn restart(&self, name: &str) -> CommandOutcome {
        let _lock = match self.lock().await {
            Ok(lock) => lock,
            Err(e) => return CommandOutcome::failure(e.to_string()),
        };
        match self.controller().restart(name).await {
            Ok(outcome) if matches!(outcome.stopped, StopOutcome::Survived { .. }) => {
                stop_outcome(name, outcome.stopped)
            }
            Ok(outcome) => CommandOutcome::success(format!(
                "Restarted {} (PID {})",
                name,
                outcome.started.record().pid
            )),
            Err(e) => CommandOutcome::failure(e.to_string()),
        }
    }

    /// List installed servers with their state.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self) -> CommandOutcome {
        let _lock = match self.lock().await {
            Ok(lock) => lock,
            Err(e) => return CommandOutcome::failure(e.to_string()),
        };
        let listings = self.controller().list();
        if listings.is_empty() {
            return CommandOutcome::success(NO_SERVERS);
        }

        let lines: Vec<String> = listings
            .iter()
            .map(|l| {
                let mut line = match l.pid {
                    Some(pid) => format!("{} [{} PID {}]", l.name, l.status, pid),
                    None => format!("{} [{}]", l.name, l.status),
                };
                line.push_str(&format!(" {} {}", l.config.command, l.config.args.join(" ")));
                if let Some(port) = l.config.port {
                    line.push_str(&format!(" port={}", port));
                }
                if let Some(last_run) = l.config.last_run {
                    line.push_str(&format!(" last run {}", last_run.to_rfc3339()));
                }
                line.trim_end().to_string()
            })
            .collect();
        CommandOutcome::success(lines.join("\n"))
    }

    /// Start every installed server.
    #[tracing::instrument(skip(self))]
    pub async fn start_all(&self) -> CommandOutcome {
        let _lock = match self.lock().await {
            Ok(lock) => lock,
            Err(e) => return CommandOutcome::failure(e.to_string()),
        };
        let mut controller = self.controller();
        if controller.registry().is_empty() {
            return CommandOutcome::success(NO_SERVERS);
        }

        let report = controller.start_all().await;
        bulk_outcome(&report, |name, outcome| describe_start(name, outcome))
    }

    /// Stop every installed server.
    #[tracing::instrument(skip(self))]
    pub async fn stop_all(&self) -> CommandOutcome {
        let _lock = match self.lock().await {
            Ok(lock) => lock,
            Err(e) => return CommandOutcome::failure(e.to_string()),
        };
        let mut controller = self.controller();
        if controller.registry().is_empty() {
            return CommandOutcome::success(NO_SERVERS);
        }

        let report = controller.stop_all().await;
        let mut outcome = bulk_outcome(&report, |name, outcome| stop_outcome(name, *outcome).message);
        if report
            .succeeded
            .iter()
            .any(|(_, o)| matches!(o, StopOutcome::Survived { .. }))
        {
            outcome.success = false;
        }
        outcome
    }

    /// Uninstall every server that is not running. Deletes files on disk.
    #[tracing::instrument(skip(self))]
    pub async fn clean_stopped_servers(&self) -> CommandOutcome {
        let _lock = match self.lock().await {
            Ok(lock) => lock,
            Err(e) => return CommandOutcome::failure(e.to_string()),
        };
        let report = self.controller().clean_stopped_servers().await;

        let mut lines = Vec::new();
        if report.removed.is_empty() {
            lines.push("No stopped servers to clean".to_string());
        } else {
            lines.push(format!(
                "Removed {} stopped server(s): {}",
                report.removed.len(),
                report.removed.join(", ")
            ));
        }
        lines.extend(report.warnings.iter().map(|w| format!("warning: {}", w)));
        CommandOutcome::success(lines.join("\n"))
    }

    /// Write the selected servers (or `all-servers`) to `target`.
    #[tracing::instrument(skip(self, target, names), fields(target = %target))]
    pub fn sync(&self, target: &SyncTarget, names: &[String]) -> CommandOutcome {
        let path = match target.resolve() {
            Ok(path) => path,
            Err(e) => return CommandOutcome::failure(e.to_string()),
        };

        match ConfigSynchronizer::new(&self.paths.registry).sync(&path, names) {
            Ok(report) => {
                let mut message = format!(
                    "Synced {} server(s) to {}",
                    report.written.len(),
                    report.target.display()
                );
                if !report.skipped.is_empty() {
                    message.push_str(&format!(
                        "\nSkipped unregistered: {}",
                        report.skipped.join(", ")
                    ));
                }
                CommandOutcome::success(message)
            }
            Err(e) => {
                self.notifications().record(
                    notifications::Severity::Error,
                    format!("Failed to sync {}: {}", target, e),
                    None,
                );
                CommandOutcome::failure(e.to_string())
            }
        }
    }

    /// Apply `change` to the preferences and persist them.
    pub fn update_preferences(&mut self, change: impl FnOnce(&mut Preferences)) -> Result<()> {
        self.preferences.update(&self.paths.preferences, change)
    }

    async fn lock(&self) -> Result<StateLock> {
        StateLock::acquire(&self.paths.lock, self.lock_timeout).await
    }
}

fn describe_start(name: &str, outcome: &StartOutcome) -> String {
    match outcome {
        StartOutcome::Started(record) => format!("Started {} (PID {})", name, record.pid),
        StartOutcome::AlreadyRunning(record) => {
            format!("{} is already running (PID {})", name, record.pid)
        }
    }
}

fn stop_outcome(name: &str, outcome: StopOutcome) -> CommandOutcome {
    match outcome {
        StopOutcome::Stopped { forced: false, .. } => {
            CommandOutcome::success(format!("Stopped {}", name))
        }
        StopOutcome::Stopped { forced: true, .. } => {
            CommandOutcome::success(format!("Stopped {} (killed after grace period)", name))
        }
        StopOutcome::NotRunning => CommandOutcome::success(format!("{} is not running", name)),
        StopOutcome::Survived { pid } => CommandOutcome::failure(format!(
            "{} (PID {}) is still running after SIGKILL",
            name, pid
        )),
    }
}

fn bulk_outcome<T>(report: &BulkReport<T>, describe: impl Fn(&str, &T) -> String) -> CommandOutcome {
    let mut lines: Vec<String> = report
        .succeeded
        .iter()
        .map(|(name, outcome)| describe(name, outcome))
        .collect();
    lines.extend(
        report
            .failed
            .iter()
            .map(|(name, e)| format!("{}: {}", name, e)),
    );

    CommandOutcome {
        success: report.is_success(),
        message: lines.join("\n"),
    }
}
