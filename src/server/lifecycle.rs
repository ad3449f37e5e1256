use crate::config::{ServerConfig, validate_server_config};
use crate::error::{Error, Result};
use crate::notifications::{NotificationLog, Severity};
use crate::registry::Registry;
use crate::server::identity::{IdentityStore, ProcessRecord};
use crate::server::monitor::{LivenessProber, ResourceInspector, ServerHealth};
use crate::server::process::{ProcessTable, ServerStatus, StopSignal};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Timing knobs for stop and restart.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// How long a terminated process gets to exit before it is killed
    pub grace_period: Duration,
    /// Pause between the stop and start halves of a restart
    pub restart_delay: Duration,
    /// How long to wait for a killed process to disappear
    pub kill_confirm_timeout: Duration,
    /// Liveness polling interval while waiting
    pub poll_interval: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            restart_delay: Duration::from_secs(1),
            kill_confirm_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Result of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new process was spawned
    Started(ProcessRecord),
    /// A live process already existed; nothing was spawned
    AlreadyRunning(ProcessRecord),
}

impl StartOutcome {
    pub fn record(&self) -> &ProcessRecord {
        match self {
            StartOutcome::Started(record) | StartOutcome::AlreadyRunning(record) => record,
        }
    }
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process exited; `forced` if it needed SIGKILL
    Stopped { pid: u32, forced: bool },
    /// There was no live process to stop
    NotRunning,
    /// The process outlived SIGKILL; its record was kept
    Survived { pid: u32 },
}

/// Result of a restart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartOutcome {
    pub stopped: StopOutcome,
    pub started: StartOutcome,
}

/// Per-server results of a bulk operation.
#[derive(Debug)]
pub struct BulkReport<T> {
    pub succeeded: Vec<(String, T)>,
    pub failed: Vec<(String, Error)>,
}

impl<T> Default for BulkReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BulkReport<T> {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What `clean_stopped_servers` removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanReport {
    /// Servers removed from the registry
    pub removed: Vec<String>,
    /// Installation directories deleted from disk
    pub deleted_dirs: Vec<PathBuf>,
    /// Problems that did not stop the clean-up
    pub warnings: Vec<String>,
}

/// Runtime state of one server.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub name: String,
    pub status: ServerStatus,
    pub pid: Option<u32>,
    pub health: ServerHealth,
}

/// A registry entry together with its derived state.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerListing {
    pub name: String,
    pub config: ServerConfig,
    pub status: ServerStatus,
    pub pid: Option<u32>,
}

/// Starts, stops and inspects registered servers.
///
/// The controller owns the registry for the duration of a command and
/// works against the identity store by PID; it never holds a handle to a
/// child process.
pub struct LifecycleController {
    registry: Registry,
    store: IdentityStore,
    prober: LivenessProber,
    inspector: ResourceInspector,
    notifications: NotificationLog,
    processes: Arc<dyn ProcessTable>,
    installation_dir: PathBuf,
    options: LifecycleOptions,
}

impl LifecycleController {
    pub fn new(
        registry: Registry,
        store: IdentityStore,
        notifications: NotificationLog,
        installation_dir: impl Into<PathBuf>,
        processes: Arc<dyn ProcessTable>,
    ) -> Self {
        Self {
            prober: LivenessProber::new(store.clone(), Arc::clone(&processes)),
            inspector: ResourceInspector::new(Arc::clone(&processes)),
            registry,
            store,
            notifications,
            processes,
            installation_dir: installation_dir.into(),
            options: LifecycleOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LifecycleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn prober(&self) -> &LivenessProber {
        &self.prober
    }

    /// Start a registered server unless it is already running.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn start(&mut self, name: &str) -> Result<StartOutcome> {
        let config = self.registry.require(name)?.clone();

        if let Some(record) = self.prober.live_record(name) {
            tracing::debug!(pid = record.pid, "Server already running");
            self.notifications.record(
                Severity::Info,
                format!("Server {} is already running (PID {})", name, record.pid),
                Some(name),
            );
            return Ok(StartOutcome::AlreadyRunning(record));
        }

        validate_server_config(name, &config)?;

        tracing::info!("Attempting to start server");
        let pid = match self.processes.spawn_detached(name, &config).await {
            Ok(pid) => pid,
            Err(e) => {
                self.notifications.record(
                    Severity::Error,
                    format!("Failed to start server {}: {}", name, e),
                    Some(name),
                );
                return Err(e);
            }
        };

        let record = ProcessRecord::new(pid, name);
        if let Err(e) = self.store.insert(record.clone()) {
            self.notifications.record(
                Severity::Warning,
                format!("Server {} started but its PID could not be saved: {}", name, e),
                Some(name),
            );
        }

        self.registry.mark_last_run(name, record.start_time);
        if let Err(e) = self.registry.save() {
            tracing::warn!(error = %e, "Failed to record last run time");
        }

        self.notifications.record(
            Severity::Info,
            format!("Started server {} (PID {})", name, pid),
            Some(name),
        );
        Ok(StartOutcome::Started(record))
    }

    /// Stop a running server: SIGTERM, wait out the grace period, then
    /// SIGKILL. The record is dropped only once the process is confirmed
    /// gone.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn stop(&mut self, name: &str) -> Result<StopOutcome> {
        let Some(record) = self.prober.live_record(name) else {
            if self.registry.get(name).is_none() {
                return Err(Error::ServerNotFound(name.to_string()));
            }
            tracing::debug!("Server is not running");
            return Ok(StopOutcome::NotRunning);
        };
        let pid = record.pid;

        tracing::info!(pid, "Sending termination signal");
        if let Err(e) = self.processes.signal(pid, StopSignal::Terminate) {
            if self.processes.is_alive(pid) {
                self.notifications.record(
                    Severity::Error,
                    format!("Failed to stop server {}: {}", name, e),
                    Some(name),
                );
                return Err(e);
            }
            // Exited between the probe and the signal
            self.evict(pid);
            return Ok(StopOutcome::Stopped { pid, forced: false });
        }

        if self.wait_for_exit(pid, self.options.grace_period).await {
            self.evict(pid);
            self.notifications.record(
                Severity::Info,
                format!("Stopped server {}", name),
                Some(name),
            );
            return Ok(StopOutcome::Stopped { pid, forced: false });
        }

        tracing::warn!(pid, "Process ignored termination, killing");
        if let Err(e) = self.processes.signal(pid, StopSignal::Kill) {
            tracing::warn!(pid, error = %e, "Kill signal failed");
        }

        if self.wait_for_exit(pid, self.options.kill_confirm_timeout).await {
            self.evict(pid);
            self.notifications.record(
                Severity::Warning,
                format!("Server {} did not exit gracefully and was killed", name),
                Some(name),
            );
            return Ok(StopOutcome::Stopped { pid, forced: true });
        }

        self.notifications.record(
            Severity::Warning,
            format!("Server {} (PID {}) survived SIGKILL; still tracking it", name, pid),
            Some(name),
        );
        Ok(StopOutcome::Survived { pid })
    }

    /// Stop, pause briefly so sockets are released, then start.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn restart(&mut self, name: &str) -> Result<RestartOutcome> {
        self.registry.require(name)?;

        let stopped = self.stop(name).await?;
        if matches!(stopped, StopOutcome::Stopped { .. }) {
            time::sleep(self.options.restart_delay).await;
        }
        let started = self.start(name).await?;

        Ok(RestartOutcome { stopped, started })
    }

    /// Start every registered server in name order; failures do not stop
    /// the rest.
    #[tracing::instrument(skip(self))]
    pub async fn start_all(&mut self) -> BulkReport<StartOutcome> {
        let mut report = BulkReport::default();
        for name in self.registry.names() {
            match self.start(&name).await {
                Ok(outcome) => report.succeeded.push((name, outcome)),
                Err(e) => {
                    tracing::error!(server_name = %name, error = %e, "Failed to start server");
                    report.failed.push((name, e));
                }
            }
        }
        report
    }

    /// Stop every registered server in name order; failures do not stop
    /// the rest.
    #[tracing::instrument(skip(self))]
    pub async fn stop_all(&mut self) -> BulkReport<StopOutcome> {
        let mut report = BulkReport::default();
        for name in self.registry.names() {
            match self.stop(&name).await {
                Ok(outcome) => report.succeeded.push((name, outcome)),
                Err(e) => {
                    tracing::error!(server_name = %name, error = %e, "Failed to stop server");
                    report.failed.push((name, e));
                }
            }
        }
        report
    }

    /// Uninstall every server that is not running.
    ///
    /// Deletes installed files from disk, drops the registry entry and any
    /// stale process record. Irreversible.
    #[tracing::instrument(skip(self))]
    pub async fn clean_stopped_servers(&mut self) -> CleanReport {
        let mut report = CleanReport::default();

        for name in self.registry.names() {
            if self.prober.check_and_repair(&name) {
                continue;
            }

            let Some(config) = self.registry.remove(&name) else {
                continue;
            };

            match self.install_dir_for(&config) {
                Some(dir) if dir.exists() => match std::fs::remove_dir_all(&dir) {
                    Ok(()) => {
                        tracing::info!(server_name = %name, dir = %dir.display(), "Deleted installation");
                        report.deleted_dirs.push(dir);
                    }
                    Err(e) => {
                        let warning = format!("Could not delete {}: {}", dir.display(), e);
                        self.notifications.record(Severity::Warning, &warning, Some(&name));
                        report.warnings.push(warning);
                    }
                },
                Some(_) => {}
                None => {
                    let warning = format!(
                        "{}: no installation directory under {}; files left in place",
                        name,
                        self.installation_dir.display()
                    );
                    tracing::warn!("{}", warning);
                    report.warnings.push(warning);
                }
            }

            let records = self.store.remove_by_name(&name);
            if let Err(e) = self.store.save(&records) {
                report.warnings.push(format!("Failed to update process records: {}", e));
            }

            self.notifications.record(
                Severity::Info,
                format!("Removed stopped server {}", name),
                Some(&name),
            );
            report.removed.push(name);
        }

        if !report.removed.is_empty() {
            if let Err(e) = self.registry.save() {
                let warning = format!("Failed to save registry: {}", e);
                self.notifications.record(Severity::Error, &warning, None);
                report.warnings.push(warning);
            }
        }

        report
    }

    /// Status of one server, or of every server when `name` is `None`.
    #[tracing::instrument(skip(self))]
    pub async fn status(&self, name: Option<&str>) -> Result<Vec<StatusReport>> {
        let names = match name {
            Some(name) => {
                self.registry.require(name)?;
                vec![name.to_string()]
            }
            None => self.registry.names(),
        };

        let mut reports = Vec::with_capacity(names.len());
        for name in names {
            let report = match self.prober.live_record(&name) {
                Some(record) => {
                    let health = match self.inspector.usage(record.pid).await {
                        Ok(usage) => ServerHealth::Ok(usage),
                        Err(e) => {
                            tracing::warn!(server_name = %name, error = %e, "Resource query failed");
                            ServerHealth::NotResponding
                        }
                    };
                    StatusReport {
                        name,
                        status: ServerStatus::Running,
                        pid: Some(record.pid),
                        health,
                    }
                }
                None => StatusReport {
                    name,
                    status: ServerStatus::Stopped,
                    pid: None,
                    health: ServerHealth::NotRunning,
                },
            };
            reports.push(report);
        }

        Ok(reports)
    }

    /// Every registry entry with its derived state.
    pub fn list(&self) -> Vec<ServerListing> {
        self.registry
            .config()
            .mcp_servers
            .iter()
            .map(|(name, config)| {
                let pid = self.prober.live_record(name).map(|r| r.pid);
                ServerListing {
                    name: name.clone(),
                    config: config.clone(),
                    status: if pid.is_some() {
                        ServerStatus::Running
                    } else {
                        ServerStatus::Stopped
                    },
                    pid,
                }
            })
            .collect()
    }

    async fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.processes.is_alive(pid) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            time::sleep(self.options.poll_interval.min(deadline - now)).await;
        }
    }

    fn evict(&self, pid: u32) {
        let records = self.store.remove_by_pid(pid);
        if let Err(e) = self.store.save(&records) {
            tracing::warn!(pid, error = %e, "Failed to remove process record");
        }
    }

    /// The top-level directory under the installation directory that holds
    /// the server's entry point, if there is one.
    fn install_dir_for(&self, config: &ServerConfig) -> Option<PathBuf> {
        let entry = Path::new(config.args.first()?);
        let parent = entry.parent()?;
        if !parent.is_absolute() || parent.components().any(|c| c == Component::ParentDir) {
            return None;
        }

        let relative = parent.strip_prefix(&self.installation_dir).ok()?;
        let top = relative.components().next()?;
        Some(self.installation_dir.join(top))
    }
}
