/// Server management module for MCP Manager.
///
/// This module handles the lifecycle of detached MCP server processes. The
/// manager keeps no resident daemon: each invocation reconstructs what is
/// running from the identity store and re-validates it against the OS.
///
/// # Components
///
/// * `identity` - Durable server name to PID records
/// * `process` - The OS seam: spawning, signalling and probing by PID
/// * `monitor` - Liveness probing with lazy repair, and resource usage
/// * `lifecycle` - Start, stop, restart, bulk operations and clean-up
///
/// # Examples
///
/// Starting and stopping a registered server:
///
/// ```no_run
/// use mcp_manager::config::Paths;
/// use mcp_manager::notifications::NotificationLog;
/// use mcp_manager::registry::Registry;
/// use mcp_manager::server::{IdentityStore, LifecycleController, SystemProcessTable};
/// use std::sync::Arc;
///
/// # async fn example() -> mcp_manager::Result<()> {
/// let paths = Paths::new("/tmp/mcp-manager");
/// let mut controller = LifecycleController::new(
///     Registry::load(&paths.registry),
///     IdentityStore::new(&paths.identity),
///     NotificationLog::new(&paths.notifications, Default::default()),
///     paths.default_installation_dir(),
///     Arc::new(SystemProcessTable),
/// );
///
/// let outcome = controller.start("fetch").await?;
/// println!("fetch running as PID {}", outcome.record().pid);
/// controller.stop("fetch").await?;
/// # Ok(())
/// # }
/// ```
pub mod identity;
pub mod lifecycle;
pub mod monitor;
mod process;

pub use identity::{IdentityStore, ProcessRecord};
pub use lifecycle::{
    BulkReport, CleanReport, LifecycleController, LifecycleOptions, RestartOutcome,
    ServerListing, StartOutcome, StatusReport, StopOutcome,
};
pub use monitor::{LivenessProber, ResourceInspector, ResourceUsage, ServerHealth};
pub use process::{ProcessTable, ServerStatus, StopSignal, SystemProcessTable, pid_is_alive};
