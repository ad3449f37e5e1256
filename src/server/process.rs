// src/server/process.rs
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use async_process::{Command, Stdio};
use async_trait::async_trait;
use std::fmt;

/// Derived state of a server. Never persisted; recomputed from the
/// identity store and the OS on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// A live process is recorded for the server
    Running,
    /// No live process is recorded
    Stopped,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Running => f.write_str("RUNNING"),
            ServerStatus::Stopped => f.write_str("STOPPED"),
        }
    }
}

/// How hard to ask a process to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Graceful termination (SIGTERM)
    Terminate,
    /// Forceful kill (SIGKILL)
    Kill,
}

/// The operating-system facilities the manager depends on.
///
/// The manager never holds a handle to the processes it starts; everything
/// it knows about them goes through this trait by PID.
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// Launches `config` detached from the caller with stdio discarded and
    /// returns the new process id.
    async fn spawn_detached(&self, name: &str, config: &ServerConfig) -> Result<u32>;

    /// Delivers `signal` to `pid`. Fails if the process does not exist.
    fn signal(&self, pid: u32, signal: StopSignal) -> Result<()>;

    /// Whether the OS confirms `pid` is a live process.
    fn is_alive(&self, pid: u32) -> bool;

    /// Raw `%cpu %mem` table for `pid`: a header line then one data line.
    async fn query_usage(&self, pid: u32) -> Result<String>;
}

/// [`ProcessTable`] backed by the real operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessTable;

#[async_trait]
impl ProcessTable for SystemProcessTable {
    async fn spawn_detached(&self, name: &str, config: &ServerConfig) -> Result<u32> {
        let mut command = std::process::Command::new(&config.command);
        command.args(&config.args);

        // Layered over the inherited environment
        command.envs(&config.env);
        if let Some(port) = config.port {
            if !config.env.contains_key("PORT") {
                command.env("PORT", port.to_string());
            }
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = Command::from(command).spawn().map_err(|e| {
            Error::Spawn(format!("'{}' ({}): {}", name, config.command, e))
        })?;
        let pid = child.id();
        tracing::debug!(server_name = %name, pid, "Spawned detached process");

        // Dropping the handle leaves the child running; it is reaped in
        // the background if it exits while we are still alive.
        drop(child);
        Ok(pid)
    }

    #[cfg(unix)]
    fn signal(&self, pid: u32, signal: StopSignal) -> Result<()> {
        use nix::sys::signal::{Signal, kill};

        let target = unix_pid(pid)
            .ok_or_else(|| Error::Signal(format!("Invalid process id {}", pid)))?;
        let signal = match signal {
            StopSignal::Terminate => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        };
        kill(target, signal).map_err(|e| Error::Signal(format!("{:?} to PID {}: {}", signal, pid, e)))
    }

    #[cfg(not(unix))]
    fn signal(&self, pid: u32, _signal: StopSignal) -> Result<()> {
        Err(Error::Signal(format!(
            "Signal delivery not supported on this platform (PID {})",
            pid
        )))
    }

    fn is_alive(&self, pid: u32) -> bool {
        pid_is_alive(pid)
    }

    async fn query_usage(&self, pid: u32) -> Result<String> {
        let output = Command::new("ps")
            .args(["-p", &pid.to_string(), "-o", "%cpu,%mem"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Probe(format!("Failed to run ps: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Probe(format!(
                "ps exited with {} for PID {}",
                output.status, pid
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Probes `pid` with a zero signal.
///
/// Anything the OS will not confirm counts as dead: a missing process, a
/// permission error, or a zombie awaiting reaping.
#[cfg(unix)]
pub fn pid_is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;

    let Some(target) = unix_pid(pid) else {
        return false;
    };

    match kill(target, None) {
        Ok(()) => !is_zombie(pid),
        Err(Errno::ESRCH) => false,
        Err(e) => {
            tracing::debug!(pid, error = %e, "Liveness probe inconclusive, treating as dead");
            false
        }
    }
}

#[cfg(not(unix))]
pub fn pid_is_alive(pid: u32) -> bool {
    tracing::warn!(pid, "Liveness probing not supported on this platform");
    false
}

/// Rejects ids that would address a process group rather than a process.
#[cfg(unix)]
fn unix_pid(pid: u32) -> Option<nix::unistd::Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .map(nix::unistd::Pid::from_raw)
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    // The state field follows the parenthesised command name, which may itself contain spaces
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next().map(|s| s == "Z"))
        })
        .unwrap_or(false)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}
