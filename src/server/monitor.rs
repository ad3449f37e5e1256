use crate::error::Result;
use crate::server::identity::{IdentityStore, ProcessRecord, latest_for};
use crate::server::process::ProcessTable;
use std::fmt;
use std::sync::Arc;

/// Server health as shown by `status`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServerHealth {
    /// Process is live and the resource query answered
    Ok(ResourceUsage),
    /// Process is live but the resource query failed
    NotResponding,
    /// No live process
    NotRunning,
}

impl fmt::Display for ServerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerHealth::Ok(usage) => write!(
                f,
                "OK (CPU {:.1}%, MEM {:.1}%)",
                usage.cpu_percent, usage.mem_percent
            ),
            ServerHealth::NotResponding => f.write_str("NOT_RESPONDING"),
            ServerHealth::NotRunning => f.write_str("NOT_RUNNING"),
        }
    }
}

/// CPU and memory utilisation of one process, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub mem_percent: f64,
}

/// Confirms recorded processes against the OS and evicts stale records.
///
/// This is the only component that deletes a record because its process
/// has gone away, and it does so in the same call that observed it.
#[derive(Clone)]
pub struct LivenessProber {
    store: IdentityStore,
    processes: Arc<dyn ProcessTable>,
}

impl LivenessProber {
    pub fn new(store: IdentityStore, processes: Arc<dyn ProcessTable>) -> Self {
        Self { store, processes }
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.processes.is_alive(pid)
    }

    /// Whether `name` has a live recorded process, repairing the store
    /// on the way.
    pub fn check_and_repair(&self, name: &str) -> bool {
        self.live_record(name).is_some()
    }

    /// Returns the live record for `name`.
    ///
    /// Duplicate records collapse to the most recent one. If that process
    /// is dead every record for `name` is evicted and the store persisted
    /// before returning `None`.
    pub fn live_record(&self, name: &str) -> Option<ProcessRecord> {
        let records = self.store.load();
        let latest = latest_for(&records, name)?.clone();
        let matching = records.iter().filter(|r| r.server_name == name).count();
        let mut others: Vec<ProcessRecord> = records
            .into_iter()
            .filter(|r| r.server_name != name)
            .collect();

        if self.processes.is_alive(latest.pid) {
            if matching > 1 {
                tracing::info!(server_name = %name, pid = latest.pid, dropped = matching - 1, "Collapsing duplicate process records");
                others.push(latest.clone());
                self.persist(&others);
            }
            return Some(latest);
        }

        tracing::info!(server_name = %name, pid = latest.pid, "Evicting stale process record");
        self.persist(&others);
        None
    }

    fn persist(&self, records: &[ProcessRecord]) {
        if let Err(e) = self.store.save(records) {
            tracing::warn!(error = %e, "Failed to persist repaired identity store");
        }
    }
}

/// Reads advisory CPU/memory figures for live processes.
#[derive(Clone)]
pub struct ResourceInspector {
    processes: Arc<dyn ProcessTable>,
}

impl ResourceInspector {
    pub fn new(processes: Arc<dyn ProcessTable>) -> Self {
        Self { processes }
    }

    /// Queries usage for `pid`.
    ///
    /// Fails only when the query tool itself fails; unparseable output
    /// yields zero usage.
    pub async fn usage(&self, pid: u32) -> Result<ResourceUsage> {
        let output = self.processes.query_usage(pid).await?;
        Ok(parse_usage(&output))
    }
}

/// Parses `ps -o %cpu,%mem` output: a header line, then a data line with
/// two numeric fields.
pub fn parse_usage(output: &str) -> ResourceUsage {
    let parsed = output.lines().nth(1).and_then(|line| {
        let mut fields = line.split_whitespace();
        let cpu = fields.next()?.parse::<f64>().ok()?;
        let mem = fields.next()?.parse::<f64>().ok()?;
        Some(ResourceUsage {
            cpu_percent: cpu,
            mem_percent: mem,
        })
    });

    parsed.unwrap_or_else(|| {
        tracing::debug!(output, "Unparseable resource usage, reporting zero");
        ResourceUsage::default()
    })
}
