//! Append-only `name:port` ledger shared by every server on the host.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{debug, info};

use crate::lib::{errors::RegistryError, fs as ledger_fs};

/// One `name:port` line of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortLedgerEntry {
    pub service_name: String,
    pub port: u16,
}

impl PortLedgerEntry {
    /// Parse a single line. Returns `None` for anything that is not `name:port`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let (name, port_text) = line.split_once(':')?;
        let port = port_text.trim().parse::<u16>().ok().filter(|port| *port != 0)?;
        Some(Self {
            service_name: name.to_string(),
            port,
        })
    }

    pub fn to_line(&self) -> String {
        format!("{}:{}\n", self.service_name, self.port)
    }
}

/// Result of replaying the ledger in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerScan {
    pub entries: Vec<PortLedgerEntry>,
    /// Non-blank lines that did not parse. Diagnostic only.
    pub skipped_lines: usize,
}

impl LedgerScan {
    /// Every port named by any line, whoever claimed it.
    pub fn occupied_ports(&self) -> BTreeSet<u16> {
        self.entries.iter().map(|entry| entry.port).collect()
    }

    /// Latest entry per service, ordered by each service's last appearance.
    pub fn latest_entries(&self) -> Vec<PortLedgerEntry> {
        let mut last_index = HashMap::new();
        for (index, entry) in self.entries.iter().enumerate() {
            last_index.insert(entry.service_name.as_str(), index);
        }
        self.entries
            .iter()
            .enumerate()
            .filter(|(index, entry)| last_index.get(entry.service_name.as_str()) == Some(index))
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn latest_port(&self, service_name: &str) -> Option<u16> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.service_name == service_name)
            .map(|entry| entry.port)
    }
}

/// Summary of an explicit compaction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompactionSummary {
    pub lines_before: usize,
    pub lines_after: usize,
    pub skipped_lines: usize,
}

/// Handle on the ledger file. Holds no state besides the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLedger {
    path: PathBuf,
}

impl PortLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        ledger_fs::lock_path_for(&self.path)
    }

    /// Replay every line. A missing file is an empty ledger.
    pub fn scan(&self) -> Result<LedgerScan, RegistryError> {
        let contents = ledger_fs::read_if_exists(&self.path)
            .map_err(|err| RegistryError::storage("read", &self.path, err))?;
        let Some(contents) = contents else {
            return Ok(LedgerScan::default());
        };

        let mut scan = LedgerScan::default();
        for (index, raw) in contents.split(|byte| *byte == b'\n').enumerate() {
            // A line that is not UTF-8 is malformed like any other.
            let line = std::str::from_utf8(raw).unwrap_or("\u{fffd}");
            if line.trim().is_empty() {
                continue;
            }
            match PortLedgerEntry::parse_line(line) {
                Some(entry) => scan.entries.push(entry),
                None => {
                    scan.skipped_lines += 1;
                    debug!(
                        target: "mcp_swarm::registry",
                        path = %self.path.display(),
                        line_number = index + 1,
                        line,
                        "Skipping malformed ledger line"
                    );
                }
            }
        }
        Ok(scan)
    }

    pub fn read_occupied_ports(&self) -> Result<BTreeSet<u16>, RegistryError> {
        Ok(self.scan()?.occupied_ports())
    }

    pub fn latest_port(&self, service_name: &str) -> Result<Option<u16>, RegistryError> {
        Ok(self.scan()?.latest_port(service_name))
    }

    pub fn latest_entries(&self) -> Result<Vec<PortLedgerEntry>, RegistryError> {
        Ok(self.scan()?.latest_entries())
    }

    /// Append one claim. No occupancy check happens here.
    pub fn append_entry(&self, service_name: &str, port: u16) -> Result<(), RegistryError> {
        let entry = PortLedgerEntry {
            service_name: service_name.to_string(),
            port,
        };
        ledger_fs::append_line(&self.path, &entry.to_line())
            .map_err(|err| RegistryError::storage("append", &self.path, err))
    }

    /// Rewrite the ledger keeping only the latest claim per service.
    ///
    /// Must be invoked explicitly. Holds the advisory lock for the whole
    /// rewrite, so concurrent registrations wait instead of interleaving.
    pub fn compact(&self) -> Result<CompactionSummary, RegistryError> {
        let lock_path = self.lock_path();
        let _lock = match ledger_fs::LedgerLock::acquire(&lock_path, None)
            .map_err(|err| RegistryError::storage("lock", &lock_path, err))?
        {
            ledger_fs::LockAttempt::Acquired(lock) => lock,
            ledger_fs::LockAttempt::TimedOut => {
                return Err(RegistryError::RegistrationTimeout {
                    path: lock_path,
                    timeout_ms: 0,
                })
            }
        };

        let exists = self
            .path
            .try_exists()
            .map_err(|err| RegistryError::storage("read", &self.path, err))?;
        let scan = self.scan()?;
        let latest = scan.latest_entries();
        let summary = CompactionSummary {
            lines_before: scan.entries.len() + scan.skipped_lines,
            lines_after: latest.len(),
            skipped_lines: scan.skipped_lines,
        };
        if !exists {
            return Ok(summary);
        }

        let contents: String = latest.iter().map(PortLedgerEntry::to_line).collect();
        ledger_fs::replace_atomically(&self.path, &contents)
            .map_err(|err| RegistryError::storage("compact", &self.path, err))?;

        info!(
            target: "mcp_swarm::registry",
            path = %self.path.display(),
            lines_before = summary.lines_before,
            lines_after = summary.lines_after,
            "Compacted port ledger"
        );
        Ok(summary)
    }
}
