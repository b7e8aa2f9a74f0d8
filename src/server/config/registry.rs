use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    lib::errors::ConfigError,
    registry::{
        LockMode, PortRange, RegistrationOptions, DEFAULT_MAX_ATTEMPTS, DEFAULT_RANGE_END,
        DEFAULT_RANGE_START,
    },
};

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Ledger location and allocation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySection {
    /// Ledger path as written in the config; resolved later against CLI/env.
    pub ledger_path: Option<PathBuf>,
    pub range: PortRange,
    pub max_attempts: u32,
    pub lock: bool,
    /// `None` disables the bound.
    pub timeout: Option<Duration>,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            ledger_path: None,
            range: PortRange::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lock: true,
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

impl RegistrySection {
    pub fn options(&self) -> RegistrationOptions {
        RegistrationOptions {
            range: self.range,
            max_attempts: self.max_attempts,
            lock_mode: if self.lock {
                LockMode::Advisory
            } else {
                LockMode::Unlocked
            },
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawRegistrySection {
    pub ledger_path: Option<PathBuf>,
    pub range_start: Option<i64>,
    pub range_end: Option<i64>,
    pub max_attempts: Option<i64>,
    pub lock: Option<bool>,
    pub timeout_secs: Option<u64>,
}

pub fn parse_registry_section(
    raw: Option<RawRegistrySection>,
    path: &Path,
) -> Result<RegistrySection, ConfigError> {
    let raw = raw.unwrap_or_default();
    let invalid = |field: &'static str, message: String| ConfigError::InvalidField {
        path: path.to_path_buf(),
        field,
        message,
    };

    let ledger_path = match raw.ledger_path {
        Some(ledger) if ledger.as_os_str().is_empty() => {
            return Err(invalid(
                "registry.ledger_path",
                "must not be empty".into(),
            ))
        }
        other => other,
    };

    let start = raw.range_start.unwrap_or(i64::from(DEFAULT_RANGE_START));
    let end = raw.range_end.unwrap_or(i64::from(DEFAULT_RANGE_END));
    let range = u32::try_from(start)
        .ok()
        .zip(u32::try_from(end).ok())
        .and_then(|(start, end)| PortRange::new(start, end).ok())
        .ok_or_else(|| {
            invalid(
                "registry.range_start",
                format!("[{start}, {end}) is not a valid port range (1 <= start < end <= 65536)"),
            )
        })?;

    let max_attempts = raw
        .max_attempts
        .map(|value| u32::try_from(value).ok().filter(|value| *value > 0))
        .unwrap_or(Some(DEFAULT_MAX_ATTEMPTS))
        .ok_or_else(|| invalid("registry.max_attempts", "must be at least 1".into()))?;

    let timeout = match raw.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS) {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    Ok(RegistrySection {
        ledger_path,
        range,
        max_attempts,
        lock: raw.lock.unwrap_or(true),
        timeout,
    })
}
