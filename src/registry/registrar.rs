//! One-shot "claim a port for this service" sequence run at server startup.

use std::{
    thread,
    time::{Duration, Instant},
};

use serde::Serialize;

use super::{
    allocator::{PortAllocator, PortRange, PortSource, RandomPortSource, DEFAULT_MAX_ATTEMPTS},
    ledger::PortLedger,
};
use crate::lib::{
    errors::RegistryError,
    fs::{LedgerLock, LockAttempt},
    telemetry::RegistrationSpan,
};

/// Whether read-allocate-append runs under the ledger's advisory lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    #[default]
    Advisory,
    /// No cross-process exclusion. Two concurrent registrations may claim
    /// the same port.
    Unlocked,
}

/// Per-process registration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPhase {
    Unregistered,
    Allocating,
    Registered,
    Failed,
}

impl RegistrationPhase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RegistrationPhase::Unregistered => "unregistered",
            RegistrationPhase::Allocating => "allocating",
            RegistrationPhase::Registered => "registered",
            RegistrationPhase::Failed => "failed",
        }
    }
}

/// How the registered port was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortOrigin {
    Explicit,
    Allocated,
}

impl PortOrigin {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PortOrigin::Explicit => "explicit",
            PortOrigin::Allocated => "allocated",
        }
    }
}

/// Successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub service_name: String,
    pub port: u16,
    pub origin: PortOrigin,
}

/// Tunables for a registration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationOptions {
    pub range: PortRange,
    pub max_attempts: u32,
    pub lock_mode: LockMode,
    /// Upper bound on the whole sequence. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            range: PortRange::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lock_mode: LockMode::Advisory,
            timeout: None,
        }
    }
}

/// Reject names that would corrupt the `name:port` line format.
pub fn validate_service_name(name: &str) -> Result<(), RegistryError> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.contains(':') {
        Some("must not contain `:`")
    } else if name.contains(['\n', '\r']) {
        Some("must not contain line breaks")
    } else if name.trim() != name {
        Some("must not start or end with whitespace")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(RegistryError::InvalidServiceName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Claims one port for one service. Consumed by [`ServiceRegistrar::register`].
pub struct ServiceRegistrar<S: PortSource = RandomPortSource> {
    ledger: PortLedger,
    options: RegistrationOptions,
    source: S,
    /// Every phase entered so far, starting at `Unregistered`.
    phases: Vec<RegistrationPhase>,
    pause_after_read: Option<Duration>,
}

impl ServiceRegistrar {
    pub fn new(ledger: PortLedger, options: RegistrationOptions) -> Self {
        Self::with_source(ledger, options, RandomPortSource::new())
    }
}

impl<S: PortSource> ServiceRegistrar<S> {
    pub fn with_source(ledger: PortLedger, options: RegistrationOptions, source: S) -> Self {
        Self {
            ledger,
            options,
            source,
            phases: vec![RegistrationPhase::Unregistered],
            pause_after_read: None,
        }
    }

    /// Sleep between reading the ledger and appending. Widens the race
    /// window for concurrency tests.
    pub fn pause_after_read(mut self, pause: Duration) -> Self {
        self.pause_after_read = Some(pause);
        self
    }

    /// Claim a port for `service_name`.
    ///
    /// An explicit port is appended as-is, even if another line already names
    /// it. Otherwise the occupied set is read, a free port drawn and appended.
    /// On success exactly one line is appended; on failure none.
    pub fn register(
        self,
        service_name: &str,
        explicit_port: Option<u16>,
    ) -> Result<Registration, RegistryError> {
        self.register_with_phases(service_name, explicit_port).0
    }

    /// [`register`](Self::register), also returning the phases entered in order.
    pub fn register_with_phases(
        mut self,
        service_name: &str,
        explicit_port: Option<u16>,
    ) -> (Result<Registration, RegistryError>, Vec<RegistrationPhase>) {
        let span = RegistrationSpan::start(service_name, &self.ledger.path().to_string_lossy());
        let result = match self.run(service_name, explicit_port, &span) {
            Ok(registration) => {
                self.enter(RegistrationPhase::Registered, &span);
                span.succeed(registration.port, registration.origin.as_str());
                Ok(registration)
            }
            Err(err) => {
                self.enter(RegistrationPhase::Failed, &span);
                span.fail(&err.to_string());
                Err(err)
            }
        };
        (result, self.phases)
    }

    fn enter(&mut self, phase: RegistrationPhase, span: &RegistrationSpan) {
        self.phases.push(phase);
        span.phase(phase.as_str());
    }

    fn run(
        &mut self,
        service_name: &str,
        explicit_port: Option<u16>,
        span: &RegistrationSpan,
    ) -> Result<Registration, RegistryError> {
        validate_service_name(service_name)?;
        let allocator = PortAllocator::new(self.options.range, self.options.max_attempts)?;
        if explicit_port == Some(0) {
            return Err(RegistryError::InvalidPort { port: 0 });
        }
        // A bound too large to represent is no bound at all.
        let deadline = self
            .options
            .timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));

        let _lock = self.acquire_lock(deadline)?;

        let (port, origin) = match explicit_port {
            Some(port) => (port, PortOrigin::Explicit),
            None => {
                self.enter(RegistrationPhase::Allocating, span);
                let occupied = self.ledger.read_occupied_ports()?;
                let port = allocator.allocate(&occupied, &mut self.source)?;
                (port, PortOrigin::Allocated)
            }
        };

        if let Some(pause) = self.pause_after_read {
            thread::sleep(pause);
        }
        self.ensure_before_deadline(deadline)?;
        self.ledger.append_entry(service_name, port)?;

        Ok(Registration {
            service_name: service_name.to_string(),
            port,
            origin,
        })
    }

    fn acquire_lock(&self, deadline: Option<Instant>) -> Result<Option<LedgerLock>, RegistryError> {
        if self.options.lock_mode == LockMode::Unlocked {
            return Ok(None);
        }
        let lock_path = self.ledger.lock_path();
        match LedgerLock::acquire(&lock_path, deadline)
            .map_err(|err| RegistryError::storage("lock", &lock_path, err))?
        {
            LockAttempt::Acquired(lock) => {
                tracing::debug!(
                    target: "mcp_swarm::registry",
                    lock_path = %lock.path().display(),
                    "Acquired ledger lock"
                );
                Ok(Some(lock))
            }
            LockAttempt::TimedOut => Err(self.timeout_error()),
        }
    }

    fn ensure_before_deadline(&self, deadline: Option<Instant>) -> Result<(), RegistryError> {
        match deadline {
            Some(deadline) if Instant::now() >= deadline => Err(self.timeout_error()),
            _ => Ok(()),
        }
    }

    fn timeout_error(&self) -> RegistryError {
        RegistryError::RegistrationTimeout {
            path: self.ledger.path().to_path_buf(),
            timeout_ms: self
                .options
                .timeout
                .map(|timeout| timeout.as_millis())
                .unwrap_or_default(),
        }
    }
}

/// Run a blocking registration on the runtime's blocking pool, bounded by the
/// registrar's timeout.
pub async fn register_with_deadline<S>(
    registrar: ServiceRegistrar<S>,
    service_name: String,
    explicit_port: Option<u16>,
) -> Result<Registration, RegistryError>
where
    S: PortSource + Send + 'static,
{
    let timeout = registrar.options.timeout;
    let ledger_path = registrar.ledger.path().to_path_buf();
    let task =
        tokio::task::spawn_blocking(move || registrar.register(&service_name, explicit_port));

    let joined = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, task).await.map_err(|_| {
            RegistryError::RegistrationTimeout {
                path: ledger_path.clone(),
                timeout_ms: timeout.as_millis(),
            }
        })?,
        None => task.await,
    };
    joined.map_err(|err| {
        RegistryError::storage(
            "register",
            ledger_path,
            std::io::Error::other(err.to_string()),
        )
    })?
}
