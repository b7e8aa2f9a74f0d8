//! Shared-port registry: the ledger file, the random allocator and the
//! registrar that ties them together under an advisory lock.

pub mod allocator;
pub mod ledger;
pub mod registrar;

pub use allocator::{
    allocate, PortAllocator, PortRange, PortSource, RandomPortSource, ScriptedPortSource,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RANGE_END, DEFAULT_RANGE_START,
};
pub use ledger::{CompactionSummary, LedgerScan, PortLedger, PortLedgerEntry};
pub use registrar::{
    register_with_deadline, validate_service_name, LockMode, PortOrigin, Registration,
    RegistrationOptions, RegistrationPhase, ServiceRegistrar,
};
