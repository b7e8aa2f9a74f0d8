use std::{io, path::PathBuf};

use config::ConfigError as ConfigLoaderError;
use rmcp::model::ErrorData;
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Errors that can occur while loading or validating configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to build (read) the configuration file.
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: ConfigLoaderError,
    },
    /// Failed to deserialize TOML into a struct.
    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ConfigLoaderError,
    },
    /// Required field is missing.
    #[error("Configuration file {path} is missing `{field}`")]
    MissingField { path: PathBuf, field: &'static str },
    /// Field failed validation.
    #[error("Configuration file {path} has invalid `{field}`: {message}")]
    InvalidField {
        path: PathBuf,
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    /// Helper to wrap `config::ConfigError` as a read failure.
    pub fn from_read_error(path: PathBuf, source: ConfigLoaderError) -> Self {
        Self::FileRead { path, source }
    }

    /// Helper to wrap `config::ConfigError` as a parse failure.
    pub fn from_parse_error(path: PathBuf, source: ConfigLoaderError) -> Self {
        Self::Parse { path, source }
    }
}

/// Failures raised by the port ledger, allocator and registrar.
///
/// Malformed ledger lines are deliberately absent: the reader skips them.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The ledger (or its lock file) could not be read or written.
    #[error("Port ledger {operation} failed for {path}: {source}")]
    Storage {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Every probe landed on an occupied port.
    #[error(
        "No free port in range [{start}, {end}) after {attempts} attempts; widen the range or compact the ledger"
    )]
    AllocationExhausted { start: u16, end: u32, attempts: u32 },
    #[error("Invalid port range [{start}, {end}): start must be at least 1 and below end, end at most 65536")]
    InvalidRange { start: u32, end: u32 },
    #[error("Invalid port {port}: ports must be in 1-65535")]
    InvalidPort { port: u32 },
    #[error("max_attempts must be at least 1")]
    InvalidAttempts,
    #[error("Invalid service name {name:?}: {reason}")]
    InvalidServiceName { name: String, reason: &'static str },
    /// The registration sequence did not finish before its deadline.
    #[error("Registration against {path} timed out after {timeout_ms} ms")]
    RegistrationTimeout { path: PathBuf, timeout_ms: u128 },
}

impl RegistryError {
    pub fn storage(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Process exit code used when this error aborts server startup.
    pub const fn exit_code(&self) -> u8 {
        match self {
            RegistryError::AllocationExhausted { .. } => 45,
            RegistryError::Storage { .. } => 46,
            RegistryError::RegistrationTimeout { .. } => 47,
            RegistryError::InvalidRange { .. }
            | RegistryError::InvalidPort { .. }
            | RegistryError::InvalidAttempts
            | RegistryError::InvalidServiceName { .. } => 1,
        }
    }

    /// Structured descriptor for reporting to MCP clients and operators.
    pub const fn descriptor(&self) -> &'static ToolErrorDescriptor {
        match self {
            RegistryError::Storage { .. } => &LEDGER_STORAGE_ERROR,
            RegistryError::AllocationExhausted { .. } => &ALLOCATION_EXHAUSTED_ERROR,
            RegistryError::RegistrationTimeout { .. } => &REGISTRATION_TIMEOUT_ERROR,
            RegistryError::InvalidRange { .. }
            | RegistryError::InvalidPort { .. }
            | RegistryError::InvalidAttempts
            | RegistryError::InvalidServiceName { .. } => &INVALID_REGISTRATION_ERROR,
        }
    }

    pub const fn retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::RegistrationTimeout { .. } | RegistryError::Storage { .. }
        )
    }

    /// Convert into `ErrorData`, carrying the fields an operator needs to act.
    pub fn to_error_data(&self) -> ErrorData {
        let details = match self {
            RegistryError::Storage {
                operation, path, ..
            } => serde_json::json!({
                "operation": operation,
                "path": path.to_string_lossy(),
                "reason": self.to_string(),
            }),
            RegistryError::AllocationExhausted {
                start,
                end,
                attempts,
            } => serde_json::json!({
                "range_start": start,
                "range_end": end,
                "attempts": attempts,
            }),
            RegistryError::RegistrationTimeout { path, timeout_ms } => serde_json::json!({
                "path": path.to_string_lossy(),
                "timeout_ms": timeout_ms,
            }),
            _ => serde_json::json!({ "reason": self.to_string() }),
        };
        self.descriptor()
            .builder()
            .retryable(self.retryable())
            .details(details)
            .with_exit_code_value(self.exit_code())
            .build()
            .unwrap_or_else(|err| ErrorData::internal_error(err.to_string(), None))
    }
}

/// Structured error metadata returned by MCP tools and startup failures.
#[derive(Debug, Clone)]
pub struct ToolErrorDescriptor {
    /// Error code.
    pub code: &'static str,
    /// User-facing message.
    pub message: &'static str,
    /// Recommended remediation.
    pub remediation: &'static str,
}

impl ToolErrorDescriptor {
    /// Simple constructor.
    pub const fn new(code: &'static str, message: &'static str, remediation: &'static str) -> Self {
        Self {
            code,
            message,
            remediation,
        }
    }

    /// Create a builder.
    pub fn builder(&self) -> ToolErrorDescriptorBuilder<'_> {
        ToolErrorDescriptorBuilder::new(self)
    }
}

/// Builder for error data that fails if required fields are missing.
pub struct ToolErrorDescriptorBuilder<'a> {
    descriptor: &'a ToolErrorDescriptor,
    retryable: Option<bool>,
    details: Option<Value>,
    extra_fields: Map<String, Value>,
}

impl<'a> ToolErrorDescriptorBuilder<'a> {
    pub fn new(descriptor: &'a ToolErrorDescriptor) -> Self {
        Self {
            descriptor,
            retryable: None,
            details: None,
            extra_fields: Map::new(),
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_context_field(mut self, key: &str, value: Value) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }

    pub fn with_exit_code_value(mut self, exit_code: u8) -> Self {
        let numeric = Number::from(exit_code);
        self.extra_fields
            .insert("exit_code".into(), Value::Number(numeric));
        self
    }

    pub fn build(self) -> Result<ErrorData, ToolErrorBuilderError> {
        if self.descriptor.remediation.trim().is_empty() {
            return Err(ToolErrorBuilderError::MissingRemediation {
                code: self.descriptor.code,
            });
        }
        let retryable = self
            .retryable
            .ok_or(ToolErrorBuilderError::MissingRetryable {
                code: self.descriptor.code,
            })?;

        let mut data = Map::new();
        data.insert("code".into(), Value::String(self.descriptor.code.into()));
        data.insert(
            "remediation".into(),
            Value::String(self.descriptor.remediation.into()),
        );
        data.insert("retryable".into(), Value::Bool(retryable));
        if let Some(details) = self.details {
            data.insert("details".into(), details);
        }
        for (key, value) in self.extra_fields {
            data.insert(key, value);
        }

        Ok(ErrorData::invalid_params(
            self.descriptor.message,
            Some(Value::Object(data)),
        ))
    }
}

/// Errors when required builder fields are missing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolErrorBuilderError {
    #[error("retryable is missing (code={code})")]
    MissingRetryable { code: &'static str },
    #[error("remediation is empty (code={code})")]
    MissingRemediation { code: &'static str },
}

pub const LEDGER_STORAGE_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "LEDGER_STORAGE_ERROR",
    "The port ledger could not be read or written",
    "Check that the ledger path exists, is writable by this user, and that the disk is not full.",
);

pub const ALLOCATION_EXHAUSTED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "PORT_ALLOCATION_EXHAUSTED",
    "No free port was found in the configured range",
    "Widen [registry] range_start/range_end or run `mcp-swarm ports compact` to drop stale claims.",
);

pub const REGISTRATION_TIMEOUT_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "REGISTRATION_TIMEOUT",
    "Port registration did not complete in time",
    "Another process may be holding the ledger lock; retry or raise [registry] timeout_secs.",
);

pub const INVALID_REGISTRATION_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "INVALID_REGISTRATION",
    "The registration request is invalid",
    "Use a non-empty service name without `:` or line breaks and a valid port range.",
);

pub const SERVICE_NOT_REGISTERED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "SERVICE_NOT_REGISTERED",
    "The service has no entry in the port ledger",
    "Start the service (or register it) before looking up its port.",
);

/// Standard error when executed without an MCP client.
pub const MCP_CLIENT_REQUIRED_ERROR: ToolErrorDescriptor = ToolErrorDescriptor::new(
    "MCP_CLIENT_REQUIRED",
    "The stdio transport can only be driven by an MCP client",
    "Launch through an MCP client, or pass `--transport sse` / `--transport http` to listen on a port.",
);
