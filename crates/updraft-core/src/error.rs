use thiserror::Error;

use crate::version::{VersionParseError, VersionScheme};

/// Failure of a single endpoint invocation. Every variant is recoverable by
/// advancing the chain to the next endpoint.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EndpointError {
    #[error("Network failure during {operation}: {details}")]
    NetworkFailure {
        operation: &'static str,
        status: Option<u16>,
        details: String,
    },

    #[error("Malformed payload from {operation}: {details}")]
    MalformedPayload {
        operation: &'static str,
        details: String,
    },

    #[error(transparent)]
    MalformedVersion(#[from] VersionParseError),

    #[error("No qualifying release: {reason}")]
    NoQualifyingRelease { reason: String },

    #[error("No installable asset found in release {tag}")]
    MissingAsset { tag: String },
}

impl EndpointError {
    pub fn network(operation: &'static str, details: impl Into<String>) -> Self {
        Self::NetworkFailure {
            operation,
            status: None,
            details: details.into(),
        }
    }

    pub fn network_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::network(operation, error.to_string())
    }

    pub fn http_status(operation: &'static str, status: u16, details: impl Into<String>) -> Self {
        Self::NetworkFailure {
            operation,
            status: Some(status),
            details: details.into(),
        }
    }

    pub fn malformed(operation: &'static str, details: impl Into<String>) -> Self {
        Self::MalformedPayload {
            operation,
            details: details.into(),
        }
    }

    pub fn malformed_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::malformed(operation, error.to_string())
    }

    pub fn no_release(reason: impl Into<String>) -> Self {
        Self::NoQualifyingRelease {
            reason: reason.into(),
        }
    }

    pub fn missing_asset(tag: impl Into<String>) -> Self {
        Self::MissingAsset { tag: tag.into() }
    }

    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. })
    }
}

/// Terminal failure of a chain run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("All {attempted} endpoints failed; last error from {endpoint}: {last}")]
    AllEndpointsFailed {
        attempted: usize,
        endpoint: String,
        last: EndpointError,
    },
}

impl ChainError {
    #[must_use]
    pub fn last_error(&self) -> &EndpointError {
        match self {
            Self::AllEndpointsFailed { last, .. } => last,
        }
    }
}

/// Errors detected while assembling an updater, before any network activity.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Current version {version} does not match the {expected} version scheme")]
    SchemeMismatch {
        expected: VersionScheme,
        version: String,
    },

    #[error("Invalid current version: {0}")]
    InvalidCurrentVersion(#[source] VersionParseError),

    #[error("At least one endpoint is required")]
    EmptyChain,

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {field}: {details}")]
    Invalid {
        field: &'static str,
        details: String,
    },
}

impl ConfigError {
    pub fn invalid(field: &'static str, details: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            details: details.into(),
        }
    }
}
