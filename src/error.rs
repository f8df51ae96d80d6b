//! Provider-agnostic error kinds and the orchestrator error type.
//!
//! Collaborators report failures as [`ProviderError`] values carrying the
//! provider's error code. The orchestrator classifies those codes into an
//! [`ErrorKind`] so callers can map failures onto transport status codes
//! without knowing anything about the underlying provider.

use std::fmt;

use thiserror::Error;

/// Coarse classification of every failure surfaced by the orchestrator.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// Malformed or invalid input, including unknown enum values.
    BadRequest,
    /// Resource, sub-resource, or tenant scope mismatch.
    NotFound,
    /// Resource is not in the lifecycle state the operation requires.
    Conflict,
    /// Scope or credential acquisition failed.
    Forbidden,
    /// Provider-side quota exhausted.
    LimitExceeded,
    /// Transient provider failure.
    ServiceUnavailable,
    /// Unexpected or unmapped failure.
    InternalError,
}

impl ErrorKind {
    /// Returns the HTTP status code used when the error is surfaced
    /// synchronously.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::LimitExceeded => 429,
            Self::InternalError => 500,
            Self::ServiceUnavailable => 503,
        }
    }

    /// Classifies a provider error code.
    ///
    /// Unknown codes are treated as [`ErrorKind::InternalError`].
    #[must_use]
    pub fn from_provider_code(code: &str) -> Self {
        match code {
            "Forbidden" | "AccessDenied" => Self::Forbidden,
            "AccessPointAlreadyExists"
            | "FileSystemAlreadyExists"
            | "FileSystemInUse"
            | "IpAddressInUse"
            | "MountTargetConflict"
            | "EntityAlreadyExists"
            | "Conflict" => Self::Conflict,
            "AccessPointNotFound" | "FileSystemNotFound" | "MountTargetNotFound"
            | "NoSuchEntity" | "NotFound" => Self::NotFound,
            "BadRequest"
            | "IncorrectFileSystemLifeCycleState"
            | "IncorrectMountTargetState"
            | "InsufficientThroughputCapacity"
            | "InvalidPolicyException"
            | "PolicyNotFound"
            | "SecurityGroupLimitExceeded"
            | "SecurityGroupNotFound"
            | "SubnetNotFound"
            | "UnsupportedAvailabilityZone"
            | "ValidationException"
            | "MalformedPolicyDocument" => Self::BadRequest,
            "AccessPointLimitExceeded"
            | "FileSystemLimitExceeded"
            | "NetworkInterfaceLimitExceeded"
            | "NoFreeAddressesInSubnet"
            | "ThroughputLimitExceeded"
            | "TooManyRequests"
            | "LimitExceeded" => Self::LimitExceeded,
            "DependencyTimeout" | "ServiceUnavailable" | "Throttling" => Self::ServiceUnavailable,
            _ => Self::InternalError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BadRequest => "bad request",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::LimitExceeded => "limit exceeded",
            Self::ServiceUnavailable => "service unavailable",
            Self::InternalError => "internal error",
        };
        formatter.write_str(label)
    }
}

/// Failure reported by a control-plane or identity collaborator.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    /// Provider error code (for example `FileSystemNotFound`).
    pub code: String,
    /// Human-readable provider message.
    pub message: String,
}

impl ProviderError {
    /// Builds a provider error from a code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for a `NotFound` provider code.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NotFound", message)
    }

    /// Returns the classified kind of this provider error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_provider_code(&self.code)
    }

    /// Returns `true` when the provider reported a missing entity.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Error returned by every orchestrator operation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{kind}: {message}")]
pub struct ProvisionError {
    /// Classification used for status mapping.
    pub kind: ErrorKind,
    /// Human-readable description, recorded verbatim on failed tasks.
    pub message: String,
}

impl ProvisionError {
    /// Builds an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Builds a [`ErrorKind::BadRequest`] error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// Builds a [`ErrorKind::NotFound`] error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Builds a [`ErrorKind::Conflict`] error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Builds a [`ErrorKind::InternalError`] error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Wraps a provider failure, classifying its code and prefixing the
    /// message with the operation that failed.
    #[must_use]
    pub fn from_provider(context: &str, err: &ProviderError) -> Self {
        Self::new(err.kind(), format!("{context}: {err}"))
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.kind.http_status()
    }
}

/// Extension for attaching operation context to provider results.
pub trait ProviderResultExt<T> {
    /// Converts a provider failure into a [`ProvisionError`] described by
    /// `context`.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ProvisionError`] when `self` is an error.
    fn context(self, context: &str) -> Result<T, ProvisionError>;
}

impl<T> ProviderResultExt<T> for Result<T, ProviderError> {
    fn context(self, context: &str) -> Result<T, ProvisionError> {
        self.map_err(|err| ProvisionError::from_provider(context, &err))
    }
}
