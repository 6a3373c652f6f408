//! Canonical result codes and the immutable [`Status`] value.
//!
//! Every RPC terminates with exactly one `Status`. A `Status` can travel
//! through error chains as a [`StatusError`] and be recovered with
//! [`Status::from_error`].

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Wire key carrying the canonical status code as decimal ASCII.
pub const GRPC_STATUS_KEY: &str = "grpc-status";

/// Wire key carrying the UTF-8 status message.
pub const GRPC_MESSAGE_KEY: &str = "grpc-message";

/// Canonical gRPC status codes
/// (<https://grpc.github.io/grpc/core/md_doc_statuscodes.html>).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// The stable wire number of this code.
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Look up a code by its wire number.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::Cancelled),
            2 => Some(Self::Unknown),
            3 => Some(Self::InvalidArgument),
            4 => Some(Self::DeadlineExceeded),
            5 => Some(Self::NotFound),
            6 => Some(Self::AlreadyExists),
            7 => Some(Self::PermissionDenied),
            8 => Some(Self::ResourceExhausted),
            9 => Some(Self::FailedPrecondition),
            10 => Some(Self::Aborted),
            11 => Some(Self::OutOfRange),
            12 => Some(Self::Unimplemented),
            13 => Some(Self::Internal),
            14 => Some(Self::Unavailable),
            15 => Some(Self::DataLoss),
            16 => Some(Self::Unauthenticated),
            _ => None,
        }
    }

    /// Serialize for the `grpc-status` trailer: decimal ASCII.
    pub fn to_ascii(self) -> String {
        self.value().to_string()
    }

    /// Parse a `grpc-status` trailer value.
    ///
    /// Unknown or unparseable codes map to [`Code::Unknown`] with a warning.
    pub fn from_ascii(ascii: &[u8]) -> Self {
        let parsed = std::str::from_utf8(ascii)
            .ok()
            .and_then(|s| s.parse::<u8>().ok())
            .and_then(Self::from_value);
        match parsed {
            Some(code) => code,
            None => {
                tracing::warn!(value = ?String::from_utf8_lossy(ascii), "unknown status code");
                Self::Unknown
            }
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        };
        f.write_str(name)
    }
}

/// The status of a completed or failed operation: a code, an optional
/// description, and an optional cause.
///
/// Equality compares code and description; the cause is carried for
/// diagnostics only.
#[derive(Debug, Clone)]
pub struct Status {
    code: Code,
    description: Option<String>,
    cause: Option<Arc<dyn StdError + Send + Sync>>,
}

impl Status {
    /// A status with the given code and no description or cause.
    pub fn new(code: Code) -> Self {
        Self {
            code,
            description: None,
            cause: None,
        }
    }

    /// Attach a human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach the underlying cause.
    pub fn with_cause(mut self, cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.cause = Some(Arc::from(cause.into()));
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn cause(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|c| &**c as &(dyn StdError + 'static))
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// Override this status with another if allowed: if either side is OK
    /// the original wins, otherwise the new status replaces it.
    pub fn override_with(self, new_status: Status) -> Status {
        if self.code == Code::Ok || new_status.code == Code::Ok {
            self
        } else {
            new_status
        }
    }

    /// Recover a `Status` from an error by walking its source chain.
    ///
    /// The first [`StatusError`] found in the chain supplies the status;
    /// otherwise the error is wrapped as INTERNAL.
    pub fn from_error(err: &(dyn StdError + 'static)) -> Status {
        let mut current: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(e) = current {
            if let Some(status_err) = e.downcast_ref::<StatusError>() {
                return status_err.status().clone();
            }
            current = e.source();
        }
        Status::new(Code::Internal).with_description(err.to_string())
    }

    /// Convert into the error form carried through error chains.
    pub fn into_error(self) -> StatusError {
        StatusError(self)
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.description == other.description
    }
}

impl Eq for Status {}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(description) = &self.description {
            write!(f, ": {description}")?;
        }
        Ok(())
    }
}

/// An error carrying a [`Status`], the tagged "operation failure" form.
///
/// [`Status::from_error`] descends source chains looking for this type.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StatusError(Status);

impl StatusError {
    pub fn status(&self) -> &Status {
        &self.0
    }

    pub fn into_status(self) -> Status {
        self.0
    }
}

impl From<Status> for StatusError {
    fn from(status: Status) -> Self {
        StatusError(status)
    }
}
