//! Error type shared by allocation, transfer, and fill operations.
//!
//! Failures from the typed layer's own validation and raw statuses
//! reported by the driver both land in [`Error`], so callers see one
//! taxonomy regardless of which side rejected the operation. Statuses
//! from the runtime and the transform library are translated through
//! separate entry points because their numeric codes overlap.

use std::panic::Location;

use thiserror::Error;

/// Error raised by the typed memory layer.
///
/// Carries the failure [`ErrorKind`] boxed, plus the source location
/// where the error was raised.
#[derive(Debug, Error)]
#[error("{kind} (at {location})")]
pub struct Error {
    kind: Box<ErrorKind>,
    location: &'static Location<'static>,
}

impl Error {
    #[track_caller]
    fn new(kind: ErrorKind) -> Error {
        Error {
            kind: kind.into(),
            location: Location::caller(),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        self.kind.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.kind
    }

    /// Source location where the error was raised.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    #[cold]
    #[track_caller]
    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error::new(ErrorKind::InvalidArgument {
            name: name.into(),
            message: message.into(),
        })
    }

    #[cold]
    #[track_caller]
    pub fn allocation_failure(message: impl Into<String>) -> Error {
        Error::new(ErrorKind::AllocationFailure {
            message: message.into(),
        })
    }

    #[cold]
    #[track_caller]
    pub fn execution_failure(message: impl Into<String>) -> Error {
        Error::new(ErrorKind::ExecutionFailure {
            message: message.into(),
        })
    }

    /// Translates a failure status reported by the runtime driver.
    ///
    /// `context` names the operation that received the status. Codes
    /// outside the runtime's documented set map to
    /// [`ErrorKind::Unknown`].
    #[cold]
    #[track_caller]
    pub fn from_runtime_status(context: &str, status: ferry_driver::Status) -> Error {
        use ferry_driver::Status;

        let message = ferry_driver::error_string(status);
        match status {
            Status::ERROR_INVALID_VALUE
            | Status::ERROR_INVALID_POINTER
            | Status::ERROR_INVALID_HANDLE
            | Status::ERROR_OUT_OF_RANGE => Error::invalid_arg(context, message),
            Status::ERROR_OUT_OF_MEMORY => {
                Error::allocation_failure(format!("{context}: {message}"))
            }
            Status::ERROR_EXECUTION_FAILED => {
                Error::execution_failure(format!("{context}: {message}"))
            }
            _ => Error::new(ErrorKind::Unknown {
                domain: StatusDomain::Runtime,
                code: status.code(),
            }),
        }
    }

    /// Translates a failure status reported by the transform library.
    ///
    /// The transform library numbers its statuses independently of the
    /// runtime, so the same raw code lands on a different kind here.
    #[cold]
    #[track_caller]
    pub fn from_transform_status(context: &str, status: ferry_driver::transform::Status) -> Error {
        use ferry_driver::transform::Status;

        let message = ferry_driver::transform::error_string(status);
        match status {
            Status::ERROR_INVALID_PLAN
            | Status::ERROR_INVALID_VALUE
            | Status::ERROR_INVALID_SIZE
            | Status::ERROR_NOT_SUPPORTED => Error::invalid_arg(context, message),
            Status::ERROR_ALLOC_FAILED => {
                Error::allocation_failure(format!("{context}: {message}"))
            }
            Status::ERROR_INTERNAL | Status::ERROR_EXEC_FAILED | Status::ERROR_SETUP_FAILED => {
                Error::execution_failure(format!("{context}: {message}"))
            }
            _ => Error::new(ErrorKind::Unknown {
                domain: StatusDomain::Transform,
                code: status.code(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("allocation failure: {message}")]
    AllocationFailure { message: String },

    #[error("execution failure: {message}")]
    ExecutionFailure { message: String },

    #[error("unrecognized {domain} status code {code}")]
    Unknown { domain: StatusDomain, code: i32 },
}

/// Status namespace a raw driver code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusDomain {
    /// The runtime surface: allocation, transfer, and stream calls.
    Runtime,
    /// The transform library that shares the device.
    Transform,
}

impl std::fmt::Display for StatusDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StatusDomain::Runtime => "runtime",
            StatusDomain::Transform => "transform",
        })
    }
}
