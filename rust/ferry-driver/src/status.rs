//! Status codes returned by the runtime entry points.
//!
//! The runtime reports outcomes through plain numeric codes so the
//! boundary stays representable as a foreign interface. Codes outside
//! the set below may appear as the driver grows; callers are expected
//! to keep an explicit fallback for them.

/// Outcome of a runtime entry point.
///
/// The wrapped code is public so that values outside the known set can
/// be constructed and inspected.
///
/// # Examples
///
/// ```
/// use ferry_driver::{Status, error_string};
///
/// assert!(Status::SUCCESS.is_success());
/// assert_eq!(error_string(Status(-17)), "unrecognized status code");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Status(pub i32);

impl Status {
    /// The entry point completed.
    pub const SUCCESS: Status = Status(0);

    /// An argument was malformed, out of its domain, or inconsistent
    /// with the other arguments.
    pub const ERROR_INVALID_VALUE: Status = Status(1);

    /// The requested storage could not be provided.
    pub const ERROR_OUT_OF_MEMORY: Status = Status(2);

    /// A pointer argument does not name a live driver allocation of the
    /// required kind.
    pub const ERROR_INVALID_POINTER: Status = Status(3);

    /// A stream handle does not name a live stream.
    pub const ERROR_INVALID_HANDLE: Status = Status(4);

    /// A span reaches past the end of the tracked allocation that
    /// contains its start.
    pub const ERROR_OUT_OF_RANGE: Status = Status(5);

    /// An operation failed to execute.
    pub const ERROR_EXECUTION_FAILED: Status = Status(6);

    /// Returns the raw numeric code.
    #[inline]
    pub const fn code(self) -> i32 {
        self.0
    }

    /// Returns `true` for [`Status::SUCCESS`].
    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == Status::SUCCESS.0
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (status {})", error_string(*self), self.0)
    }
}

impl std::error::Error for Status {}

/// Returns a short description of a runtime status code.
///
/// Unknown codes produce a fixed fallback string rather than an error,
/// matching the behavior expected of a status-to-string entry point.
pub const fn error_string(status: Status) -> &'static str {
    match status {
        Status::SUCCESS => "no error",
        Status::ERROR_INVALID_VALUE => "invalid argument passed to a driver entry point",
        Status::ERROR_OUT_OF_MEMORY => "out of memory",
        Status::ERROR_INVALID_POINTER => "pointer does not name a live allocation",
        Status::ERROR_INVALID_HANDLE => "handle does not name a live stream",
        Status::ERROR_OUT_OF_RANGE => "operation exceeds the bounds of a tracked allocation",
        Status::ERROR_EXECUTION_FAILED => "an operation failed to execute",
        _ => "unrecognized status code",
    }
}

/// Shorthand for results carrying a runtime [`Status`] on failure.
pub type Result<T> = std::result::Result<T, Status>;
