//! Status codes of the transform library that shares the device.
//!
//! The transform library is a separate native component with its own
//! numbering; a given code means different things in the two domains.
//! Executing transforms is outside this crate, only the status surface
//! crosses the boundary so callers can fold both domains into one error
//! taxonomy.

/// Outcome of a transform library entry point.
///
/// Distinct from the runtime [`Status`](crate::Status): the numeric
/// codes overlap but their meanings do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Status(pub i32);

impl Status {
    /// The entry point completed.
    pub const SUCCESS: Status = Status(0);

    /// The plan handle does not describe a usable transform.
    pub const ERROR_INVALID_PLAN: Status = Status(1);

    /// The library failed to allocate device or host memory.
    pub const ERROR_ALLOC_FAILED: Status = Status(2);

    /// A pointer or parameter was invalid.
    pub const ERROR_INVALID_VALUE: Status = Status(3);

    /// The library hit a driver or internal failure.
    pub const ERROR_INTERNAL: Status = Status(4);

    /// A transform failed to execute on the device.
    pub const ERROR_EXEC_FAILED: Status = Status(5);

    /// The library failed to initialize.
    pub const ERROR_SETUP_FAILED: Status = Status(6);

    /// The transform size is not supported.
    pub const ERROR_INVALID_SIZE: Status = Status(7);

    /// The requested operation is not implemented.
    pub const ERROR_NOT_SUPPORTED: Status = Status(8);

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

/// Returns a short description of a transform library status code.
///
/// Unknown codes produce a fixed fallback string rather than an error.
pub const fn error_string(status: Status) -> &'static str {
    match status {
        Status::SUCCESS => "no error",
        Status::ERROR_INVALID_PLAN => "the plan handle does not describe a usable transform",
        Status::ERROR_ALLOC_FAILED => "the transform library failed to allocate device or host memory",
        Status::ERROR_INVALID_VALUE => "invalid pointer or parameter passed to the transform library",
        Status::ERROR_INTERNAL => "driver or internal transform library error",
        Status::ERROR_EXEC_FAILED => "failed to execute a transform on the device",
        Status::ERROR_SETUP_FAILED => "the transform library failed to initialize",
        Status::ERROR_INVALID_SIZE => "the transform size is not supported",
        Status::ERROR_NOT_SUPPORTED => "the requested operation is not implemented",
        _ => "unknown transform error",
    }
}

/// Shorthand for results carrying a transform [`Status`] on failure.
pub type Result<T> = std::result::Result<T, Status>;
