//! Error types.
//!
//! There are specific error kinds (see [`ErrorKind`]) and one [`Error`] type carrying a kind
//! plus a human-readable message. Every fallible public operation returns [`Result`].

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};

/// Alias for `Result<T, Error>`, used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of failure a [`Error`] represents.
///
/// These are deliberately coarse; callers match on the kind and read the message for detail.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// An operation was attempted against state that doesn't support it (e.g. a destroyed
    /// world, or reading a missing component).
    InvalidOperation,
    /// An argument was null, out of range, or otherwise malformed.
    InvalidArgument,
    /// The object this call targets has already been torn down.
    Disposed,
    /// A referenced service or context entry could not be found.
    NotFound,
    /// The requested operation or format is not supported (e.g. no formatter registered).
    Unsupported,
    /// Snapshot data failed to parse (bad magic, truncated stream, etc).
    CorruptData,
    /// A system ordering constraint formed a cycle.
    DependencyCycle,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidOperation => "invalid operation",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Disposed => "disposed",
            ErrorKind::NotFound => "not found",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::CorruptData => "corrupt data",
            ErrorKind::DependencyCycle => "dependency cycle",
        };
        f.write_str(s)
    }
}

/// The ZenECS error type.
///
/// Carries an [`ErrorKind`] plus a message. Messages follow the `"world.N: ..."` convention from
/// the write-denial/error-reporting contract when a world context is available.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Creates a new error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The error's message, without the kind prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidOperation, message)
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument, message)
    }

    pub(crate) fn disposed(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Disposed, message)
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, message)
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Unsupported, message)
    }

    pub(crate) fn corrupt_data(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::CorruptData, message)
    }

    pub(crate) fn dependency_cycle(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::DependencyCycle, message)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Error {}
