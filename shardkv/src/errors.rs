use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Error kinds for shardkv operations
///
/// Each kind names a category of failure so callers can match on it instead of
/// parsing messages. Absent keys and empty ranges are not errors: they are
/// reported as `None` and `0` respectively.
///
/// # Examples
///
/// ```rust
/// use shardkv::errors::{ErrorKind, KvError, KvResult};
///
/// fn example() -> KvResult<()> {
///     Err(KvError::new("shard count must be positive", ErrorKind::InvalidConfiguration))
/// }
/// assert!(example().is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Operation Errors
    /// The operation is not valid in the current context
    InvalidOperation,

    // Configuration Errors
    /// A configuration key is unknown or its value cannot be parsed
    InvalidConfiguration,
    /// A store was reopened or reloaded with parameters that differ from the
    /// ones it was created with
    ConfigurationConflict,

    // Persistence Errors
    /// Saving or loading a store image failed
    PersistenceFailure,
    /// No saved image exists for the store
    ImageNotFound,
    /// The store is neither resident, saved nor declared
    StoreNotFound,

    // IO Errors
    /// Generic IO error
    IOError,
    /// The file was not found
    FileNotFound,
    /// Permission denied for file operation
    PermissionDenied,
    /// File data is corrupted
    FileCorrupted,

    // Data Encoding Errors
    /// Error encoding or decoding data
    EncodingError,
    /// A stored value has the wrong shape for the operation
    InvalidDataType,

    // Memory Errors
    /// The virtual memory manager cannot satisfy an allocation
    AllocationFailure,

    // Lifecycle Errors
    /// The store has been removed from its registry or closed
    StoreClosed,
    /// The registry has been closed
    RegistryClosed,

    // Backend Errors
    /// Error from a persistence backend
    BackendError,

    // Extension Errors - allows adapter crates to plug in their own error types
    /// Error from an extension crate (e.g. "fjall")
    Extension(String),

    // Generic/Internal Errors
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::InvalidConfiguration => write!(f, "Invalid configuration"),
            ErrorKind::ConfigurationConflict => write!(f, "Configuration conflict"),
            ErrorKind::PersistenceFailure => write!(f, "Persistence failure"),
            ErrorKind::ImageNotFound => write!(f, "Image not found"),
            ErrorKind::StoreNotFound => write!(f, "Store not found"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::FileNotFound => write!(f, "File not found"),
            ErrorKind::PermissionDenied => write!(f, "Permission denied"),
            ErrorKind::FileCorrupted => write!(f, "File corrupted"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::InvalidDataType => write!(f, "Invalid data type"),
            ErrorKind::AllocationFailure => write!(f, "Allocation failure"),
            ErrorKind::StoreClosed => write!(f, "Store closed"),
            ErrorKind::RegistryClosed => write!(f, "Registry closed"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::Extension(name) => write!(f, "{} error", name),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Error type for all fallible shardkv operations.
///
/// `KvError` carries a message, an [`ErrorKind`], an optional cause and the
/// backtrace captured where it was created. Causes chain, so an I/O failure
/// inside a save surfaces as a `PersistenceFailure` whose cause is the
/// original `IOError`.
///
/// # Examples
///
/// ```rust
/// use shardkv::errors::{ErrorKind, KvError};
///
/// let cause = KvError::new("disk full", ErrorKind::IOError);
/// let err = KvError::new_with_cause("failed to save store", ErrorKind::PersistenceFailure, cause);
/// assert_eq!(err.kind(), &ErrorKind::PersistenceFailure);
/// assert!(err.cause().is_some());
/// ```
#[derive(Clone)]
pub struct KvError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<KvError>>,
    backtrace: Atomic<Backtrace>,
}

impl KvError {
    /// Creates a new `KvError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        KvError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `KvError` wrapping the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: KvError) -> Self {
        KvError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&KvError> {
        self.cause.as_deref()
    }
}

impl Display for KvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for KvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace.read()),
        }
    }
}

impl Error for KvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for shardkv operations.
pub type KvResult<T> = Result<T, KvError>;

impl From<std::io::Error> for KvError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData => {
                ErrorKind::FileCorrupted
            }
            _ => ErrorKind::IOError,
        };
        KvError::new(&format!("IO error: {}", err), error_kind)
    }
}

impl From<std::string::FromUtf8Error> for KvError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        KvError::new(
            &format!("UTF-8 encoding error: {}", err),
            ErrorKind::EncodingError,
        )
    }
}

impl From<std::str::Utf8Error> for KvError {
    fn from(err: std::str::Utf8Error) -> Self {
        KvError::new(
            &format!("UTF-8 encoding error: {}", err),
            ErrorKind::EncodingError,
        )
    }
}

impl From<std::num::ParseIntError> for KvError {
    fn from(err: std::num::ParseIntError) -> Self {
        KvError::new(
            &format!("Integer parsing error: {}", err),
            ErrorKind::InvalidDataType,
        )
    }
}

impl From<std::num::ParseFloatError> for KvError {
    fn from(err: std::num::ParseFloatError) -> Self {
        KvError::new(
            &format!("Float parsing error: {}", err),
            ErrorKind::InvalidDataType,
        )
    }
}

impl From<bincode::error::EncodeError> for KvError {
    fn from(err: bincode::error::EncodeError) -> Self {
        match err {
            bincode::error::EncodeError::Io { inner, .. } => KvError::from(inner),
            other => KvError::new(
                &format!("Image encoding error: {}", other),
                ErrorKind::EncodingError,
            ),
        }
    }
}

impl From<bincode::error::DecodeError> for KvError {
    fn from(err: bincode::error::DecodeError) -> Self {
        match err {
            bincode::error::DecodeError::Io { inner, .. } => KvError::from(inner),
            other => KvError::new(
                &format!("Image decoding error: {}", other),
                ErrorKind::FileCorrupted,
            ),
        }
    }
}

impl From<String> for KvError {
    fn from(msg: String) -> Self {
        KvError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for KvError {
    fn from(msg: &str) -> Self {
        KvError::new(msg, ErrorKind::InternalError)
    }
}
