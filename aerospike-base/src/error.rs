// Error taxonomy for the cluster client core (spec §7).
//
// Follows the same shape the rest of the workspace uses: wrap the
// underlying cause in a backtrace-carrying box and log it once at
// construction time. On top of that we add the finite `ErrorKind`
// taxonomy, an `in_doubt` flag for writes that may or may not have
// landed server-side, and an origin tag captured with
// `#[track_caller]` so every raised error remembers where it was born.

use std::borrow::Cow;
use std::fmt;
use std::panic::Location;

use backtrace_error::DynBacktraceError;
use tracing::error;

#[cfg(test)]
use test_log::test;

/// The finite set of error kinds the client can surface (spec §7).
///
/// External code matches on this enum to decide whether to retry,
/// surface to the user, or treat a batch/scan sub-error specially.
/// Stable: add new variants, never repurpose one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Ok,
    Timeout,
    Client,
    Connection,
    AsyncConnection,
    InvalidNode,
    NoMoreConnections,
    Cluster,
    NamespaceNotFound,
    RecordNotFound,
    RecordAlreadyExists,
    GenerationMismatch,
    KeyMismatch,
    BinNameTooLong,
    Param,
    Udf,
    BatchFailed,
    TxnFailed,
    TxnAlreadyCommitted,
    TxnAlreadyAborted,
    MrtAborted,
    QueueFull,
    Unavailable,
    Unknown,
}

impl ErrorKind {
    /// Kinds the command loop may consume locally and retry (spec §7
    /// Propagation); everything else must surface to the caller
    /// unchanged.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::Connection
                | ErrorKind::AsyncConnection
                | ErrorKind::InvalidNode
                | ErrorKind::Cluster
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
#[allow(dead_code)]
pub struct Error {
    kind: ErrorKind,
    in_doubt: bool,
    origin: &'static Location<'static>,
    inner: DynBacktraceError,
}

pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl Error {
    #[track_caller]
    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        let origin = Location::caller();
        error!(target: "aerospike", kind = %kind, origin = %origin, "{:?}", err);
        Error {
            kind,
            in_doubt: false,
            origin,
            inner: DynBacktraceError::from(err),
        }
    }

    #[track_caller]
    pub fn msg(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
        Self::new(kind, SimpleErr(msg.into()))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn in_doubt(&self) -> bool {
        self.in_doubt
    }

    /// Marks the write this error describes as possibly-applied
    /// server-side. Sticky: once set on a transaction's last error it
    /// stays set until the transaction commits (spec §4.9, §8 #8).
    pub fn with_in_doubt(mut self, in_doubt: bool) -> Self {
        self.in_doubt = in_doubt;
        self
    }

    pub fn origin(&self) -> &'static Location<'static> {
        self.origin
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (at {})", self.kind, self.inner, self.origin)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

#[track_caller]
pub fn err(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::msg(kind, msg)
}

#[test]
fn test_error_kind_retryable() {
    assert!(ErrorKind::Timeout.is_retryable());
    assert!(!ErrorKind::RecordNotFound.is_retryable());
}

#[test]
fn test_in_doubt_sticky_by_default_false() {
    let e = err(ErrorKind::Connection, "boom");
    assert!(!e.in_doubt());
    let e = e.with_in_doubt(true);
    assert!(e.in_doubt());
}
