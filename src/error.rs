//! Repository-wide structured errors for retrieval-related operations.

use crate::transfer::display_path;

/// Failure class reported by an object store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Network/transport/throttling style failure; worth another attempt.
    Transient,
    /// Bucket or object does not exist.
    NotFound,
    /// Credentials were rejected or access is denied.
    PermissionDenied,
    /// Request can never succeed as issued (bad bucket name, bad key...).
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Transient, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == StoreErrorKind::Transient
    }

    /// Map a local io::Error (used by the filesystem-backed store) onto a store failure class.
    pub fn from_io(err: &std::io::Error, what: &str) -> Self {
        use std::io::ErrorKind::*;
        let kind = match err.kind() {
            NotFound => StoreErrorKind::NotFound,
            PermissionDenied => StoreErrorKind::PermissionDenied,
            InvalidInput | InvalidData => StoreErrorKind::Invalid,
            _ => StoreErrorKind::Transient,
        };
        Self::new(kind, format!("{}: {}", what, err))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.kind {
            StoreErrorKind::Transient => "transient store error",
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::PermissionDenied => "permission denied",
            StoreErrorKind::Invalid => "invalid request",
        };
        write!(f, "{}: {}", label, self.message)
    }
}

impl std::error::Error for StoreError {}

/// Errors from turning an object key into a local destination path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPathError {
    /// Key is empty, only separators, or ends with a separator.
    NoFileName(String),
    /// Key contains a `..` segment and would land outside the destination root.
    EscapesRoot(String),
}

impl std::fmt::Display for KeyPathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPathError::NoFileName(k) => write!(f, "key has no file name: '{}'", k),
            KeyPathError::EscapesRoot(k) => {
                write!(f, "key escapes the destination root: '{}'", k)
            }
        }
    }
}

impl std::error::Error for KeyPathError {}

#[derive(Debug, Clone)]
pub enum MkdirError {
    /// A path component exists but is a file (a directory was expected).
    ExistsAsFile(std::path::PathBuf),
    /// Any other filesystem error, keeping the path and the underlying message.
    Io(std::path::PathBuf, String),
}

impl std::fmt::Display for MkdirError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MkdirError::ExistsAsFile(p) => {
                write!(f, "a file already exists where a directory is needed: {}", display_path(p))
            }
            MkdirError::Io(p, msg) => {
                write!(f, "failed to create directory: {}: {}", display_path(p), msg)
            }
        }
    }
}

impl std::error::Error for MkdirError {}

/// Failures raised while enumerating or fetching objects. Per-object variants
/// never leave the task that produced them; `Enumeration`, `WorkerSpawn` and
/// `WorkerPanicked` abort the batch.
#[derive(Debug, Clone)]
pub enum FetchError {
    Enumeration(StoreError),
    Store(StoreError),
    Stream(String),
    KeyPath(KeyPathError),
    CreateDir(MkdirError),
    LocalOpen(String, String, std::io::ErrorKind),
    LocalWrite(String, String, std::io::ErrorKind),
    WorkerSpawn(String),
    WorkerPanicked(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use FetchError::*;
        match self {
            Enumeration(e) => write!(f, "listing objects failed: {}", e),
            Store(e) => write!(f, "fetch failed: {}", e),
            Stream(msg) => write!(f, "object stream read failed: {}", msg),
            KeyPath(e) => write!(f, "{}", e),
            CreateDir(e) => write!(f, "{}", e),
            LocalOpen(path, msg, _) => write!(f, "local open failed: {}: {}", path, msg),
            LocalWrite(path, msg, _) => write!(f, "local write failed: {}: {}", path, msg),
            WorkerSpawn(msg) => write!(f, "cannot start worker thread: {}", msg),
            WorkerPanicked(msg) => write!(f, "worker thread died: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    pub(crate) fn local_open(path: &std::path::Path, err: &std::io::Error) -> Self {
        FetchError::LocalOpen(display_path(path).to_string(), err.to_string(), err.kind())
    }

    pub(crate) fn local_write(path: &std::path::Path, err: &std::io::Error) -> Self {
        FetchError::LocalWrite(display_path(path).to_string(), err.to_string(), err.kind())
    }

    /// Whether another attempt at the same object may succeed. Network and
    /// store-side hiccups are retriable; anything about the destination (bad
    /// key, blocked directory, permission, disk full) is not.
    pub fn is_transient(&self) -> bool {
        use FetchError::*;
        match self {
            Store(e) => e.is_transient(),
            Stream(_) => true,
            LocalOpen(_, _, kind) | LocalWrite(_, _, kind) => is_transient_io(*kind),
            // non-retriable: validation/filesystem/batch-level errors
            KeyPath(_) | CreateDir(_) | Enumeration(_) | WorkerSpawn(_) | WorkerPanicked(_) => {
                false
            }
        }
    }
}

fn is_transient_io(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind::*;
    matches!(kind, Interrupted | TimedOut | WouldBlock)
}
