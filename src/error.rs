//! The exception taxonomy exposed to applications, plus the internal "this should never happen"
//! error class used while an operation is being assembled.
//!
//! Every public VFS method returns `Result<T, FsError>`. Internally, components raise the richer
//! [`InternalError`] (a superset that also carries bugs/invariant violations); [`Vfs`] methods
//! convert those into an [`FsError`] at the outermost frame that knows the user-visible path, per
//! the error propagation rules.
//!
//! [`Vfs`]: crate::filesystem::Vfs

use std::fmt;

/// One of the domain-level exception codes a VFS operation can fail with.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FsErrorKind {
    /// ENOENT
    NotFound,
    /// EEXIST
    AlreadyExists,
    /// ENOTDIR
    NotDirectory,
    /// ENOTFILE
    NotFile,
    /// not-link
    NotLink,
    /// EISDIR
    IsDirectory,
    /// ENOTEMPTY
    NotEmpty,
    /// EEOF
    UnexpectedEof,
    /// EPERM
    PermissionDenied,
    /// EBUSY
    Busy,
    /// EIO
    Io,
    /// concurrent-update
    ConcurrentUpdate,
    /// parsing-error
    ParsingError,
    /// ENOSYS
    NotImplemented,
    /// is-endless
    IsEndless,
    /// version-mismatch
    VersionMismatch,
    /// attrsNotEnabledInFS
    AttrsNotEnabled,
    /// storage-closed
    StorageClosed,
    /// argument was out of range / malformed
    BadArgument,
}

impl fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NotFound => "no such file or directory",
            Self::AlreadyExists => "file or directory already exists",
            Self::NotDirectory => "not a directory",
            Self::NotFile => "not a file",
            Self::NotLink => "not a link",
            Self::IsDirectory => "is a directory",
            Self::NotEmpty => "directory is not empty",
            Self::UnexpectedEof => "unexpected end of file",
            Self::PermissionDenied => "operation not permitted",
            Self::Busy => "resource is busy",
            Self::Io => "i/o error",
            Self::ConcurrentUpdate => "concurrent update detected",
            Self::ParsingError => "failed to parse content",
            Self::NotImplemented => "operation not implemented",
            Self::IsEndless => "operation would not terminate",
            Self::VersionMismatch => "version mismatch",
            Self::AttrsNotEnabled => "extended attributes not enabled for this filesystem",
            Self::StorageClosed => "storage has been closed",
            Self::BadArgument => "bad argument",
        };
        f.write_str(msg)
    }
}

/// A file exception, as described in the external exception taxonomy (§6). Carries an optional
/// user-visible path and an optional underlying cause.
#[derive(Debug)]
pub struct FsError {
    kind: FsErrorKind,
    path: Option<String>,
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl FsError {
    pub fn new(kind: FsErrorKind) -> Self {
        Self {
            kind,
            path: None,
            cause: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> FsErrorKind {
        self.kind
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Re-targets the path of an existing error, used by `move` to relabel an error raised on the
    /// source side as `initPath` or the destination side as `newPath`.
    pub fn retarget_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn not_found() -> Self {
        Self::new(FsErrorKind::NotFound)
    }

    pub fn already_exists() -> Self {
        Self::new(FsErrorKind::AlreadyExists)
    }

    pub fn not_directory() -> Self {
        Self::new(FsErrorKind::NotDirectory)
    }

    pub fn not_file() -> Self {
        Self::new(FsErrorKind::NotFile)
    }

    pub fn not_link() -> Self {
        Self::new(FsErrorKind::NotLink)
    }

    pub fn is_directory() -> Self {
        Self::new(FsErrorKind::IsDirectory)
    }

    pub fn not_empty() -> Self {
        Self::new(FsErrorKind::NotEmpty)
    }

    pub fn version_mismatch() -> Self {
        Self::new(FsErrorKind::VersionMismatch)
    }

    pub fn storage_closed() -> Self {
        Self::new(FsErrorKind::StorageClosed)
    }

    pub fn bad_argument() -> Self {
        Self::new(FsErrorKind::BadArgument)
    }

    pub fn parsing_error(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(FsErrorKind::ParsingError).with_cause(cause)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} (path: {path})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

/// Invariant violations and other conditions that should never happen given a correct caller and
/// a correct store. These are bugs: the operation that triggered one is aborted, but the VFS as a
/// whole keeps running.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum InternalError {
    #[error("filesystem invariant violated: {0}")]
    Invariant(&'static str),

    #[error("node with id {0:?} is missing from the in-memory node table")]
    MissingNode(crate::codec::ObjectId),

    #[error("attempted to link to an incompatible storage type")]
    IncompatibleStorageType,

    #[error("node name was invalid: {0}")]
    InvalidName(#[from] crate::codec::NodeNameError),
}

/// The error type threaded through the internals of a single filesystem component before it's
/// translated into a path-bearing [`FsError`] at the `Vfs` boundary.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum OperationError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error(transparent)]
    Storage(#[from] crate::store::StorageError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),
}

impl OperationError {
    /// Converts this error into a user-facing [`FsError`], stamping the path the caller knows at
    /// this frame. Internal bugs still surface as an `FsError` (so a single `?` works end to end
    /// in `Vfs` methods) but keep their original detail as the `source()`.
    pub fn into_fs_error(self, path: impl Into<String>) -> FsError {
        match self {
            OperationError::Fs(err) => {
                if err.path().is_some() {
                    err
                } else {
                    err.with_path(path)
                }
            }
            OperationError::Internal(err) => FsError::new(FsErrorKind::Io)
                .with_path(path)
                .with_cause(err),
            OperationError::Storage(err) => FsError::new(FsErrorKind::Io)
                .with_path(path)
                .with_cause(err),
            OperationError::Crypto(err) => FsError::new(FsErrorKind::Io)
                .with_path(path)
                .with_cause(err),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
pub(crate) type OpResult<T> = Result<T, OperationError>;

/// Maps a store-level failure onto the closest file exception. Shared by every node kind's
/// persistence calls so `not-found`/`version-mismatch`/`storage-closed` read the same way
/// everywhere a `Storage` call surfaces an error.
pub(crate) fn from_storage_error(err: crate::store::StorageError) -> FsError {
    use crate::store::StorageError;
    match err {
        StorageError::NotFound => FsError::not_found(),
        StorageError::VersionConflict { .. } => FsError::version_mismatch(),
        StorageError::Closed => FsError::storage_closed(),
        other => FsError::new(FsErrorKind::Io).with_cause(other),
    }
}
