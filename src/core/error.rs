//! Error taxonomy shared by every provider, the facade and the module hooks.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VfsError>;

/// Stable, matchable classification of a [`VfsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidPath,
    NotFound,
    NotADirectory,
    IsADirectory,
    AlreadyExists,
    NotEmpty,
    NotSupported,
    PermissionDenied,
    AlreadyInstalled,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidPath => "invalid path",
            ErrorKind::NotFound => "not found",
            ErrorKind::NotADirectory => "not a directory",
            ErrorKind::IsADirectory => "is a directory",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::NotEmpty => "directory not empty",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::AlreadyInstalled => "already installed",
            ErrorKind::Io => "i/o error",
        };
        f.write_str(name)
    }
}

/// Errors raised by VFS operations.
///
/// Host-specific errors never leak through: [`DirFS`](crate::DirFS) maps
/// them into these variants, keeping only the message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VfsError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("module hooks already installed: {0}")]
    AlreadyInstalled(String),
    #[error("i/o error: {0}")]
    Io(String),
}

impl VfsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::InvalidPath(_) => ErrorKind::InvalidPath,
            VfsError::NotFound(_) => ErrorKind::NotFound,
            VfsError::NotADirectory(_) => ErrorKind::NotADirectory,
            VfsError::IsADirectory(_) => ErrorKind::IsADirectory,
            VfsError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            VfsError::NotEmpty(_) => ErrorKind::NotEmpty,
            VfsError::NotSupported(_) => ErrorKind::NotSupported,
            VfsError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            VfsError::AlreadyInstalled(_) => ErrorKind::AlreadyInstalled,
            VfsError::Io(_) => ErrorKind::Io,
        }
    }

    /// Maps a host error into the taxonomy, tagging it with a virtual path.
    pub fn from_io(err: io::Error, path: impl fmt::Display) -> Self {
        let detail = format!("{path}");
        match err.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound(detail),
            io::ErrorKind::NotADirectory => VfsError::NotADirectory(detail),
            io::ErrorKind::IsADirectory => VfsError::IsADirectory(detail),
            io::ErrorKind::AlreadyExists => VfsError::AlreadyExists(detail),
            io::ErrorKind::DirectoryNotEmpty => VfsError::NotEmpty(detail),
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                VfsError::PermissionDenied(detail)
            }
            _ => VfsError::Io(format!("{detail}: {err}")),
        }
    }
}
