use std::io;

use thiserror::Error;

use crate::pool::PoolError;
use crate::translate::StatusError;

/// Boxed error used to carry transport causes across the factory seam
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure to open a channel to a backend host
#[derive(Error, Debug)]
#[error("failed to connect to {host}:{port}: {source}")]
pub struct ConnectError {
    pub host: String,
    pub port: u16,
    #[source]
    pub source: BoxError,
}

impl ConnectError {
    pub fn new(host: impl Into<String>, port: u16, source: impl Into<BoxError>) -> Self {
        Self {
            host: host.into(),
            port,
            source: source.into(),
        }
    }
}

/// Main error type for remote-vfs operations
#[derive(Error, Debug)]
pub enum VfsError {
    #[error(transparent)]
    Pool(#[from] PoolError<ConnectError>),

    #[error("{reason} {}: no such file", describe(.path, .other))]
    NoSuchFile {
        reason: String,
        path: String,
        other: Option<String>,
        #[source]
        cause: StatusError,
    },

    #[error("{reason} {}: access denied", describe(.path, .other))]
    AccessDenied {
        reason: String,
        path: String,
        other: Option<String>,
        #[source]
        cause: StatusError,
    },

    #[error("{path} is not a symbolic link")]
    NotLink {
        path: String,
        #[source]
        cause: StatusError,
    },

    #[error("{reason} {}: {cause}", describe(.path, .other))]
    FileSystem {
        reason: String,
        path: String,
        other: Option<String>,
        #[source]
        cause: StatusError,
    },

    #[error("No mounted filesystem matches {0}")]
    UnresolvedMount(String),

    #[error("A filesystem is already mounted at {0}")]
    AlreadyMounted(String),

    #[error("Filesystem registry is closed")]
    RegistryClosed,

    #[error("No provider registered for scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("Invalid URI {uri:?}: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn describe(path: &str, other: &Option<String>) -> String {
    match other {
        Some(other) => format!("{} to {}", path, other),
        None => path.to_string(),
    }
}

impl VfsError {
    /// Closest std I/O error kind, for callers bridging into `std::io`
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            VfsError::Pool(PoolError::Timeout { .. }) => io::ErrorKind::TimedOut,
            VfsError::Pool(PoolError::Factory(_)) => io::ErrorKind::ConnectionRefused,
            VfsError::Pool(PoolError::Closed) => io::ErrorKind::NotConnected,
            VfsError::Pool(PoolError::Exhausted { .. }) => io::ErrorKind::WouldBlock,
            VfsError::NoSuchFile { .. } => io::ErrorKind::NotFound,
            VfsError::AccessDenied { .. } => io::ErrorKind::PermissionDenied,
            VfsError::NotLink { .. } => io::ErrorKind::InvalidInput,
            VfsError::FileSystem { .. } => io::ErrorKind::Other,
            VfsError::UnresolvedMount(_) => io::ErrorKind::NotFound,
            VfsError::AlreadyMounted(_) => io::ErrorKind::AlreadyExists,
            VfsError::RegistryClosed => io::ErrorKind::NotConnected,
            VfsError::UnsupportedScheme(_) => io::ErrorKind::Unsupported,
            VfsError::InvalidUri { .. } => io::ErrorKind::InvalidInput,
            VfsError::NotSupported(_) => io::ErrorKind::Unsupported,
            VfsError::Config(_) => io::ErrorKind::InvalidInput,
            VfsError::Io(e) => e.kind(),
        }
    }
}

impl From<VfsError> for io::Error {
    fn from(err: VfsError) -> Self {
        match err {
            VfsError::Io(e) => e,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}

/// Result type alias for remote-vfs operations
pub type Result<T> = std::result::Result<T, VfsError>;
