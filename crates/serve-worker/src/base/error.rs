use std::io;
use std::path::PathBuf;

use serve_protocol::{ErrorKind, FramingError, ProtocolError};
use thiserror::Error;

/// Startup failures. Nothing has been exchanged with the peer yet.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove stale socket file {path:?}: {source}")]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("socket path {0:?} is occupied by something that is not a socket")]
    SocketPathInUse(PathBuf),
}

/// Failures that end the serving loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("connection I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("unsupported runtime type: {0}")]
    UnsupportedRuntime(String),

    #[error("unknown device type: {0}")]
    UnknownDevice(String),

    #[error("runtime {runtime} has no {device} implementation")]
    UnsupportedDevice { runtime: String, device: String },

    #[error("model not found: {0:?}")]
    ModelNotFound(PathBuf),

    #[error("backend initialization failed: {0}")]
    Backend(String),
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::UnsupportedRuntime(_) => ErrorKind::UnsupportedRuntime,
            LoadError::UnknownDevice(_) | LoadError::UnsupportedDevice { .. } => {
                ErrorKind::UnsupportedDevice
            }
            LoadError::ModelNotFound(_) => ErrorKind::ModelNotFound,
            LoadError::Backend(_) => ErrorKind::LoadFailed,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("execution failed: {0}")]
    Execution(String),
}

impl PredictError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictError::InvalidInput(_) => ErrorKind::InvalidInput,
            PredictError::Execution(_) => ErrorKind::PredictFailed,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnloadError {
    #[error("backend teardown failed: {0}")]
    Backend(String),
}

impl UnloadError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UnloadFailed
    }
}
