//! Transport Module - listening endpoint and per-connection serving loop
//!
//! ```text
//! Listener (tcp | unix) ──accept──→ Connection<S>
//!                                      │  read bytes
//!                                      ▼
//!                                  FrameCodec ──→ decode_command ──→ ModelWorker
//!                                                                       │
//!                                  write bytes ←── encode_response ←────┘
//! ```

mod connection;

pub use connection::Connection;

use std::io;
#[cfg(unix)]
use std::path::{Path, PathBuf};

use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::base::error::{InitError, RunError};
use crate::config::SocketAddress;

/// Bound listening endpoint. Dropping it removes the Unix socket file.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

/// Accepted peer stream.
#[derive(Debug)]
pub enum Accepted {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Listener {
    pub async fn bind(address: &SocketAddress) -> Result<Self, InitError> {
        match address {
            SocketAddress::Tcp { host, port } => TcpListener::bind((host.as_str(), *port))
                .await
                .map(Listener::Tcp)
                .map_err(|source| InitError::Bind {
                    address: address.to_string(),
                    source,
                }),

            #[cfg(unix)]
            SocketAddress::Unix(path) => {
                remove_stale_socket(path)?;
                let listener = UnixListener::bind(path).map_err(|source| InitError::Bind {
                    address: address.to_string(),
                    source,
                })?;
                Ok(Listener::Unix {
                    listener,
                    path: path.clone(),
                })
            }

            #[cfg(not(unix))]
            SocketAddress::Unix(_) => Err(InitError::InvalidConfig(
                "unix sockets are not supported on this platform".into(),
            )),
        }
    }

    /// Wait for the next peer. Returns the stream and a printable peer name.
    pub async fn accept(&self) -> Result<(Accepted, String), RunError> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(RunError::Accept)?;
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Failed to set TCP_NODELAY: {}", e);
                }
                Ok((Accepted::Tcp(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix { listener, path } => {
                let (stream, _) = listener.accept().await.map_err(RunError::Accept)?;
                Ok((Accepted::Unix(stream), path.display().to_string()))
            }
        }
    }

    /// Actual bound address (resolves port 0 for TCP).
    pub fn local_address(&self) -> io::Result<SocketAddress> {
        match self {
            Listener::Tcp(listener) => {
                let addr = listener.local_addr()?;
                Ok(SocketAddress::Tcp {
                    host: addr.ip().to_string(),
                    port: addr.port(),
                })
            }
            #[cfg(unix)]
            Listener::Unix { path, .. } => Ok(SocketAddress::Unix(path.clone())),
        }
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            match std::fs::remove_file(&*path) {
                Ok(()) => tracing::debug!("Removed socket file {:?}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove socket file {:?}: {}", path, e),
            }
        }
    }
}

/// Clear a socket file left behind by a previous process.
///
/// Anything at `path` that is not a socket is left alone and reported.
#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> Result<(), InitError> {
    use std::os::unix::fs::FileTypeExt;

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(InitError::StaleSocket {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.file_type().is_socket() {
        return Err(InitError::SocketPathInUse(path.to_path_buf()));
    }

    tracing::warn!("Removing stale socket file {:?}", path);
    std::fs::remove_file(path).map_err(|source| InitError::StaleSocket {
        path: path.to_path_buf(),
        source,
    })
}
