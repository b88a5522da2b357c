//! Worker Server - owns the listener and the model worker
//!
//! ```text
//! Server::initialize(config)   validate → bind (stale socket removed)
//!          │
//! Server::run()                accept one peer → serve until it leaves
//!          │
//!        drop                  socket file removed
//! ```
//!
//! One server serves one orchestrator connection for its lifetime. The
//! model itself is loaded on the first LOAD, not at initialization.

use std::io;

use serve_protocol::FrameCodec;

use crate::base::error::{InitError, RunError};
use crate::config::{SocketAddress, WorkerConfig};
use crate::transport::{Accepted, Connection, Listener};
use crate::worker::ModelWorker;

pub struct Server {
    config: WorkerConfig,
    listener: Listener,
    worker: ModelWorker,
}

impl Server {
    pub async fn initialize(config: WorkerConfig) -> Result<Self, InitError> {
        config.validate()?;
        let address = config.network.socket_address()?;

        let listener = Listener::bind(&address).await?;
        tracing::info!("Worker listening on {}", address);

        let worker = ModelWorker::new(config.model.clone());
        Ok(Self {
            config,
            listener,
            worker,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn local_address(&self) -> io::Result<SocketAddress> {
        self.listener.local_address()
    }

    /// Accept one connection and serve it until it closes.
    ///
    /// Returns `Ok` when the peer disconnects cleanly or the idle timeout
    /// fires. Consumes the server so the socket file goes away with it.
    pub async fn run(mut self) -> Result<(), RunError> {
        let (accepted, peer) = self.listener.accept().await?;

        let codec = FrameCodec::new(self.config.network.max_frame_len);
        let idle_timeout = self.config.network.idle_timeout();

        let result = match accepted {
            Accepted::Tcp(stream) => {
                Connection::new(stream, peer, codec, idle_timeout)
                    .serve(&mut self.worker)
                    .await
            }
            #[cfg(unix)]
            Accepted::Unix(stream) => {
                Connection::new(stream, peer, codec, idle_timeout)
                    .serve(&mut self.worker)
                    .await
            }
        };

        tracing::info!("Serving loop finished, model state: {}", self.worker.state());
        result
    }
}
