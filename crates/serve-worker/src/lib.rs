//! Serve Worker - one model, one socket, one orchestrator
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ server      initialize(config) / run()                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ transport   Listener (tcp | unix), Connection serving loop   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ worker      ModelState machine, LOAD/PREDICT/UNLOAD/PING     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ backend     closed set of (runtime, device) variants         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod base;
pub mod config;
pub mod server;
pub mod transport;
pub mod worker;

pub use base::error::{InitError, LoadError, PredictError, RunError, UnloadError};
pub use config::WorkerConfig;
pub use server::Server;
