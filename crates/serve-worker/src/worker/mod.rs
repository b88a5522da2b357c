//! Model Worker - owns the single model of this process
//!
//! ```text
//! Command ──→ ModelWorker::handle()
//!                 │
//!            handlers::dispatch()   ← state gate (InvalidState)
//!                 │
//!     ┌───────┬───┴────┬────────┐
//!     ▼       ▼        ▼        ▼
//!   load   predict   unload   status
//!     │       │        │
//!     └───────┴────────┴──→ Backend (one instance, never shared)
//! ```
//!
//! Handlers are transport-independent: they map a decoded `Command` to a
//! `Response` and never see sockets or frames.

mod handlers;
mod state_machine;
#[allow(clippy::module_inception)]
mod worker;

pub use state_machine::{ModelState, StateTransitionError};
pub use worker::{ModelHandle, ModelWorker, PredictStats, WorkerStatus};
