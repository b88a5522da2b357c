//! Command Handlers
//!
//! Each handler is a free function: `fn handle_xxx(worker, params) -> Response`.
//! `dispatch` gates on the lifecycle state first, so handlers only run in a
//! state that allows them.

mod load_model_handler;
mod predict_handler;
mod status_handler;
mod unload_handler;

pub use load_model_handler::handle_load_model;
pub use predict_handler::handle_predict;
pub use status_handler::handle_status;
pub use unload_handler::handle_unload_model;

use serve_protocol::{Command, ErrorKind, Response};

use super::ModelWorker;

/// Dispatch a command to its handler.
///
/// Commands not allowed in the current state get an `InvalidState` error
/// and leave the state untouched. PING is allowed everywhere.
pub fn dispatch(worker: &mut ModelWorker, command: Command) -> Response {
    let state = worker.state().clone();

    match command {
        Command::Ping => handle_status(worker),

        Command::Load(params) => {
            if !state.can_load() {
                return make_error(
                    None,
                    ErrorKind::InvalidState,
                    format!("LOAD requires Unloaded state, current: {}", state),
                );
            }
            handle_load_model(worker, params)
        }

        Command::Predict(request) => {
            if !state.can_predict() {
                return make_error(
                    Some(request.request_id),
                    ErrorKind::InvalidState,
                    format!("PREDICT requires Ready state, current: {}", state),
                );
            }
            handle_predict(worker, request)
        }

        Command::Unload => {
            if !state.can_unload() {
                return make_error(
                    None,
                    ErrorKind::InvalidState,
                    format!("UNLOAD requires Ready state, current: {}", state),
                );
            }
            handle_unload_model(worker)
        }
    }
}

/// Build an `Error` response.
pub fn make_error(request_id: Option<String>, kind: ErrorKind, message: String) -> Response {
    match &request_id {
        Some(id) => tracing::warn!("[{}] {}: {}", id, kind, message),
        None => tracing::warn!("{}: {}", kind, message),
    }
    Response::error(request_id, kind, message)
}
