//! Unload Handler
//!
//! State transitions: Ready → Unloading → Unloaded, or Faulted when the
//! backend teardown fails.

use serve_protocol::{ErrorKind, Response};

use crate::worker::state_machine::ModelState;

use super::super::ModelWorker;
use super::make_error;

pub fn handle_unload_model(worker: &mut ModelWorker) -> Response {
    if let Err(e) = worker.transition_state(ModelState::Unloading) {
        return make_error(None, ErrorKind::InvalidState, e.to_string());
    }

    let Some(model) = worker.take_model() else {
        if let Err(e) = worker.transition_state(ModelState::Unloaded) {
            tracing::error!("{}", e);
        }
        return make_error(None, ErrorKind::InvalidState, "No model loaded".into());
    };

    tracing::info!("Unloading model '{}'...", model.spec.model_name);

    if let Err(e) = model.backend.unload() {
        let reason = e.to_string();
        if let Err(te) = worker.transition_state(ModelState::Faulted(reason.clone())) {
            tracing::error!("{}", te);
        }
        return make_error(None, e.kind(), reason);
    }

    if let Err(e) = worker.transition_state(ModelState::Unloaded) {
        return make_error(None, ErrorKind::InvalidState, e.to_string());
    }

    tracing::info!("Model unloaded");
    Response::ok(None, Vec::new())
}
