//! Load Model Handler
//!
//! State transitions: Unloaded → Loading → Ready, or back to Unloaded when
//! the backend cannot be constructed.

use std::time::Instant;

use serve_protocol::{ErrorKind, LoadParams, Response};

use crate::backend::Backend;
use crate::worker::state_machine::ModelState;

use super::super::worker::ModelHandle;
use super::super::ModelWorker;
use super::make_error;

pub fn handle_load_model(worker: &mut ModelWorker, params: LoadParams) -> Response {
    let spec = worker.resolve_load_spec(params);
    tracing::info!(
        "Loading model '{}' ({} on {}) from {}",
        spec.model_name,
        spec.runtime_type,
        spec.device_type,
        spec.model_dir.display()
    );

    if let Err(e) = worker.transition_state(ModelState::Loading) {
        return make_error(None, ErrorKind::InvalidState, e.to_string());
    }

    let start_time = Instant::now();

    let backend = match Backend::load(&spec) {
        Ok(backend) => backend,
        Err(e) => {
            // Nothing was constructed; the worker can take another LOAD
            if let Err(te) = worker.transition_state(ModelState::Unloaded) {
                tracing::error!("{}", te);
            }
            return make_error(None, e.kind(), e.to_string());
        }
    };

    let load_time_ms = start_time.elapsed().as_millis() as u64;

    let output = match serde_json::to_vec(backend.describe()) {
        Ok(output) => output,
        Err(e) => {
            if let Err(ue) = backend.unload() {
                tracing::error!("Failed to release backend after load error: {}", ue);
            }
            if let Err(te) = worker.transition_state(ModelState::Unloaded) {
                tracing::error!("{}", te);
            }
            return make_error(
                None,
                ErrorKind::LoadFailed,
                format!("Failed to encode model metadata: {}", e),
            );
        }
    };

    tracing::info!(
        "Model '{}' ready in {} ms",
        backend.describe().model_name,
        load_time_ms
    );

    worker.install(ModelHandle {
        spec,
        backend,
        loaded_at: Instant::now(),
        load_time_ms,
    });

    if let Err(e) = worker.transition_state(ModelState::Ready) {
        return make_error(None, ErrorKind::InvalidState, e.to_string());
    }

    Response::ok(None, output)
}
