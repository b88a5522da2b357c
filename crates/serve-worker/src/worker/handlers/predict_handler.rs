//! Predict Handler
//!
//! Runs one inference. Failures are reported against the request id and
//! never change the lifecycle state.

use std::time::Instant;

use serve_protocol::{ErrorKind, PredictRequest, Response};

use super::super::ModelWorker;
use super::make_error;

pub fn handle_predict(worker: &mut ModelWorker, request: PredictRequest) -> Response {
    let PredictRequest { request_id, input } = request;

    let Some(backend) = worker.backend_mut() else {
        return make_error(
            Some(request_id),
            ErrorKind::InvalidState,
            "Model not loaded".into(),
        );
    };

    let start_time = Instant::now();
    let result = backend.predict(&input);
    let elapsed = start_time.elapsed();
    worker.record_predict(elapsed, result.is_ok());

    match result {
        Ok(output) => {
            tracing::debug!(
                "[{}] predict ok: {} -> {} bytes in {:.3} ms",
                request_id,
                input.len(),
                output.len(),
                elapsed.as_secs_f64() * 1000.0
            );
            Response::ok(Some(request_id), output)
        }
        Err(e) => make_error(Some(request_id), e.kind(), e.to_string()),
    }
}
