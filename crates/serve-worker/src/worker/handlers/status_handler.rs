use serve_protocol::{ErrorKind, Response};

use super::super::ModelWorker;
use super::make_error;

/// PING: JSON status snapshot. Allowed in any state, read-only.
pub fn handle_status(worker: &ModelWorker) -> Response {
    status_response(serde_json::to_vec(&worker.status()))
}

fn status_response(encoded: serde_json::Result<Vec<u8>>) -> Response {
    match encoded {
        Ok(output) => Response::ok(None, output),
        Err(e) => make_error(
            None,
            ErrorKind::Internal,
            format!("Failed to encode worker status: {}", e),
        ),
    }
}
