//! Command / Response messages.
//!
//! Every payload starts with a one-byte discriminant (see [`tags`]); the rest
//! is a bincode body with fixed-width little-endian integers. Trailing bytes
//! after the body are rejected so a payload maps to exactly one message.

use std::fmt;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// One-byte payload discriminants.
pub mod tags {
    pub const LOAD: u8 = b'L';
    pub const PREDICT: u8 = b'I';
    pub const UNLOAD: u8 = b'U';
    pub const PING: u8 = b'P';

    pub const RESPONSE_OK: u8 = b'O';
    pub const RESPONSE_ERROR: u8 = b'E';
}

fn wire() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Body of a LOAD command.
///
/// Fields left as `None` are filled in by the worker from its startup
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadParams {
    pub model_name: String,
    pub model_dir: Option<String>,
    pub runtime_type: Option<String>,
    pub device_type: Option<String>,
}

/// Body of a PREDICT command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Caller-assigned correlation token, echoed back untouched.
    pub request_id: String,
    pub input: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load(LoadParams),
    Predict(PredictRequest),
    Unload,
    Ping,
}

impl Command {
    pub fn tag(&self) -> u8 {
        match self {
            Command::Load(_) => tags::LOAD,
            Command::Predict(_) => tags::PREDICT,
            Command::Unload => tags::UNLOAD,
            Command::Ping => tags::PING,
        }
    }

    /// Request id carried by the command, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Command::Predict(req) => Some(&req.request_id),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Load(_) => "LOAD",
            Command::Predict(_) => "PREDICT",
            Command::Unload => "UNLOAD",
            Command::Ping => "PING",
        }
    }
}

/// Error categories carried in an `Error` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidState,
    UnsupportedRuntime,
    UnsupportedDevice,
    ModelNotFound,
    LoadFailed,
    InvalidInput,
    PredictFailed,
    UnloadFailed,
    /// Worker-side failure not caused by the model or the request
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok {
        request_id: Option<String>,
        output: Vec<u8>,
    },
    Error {
        request_id: Option<String>,
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    pub fn ok(request_id: Option<String>, output: Vec<u8>) -> Self {
        Response::Ok { request_id, output }
    }

    pub fn error(request_id: Option<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            request_id,
            kind,
            message: message.into(),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Response::Ok { request_id, .. } | Response::Error { request_id, .. } => {
                request_id.as_deref()
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }

    /// Error kind, or `None` for an `Ok` response.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Response::Ok { .. } => None,
            Response::Error { kind, .. } => Some(*kind),
        }
    }
}

#[derive(Serialize)]
struct OkBodyRef<'a> {
    request_id: &'a Option<String>,
    output: &'a [u8],
}

#[derive(Deserialize)]
struct OkBody {
    request_id: Option<String>,
    output: Vec<u8>,
}

#[derive(Serialize)]
struct ErrorBodyRef<'a> {
    request_id: &'a Option<String>,
    kind: ErrorKind,
    message: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    request_id: Option<String>,
    kind: ErrorKind,
    message: String,
}

fn encode_body<T: Serialize>(tag: u8, kind: &'static str, body: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = vec![tag];
    wire()
        .serialize_into(&mut payload, body)
        .map_err(|e| ProtocolError::Encode {
            kind,
            reason: e.to_string(),
        })?;
    Ok(payload)
}

fn decode_body<'de, T: Deserialize<'de>>(kind: &'static str, body: &'de [u8]) -> Result<T, ProtocolError> {
    wire().deserialize(body).map_err(|e| ProtocolError::Malformed {
        kind,
        reason: e.to_string(),
    })
}

fn expect_empty(kind: &'static str, body: &[u8]) -> Result<(), ProtocolError> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::Malformed {
            kind,
            reason: format!("expected empty body, got {} bytes", body.len()),
        })
    }
}

pub fn encode_command(cmd: &Command) -> Result<Vec<u8>, ProtocolError> {
    match cmd {
        Command::Load(params) => encode_body(tags::LOAD, "LOAD", params),
        Command::Predict(req) => encode_body(tags::PREDICT, "PREDICT", req),
        Command::Unload => Ok(vec![tags::UNLOAD]),
        Command::Ping => Ok(vec![tags::PING]),
    }
}

pub fn decode_command(payload: &[u8]) -> Result<Command, ProtocolError> {
    let (&tag, body) = payload.split_first().ok_or(ProtocolError::EmptyPayload)?;
    match tag {
        tags::LOAD => decode_body("LOAD", body).map(Command::Load),
        tags::PREDICT => decode_body("PREDICT", body).map(Command::Predict),
        tags::UNLOAD => expect_empty("UNLOAD", body).map(|_| Command::Unload),
        tags::PING => expect_empty("PING", body).map(|_| Command::Ping),
        other => Err(ProtocolError::UnknownCommand(other)),
    }
}

pub fn encode_response(resp: &Response) -> Result<Vec<u8>, ProtocolError> {
    match resp {
        Response::Ok { request_id, output } => encode_body(
            tags::RESPONSE_OK,
            "Ok response",
            &OkBodyRef { request_id, output },
        ),
        Response::Error {
            request_id,
            kind,
            message,
        } => encode_body(
            tags::RESPONSE_ERROR,
            "Error response",
            &ErrorBodyRef {
                request_id,
                kind: *kind,
                message,
            },
        ),
    }
}

pub fn decode_response(payload: &[u8]) -> Result<Response, ProtocolError> {
    let (&tag, body) = payload.split_first().ok_or(ProtocolError::EmptyPayload)?;
    match tag {
        tags::RESPONSE_OK => {
            let body: OkBody = decode_body("Ok response", body)?;
            Ok(Response::Ok {
                request_id: body.request_id,
                output: body.output,
            })
        }
        tags::RESPONSE_ERROR => {
            let body: ErrorBody = decode_body("Error response", body)?;
            Ok(Response::Error {
                request_id: body.request_id,
                kind: body.kind,
                message: body.message,
            })
        }
        other => Err(ProtocolError::UnknownResponse(other)),
    }
}
