//! Serve Protocol - wire contract between a model worker and its orchestrator
//!
//! Two layers, both transport-independent:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  message: Command / Response  <->  [u8 tag][bincode body]     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  codec:   payload             <->  [u32 LE len][payload]      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The codec knows nothing about commands; the message layer knows nothing
//! about byte streams. The worker's socket loop glues them together.

mod codec;
mod error;
mod message;

pub use codec::{FrameCodec, DEFAULT_MAX_FRAME_LEN, LENGTH_PREFIX_SIZE};
pub use error::{FramingError, ProtocolError};
pub use message::{
    decode_command, decode_response, encode_command, encode_response, tags, Command, ErrorKind,
    LoadParams, PredictRequest, Response,
};
