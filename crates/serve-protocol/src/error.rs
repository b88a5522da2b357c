use thiserror::Error;

/// Errors raised while splitting a byte stream into frames.
///
/// Every variant is connection-fatal: once the length prefix cannot be
/// trusted there is no way to find the next frame boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("frame length {declared} exceeds maximum of {max} bytes")]
    FrameTooLarge { declared: usize, max: usize },

    #[error("stream ended mid-frame with {buffered} bytes buffered")]
    Truncated { buffered: usize },
}

/// Errors raised while interpreting a frame payload as a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command discriminant 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("unknown response discriminant 0x{0:02x}")]
    UnknownResponse(u8),

    #[error("empty payload")]
    EmptyPayload,

    #[error("malformed {kind} payload: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("failed to encode {kind}: {reason}")]
    Encode { kind: &'static str, reason: String },
}
