//! Per-connection serving loop.
//!
//! Reads bytes into an accumulator, extracts every complete frame, and
//! answers each decoded command before looking at the next one. Responses
//! therefore leave in exactly the order their commands arrived.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use serve_protocol::{
    decode_command, encode_response, tags, ErrorKind, FrameCodec, FramingError, Response,
};

use crate::base::error::RunError;
use crate::worker::ModelWorker;

const READ_CHUNK: usize = 8 * 1024;

pub struct Connection<S> {
    stream: S,
    peer: String,
    codec: FrameCodec,
    /// Partial-frame accumulator
    inbound: BytesMut,
    outbound: BytesMut,
    idle_timeout: Option<Duration>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: String, codec: FrameCodec, idle_timeout: Option<Duration>) -> Self {
        Self {
            stream,
            peer,
            codec,
            inbound: BytesMut::with_capacity(READ_CHUNK),
            outbound: BytesMut::with_capacity(READ_CHUNK),
            idle_timeout,
        }
    }

    /// Serve until the peer closes, the idle timeout fires, or the stream
    /// can no longer be trusted.
    ///
    /// Framing and protocol errors close the connection without writing a
    /// response and are returned to the caller.
    pub async fn serve(&mut self, worker: &mut ModelWorker) -> Result<(), RunError> {
        tracing::info!("Connection from {} accepted", self.peer);

        let result = self.serve_inner(worker).await;
        match &result {
            Ok(()) => tracing::info!("Connection from {} closed", self.peer),
            Err(e) => tracing::error!("Connection from {} aborted: {}", self.peer, e),
        }

        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("Shutdown of {} failed: {}", self.peer, e);
        }
        result
    }

    async fn serve_inner(&mut self, worker: &mut ModelWorker) -> Result<(), RunError> {
        loop {
            while let Some(frame) = self.codec.decode(&mut self.inbound)? {
                let command = decode_command(&frame)?;
                tracing::debug!(
                    "Received {} ({} bytes){}",
                    command.name(),
                    frame.len(),
                    command
                        .request_id()
                        .map(|id| format!(" id={}", id))
                        .unwrap_or_default()
                );

                let answered = command.tag();
                let response = worker.handle(command);
                self.write_response(answered, &response).await?;
            }

            let read = match self.idle_timeout {
                Some(limit) => match timeout(limit, self.stream.read_buf(&mut self.inbound)).await {
                    Ok(read) => read?,
                    Err(_) => {
                        tracing::info!("{} idle for {:?}, closing", self.peer, limit);
                        return Ok(());
                    }
                },
                None => self.stream.read_buf(&mut self.inbound).await?,
            };

            if read == 0 {
                self.codec.finish(&self.inbound)?;
                return Ok(());
            }
        }
    }

    /// Frame and send one response. A response larger than the frame limit
    /// is replaced by the first of `shrunk_responses` that fits.
    async fn write_response(&mut self, answered: u8, response: &Response) -> Result<(), RunError> {
        let payload = encode_response(response)?;

        self.outbound.clear();
        if let Err(e) = self.codec.encode(&payload, &mut self.outbound) {
            tracing::warn!("Response does not fit in one frame: {}", e);
            if !self.encode_first_fitting(shrunk_responses(answered, response, &e))? {
                return Err(e.into());
            }
        }

        self.stream.write_all(&self.outbound).await?;
        self.stream.flush().await?;
        Ok(())
    }

    fn encode_first_fitting(&mut self, candidates: Vec<Response>) -> Result<bool, RunError> {
        for candidate in candidates {
            let payload = encode_response(&candidate)?;
            if self.codec.encode(&payload, &mut self.outbound).is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Smaller stand-ins for a response that overflowed the frame limit, most
/// informative first.
///
/// The command's outcome is kept: a LOAD, UNLOAD or PING that succeeded
/// still answers `Ok`, only without its body. A PREDICT whose output cannot
/// be delivered answers `PredictFailed`. Errors keep their kind and lose the
/// message text, then the request id.
fn shrunk_responses(answered: u8, response: &Response, overflow: &FramingError) -> Vec<Response> {
    match response {
        Response::Ok { request_id, .. } if answered == tags::PREDICT => vec![
            Response::error(
                request_id.clone(),
                ErrorKind::PredictFailed,
                format!("response exceeds frame limit: {}", overflow),
            ),
            Response::error(request_id.clone(), ErrorKind::PredictFailed, ""),
            Response::error(None, ErrorKind::PredictFailed, ""),
        ],
        Response::Ok { request_id, .. } => vec![
            Response::ok(request_id.clone(), Vec::new()),
            Response::ok(None, Vec::new()),
        ],
        Response::Error {
            request_id, kind, ..
        } => vec![
            Response::error(request_id.clone(), *kind, ""),
            Response::error(None, *kind, ""),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::worker::ModelState;
    use serve_protocol::{decode_response, encode_command, Command, PredictRequest};

    fn echo_worker(dir: &std::path::Path) -> ModelWorker {
        ModelWorker::new(ModelConfig {
            runtime_type: "echo".to_string(),
            device_type: "cpu".to_string(),
            model_dir: Some(dir.to_path_buf()),
        })
    }

    fn frame(command: &Command, codec: &FrameCodec, dst: &mut BytesMut) {
        codec.encode(&encode_command(command).unwrap(), dst).unwrap();
    }

    fn responses(bytes: &[u8], codec: &FrameCodec) -> Vec<Response> {
        let mut buf = BytesMut::from(bytes);
        let mut out = Vec::new();
        while let Some(payload) = codec.decode(&mut buf).unwrap() {
            out.push(decode_response(&payload).unwrap());
        }
        assert!(buf.is_empty());
        out
    }

    #[tokio::test]
    async fn test_pipelined_commands_answered_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker = echo_worker(dir.path());
        let codec = FrameCodec::default();

        let mut wire = BytesMut::new();
        frame(&Command::Load(Default::default()), &codec, &mut wire);
        for i in 0..5 {
            frame(
                &Command::Predict(PredictRequest {
                    request_id: format!("req-{}", i),
                    input: vec![i as u8; i + 1],
                }),
                &codec,
                &mut wire,
            );
        }

        let (client, server) = tokio::io::duplex(64 * 1024);
        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(&wire).await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut conn = Connection::new(server, "test".into(), codec, None);
        conn.serve(&mut worker).await.unwrap();

        let mut received = Vec::new();
        client_read.read_to_end(&mut received).await.unwrap();
        let responses = responses(&received, &codec);

        assert_eq!(responses.len(), 6);
        assert!(responses[0].is_ok());
        for (i, resp) in responses[1..].iter().enumerate() {
            assert_eq!(
                resp,
                &Response::ok(Some(format!("req-{}", i)), vec![i as u8; i + 1])
            );
        }
    }

    #[tokio::test]
    async fn test_truncated_stream_is_framing_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker = echo_worker(dir.path());

        let (client, server) = tokio::io::duplex(1024);
        let (mut client_read, mut client_write) = tokio::io::split(client);
        // Declares 10 bytes, delivers 3
        client_write.write_all(&[10, 0, 0, 0, b'P', 0, 0]).await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut conn = Connection::new(server, "test".into(), FrameCodec::default(), None);
        let err = conn.serve(&mut worker).await.unwrap_err();
        assert!(matches!(err, RunError::Framing(_)));

        let mut received = Vec::new();
        client_read.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_without_response() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker = echo_worker(dir.path());

        let (client, server) = tokio::io::duplex(1024);
        let (mut client_read, _client_write) = tokio::io::split(client);

        let mut conn = Connection::new(
            server,
            "test".into(),
            FrameCodec::default(),
            Some(Duration::from_millis(50)),
        );
        conn.serve(&mut worker).await.unwrap();
        drop(conn);

        let mut received = Vec::new();
        client_read.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_response_becomes_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker = echo_worker(dir.path());
        let codec = FrameCodec::new(256);

        let mut wire = BytesMut::new();
        frame(&Command::Load(Default::default()), &codec, &mut wire);
        // Command frame is exactly 256 bytes; the echoed response carries
        // one more byte (the request id option tag) and overflows.
        frame(
            &Command::Predict(PredictRequest {
                request_id: "big".to_string(),
                input: vec![7u8; 236],
            }),
            &codec,
            &mut wire,
        );

        let (client, server) = tokio::io::duplex(64 * 1024);
        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(&wire).await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut conn = Connection::new(server, "test".into(), codec, None);
        conn.serve(&mut worker).await.unwrap();

        let mut received = Vec::new();
        client_read.read_to_end(&mut received).await.unwrap();
        let responses = responses(&received, &codec);

        assert_eq!(responses.len(), 2);
        // LOAD metadata JSON fits under 256 bytes
        assert!(responses[0].is_ok());
        assert_eq!(responses[1].error_kind(), Some(ErrorKind::PredictFailed));
        assert_eq!(responses[1].request_id(), Some("big"));
    }

    #[tokio::test]
    async fn test_oversized_response_with_long_request_id_still_answered() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker = echo_worker(dir.path());
        let codec = FrameCodec::new(512);
        let long_id = "r".repeat(480);

        let mut wire = BytesMut::new();
        frame(&Command::Load(Default::default()), &codec, &mut wire);
        // 512-byte command; the echo needs 513 and a full error message
        // would not fit either
        frame(
            &Command::Predict(PredictRequest {
                request_id: long_id.clone(),
                input: vec![3u8; 15],
            }),
            &codec,
            &mut wire,
        );
        frame(&Command::Ping, &codec, &mut wire);

        let (client, server) = tokio::io::duplex(64 * 1024);
        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(&wire).await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut conn = Connection::new(server, "test".into(), codec, None);
        conn.serve(&mut worker).await.unwrap();

        let mut received = Vec::new();
        client_read.read_to_end(&mut received).await.unwrap();
        let responses = responses(&received, &codec);

        assert_eq!(responses.len(), 3);
        assert!(responses[0].is_ok());
        assert_eq!(
            responses[1],
            Response::error(Some(long_id), ErrorKind::PredictFailed, "")
        );
        assert!(responses[2].is_ok());
    }

    #[tokio::test]
    async fn test_oversized_load_reply_keeps_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker = echo_worker(dir.path());
        // Too small for the LOAD metadata or the PING status
        let codec = FrameCodec::new(64);

        let mut wire = BytesMut::new();
        frame(&Command::Load(Default::default()), &codec, &mut wire);
        frame(&Command::Ping, &codec, &mut wire);
        frame(
            &Command::Predict(PredictRequest {
                request_id: "a".to_string(),
                input: vec![1],
            }),
            &codec,
            &mut wire,
        );

        let (client, server) = tokio::io::duplex(64 * 1024);
        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(&wire).await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut conn = Connection::new(server, "test".into(), codec, None);
        conn.serve(&mut worker).await.unwrap();

        let mut received = Vec::new();
        client_read.read_to_end(&mut received).await.unwrap();
        let responses = responses(&received, &codec);

        assert_eq!(
            responses,
            vec![
                Response::ok(None, Vec::new()),
                Response::ok(None, Vec::new()),
                Response::ok(Some("a".to_string()), vec![1]),
            ]
        );
        assert_eq!(worker.state(), &ModelState::Ready);
    }

    #[test]
    fn test_shrunk_error_keeps_kind() {
        let overflow = FramingError::FrameTooLarge {
            declared: 100,
            max: 64,
        };
        let original = Response::error(Some("x".repeat(80)), ErrorKind::InvalidState, "not loaded");

        let candidates = shrunk_responses(tags::PREDICT, &original, &overflow);
        assert_eq!(
            candidates.last(),
            Some(&Response::error(None, ErrorKind::InvalidState, ""))
        );
        assert!(candidates.iter().all(|c| c.error_kind() == Some(ErrorKind::InvalidState)));
    }
}
