//! Frame codec
//!
//! Reading returns a tagged outcome rather than using errors as control
//! flow: `Ok(FrameRead::Payload)` for a data frame, `Ok(FrameRead::EndOfMessage)`
//! for the sentinel, and a [`TransportError`] variant for timeout, protocol
//! violation, and peer close.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;

/// Frame header size in bytes
pub const HEADER_BYTES: usize = 2;

/// Reserved header value marking the end of a logical message
pub const END_OF_MESSAGE: u16 = 0xFFFF;

/// One read outcome from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    /// A data frame's payload
    Payload(Vec<u8>),
    /// The end-of-message sentinel
    EndOfMessage,
}

/// Encodes and decodes the length-prefixed wire format
///
/// Byte order is big-endian on both encode and decode paths. Outgoing
/// payloads are split into `send_chunk` sized frames followed by exactly
/// one sentinel.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload: usize,
    send_chunk: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            max_payload: 4096,
            send_chunk: 2048,
        }
    }
}

impl FrameCodec {
    /// Create a codec with explicit limits
    ///
    /// `max_payload` must stay below the sentinel value; `send_chunk` must
    /// not exceed `max_payload` so everything we emit is readable by the
    /// same codec.
    pub fn new(max_payload: usize, send_chunk: usize) -> Self {
        debug_assert!(max_payload > 0 && max_payload < END_OF_MESSAGE as usize);
        debug_assert!(send_chunk > 0 && send_chunk <= max_payload);
        Self {
            max_payload,
            send_chunk,
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Read one frame
    ///
    /// The header is exactly [`HEADER_BYTES`] bytes; short reads are
    /// retried by `read_exact` until satisfied or `timeout` elapses.
    /// The declared length is validated against `max_payload` before any
    /// buffer is allocated. The same `timeout` bounds the body read.
    pub async fn read_frame<R>(
        &self,
        stream: &mut R,
        timeout: Duration,
    ) -> Result<FrameRead, TransportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut header = [0u8; HEADER_BYTES];
        read_exact_timed(stream, &mut header, timeout).await?;

        let declared = u16::from_be_bytes(header);
        if declared == END_OF_MESSAGE {
            return Ok(FrameRead::EndOfMessage);
        }

        let len = declared as usize;
        if len == 0 || len > self.max_payload {
            tracing::debug!(declared = len, max = self.max_payload, "Rejecting illegal frame length");
            return Err(TransportError::ProtocolViolation(format!(
                "Illegal frame length {} (max {})",
                len, self.max_payload
            )));
        }

        let mut payload = vec![0u8; len];
        read_exact_timed(stream, &mut payload, timeout).await?;

        Ok(FrameRead::Payload(payload))
    }

    /// Write one payload as a sequence of frames, without the sentinel
    ///
    /// The payload is split into `send_chunk` sized frames; each write is
    /// flushed whole before the next begins.
    pub async fn write_payload<W>(
        &self,
        stream: &mut W,
        payload: &[u8],
    ) -> Result<(), TransportError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        for chunk in payload.chunks(self.send_chunk) {
            let header = (chunk.len() as u16).to_be_bytes();
            stream.write_all(&header).await?;
            stream.write_all(chunk).await?;
        }
        stream.flush().await?;
        Ok(())
    }

    /// Write the end-of-message sentinel
    pub async fn write_end_marker<W>(&self, stream: &mut W) -> Result<(), TransportError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        stream.write_all(&END_OF_MESSAGE.to_be_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Write one complete logical message: all payload frames plus the sentinel
    pub async fn write_message<W>(
        &self,
        stream: &mut W,
        payload: &[u8],
    ) -> Result<(), TransportError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.write_payload(stream, payload).await?;
        self.write_end_marker(stream).await
    }
}

/// `read_exact` bounded by a timeout, with EOF mapped to `ConnectionClosed`
async fn read_exact_timed<R>(
    stream: &mut R,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin + Send,
{
    match tokio::time::timeout(timeout, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(TransportError::ConnectionClosed)
        }
        Ok(Err(e)) => Err(TransportError::Io(e)),
        Err(_) => Err(TransportError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_round_trip() {
        let codec = FrameCodec::default();
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);

        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        codec.write_message(&mut client, &payload).await.unwrap();

        let mut received = Vec::new();
        let mut frames = 0;
        loop {
            match codec.read_frame(&mut server, TIMEOUT).await.unwrap() {
                FrameRead::Payload(chunk) => {
                    assert!(chunk.len() <= 2048);
                    received.extend_from_slice(&chunk);
                    frames += 1;
                }
                FrameRead::EndOfMessage => break,
            }
        }

        assert_eq!(received, payload);
        assert_eq!(frames, 3); // 2048 + 2048 + 904
    }

    #[tokio::test]
    async fn test_empty_payload_is_bare_sentinel() {
        let codec = FrameCodec::default();
        let (mut client, mut server) = tokio::io::duplex(1024);

        codec.write_message(&mut client, &[]).await.unwrap();

        assert_eq!(
            codec.read_frame(&mut server, TIMEOUT).await.unwrap(),
            FrameRead::EndOfMessage
        );
    }

    #[tokio::test]
    async fn test_zero_length_rejected() {
        let codec = FrameCodec::default();
        let (mut client, mut server) = tokio::io::duplex(1024);

        client.write_all(&0u16.to_be_bytes()).await.unwrap();

        let err = codec.read_frame(&mut server, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, TransportError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected_without_read() {
        let codec = FrameCodec::default();
        let (mut client, mut server) = tokio::io::duplex(1024);

        // Declares 8192 bytes but sends none; rejection must not wait for them
        client.write_all(&8192u16.to_be_bytes()).await.unwrap();

        let start = std::time::Instant::now();
        let err = codec.read_frame(&mut server, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, TransportError::ProtocolViolation(_)));
        assert!(start.elapsed() < TIMEOUT);
    }

    #[tokio::test]
    async fn test_header_timeout() {
        let codec = FrameCodec::default();
        let (_client, mut server) = tokio::io::duplex(1024);

        let err = codec
            .read_frame(&mut server, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }

    #[tokio::test]
    async fn test_peer_close_during_header() {
        let codec = FrameCodec::default();
        let (client, mut server) = tokio::io::duplex(1024);
        drop(client);

        let err = codec.read_frame(&mut server, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_peer_close_during_body() {
        let codec = FrameCodec::default();
        let (mut client, mut server) = tokio::io::duplex(1024);

        client.write_all(&10u16.to_be_bytes()).await.unwrap();
        client.write_all(&[1, 2, 3, 4]).await.unwrap();
        drop(client);

        let err = codec.read_frame(&mut server, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_max_payload_boundary() {
        let codec = FrameCodec::new(4096, 4096);
        let (mut client, mut server) = tokio::io::duplex(16 * 1024);

        let payload = vec![0xAB; 4096];
        codec.write_payload(&mut client, &payload).await.unwrap();

        match codec.read_frame(&mut server, TIMEOUT).await.unwrap() {
            FrameRead::Payload(chunk) => assert_eq!(chunk.len(), 4096),
            other => panic!("expected payload frame, got {:?}", other),
        }
    }
}
