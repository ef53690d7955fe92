//! Control tokens
//!
//! Sent as raw newline-terminated ASCII lines outside the framing; the
//! device client reads them with read-until-newline.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::TransportError;

/// Wake phrase confirmed; client should begin streaming the full utterance
pub const WAKE_CONFIRMED: &[u8] = b"WAKE_CONFIRMED\n";

/// Capture sentinel received and the utterance passed validation; client
/// should switch to playback
pub const DATA_RECEIVED: &[u8] = b"DATA_RECEIVED\n";

/// A turn stage failed; sent in place of an audio reply
pub const STAGE_ERROR: &[u8] = b"<ERROR>\n";

/// The full reply (frames + sentinel) has been streamed
pub const REPLY_COMPLETE: &[u8] = b"REPLY_COMPLETE\n";

/// Send one control token, fully flushed
pub async fn send<W>(stream: &mut W, token: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + Send,
{
    stream.write_all(token).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_tokens_are_newline_terminated() {
        for token in [WAKE_CONFIRMED, DATA_RECEIVED, STAGE_ERROR, REPLY_COMPLETE] {
            assert_eq!(*token.last().unwrap(), b'\n');
        }
    }

    #[tokio::test]
    async fn test_send_token() {
        let (mut client, mut server) = tokio::io::duplex(64);
        send(&mut client, WAKE_CONFIRMED).await.unwrap();
        drop(client);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, WAKE_CONFIRMED);
    }
}
