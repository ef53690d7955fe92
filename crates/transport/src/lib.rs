//! Length-prefixed wire framing for the voicelink speech server
//!
//! The protocol is a stream of frames, each a 2-byte big-endian unsigned
//! length header followed by that many payload bytes. The reserved header
//! value `0xFFFF` is the end-of-message sentinel and carries no payload.
//! Control signals are raw newline-terminated ASCII tokens outside the
//! framing (the device client reads them with read-until-newline).

pub mod frame;
pub mod tokens;

pub use frame::{FrameCodec, FrameRead, END_OF_MESSAGE, HEADER_BYTES};

use thiserror::Error;

/// Transport outcomes that are not a successful frame
///
/// Callers branch on these explicitly: a timeout regresses the session,
/// a protocol violation or closed connection aborts it.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Timed out waiting for frame data")]
    Timeout,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
