//! Voicelink Server
//!
//! TCP listener, per-connection session state machine, and the wiring
//! that bridges the frame codec, the audio accumulator, and the turn
//! pipeline into a running service.

pub mod connection;
pub mod history;
pub mod listener;
pub mod session;
pub mod state;

pub use connection::ConnectionDriver;
pub use history::FileTurnLogger;
pub use listener::Listener;
pub use session::{Phase, Session, SessionInfo, SessionRegistry};
pub use state::{AppState, Collaborators};

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Illegal phase transition: {from} -> {to}")]
    IllegalTransition {
        from: session::Phase,
        to: session::Phase,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] voicelink_transport::TransportError),
}
