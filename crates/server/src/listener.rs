//! Connection listener
//!
//! Binds one address, accepts connections indefinitely, and spawns one
//! isolated session task per connection. The accept loop never blocks on
//! a session; it only registers the new session and moves on.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::net::{TcpListener, TcpStream};

use crate::connection::ConnectionDriver;
use crate::session::{Session, SessionInfo};
use crate::state::AppState;
use crate::ServerError;

/// TCP listener bound to the configured address
pub struct Listener {
    state: AppState,
    inner: TcpListener,
}

impl Listener {
    /// Bind to the configured address; failure here is fatal to startup
    pub async fn bind(state: AppState) -> Result<Self, ServerError> {
        let addr = format!(
            "{}:{}",
            state.settings.server.host, state.settings.server.port
        );
        let inner = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", addr, e)))?;
        tracing::info!("Listening on {}", addr);
        Ok(Self { state, inner })
    }

    /// Actual bound address (useful when the configured port is 0)
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.inner
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))
    }

    /// Accept connections until `shutdown` resolves
    pub async fn serve(self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received, stopping accept loop");
                    break;
                }
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(stream, peer),
                    Err(e) => tracing::error!("Accept failed: {}", e),
                }
            }
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer, "Failed to set TCP_NODELAY: {}", e);
        }

        let state = self.state.clone();
        let session = Session::new(
            peer,
            state.audio_spec,
            state.settings.audio.min_utterance_duration(),
        );
        let session_id = session.id().to_string();

        if let Err(e) = state.registry.register(SessionInfo {
            id: session_id.clone(),
            peer,
            connected_at: Instant::now(),
        }) {
            tracing::warn!(peer = %peer, error = %e, "Rejecting connection");
            return;
        }

        tracing::info!(
            session_id = %session_id,
            peer = %peer,
            live_sessions = state.registry.count(),
            "Accepted connection"
        );

        tokio::spawn(async move {
            let registry = state.registry.clone();
            ConnectionDriver::new(state, session, stream).run().await;
            registry.unregister(&session_id);
            tracing::info!(
                session_id = %session_id,
                live_sessions = registry.count(),
                "Connection closed"
            );
        });
    }
}
