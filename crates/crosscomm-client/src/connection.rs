//! Connection state
//!
//! [`Connection`] is the mutex-guarded record of the current session: its
//! lifecycle state, a generation counter and the live sink. Every session
//! gets a fresh generation so tasks belonging to a superseded session can
//! recognise themselves and leave the newer one alone.

use core::fmt;
use std::sync::Arc;

use futures::SinkExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crosscomm_core::Envelope;

use crate::error::ClientError;
use crate::heartbeat::HeartbeatHandle;
use crate::transport::{Frame, FrameSink};

/// Sink shared by callers, the heartbeat loop and disconnect
pub(crate) type SharedSink = Arc<Mutex<FrameSink>>;

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Lifecycle of the relay connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// Resources owned by one established session
pub(crate) struct Session {
    pub(crate) sink: SharedSink,
    pub(crate) receiver: JoinHandle<()>,
    pub(crate) heartbeat: Option<HeartbeatHandle>,
}

impl Session {
    /// Stop background tasks; the sink is left to the caller
    pub(crate) fn stop_tasks(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        self.receiver.abort();
    }
}

/// Current connection record
#[derive(Default)]
pub(crate) struct Connection {
    state: ConnectionState,
    generation: u64,
    session: Option<Session>,
}

impl Connection {
    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while `generation` is the established session
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.state == ConnectionState::Connected && self.generation == generation
    }

    /// Sink of the established session
    pub(crate) fn sink(&self) -> Option<SharedSink> {
        match (self.state, &self.session) {
            (ConnectionState::Connected, Some(session)) => Some(session.sink.clone()),
            _ => None,
        }
    }

    /// Enter `Connecting` and allocate the generation for the new session
    pub(crate) fn begin_connect(&mut self) -> u64 {
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        self.generation
    }

    /// Return to `Disconnected` after a failed attempt of `generation`
    pub(crate) fn abort_connect(&mut self, generation: u64) {
        if self.generation == generation && self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Install the session of `generation` and enter `Connected`
    ///
    /// Fails, handing the session back, when the attempt was superseded or
    /// the receive loop already reported the link as lost.
    pub(crate) fn establish(&mut self, generation: u64, session: Session) -> Result<(), Session> {
        if self.generation != generation || self.state != ConnectionState::Connecting {
            return Err(session);
        }
        self.session = Some(session);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    pub(crate) fn attach_heartbeat(&mut self, heartbeat: HeartbeatHandle) {
        match self.session.as_mut() {
            Some(session) => session.heartbeat = Some(heartbeat),
            None => heartbeat.stop(),
        }
    }

    /// Enter `Disconnecting` and take the session for teardown
    pub(crate) fn begin_disconnect(&mut self) -> Option<Session> {
        if self.state != ConnectionState::Connected {
            return None;
        }
        self.state = ConnectionState::Disconnecting;
        self.session.take()
    }

    pub(crate) fn finish_disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Receive-loop exit for `generation`; ignored when superseded
    pub(crate) fn mark_lost(&mut self, generation: u64) -> bool {
        if self.generation != generation {
            return false;
        }
        match self.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                if let Some(mut session) = self.session.take() {
                    if let Some(heartbeat) = session.heartbeat.take() {
                        heartbeat.stop();
                    }
                }
                self.state = ConnectionState::Disconnected;
                true
            }
            _ => false,
        }
    }
}

// ----------------------------------------------------------------------------
// Sending
// ----------------------------------------------------------------------------

/// Serialize and write one envelope
pub(crate) async fn send_envelope(sink: &SharedSink, envelope: &Envelope) -> Result<(), ClientError> {
    let text = envelope.to_json()?;
    sink.lock().await.send(Frame::Text(text)).await?;
    Ok(())
}

/// Write an envelope whose loss is tolerated (heartbeat, logout)
pub(crate) async fn send_best_effort(sink: &SharedSink, envelope: &Envelope) {
    if let Err(e) = send_envelope(sink, envelope).await {
        debug!("Best-effort {} send failed: {}", envelope.kind(), e);
    }
}

/// Close the sink, ignoring errors from an already broken link
pub(crate) async fn close_sink(sink: &SharedSink) {
    if let Err(e) = sink.lock().await.close().await {
        debug!("Closing transport failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_guards_state_changes() {
        let mut connection = Connection::default();
        let first = connection.begin_connect();
        connection.abort_connect(first);
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        let second = connection.begin_connect();
        assert!(second > first);

        // A loop from the first session cannot touch the second
        assert!(!connection.mark_lost(first));
        assert_eq!(connection.state(), ConnectionState::Connecting);

        assert!(connection.mark_lost(second));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(!connection.is_current(second));
    }

    #[test]
    fn test_disconnect_requires_connected() {
        let mut connection = Connection::default();
        assert!(connection.begin_disconnect().is_none());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(connection.sink().is_none());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
