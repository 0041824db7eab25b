//! A single connection to the realtime trace endpoint.
//!
//! Lifecycle: `Idle -> Handshaking -> Active -> Closed`. [`ConnectionSession::open`]
//! connects and sends the activation command; [`ConnectionSession::start`]
//! spawns the receive loop, which decodes every inbound frame and hands the
//! records to a [`SessionSink`] until the transport closes, fails, or the
//! session is closed by its owner.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::{sync::watch, task::JoinHandle};
use trace_relay_core::{
    Connector, Credential, Frame, TraceRecord, Transport, TransportError, decode_frame,
};
use uuid::Uuid;

/// Session identifier.
pub type SessionId = Uuid;

/// Connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Handshaking,
    Active,
    Closed,
}

/// Session error. `Display` is the transport's own description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Transport connect or authentication failed.
    #[error("{0}")]
    Connect(TransportError),
    /// Sending the activation command failed.
    #[error("{0}")]
    Activate(TransportError),
    /// The receive loop ended: remote close, transport error, or end of stream.
    #[error("{0}")]
    Receive(TransportError),
    /// The owner gave up on the attempt before it completed.
    #[error("Connection attempt cancelled")]
    Cancelled,
}

impl SessionError {
    /// Underlying transport error, if the transport produced one.
    #[must_use]
    pub const fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Connect(e) | Self::Activate(e) | Self::Receive(e) => Some(e),
            Self::Cancelled => None,
        }
    }
}

/// Receiver of everything a running session produces.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Records decoded from one frame, in feed order. Never empty.
    async fn on_records(&self, records: Vec<TraceRecord>);

    /// Called exactly once when the receive loop ends. `None` means the
    /// owner closed the session.
    async fn on_closed(&self, error: Option<SessionError>);
}

/// One connection to the trace endpoint.
pub struct ConnectionSession {
    id: SessionId,
    phase: Arc<watch::Sender<SessionPhase>>,
    shutdown: watch::Sender<bool>,
    /// Held until the receive loop takes it over.
    transport: Option<Box<dyn Transport>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionSession {
    /// Connect to `uri` and send the activation command.
    ///
    /// No retry is attempted; the caller decides whether to try again.
    ///
    /// # Errors
    /// Returns error if the connection or the activation send fails.
    pub async fn open(
        connector: &dyn Connector,
        uri: &str,
        credential: Option<&Credential>,
        activation: String,
    ) -> Result<Self, SessionError> {
        let id = Uuid::new_v4();
        let (phase, _) = watch::channel(SessionPhase::Idle);

        let mut transport = connector
            .connect(uri, credential)
            .await
            .map_err(SessionError::Connect)?;
        phase.send_replace(SessionPhase::Handshaking);
        tracing::debug!(%id, uri, "Transport connected, activating provider");

        if let Err(e) = transport.send_text(activation).await {
            if let Err(close_err) = transport.close().await {
                tracing::debug!(%id, "Close after failed activation: {close_err}");
            }
            return Err(SessionError::Activate(e));
        }
        phase.send_replace(SessionPhase::Active);

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            id,
            phase: Arc::new(phase),
            shutdown,
            transport: Some(transport),
            task: None,
        })
    }

    /// Spawn the receive loop. Has no effect if already started or closed.
    pub fn start(&mut self, sink: Arc<dyn SessionSink>) {
        let Some(transport) = self.transport.take() else {
            return;
        };
        let task = tokio::spawn(receive_loop(
            self.id,
            transport,
            sink,
            self.shutdown.subscribe(),
            Arc::clone(&self.phase),
        ));
        self.task = Some(task);
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Close the session and wait for the receive loop to finish.
    ///
    /// Safe to call at any time, any number of times.
    pub async fn close(&mut self) {
        self.shutdown.send_replace(true);

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(id = %self.id, "Receive loop aborted: {e}");
            }
        }

        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::debug!(id = %self.id, "Close handshake failed: {e}");
            }
        }

        self.phase.send_replace(SessionPhase::Closed);
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

async fn receive_loop(
    id: SessionId,
    mut transport: Box<dyn Transport>,
    sink: Arc<dyn SessionSink>,
    mut shutdown: watch::Receiver<bool>,
    phase: Arc<watch::Sender<SessionPhase>>,
) {
    let outcome = loop {
        tokio::select! {
            // Also fires when the session handle is dropped.
            _ = shutdown.changed() => {
                if let Err(e) = transport.close().await {
                    tracing::debug!(%id, "Close handshake failed: {e}");
                }
                break None;
            }
            frame = transport.next_frame() => match frame {
                Some(Ok(Frame::Text(text))) => {
                    let records = decode_frame(&text);
                    if !records.is_empty() {
                        sink.on_records(records).await;
                    }
                }
                Some(Ok(Frame::Close { code, reason })) => {
                    break Some(SessionError::Receive(TransportError::Closed { code, reason }));
                }
                Some(Err(e)) => break Some(SessionError::Receive(e)),
                None => break Some(SessionError::Receive(TransportError::Ended)),
            }
        }
    };

    phase.send_replace(SessionPhase::Closed);
    match &outcome {
        Some(e) => tracing::info!(%id, "Session closed: {e}"),
        None => tracing::debug!(%id, "Session closed by owner"),
    }
    sink.on_closed(outcome).await;
}
