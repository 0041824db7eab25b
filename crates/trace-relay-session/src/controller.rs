//! Session controller: owns the single live session and publishes state.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use trace_relay_core::{
    Connector, Credential, CredentialProvider, CredentialStore, RecordFeed, RelayConfig,
    SessionState, TraceRecord,
};

use crate::session::{ConnectionSession, SessionError, SessionId, SessionSink};

/// State shared with the receive loop of the current session.
struct Shared {
    feed: Arc<RecordFeed>,
    state: watch::Sender<SessionState>,
    /// Keeps the watch channel and the feed in the same order.
    publish_lock: StdMutex<()>,
    current: Mutex<Option<ConnectionSession>>,
}

impl Shared {
    fn publish(&self, state: SessionState) {
        let _guard = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.state.send_replace(state.clone());
        self.feed.push_state(state);
    }
}

/// Sink installed on the current session.
struct ControllerSink {
    shared: Arc<Shared>,
    session_id: SessionId,
}

#[async_trait]
impl SessionSink for ControllerSink {
    async fn on_records(&self, records: Vec<TraceRecord>) {
        self.shared.feed.push_records(records);
    }

    async fn on_closed(&self, error: Option<SessionError>) {
        let mut current = self.shared.current.lock().await;
        // A session replaced or detached by the controller reports nothing.
        if current.as_ref().is_none_or(|s| s.id() != self.session_id) {
            return;
        }
        current.take();

        let state = match error {
            Some(e) => {
                tracing::warn!(session_id = %self.session_id, "Trace session failed: {e}");
                SessionState::Failed(e.to_string())
            }
            None => SessionState::Disconnected,
        };
        self.shared.publish(state);
    }
}

/// Owns at most one [`ConnectionSession`] and the credential caching policy.
///
/// Every state change is published both on a watch channel (latest value)
/// and on the [`RecordFeed`], interleaved in order with decoded records.
pub struct SessionController<C>
where
    C: Connector,
{
    connector: C,
    credentials: CredentialProvider,
    config: RelayConfig,
    manual_credential: StdMutex<Option<(String, String)>>,
    /// Serializes attach/detach.
    control: Mutex<()>,
    /// Bumped by `detach`; an attach started under an older value gives up.
    cancel: watch::Sender<u64>,
    shared: Arc<Shared>,
}

impl<C> SessionController<C>
where
    C: Connector,
{
    /// Create a controller. `config` supplies the provider settings; host
    /// and port are given per attach.
    #[must_use]
    pub fn new(connector: C, store: Arc<dyn CredentialStore>, config: RelayConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            connector,
            credentials: CredentialProvider::new(store),
            config,
            manual_credential: StdMutex::new(None),
            control: Mutex::new(()),
            cancel: watch::Sender::new(0),
            shared: Arc::new(Shared {
                feed: Arc::new(RecordFeed::new()),
                state,
                publish_lock: StdMutex::new(()),
                current: Mutex::new(None),
            }),
        }
    }

    /// Use credentials entered by the user instead of cached ones.
    ///
    /// Empty values clear the override.
    pub fn set_credential(&self, username: impl Into<String>, password: impl Into<String>) {
        let (username, password) = (username.into(), password.into());
        let value = (!username.is_empty() && !password.is_empty()).then_some((username, password));
        *self
            .manual_credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Connect to `host:port`, replacing any current session.
    ///
    /// The outcome is also published as a state transition; a failure is
    /// never fatal and another `attach` may follow at any time. A
    /// [`detach`](Self::detach) issued while the attempt is in flight cancels
    /// it and reports `Disconnected`.
    ///
    /// # Errors
    /// Returns error if the connection or the activation fails, or
    /// [`SessionError::Cancelled`] if the attempt was detached.
    pub async fn attach(&self, host: &str, port: u16) -> Result<(), SessionError> {
        let mut cancel = self.cancel.subscribe();
        let epoch = *cancel.borrow_and_update();

        let _control = self.control.lock().await;
        self.teardown().await;

        let config = self.config.clone().with_host(host).with_port(port);
        let credential = self.credential_for(&config.resource_id()).await;
        let uri = config.endpoint_uri();

        tracing::info!(%uri, authenticated = credential.is_some(), "Attaching to trace endpoint");
        self.shared.publish(SessionState::Connecting);

        let opened = tokio::select! {
            biased;
            _ = cancel.wait_for(|current| *current != epoch) => {
                Err(SessionError::Cancelled)
            }
            result = ConnectionSession::open(
                &self.connector,
                &uri,
                credential.as_ref(),
                config.activation_command(),
            ) => result,
        };

        let mut session = match opened {
            Ok(session) => session,
            Err(SessionError::Cancelled) => {
                tracing::info!(%uri, "Attach cancelled");
                self.shared.publish(SessionState::Disconnected);
                return Err(SessionError::Cancelled);
            }
            Err(e) => {
                tracing::warn!(%uri, "Attach failed: {e}");
                self.shared.publish(SessionState::Failed(e.to_string()));
                return Err(e);
            }
        };

        tracing::info!(%uri, session_id = %session.id(), "Trace session active");
        self.shared.publish(SessionState::Connected);

        // Only credentials that made it through a full round trip are cached.
        if let Some(credential) = &credential {
            self.credentials.store(credential).await;
        }

        let sink = Arc::new(ControllerSink {
            shared: Arc::clone(&self.shared),
            session_id: session.id(),
        });
        // Install before starting so an immediate close finds its slot.
        let mut current = self.shared.current.lock().await;
        session.start(sink);
        *current = Some(session);
        Ok(())
    }

    /// Close the current session, if any, and report `Disconnected`.
    ///
    /// Also cancels any attach still connecting, without waiting for the
    /// transport to give up.
    pub async fn detach(&self) {
        self.cancel.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
        let _control = self.control.lock().await;
        if self.teardown().await {
            self.shared.publish(SessionState::Disconnected);
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Message of the last failure, if the controller is in `Failed`.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.shared.state.borrow().error_message().map(str::to_string)
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Ordered feed of records and state transitions.
    #[must_use]
    pub fn feed(&self) -> Arc<RecordFeed> {
        Arc::clone(&self.shared.feed)
    }

    /// Whether a session is currently installed.
    pub async fn is_attached(&self) -> bool {
        self.shared.current.lock().await.is_some()
    }

    async fn credential_for(&self, resource_id: &str) -> Option<Credential> {
        let manual = self
            .manual_credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match manual {
            Some((username, password)) => Some(Credential::new(resource_id, username, password)),
            None => self.credentials.load(resource_id).await,
        }
    }

    /// Take the current session out of its slot and close it.
    async fn teardown(&self) -> bool {
        // Release the slot before closing; the loop locks it on exit.
        let previous = self.shared.current.lock().await.take();
        match previous {
            Some(mut session) => {
                tracing::debug!(session_id = %session.id(), "Closing previous session");
                session.close().await;
                true
            }
            None => false,
        }
    }
}
