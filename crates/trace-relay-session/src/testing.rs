//! In-process scripted transport for session and controller tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use trace_relay_core::{
    Connector, Credential, CredentialStore, Frame, StoreError, Transport, TransportError,
};

type Inbound = Option<Result<Frame, TransportError>>;

/// Build a frame holding one `Log` event per message.
pub fn log_frame(messages: &[&str]) -> String {
    let events: Vec<_> = messages
        .iter()
        .map(|m| {
            json!({
                "TaskName": "Log",
                "Timestamp": 132_539_328_000_000_000_i64,
                "Level": 4,
                "msg": format!("\"{m}\""),
            })
        })
        .collect();
    json!({ "Events": events }).to_string()
}

/// The server side of one mock connection.
#[derive(Clone)]
pub struct RemoteEnd {
    pub uri: String,
    pub credential: Option<Credential>,
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl RemoteEnd {
    pub fn send_text(&self, text: String) {
        let _ = self.inbound.send(Some(Ok(Frame::Text(text))));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.inbound.send(Some(Ok(Frame::Close {
            code,
            reason: reason.to_string(),
        })));
    }

    pub fn fail(&self, err: TransportError) {
        let _ = self.inbound.send(Some(Err(err)));
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    send_error: Option<TransportError>,
    open: Arc<AtomicUsize>,
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if let Some(err) = self.send_error.take() {
            return Err(err);
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.inbound.recv().await.flatten()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out channel-backed transports.
#[derive(Default)]
pub struct MockConnector {
    remotes: Mutex<Vec<RemoteEnd>>,
    connect_errors: Mutex<VecDeque<TransportError>>,
    send_errors: Mutex<VecDeque<TransportError>>,
    hang_next: AtomicBool,
    open: Arc<AtomicUsize>,
    open_at_connect: Mutex<Vec<usize>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_connect(&self, err: TransportError) {
        self.connect_errors.lock().unwrap().push_back(err);
    }

    /// The next connect never completes.
    pub fn hang_next_connect(&self) {
        self.hang_next.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_send(&self, err: TransportError) {
        self.send_errors.lock().unwrap().push_back(err);
    }

    /// Server side of the `i`-th successful connection.
    pub fn remote(&self, i: usize) -> RemoteEnd {
        self.remotes.lock().unwrap()[i].clone()
    }

    pub fn connections(&self) -> usize {
        self.remotes.lock().unwrap().len()
    }

    /// Number of transports still alive when each connect was made.
    pub fn open_at_connect(&self) -> Vec<usize> {
        self.open_at_connect.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        uri: &str,
        credential: Option<&Credential>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.open_at_connect
            .lock()
            .unwrap()
            .push(self.open.load(Ordering::SeqCst));

        if let Some(err) = self.connect_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        if self.hang_next.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.remotes.lock().unwrap().push(RemoteEnd {
            uri: uri.to_string(),
            credential: credential.cloned(),
            inbound: tx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        });
        self.open.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockTransport {
            inbound: rx,
            sent,
            closed,
            send_error: self.send_errors.lock().unwrap().pop_front(),
            open: Arc::clone(&self.open),
        }))
    }
}

/// Credential store recording every save.
#[derive(Default)]
pub struct CountingStore {
    entries: Mutex<HashMap<String, Credential>>,
    saves: Mutex<Vec<Credential>>,
}

impl CountingStore {
    pub fn with(credential: Credential) -> Self {
        let store = Self::default();
        store
            .entries
            .lock()
            .unwrap()
            .insert(credential.resource_id.clone(), credential);
        store
    }

    pub fn saves(&self) -> Vec<Credential> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialStore for CountingStore {
    async fn find(&self, resource_id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.entries.lock().unwrap().get(resource_id).cloned())
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        self.saves.lock().unwrap().push(credential.clone());
        self.entries
            .lock()
            .unwrap()
            .insert(credential.resource_id.clone(), credential.clone());
        Ok(())
    }
}
