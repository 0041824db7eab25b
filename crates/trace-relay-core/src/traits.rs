//! Core traits for credential storage and the streaming transport.

use async_trait::async_trait;
use thiserror::Error;

use crate::credential::Credential;

/// Credential store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Trait for secret-storage backends holding cached credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find the credential saved for a resource identifier.
    async fn find(&self, resource_id: &str) -> Result<Option<Credential>, StoreError>;

    /// Save (or replace) a credential under its resource identifier.
    async fn save(&self, credential: &Credential) -> Result<(), StoreError>;
}

/// One inbound frame from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Complete UTF-8 text message.
    Text(String),
    /// Remote close with status code and reason.
    Close { code: u16, reason: String },
}

/// Transport error.
///
/// The `Display` output is the human-readable failure reported to observers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Receive failed: {0}")]
    Receive(String),
    #[error("Code: {code}, Reason: \"{reason}\"")]
    Closed { code: u16, reason: String },
    #[error("Connection ended without a close frame")]
    Ended,
}

/// An open, bidirectional text-frame connection.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next inbound frame. `None` means the stream has ended.
    ///
    /// Must be cancel-safe: dropping the future loses no frame.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Close the connection from our side.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `uri`, authenticating with `credential` if given.
    async fn connect(
        &self,
        uri: &str,
        credential: Option<&Credential>,
    ) -> Result<Box<dyn Transport>, TransportError>;
}
