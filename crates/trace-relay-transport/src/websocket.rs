//! Secure WebSocket transport for the realtime trace endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    Connector as TlsConnector, MaybeTlsStream, WebSocketStream,
    tungstenite::{
        Error as WsError, Message,
        client::IntoClientRequest,
        error::ProtocolError,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};
use trace_relay_core::{Connector, Credential, Frame, Transport, TransportError};

use crate::{
    protocol::{CLOSE_ABNORMAL, CLOSE_NO_STATUS, basic_auth_header},
    tls,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `wss://` connections with the tolerant certificate policy.
#[derive(Clone)]
pub struct WsConnector {
    tls: Arc<rustls::ClientConfig>,
}

impl WsConnector {
    /// Connector trusting the platform's root certificates.
    ///
    /// # Errors
    /// Returns error if the TLS configuration cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_roots(tls::native_roots())
    }

    /// Connector trusting only `roots`.
    ///
    /// # Errors
    /// Returns error if the TLS configuration cannot be built.
    pub fn with_roots(roots: rustls::RootCertStore) -> Result<Self, TransportError> {
        Ok(Self {
            tls: Arc::new(tls::client_config(roots)?),
        })
    }
}

impl std::fmt::Debug for WsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnector").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        uri: &str,
        credential: Option<&Credential>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut request = uri
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        if let Some(credential) = credential {
            let value = HeaderValue::from_str(&basic_auth_header(credential))
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        tracing::debug!(uri, authenticated = credential.is_some(), "Opening WebSocket");

        let (stream, _response) = tokio_tungstenite::connect_async_tls_with_config(
            request,
            None,
            false,
            Some(TlsConnector::Rustls(Arc::clone(&self.tls))),
        )
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Box::new(WsTransport::new(stream)))
    }
}

/// An open WebSocket connection.
pub struct WsTransport {
    stream: WsStream,
}

impl WsTransport {
    #[must_use]
    pub const fn new(stream: WsStream) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(receive_error(e))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(Frame::Text(text))),
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => return Some(Ok(Frame::Text(text))),
                    Err(_) => {
                        tracing::debug!("Dropping non-UTF-8 binary frame");
                    }
                },
                Message::Close(frame) => {
                    let (code, reason) = frame.map_or_else(
                        || (CLOSE_NO_STATUS, String::new()),
                        |f| (u16::from(f.code), f.reason.into_owned()),
                    );
                    return Some(Ok(Frame::Close { code, reason }));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}

fn receive_error(err: WsError) -> TransportError {
    match err {
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => TransportError::Closed {
            code: CLOSE_ABNORMAL,
            reason: err.to_string(),
        },
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Ended,
        other => TransportError::Receive(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_maps_to_abnormal_close() {
        let err = receive_error(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake));
        assert!(matches!(err, TransportError::Closed { code: 1006, .. }));
    }

    #[test]
    fn test_closed_maps_to_ended() {
        assert_eq!(receive_error(WsError::ConnectionClosed), TransportError::Ended);
    }

    #[tokio::test]
    async fn test_invalid_uri_rejected() {
        let connector = WsConnector::with_roots(rustls::RootCertStore::empty()).unwrap();
        let err = connector.connect("not a uri", None).await.err().unwrap();
        assert!(matches!(err, TransportError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = WsConnector::with_roots(rustls::RootCertStore::empty()).unwrap();
        let uri = format!("wss://127.0.0.1:{port}/api/etw/session/realtime");
        let err = connector.connect(&uri, None).await.err().unwrap();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
