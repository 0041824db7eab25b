//! Transport layer for the realtime trace endpoint.
//!
//! Provides:
//! - Wire helpers (authorization header, close codes)
//! - Tolerant TLS certificate verification (feature: websocket)
//! - WebSocket connector (feature: websocket)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod tls;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::basic_auth_header;

#[cfg(feature = "websocket")]
pub use websocket::{WsConnector, WsTransport};
