//! Core abstractions for the realtime trace relay client.
//!
//! This crate provides the fundamental building blocks:
//! - `TraceRecord` / `TraceLevel` - Typed log records
//! - `decoder` - Frame decoding for the realtime event feed
//! - `RecordFeed` - Ordered broadcast + history for consumers
//! - `CredentialProvider` - Best-effort cached credentials
//! - Transport and credential store traits

pub mod config;
pub mod credential;
pub mod decoder;
pub mod feed;
pub mod pin;
pub mod record;
pub mod state;
pub mod traits;

pub use config::{DeviceFamily, RelayConfig};
pub use credential::{Credential, CredentialProvider};
pub use decoder::decode_frame;
pub use feed::RecordFeed;
pub use record::{Severity, TraceLevel, TraceRecord};
pub use state::{RelayEvent, SessionState, StateUpdate};
pub use traits::{Connector, CredentialStore, Frame, StoreError, Transport, TransportError};
