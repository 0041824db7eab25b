//! Session orchestration for the realtime trace relay.
//!
//! Provides:
//! - `ConnectionSession` - One connection: connect, activate, receive loop
//! - `SessionController` - Single-session ownership, credential policy, state
//! - Credential store implementations (memory, JSON file)

pub mod controller;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;

pub use controller::SessionController;
pub use session::{ConnectionSession, SessionError, SessionPhase, SessionSink};
