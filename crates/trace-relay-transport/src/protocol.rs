//! Wire helpers shared by transports.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use trace_relay_core::Credential;

/// Close code reported when the remote sent a close frame without a status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the connection dropped without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// `Authorization` header value for HTTP Basic authentication.
#[must_use]
pub fn basic_auth_header(credential: &Credential) -> String {
    let pair = format!("{}:{}", credential.username, credential.password);
    format!("Basic {}", BASE64.encode(pair))
}
