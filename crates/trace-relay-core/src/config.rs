//! Relay configuration.
//!
//! Provides:
//! - Endpoint and credential resource derivation from host and port
//! - The trace provider activation command
//! - Platform-dependent default port

use serde::{Deserialize, Serialize};

/// Default endpoint host.
pub const DEFAULT_HOST: &str = "localhost";

/// Provider streamed by default.
pub const DEFAULT_PROVIDER: &str = "9f7e92de-9bd1-5b43-9cbd-e332a6ed01e6";

/// Default provider verbosity (Verbose).
pub const DEFAULT_VERBOSITY: u8 = 5;

/// Realtime session path on the endpoint.
pub const REALTIME_PATH: &str = "/api/etw/session/realtime";

/// Device family the client runs on; selects the default port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    /// Headset-class device, portal served on 443.
    Holographic,
    #[default]
    Desktop,
}

impl DeviceFamily {
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Holographic => 443,
            Self::Desktop => 50443,
        }
    }
}

/// Connection settings for the realtime trace endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Trace provider GUID to activate.
    pub provider: String,
    /// Verbosity requested for the provider.
    pub verbosity: u8,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::for_device(DeviceFamily::default())
    }
}

impl RelayConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for a given device family.
    #[must_use]
    pub fn for_device(family: DeviceFamily) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: family.default_port(),
            provider: DEFAULT_PROVIDER.to_string(),
            verbosity: DEFAULT_VERBOSITY,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>, verbosity: u8) -> Self {
        self.provider = provider.into();
        self.verbosity = verbosity;
        self
    }

    /// Secure WebSocket URI of the realtime session.
    #[must_use]
    pub fn endpoint_uri(&self) -> String {
        format!("wss://{}:{}{REALTIME_PATH}", self.host, self.port)
    }

    /// Credential lookup key for this endpoint.
    #[must_use]
    pub fn resource_id(&self) -> String {
        format!("https://{}:{}/", self.host, self.port)
    }

    /// Control frame that starts streaming the configured provider.
    #[must_use]
    pub fn activation_command(&self) -> String {
        format!("provider {} enable {}", self.provider, self.verbosity)
    }
}
