//! Transport selection by device platform.

use crate::cli_session::CliSession;
use crate::error::{Error, Result};
use crate::json_rpc::JsonRpcSession;
use crate::session::{DEFAULT_JSONRPC_PORT, DEFAULT_SSH_PORT, DEFAULT_TIMEOUT, SessionConfig};
use crate::transport::Transport;
use std::time::Duration;

/// Platforms with a transport implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// CLI-driven management over SSH (JunOS-style semantics)
    Junos,
    /// JSON-RPC management API over HTTPS
    SrLinux,
}

impl Platform {
    /// Parse a platform tag from the inventory.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "junos" => Some(Self::Junos),
            "srlinux" => Some(Self::SrLinux),
            _ => None,
        }
    }

    /// The inventory tag for this platform.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Junos => "junos",
            Self::SrLinux => "srlinux",
        }
    }

    /// Default management port for this platform.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Junos => DEFAULT_SSH_PORT,
            Self::SrLinux => DEFAULT_JSONRPC_PORT,
        }
    }
}

/// Everything needed to build a transport for one device.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    /// Fully qualified domain name
    pub fqdn: String,
    /// Platform tag selecting the transport implementation
    pub platform: String,
    /// Username to authenticate as
    pub username: String,
    /// Password for HTTP-authenticated transports
    pub password: String,
    /// Management port override
    pub port: Option<u16>,
    /// Per-device RPC timeout override
    pub timeout: Option<Duration>,
    /// Alternative ssh_config file
    pub ssh_config: Option<String>,
}

impl DeviceSpec {
    /// Create a spec with defaults for everything but identity and platform.
    pub fn new(fqdn: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            platform: platform.into(),
            username: String::new(),
            password: String::new(),
            port: None,
            timeout: None,
            ssh_config: None,
        }
    }
}

/// Builds transports from device specs. Pure selection, no side effects;
/// no connection is opened until the transport is first used.
pub struct TransportFactory {
    confirm_timeout: Duration,
}

impl TransportFactory {
    /// Create a factory committing with the given confirm window.
    pub fn new(confirm_timeout: Duration) -> Self {
        Self { confirm_timeout }
    }

    /// Build the transport for one device and its candidate configuration.
    pub fn create(&self, spec: &DeviceSpec, candidate: String) -> Result<Transport> {
        let platform =
            Platform::from_tag(&spec.platform).ok_or_else(|| Error::UnsupportedPlatform {
                platform: spec.platform.clone(),
            })?;

        let config = SessionConfig {
            fqdn: spec.fqdn.clone(),
            username: spec.username.clone(),
            password: spec.password.clone(),
            port: spec.port.unwrap_or_else(|| platform.default_port()),
            timeout: spec.timeout.unwrap_or(DEFAULT_TIMEOUT),
            ssh_config: spec.ssh_config.clone(),
        };

        let session: Box<dyn crate::session::Session> = match platform {
            Platform::Junos => Box::new(CliSession::new(config)),
            Platform::SrLinux => Box::new(JsonRpcSession::new(config)),
        };
        Ok(Transport::new(session, candidate, self.confirm_timeout))
    }
}
