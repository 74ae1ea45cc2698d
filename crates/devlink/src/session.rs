//! Session abstraction over a device management connection.
//!
//! A [`Session`] exposes the raw protocol operations against exactly one
//! device: stage a candidate configuration, diff it against the running one,
//! validate, commit with a confirm timer, roll back, close. Implementations
//! wrap a concrete management-plane protocol; the commit/diff state machine
//! in [`crate::transport`] is written entirely against this trait.

use crate::error::Result;
use std::time::Duration;

/// Default timeout for device RPCs.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default SSH port for CLI-driven sessions.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default HTTPS port for JSON-RPC sessions.
pub const DEFAULT_JSONRPC_PORT: u16 = 443;

/// Connection parameters for one device session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fully qualified domain name of the device
    pub fqdn: String,
    /// Username to authenticate as (empty = the invoking user / transport default)
    pub username: String,
    /// TCP port of the management endpoint
    pub port: u16,
    /// Per-RPC timeout on the management channel
    pub timeout: Duration,
    /// Alternative ssh_config file for CLI-driven sessions
    pub ssh_config: Option<String>,
    /// Password for HTTP-authenticated sessions (unused by CLI sessions)
    pub password: String,
}

impl SessionConfig {
    /// Create a config for the given device with defaults for everything else.
    pub fn new(fqdn: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            username: String::new(),
            port: DEFAULT_SSH_PORT,
            timeout: DEFAULT_TIMEOUT,
            ssh_config: None,
            password: String::new(),
        }
    }
}

/// Raw protocol operations against exactly one connected device.
///
/// Sessions are single-use: one device, one action invocation. They are never
/// shared between devices or reused across runs. All operations other than
/// [`Session::close`] may fail; `close` is idempotent, safe after prior
/// failures, and never reports an error.
pub trait Session: Send {
    /// Establish the management connection.
    ///
    /// Any network or authentication failure maps to
    /// [`crate::Error::Connect`]; callers do not need to distinguish the
    /// underlying cause for fleet-level decisions.
    fn open(&mut self) -> Result<()>;

    /// Stage a candidate configuration on the device.
    ///
    /// Fails with [`crate::Error::Load`] if the device rejects the input as
    /// syntactically invalid.
    fn load_candidate(&mut self, text: &str) -> Result<()>;

    /// Return the textual diff between the staged and running configuration.
    ///
    /// Pure and repeatable: calling it twice without re-staging returns the
    /// same text. An empty string means the device is already converged.
    fn compute_diff(&mut self) -> Result<String>;

    /// Validate the staged configuration without applying it.
    ///
    /// Fails with [`crate::Error::Validation`] if the device rejects it.
    fn commit_check(&mut self) -> Result<()>;

    /// Apply the staged configuration, arming an automatic rollback timer.
    ///
    /// The device reverts on its own unless a subsequent confirming commit or
    /// explicit acceptance arrives within `confirm_timeout`. Blocks until the
    /// device acknowledges or the management channel itself times out. The
    /// `comment` is recorded in the device commit history where the platform
    /// supports it.
    fn commit_confirmed(&mut self, confirm_timeout: Duration, comment: &str) -> Result<()>;

    /// Acknowledge a confirmed commit, disarming the rollback timer.
    ///
    /// Must be issued after a successful [`Session::commit_confirmed`] and
    /// before the confirm window elapses, otherwise the device reverts on
    /// its own.
    fn confirm(&mut self) -> Result<()>;

    /// Revert to the pre-commit state.
    ///
    /// Best-effort: a failure here must never mask the outcome of the
    /// operation that triggered the rollback.
    fn rollback(&mut self) -> Result<()>;

    /// Release the connection. Idempotent, never fails.
    fn close(&mut self);

    /// The FQDN of the device this session talks to.
    fn fqdn(&self) -> &str;
}
