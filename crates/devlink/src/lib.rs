//! # devlink
//!
//! Device transport layer for fleet configuration management.
//!
//! This crate provides the per-device half of a configuration push: a
//! [`Session`] abstraction over a management-plane protocol, the
//! transactional [`Transport`] state machine layered on top of it, and the
//! [`TransportFactory`] that selects an implementation per device platform.
//!
//! ## Core concepts
//!
//! - **Session**: raw protocol operations against one connected device
//!   (stage, diff, validate, commit-confirmed, acknowledge, rollback)
//! - **Transport**: the commit/diff state machine for one device and one
//!   action invocation; absorbs session errors into typed outcomes
//! - **CommitOutcome**: how one attempt ended - committed, timed out
//!   (retryable), aborted (never retried), or failed
//! - **RetryConfig**: backoff policy whose floor is tied to the device's
//!   confirm window
//!
//! ## Protocol
//!
//! A commit stages the candidate, computes the diff, and - unless the device
//! is already converged - applies it with an armed rollback timer that a
//! confirming acknowledgement disarms. A device that times out mid-commit
//! reverts on its own; callers retry only after that window has passed.
//!
//! ## Example
//!
//! ```no_run
//! use devlink::{AutoApprove, DeviceSpec, TransportFactory};
//! use std::time::Duration;
//!
//! let factory = TransportFactory::new(Duration::from_secs(120));
//! let spec = DeviceSpec::new("leaf1.example.com", "junos");
//! let mut transport = factory
//!     .create(&spec, "set system host-name leaf1".to_string())
//!     .unwrap();
//!
//! let outcome = transport.commit(1, "maintenance window", &mut AutoApprove);
//! transport.disconnect();
//! assert!(outcome.is_success());
//! ```

pub mod cli_session;
pub mod error;
pub mod factory;
pub mod json_rpc;
pub mod retry;
pub mod session;
pub mod transport;

// Re-export main types at crate root
pub use cli_session::CliSession;
pub use error::{Error, ErrorCategory, Result};
pub use factory::{DeviceSpec, Platform, TransportFactory};
pub use json_rpc::JsonRpcSession;
pub use retry::RetryConfig;
pub use session::{
    DEFAULT_JSONRPC_PORT, DEFAULT_SSH_PORT, DEFAULT_TIMEOUT, Session, SessionConfig,
};
pub use transport::{
    ApprovalCallback, AutoApprove, CommitOutcome, DiffResult, Transport, TransportState,
};
