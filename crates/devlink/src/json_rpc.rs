//! JSON-RPC session over HTTPS.
//!
//! Talks to devices exposing a JSON-RPC management API (SR Linux style):
//! the candidate is staged client-side as a list of configuration commands,
//! `diff`/`validate` are read-only RPCs, and `set` with a `confirm-timeout`
//! arms the device-side rollback timer that a follow-up `confirmed-accept`
//! update disarms.

use crate::error::{Error, Result};
use crate::session::{Session, SessionConfig};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::debug;
use serde_json::{Value, json};
use std::time::Duration;

/// Session that drives a JSON-RPC management endpoint.
pub struct JsonRpcSession {
    config: SessionConfig,
    agent: ureq::Agent,
    endpoint: String,
    authorization: String,
    staged: Option<Vec<String>>,
}

impl JsonRpcSession {
    /// Create an unopened session for the given device.
    pub fn new(config: SessionConfig) -> Self {
        let endpoint = format!("https://{}:{}/jsonrpc", config.fqdn, config.port);
        Self::with_endpoint(config, endpoint)
    }

    /// Create a session against a custom endpoint (for testing).
    pub fn with_endpoint(config: SessionConfig, endpoint: String) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build()
            .into();
        let authorization = format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", config.username, config.password))
        );
        Self {
            config,
            agent,
            endpoint,
            authorization,
            staged: None,
        }
    }

    fn staged_commands(&self) -> Result<&[String]> {
        self.staged.as_deref().ok_or_else(|| Error::Protocol {
            message: "no candidate configuration staged".to_string(),
        })
    }

    /// Send one JSON-RPC request and return the response body.
    ///
    /// With `raise_on_error` set, an `error` member in the reply becomes a
    /// protocol error; callers that interpret errors themselves pass false.
    fn rpc(&self, method: &str, params: Value, raise_on_error: bool) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": method,
            "params": params,
        });
        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", self.authorization.as_str())
            .header("User-Agent", "convoy")
            .send_json(&payload)
            .map_err(|e| map_transport_error(method, &e))?;

        if !response.status().is_success() {
            return Err(Error::Protocol {
                message: format!("HTTP {} from {} RPC", response.status(), method),
            });
        }

        let body: Value = response.body_mut().read_json().map_err(|e| Error::Protocol {
            message: format!("invalid JSON in {method} reply: {e}"),
        })?;

        if raise_on_error {
            if let Some(message) = rpc_error_message(&body) {
                return Err(Error::Protocol { message });
            }
        }
        Ok(body)
    }
}

/// Extract the error message from a JSON-RPC reply, if any.
fn rpc_error_message(body: &Value) -> Option<String> {
    body.get("error")
        .map(|e| e["message"].as_str().unwrap_or("unknown RPC error").to_string())
}

fn map_transport_error(method: &str, err: &ureq::Error) -> Error {
    match err {
        ureq::Error::Timeout(_) => Error::timeout(method),
        other => Error::Connect {
            message: format!("{method} RPC failed: {other}"),
        },
    }
}

/// Split opaque candidate text into the command list the API expects.
fn to_commands(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

impl Session for JsonRpcSession {
    fn open(&mut self) -> Result<()> {
        debug!(
            "Connecting to device {}:{} (user={} timeout={:?})",
            self.config.fqdn, self.config.port, self.config.username, self.config.timeout
        );
        // The HTTP channel is connectionless; probe the API so that network
        // and authentication failures surface here rather than mid-commit.
        self.rpc(
            "get",
            json!({
                "commands": [{"path": "/system/information/version", "datastore": "state"}]
            }),
            true,
        )
        .map_err(|e| match e {
            Error::Timeout { message } => Error::Timeout { message },
            other => Error::connect(other),
        })?;
        Ok(())
    }

    fn load_candidate(&mut self, text: &str) -> Result<()> {
        debug!("Preparing the configuration on {}", self.config.fqdn);
        let commands = to_commands(text);
        if commands.is_empty() {
            return Err(Error::Load {
                message: "candidate configuration is empty".to_string(),
            });
        }
        self.staged = Some(commands);
        Ok(())
    }

    fn compute_diff(&mut self) -> Result<String> {
        let commands = self.staged_commands()?.to_vec();
        let body = self.rpc(
            "diff",
            json!({"commands": commands, "output-format": "text"}),
            true,
        )?;
        let diff = body["result"]
            .as_array()
            .and_then(|r| r.first())
            .and_then(Value::as_str)
            .unwrap_or("");
        Ok(diff.to_string())
    }

    fn commit_check(&mut self) -> Result<()> {
        let commands = self.staged_commands()?.to_vec();
        let body = self.rpc("validate", json!({"commands": commands}), false)?;
        match rpc_error_message(&body) {
            Some(message) => Err(Error::Validation { message }),
            None => Ok(()),
        }
    }

    fn commit_confirmed(&mut self, confirm_timeout: Duration, _comment: &str) -> Result<()> {
        let commands = self.staged_commands()?.to_vec();
        self.rpc(
            "set",
            json!({
                "confirm-timeout": confirm_timeout.as_secs(),
                "commands": commands,
            }),
            true,
        )?;
        Ok(())
    }

    fn confirm(&mut self) -> Result<()> {
        self.rpc(
            "set",
            json!({
                "datastore": "tools",
                "commands": [{
                    "action": "update",
                    "path": "/system/configuration/confirmed-accept",
                }],
            }),
            true,
        )?;
        debug!("Commit confirmed on {}", self.config.fqdn);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        // The candidate only exists client-side; discarding it is the rollback.
        self.staged = None;
        Ok(())
    }

    fn close(&mut self) {
        self.staged = None;
    }

    fn fqdn(&self) -> &str {
        &self.config.fqdn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_commands_strips_blank_lines() {
        let commands = to_commands("set system name leaf1\n\n  set network mtu 9000  \n");
        assert_eq!(
            commands,
            vec!["set system name leaf1", "set network mtu 9000"]
        );
    }

    #[test]
    fn test_load_candidate_rejects_empty_text() {
        let mut session = JsonRpcSession::new(SessionConfig::new("leaf1.example.com"));
        let err = session.load_candidate("\n  \n").unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }

    #[test]
    fn test_diff_requires_staged_candidate() {
        let mut session = JsonRpcSession::new(SessionConfig::new("leaf1.example.com"));
        let err = session.compute_diff().unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_rpc_error_message_extraction() {
        let body = json!({"jsonrpc": "2.0", "id": 0, "error": {"message": "bad path"}});
        assert_eq!(rpc_error_message(&body), Some("bad path".to_string()));
        let ok = json!({"jsonrpc": "2.0", "id": 0, "result": []});
        assert_eq!(rpc_error_message(&ok), None);
    }

    #[test]
    fn test_rollback_discards_staged_candidate() {
        let mut session = JsonRpcSession::new(SessionConfig::new("leaf1.example.com"));
        session.load_candidate("set system name leaf1").unwrap();
        session.rollback().unwrap();
        assert!(session.compute_diff().is_err());
    }
}
