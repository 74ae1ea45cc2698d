//! CLI-driven session over a spawned OpenSSH child process.
//!
//! Drives the device management CLI (JunOS-style semantics: exclusive
//! candidate database, `show | compare`, `commit confirmed`) through a
//! persistent `ssh` subprocess. Each RPC writes one command line and drains
//! output until the device prompt reappears; a reader thread feeds lines
//! through a channel so every RPC honors the configured timeout.

use crate::error::{Error, Result};
use crate::session::{Session, SessionConfig};
use log::{debug, warn};
use regex::Regex;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread;
use std::time::{Duration, Instant};

/// Matches the CLI prompt that terminates each command's output,
/// e.g. `admin@leaf1.example.com>` or `admin@leaf1.example.com#`.
const PROMPT_PATTERN: &str = r"^\S+@[\w.-]+[>#%]\s*$";

/// End-of-input marker for `load override terminal`.
const EOT: &str = "\u{4}";

struct SshChild {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
}

/// Session that drives a device CLI through an `ssh` subprocess.
pub struct CliSession {
    config: SessionConfig,
    prompt: Regex,
    conn: Option<SshChild>,
    closed: bool,
}

impl CliSession {
    /// Create an unopened session for the given device.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            prompt: Regex::new(PROMPT_PATTERN).expect("prompt pattern is valid"),
            conn: None,
            closed: false,
        }
    }

    fn spawn_ssh(&self) -> Result<SshChild> {
        let mut cmd = Command::new("ssh");
        cmd.arg("-T")
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.config.timeout.as_secs().max(1)
            ));
        if let Some(ssh_config) = &self.config.ssh_config {
            cmd.arg("-F").arg(ssh_config);
        }
        if !self.config.username.is_empty() {
            cmd.arg("-l").arg(&self.config.username);
        }
        cmd.arg(&self.config.fqdn)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| Error::Connect {
            message: format!("failed to execute ssh: {e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| Error::Connect {
            message: "ssh child has no stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| Error::Connect {
            message: "ssh child has no stdout".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| Error::Connect {
            message: "ssh child has no stderr".to_string(),
        })?;

        // Both streams feed one channel; the channel disconnects when the
        // ssh process exits and both readers reach EOF.
        let (tx, rx) = channel();
        spawn_reader(stdout, tx.clone());
        spawn_reader(stderr, tx);

        Ok(SshChild {
            child,
            stdin,
            lines: rx,
        })
    }

    /// Send one command line and collect output until the prompt reappears.
    fn run(&mut self, command: &str) -> Result<String> {
        self.run_with_timeout(command, self.config.timeout)
    }

    fn run_with_timeout(&mut self, command: &str, timeout: Duration) -> Result<String> {
        let prompt = self.prompt.clone();
        let conn = self.conn.as_mut().ok_or_else(|| Error::Protocol {
            message: "session is not open".to_string(),
        })?;

        writeln!(conn.stdin, "{command}").map_err(|e| Error::Protocol {
            message: format!("failed to send command: {e}"),
        })?;
        conn.stdin.flush().map_err(|e| Error::Protocol {
            message: format!("failed to flush command: {e}"),
        })?;

        let mut output = Vec::new();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match conn.lines.recv_timeout(remaining) {
                Ok(line) if prompt.is_match(&line) => break,
                Ok(line) => output.push(line),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(Error::timeout(command));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Protocol {
                        message: format!("connection closed while waiting for `{command}` reply"),
                    });
                }
            }
        }

        Ok(output.join("\n"))
    }
}

fn spawn_reader(stream: impl Read + Send + 'static, tx: Sender<String>) {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

impl Session for CliSession {
    fn open(&mut self) -> Result<()> {
        debug!(
            "Connecting to device {} (user {} port {})",
            self.config.fqdn, self.config.username, self.config.port
        );
        self.conn = Some(self.spawn_ssh()?);

        // Probe the channel and silence pagination. Any failure this early is
        // a connection-establishment failure, whatever OpenSSH printed.
        let banner = self
            .run("set cli screen-length 0")
            .map_err(|e| Error::connect(e))?;
        if banner.contains("Permission denied") || banner.contains("Connection refused") {
            self.close();
            return Err(Error::Connect { message: banner });
        }

        // Exclusive candidate database: equivalent of the configuration lock.
        let reply = self.run("configure exclusive").map_err(|e| match e {
            Error::Timeout { message } => Error::Timeout { message },
            other => Error::connect(other),
        })?;
        if reply.contains("error:") {
            self.close();
            return Err(Error::Connect {
                message: format!("unable to enter exclusive configuration mode: {reply}"),
            });
        }
        Ok(())
    }

    fn load_candidate(&mut self, text: &str) -> Result<()> {
        debug!("Preparing the configuration on {}", self.config.fqdn);
        {
            let conn = self.conn.as_mut().ok_or_else(|| Error::Protocol {
                message: "session is not open".to_string(),
            })?;
            writeln!(conn.stdin, "load override terminal").map_err(Error::Io)?;
            writeln!(conn.stdin, "{text}").map_err(Error::Io)?;
        }
        let reply = self.run(EOT)?;
        if reply.contains("syntax error") || reply.contains("error:") {
            return Err(Error::Load { message: reply });
        }
        Ok(())
    }

    fn compute_diff(&mut self) -> Result<String> {
        let reply = self.run("show | compare")?;
        // The CLI echoes nothing when candidate and running match.
        Ok(reply.trim_end().to_string())
    }

    fn commit_check(&mut self) -> Result<()> {
        let reply = self.run("commit check")?;
        if reply.contains("configuration check succeeds") {
            Ok(())
        } else {
            Err(Error::Validation { message: reply })
        }
    }

    fn commit_confirmed(&mut self, confirm_timeout: Duration, comment: &str) -> Result<()> {
        // The CLI takes the confirm window in minutes, one minute minimum.
        let minutes = confirm_timeout.as_secs().div_ceil(60).max(1);
        let reply = self.run(&format!(
            "commit confirmed {minutes} comment \"{}\"",
            comment.replace('"', "'")
        ))?;
        if reply.contains("commit complete") || reply.contains("commit confirmed will be") {
            Ok(())
        } else {
            Err(Error::Validation { message: reply })
        }
    }

    fn confirm(&mut self) -> Result<()> {
        // On this CLI a `commit check` after a confirmed commit acknowledges
        // it and disarms the rollback timer.
        let reply = self.run("commit check")?;
        if reply.contains("configuration check succeeds") {
            debug!("Commit confirmed on {}", self.config.fqdn);
            Ok(())
        } else {
            Err(Error::Validation { message: reply })
        }
    }

    fn rollback(&mut self) -> Result<()> {
        debug!("Rolling back staged config on {}", self.config.fqdn);
        let reply = self.run("rollback 0")?;
        if reply.contains("error:") {
            return Err(Error::Rollback { message: reply });
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut conn) = self.conn.take() {
            // Polite exit first; the kill covers a wedged channel.
            let _ = writeln!(conn.stdin, "exit");
            let _ = writeln!(conn.stdin, "exit");
            let _ = conn.stdin.flush();
            drop(conn.stdin);
            if let Err(e) = conn.child.kill() {
                warn!("Unable to terminate ssh child for {}: {e}", self.config.fqdn);
            }
            let _ = conn.child.wait();
        }
    }

    fn fqdn(&self) -> &str {
        &self.config.fqdn
    }
}

impl Drop for CliSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_pattern() {
        let prompt = Regex::new(PROMPT_PATTERN).unwrap();
        assert!(prompt.is_match("admin@leaf1.example.com>"));
        assert!(prompt.is_match("admin@leaf1.example.com# "));
        assert!(!prompt.is_match("+ set system host-name leaf1"));
        assert!(!prompt.is_match("commit complete"));
    }

    #[test]
    fn test_run_fails_when_not_open() {
        let mut session = CliSession::new(SessionConfig::new("leaf1.example.com"));
        let err = session.run("show | compare").unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut session = CliSession::new(SessionConfig::new("leaf1.example.com"));
        session.close();
        session.close();
    }
}
