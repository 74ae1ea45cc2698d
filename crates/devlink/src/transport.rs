//! Commit/diff state machine over a device session.
//!
//! A [`Transport`] wraps one [`Session`] for one device and one action
//! invocation, layering the transactional protocol on top of the raw RPCs:
//! stage-and-diff with error absorption, empty-diff short-circuit,
//! commit-confirmed with a confirming acknowledgement, timeout-is-retryable
//! classification, and rollback that never masks the triggering failure.

use crate::error::{Error, Result};
use crate::session::Session;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// States of one attempt cycle.
///
/// `Committed`, `RolledBack` and `Failed` are terminal for an attempt; a
/// retry re-enters from `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No session opened yet
    Idle,
    /// Session open, nothing staged
    Connected,
    /// Candidate staged, diff computed
    Diffed,
    /// Commit RPC in flight
    Committing,
    /// Commit applied, awaiting the confirming acknowledgement
    Confirming,
    /// Commit applied and acknowledged
    Committed,
    /// Staged configuration reverted after a failure
    RolledBack,
    /// Attempt failed without a successful rollback
    Failed,
}

/// Outcome of a [`Transport::diff`] call.
///
/// `diff` is `None` when the diff could not be determined because of a
/// failure; an empty string means the device is already converged. A
/// non-empty diff with `success = false` means the diff was computed but the
/// device rejected the staged configuration at commit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Device the diff belongs to
    pub fqdn: String,
    /// Diff text, `None` on failure
    pub diff: Option<String>,
    /// Whether diff and commit check both succeeded
    pub success: bool,
}

/// Outcome of one [`Transport::commit`] attempt.
#[derive(Debug)]
pub enum CommitOutcome {
    /// Configuration applied (or nothing to apply)
    Committed {
        /// The diff that was committed; empty when the device was converged
        diff: String,
    },
    /// Management RPC timed out; the attempt may be retried after the
    /// device's own rollback grace period has passed
    TimedOut {
        /// The timeout that ended the attempt
        error: Error,
    },
    /// Deliberate stop: the device or the operator rejected the change
    Aborted {
        /// The abort reason
        error: Error,
    },
    /// Hard failure; not retryable
    Failed {
        /// The error that ended the attempt
        error: Error,
    },
}

impl CommitOutcome {
    /// Whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// Whether the caller may retry with a higher attempt number.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Decides whether a computed diff may be committed to a device.
///
/// Returning an error aborts the commit for this device; the staged
/// configuration is rolled back and no further attempts are made.
pub trait ApprovalCallback: Send {
    /// Approve or reject the diff for the given device.
    fn approve(&mut self, fqdn: &str, diff: &str) -> Result<()>;
}

/// Approval callback that approves everything (non-interactive runs).
pub struct AutoApprove;

impl ApprovalCallback for AutoApprove {
    fn approve(&mut self, _fqdn: &str, _diff: &str) -> Result<()> {
        Ok(())
    }
}

/// Transactional transport for exactly one device.
pub struct Transport {
    session: Box<dyn Session>,
    candidate: String,
    confirm_timeout: Duration,
    state: TransportState,
    cached_diff: Option<String>,
    disconnected: bool,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("candidate", &self.candidate)
            .field("confirm_timeout", &self.confirm_timeout)
            .field("state", &self.state)
            .field("cached_diff", &self.cached_diff)
            .field("disconnected", &self.disconnected)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a transport over the given session and candidate configuration.
    pub fn new(session: Box<dyn Session>, candidate: String, confirm_timeout: Duration) -> Self {
        Self {
            session,
            candidate,
            confirm_timeout,
            state: TransportState::Idle,
            cached_diff: None,
            disconnected: false,
        }
    }

    /// Current state, for callers that report on the attempt cycle.
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// The device this transport talks to.
    pub fn fqdn(&self) -> &str {
        self.session.fqdn()
    }

    /// Stage the candidate, compute the diff and commit-check it.
    ///
    /// Never propagates a session error: a failure to stage or diff yields
    /// `diff = None`, a commit-check rejection yields the diff with
    /// `success = false`. The staged state is always reverted afterwards;
    /// this is a read-only operation from the device's point of view.
    pub fn diff(&mut self) -> DiffResult {
        let fqdn = self.session.fqdn().to_string();
        let diff = match self.prepare() {
            Ok(diff) => diff,
            Err(e) => {
                error!("Failed to get diff for {fqdn}: {e}");
                return DiffResult {
                    fqdn,
                    diff: None,
                    success: false,
                };
            }
        };

        if diff.is_empty() {
            info!("Empty diff for {fqdn}, skipping device.");
            self.discard_staged();
            return DiffResult {
                fqdn,
                diff: Some(diff),
                success: true,
            };
        }

        info!("Running commit check on {fqdn}");
        let success = match self.session.commit_check() {
            Ok(()) => true,
            Err(e) => {
                error!("Commit check error on {fqdn}: {e}");
                false
            }
        };
        self.discard_staged();
        DiffResult {
            fqdn,
            diff: Some(diff),
            success,
        }
    }

    /// Run one commit attempt.
    ///
    /// Stages the candidate if a prior [`Transport::diff`] has not already
    /// cached an empty diff; retry attempts always re-stage because the
    /// previous attempt may have been applied and auto-rolled-back, or
    /// half-applied. `comment` is the commit message recorded on the device.
    pub fn commit(
        &mut self,
        attempt: u32,
        comment: &str,
        approval: &mut dyn ApprovalCallback,
    ) -> CommitOutcome {
        debug_assert!(attempt >= 1, "commit attempts are numbered from 1");
        let fqdn = self.session.fqdn().to_string();

        let diff = match (attempt, self.cached_diff.take()) {
            (1, Some(diff)) => diff,
            _ => match self.prepare() {
                Ok(diff) => diff,
                Err(e) => return self.classify_failure(e),
            },
        };

        if diff.is_empty() && attempt == 1 {
            // Converged device: committing would only spend a device RPC
            // cycle and risk a spurious timeout.
            info!("Empty diff for {fqdn}, skipping device.");
            self.state = TransportState::Committed;
            return CommitOutcome::Committed { diff };
        }

        if !diff.is_empty() {
            if let Err(e) = approval.approve(&fqdn, &diff) {
                self.rollback_after_failure();
                self.state = TransportState::Failed;
                let error = match e {
                    abort @ Error::Abort { .. } => abort,
                    other => Error::Abort {
                        message: other.to_string(),
                    },
                };
                return CommitOutcome::Aborted { error };
            }
        }

        info!("Committing the configuration on {fqdn}");
        self.state = TransportState::Committing;

        if !diff.is_empty() {
            if let Err(e) = self.session.commit_confirmed(self.confirm_timeout, comment) {
                return self.classify_failure(e);
            }
        }

        self.state = TransportState::Confirming;
        match self.session.confirm() {
            Ok(()) => {
                self.state = TransportState::Committed;
                CommitOutcome::Committed { diff }
            }
            Err(e @ Error::Timeout { .. }) => {
                self.state = TransportState::Failed;
                CommitOutcome::TimedOut { error: e }
            }
            Err(e @ Error::Validation { .. }) => {
                // The device explicitly refused the acknowledgement.
                self.rollback_after_failure();
                CommitOutcome::Failed { error: e }
            }
            Err(e) => {
                // Heuristic: the configuration was applied by the time the
                // acknowledgement failed, so the side effect has already
                // happened and only the channel teardown is broken. A
                // genuinely failed commit that also fails to close cleanly
                // is indistinguishable here without device-side confirmation.
                warn!("Ignoring acknowledgement failure after commit on {fqdn}: {e}");
                self.state = TransportState::Committed;
                CommitOutcome::Committed { diff }
            }
        }
    }

    /// Close the session. Idempotent; safe in any state.
    pub fn disconnect(&mut self) {
        if !self.disconnected {
            self.session.close();
            self.disconnected = true;
        }
    }

    /// Open if needed, stage the candidate, compute and cache the diff.
    fn prepare(&mut self) -> Result<String> {
        if self.state == TransportState::Idle {
            self.session.open()?;
            self.state = TransportState::Connected;
        }
        debug!("Preparing the configuration on {}", self.session.fqdn());

        let staged = self
            .session
            .load_candidate(&self.candidate)
            .and_then(|()| self.session.compute_diff());
        match staged {
            Ok(diff) => {
                self.state = TransportState::Diffed;
                self.cached_diff = Some(diff.clone());
                Ok(diff)
            }
            Err(e) => {
                // A load rejection leaves nothing staged; anything else may
                // have left partial state behind.
                if !matches!(e, Error::Load { .. }) {
                    self.rollback_after_failure();
                }
                Err(e)
            }
        }
    }

    /// Revert staged state after a read-only operation.
    ///
    /// Failure here is only worth a debug line: the exclusive candidate is
    /// discarded when the session closes anyway. A non-empty cached diff is
    /// dropped with it, so a later commit re-stages.
    fn discard_staged(&mut self) {
        if let Err(e) = self.session.rollback() {
            debug!(
                "Discarding staged config on {} failed: {e}",
                self.session.fqdn()
            );
        }
        if self.cached_diff.as_deref().is_some_and(|d| !d.is_empty()) {
            self.cached_diff = None;
        }
    }

    /// Map a session error to the attempt outcome, rolling back when the
    /// failure is neither a timeout nor an abort.
    fn classify_failure(&mut self, error: Error) -> CommitOutcome {
        match error {
            e @ Error::Timeout { .. } => {
                self.state = TransportState::Failed;
                CommitOutcome::TimedOut { error: e }
            }
            e @ Error::Abort { .. } => {
                self.rollback_after_failure();
                self.state = TransportState::Failed;
                CommitOutcome::Aborted { error: e }
            }
            e @ Error::Load { .. } => {
                // Nothing was staged; there is nothing to roll back.
                self.state = TransportState::Failed;
                CommitOutcome::Failed { error: e }
            }
            e => {
                self.rollback_after_failure();
                CommitOutcome::Failed { error: e }
            }
        }
    }

    /// Best-effort rollback; its own failure is logged and never escalated
    /// over the error that triggered it.
    fn rollback_after_failure(&mut self) {
        match self.session.rollback() {
            Ok(()) => self.state = TransportState::RolledBack,
            Err(e) => {
                error!("Rollback failed on {}: {e}", self.session.fqdn());
                self.state = TransportState::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted session: errors are popped per operation; every call is
    /// recorded through a shared log for assertions on the RPCs issued.
    #[derive(Default)]
    struct ScriptedSession {
        fqdn: String,
        calls: Arc<Mutex<Vec<&'static str>>>,
        closed: Arc<AtomicU32>,
        open_error: Option<Error>,
        load_error: Option<Error>,
        diffs: VecDeque<Result<String>>,
        check_error: Option<Error>,
        commit_error: Option<Error>,
        confirm_error: Option<Error>,
        rollback_error: Option<Error>,
    }

    impl ScriptedSession {
        fn new(fqdn: &str) -> Self {
            Self {
                fqdn: fqdn.to_string(),
                ..Default::default()
            }
        }

        fn with_diff(mut self, diff: &str) -> Self {
            self.diffs.push_back(Ok(diff.to_string()));
            self
        }

        fn log(&self) -> Arc<Mutex<Vec<&'static str>>> {
            Arc::clone(&self.calls)
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl Session for ScriptedSession {
        fn open(&mut self) -> Result<()> {
            self.record("open");
            match self.open_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn load_candidate(&mut self, _text: &str) -> Result<()> {
            self.record("load");
            match self.load_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn compute_diff(&mut self) -> Result<String> {
            self.record("diff");
            self.diffs.pop_front().unwrap_or_else(|| Ok(String::new()))
        }

        fn commit_check(&mut self) -> Result<()> {
            self.record("commit_check");
            match self.check_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn commit_confirmed(&mut self, _t: Duration, _comment: &str) -> Result<()> {
            self.record("commit_confirmed");
            match self.commit_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn confirm(&mut self) -> Result<()> {
            self.record("confirm");
            match self.confirm_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn rollback(&mut self) -> Result<()> {
            self.record("rollback");
            match self.rollback_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }

        fn fqdn(&self) -> &str {
            &self.fqdn
        }
    }

    struct RejectAll;

    impl ApprovalCallback for RejectAll {
        fn approve(&mut self, _fqdn: &str, _diff: &str) -> Result<()> {
            Err(Error::Abort {
                message: "rejected by operator".to_string(),
            })
        }
    }

    fn transport(session: ScriptedSession) -> Transport {
        Transport::new(
            Box::new(session),
            "set system host-name leaf1".to_string(),
            Duration::from_secs(120),
        )
    }

    #[test]
    fn test_diff_success_runs_commit_check() {
        let session = ScriptedSession::new("leaf1.example.com").with_diff("+ host-name");
        let calls = session.log();
        let mut t = transport(session);
        let result = t.diff();
        assert!(result.success);
        assert_eq!(result.diff.as_deref(), Some("+ host-name"));
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["open", "load", "diff", "commit_check", "rollback"]
        );
    }

    #[test]
    fn test_diff_empty_skips_commit_check() {
        let session = ScriptedSession::new("leaf1.example.com").with_diff("");
        let calls = session.log();
        let mut t = transport(session);
        let result = t.diff();
        assert!(result.success);
        assert_eq!(result.diff.as_deref(), Some(""));
        assert!(!calls.lock().unwrap().contains(&"commit_check"));
    }

    #[test]
    fn test_diff_connect_failure_yields_none() {
        let mut session = ScriptedSession::new("leaf1.example.com");
        session.open_error = Some(Error::connect("no route to host"));
        let mut t = transport(session);
        let result = t.diff();
        assert!(!result.success);
        assert_eq!(result.diff, None);
    }

    #[test]
    fn test_diff_mid_call_failure_yields_none() {
        let mut session = ScriptedSession::new("leaf1.example.com");
        session.diffs.push_back(Err(Error::Protocol {
            message: "connection reset".to_string(),
        }));
        let mut t = transport(session);
        let result = t.diff();
        assert!(!result.success);
        assert_eq!(result.diff, None);
        // Partial staged state is rolled back.
        assert_eq!(t.state(), TransportState::RolledBack);
    }

    #[test]
    fn test_diff_check_rejection_keeps_diff_text() {
        let mut session = ScriptedSession::new("leaf1.example.com").with_diff("+ mtu 9000");
        session.check_error = Some(Error::Validation {
            message: "constraint violation".to_string(),
        });
        let mut t = transport(session);
        let result = t.diff();
        assert!(!result.success);
        assert_eq!(result.diff.as_deref(), Some("+ mtu 9000"));
    }

    #[test]
    fn test_commit_empty_first_diff_issues_no_rpc() {
        let session = ScriptedSession::new("leaf1.example.com").with_diff("");
        let calls = session.log();
        let mut t = transport(session);
        let outcome = t.commit(1, "maintenance", &mut AutoApprove);
        assert!(outcome.is_success());
        assert_eq!(t.state(), TransportState::Committed);
        let calls = calls.lock().unwrap();
        assert!(!calls.contains(&"commit_confirmed"));
        assert!(!calls.contains(&"commit_check"));
        assert!(!calls.contains(&"confirm"));
    }

    #[test]
    fn test_commit_applies_nonempty_diff() {
        let session = ScriptedSession::new("leaf1.example.com").with_diff("+ mtu 9000");
        let calls = session.log();
        let mut t = transport(session);
        let outcome = t.commit(1, "maintenance", &mut AutoApprove);
        match outcome {
            CommitOutcome::Committed { diff } => assert_eq!(diff, "+ mtu 9000"),
            other => panic!("expected Committed, got {other:?}"),
        }
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["open", "load", "diff", "commit_confirmed", "confirm"]
        );
    }

    #[test]
    fn test_commit_reuses_cached_empty_diff() {
        let session = ScriptedSession::new("leaf1.example.com").with_diff("");
        let calls = session.log();
        let mut t = transport(session);
        assert!(t.diff().success);
        let outcome = t.commit(1, "maintenance", &mut AutoApprove);
        assert!(outcome.is_success());
        // One staging pass only; no commit RPCs at all.
        let calls = calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| **c == "load").count(), 1);
        assert!(!calls.contains(&"commit_confirmed"));
    }

    #[test]
    fn test_commit_timeout_is_retryable() {
        let mut session = ScriptedSession::new("leaf1.example.com").with_diff("+ mtu 9000");
        session.commit_error = Some(Error::timeout("commit"));
        let mut t = transport(session);
        let outcome = t.commit(1, "maintenance", &mut AutoApprove);
        assert!(outcome.is_retryable());
        assert_eq!(t.state(), TransportState::Failed);
    }

    #[test]
    fn test_commit_abort_is_not_retryable_and_rolls_back() {
        let session = ScriptedSession::new("leaf1.example.com").with_diff("+ mtu 9000");
        let calls = session.log();
        let mut t = transport(session);
        let outcome = t.commit(1, "maintenance", &mut RejectAll);
        assert!(matches!(outcome, CommitOutcome::Aborted { .. }));
        assert!(!outcome.is_retryable());
        assert_eq!(t.state(), TransportState::Failed);
        let calls = calls.lock().unwrap();
        assert!(calls.contains(&"rollback"));
        assert!(!calls.contains(&"commit_confirmed"));
    }

    #[test]
    fn test_acknowledgement_failure_after_commit_is_success() {
        let mut session = ScriptedSession::new("leaf1.example.com").with_diff("+ mtu 9000");
        session.confirm_error = Some(Error::Protocol {
            message: "channel torn down".to_string(),
        });
        let mut t = transport(session);
        let outcome = t.commit(1, "maintenance", &mut AutoApprove);
        assert!(outcome.is_success());
        assert_eq!(t.state(), TransportState::Committed);
    }

    #[test]
    fn test_acknowledgement_validation_failure_is_failure() {
        let mut session = ScriptedSession::new("leaf1.example.com").with_diff("+ mtu 9000");
        session.confirm_error = Some(Error::Validation {
            message: "constraint violation".to_string(),
        });
        let mut t = transport(session);
        let outcome = t.commit(1, "maintenance", &mut AutoApprove);
        assert!(matches!(outcome, CommitOutcome::Failed { .. }));
    }

    #[test]
    fn test_rollback_failure_does_not_mask_commit_error() {
        let mut session = ScriptedSession::new("leaf1.example.com").with_diff("+ mtu 9000");
        session.commit_error = Some(Error::Validation {
            message: "commit refused".to_string(),
        });
        session.rollback_error = Some(Error::Rollback {
            message: "rollback refused".to_string(),
        });
        let mut t = transport(session);
        let outcome = t.commit(1, "maintenance", &mut AutoApprove);
        match outcome {
            CommitOutcome::Failed { error } => {
                assert!(error.to_string().contains("commit refused"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(t.state(), TransportState::Failed);
    }

    #[test]
    fn test_retry_restages_and_acknowledges_empty_diff() {
        // First attempt times out after staging a diff; the retry re-stages
        // and sees none (the change was applied before the channel broke),
        // but must still acknowledge through the confirming call.
        let mut session = ScriptedSession::new("leaf1.example.com")
            .with_diff("+ mtu 9000")
            .with_diff("");
        session.commit_error = Some(Error::timeout("commit"));
        let calls = session.log();
        let mut t = transport(session);
        let first = t.commit(1, "maintenance", &mut AutoApprove);
        assert!(first.is_retryable());

        let second = t.commit(2, "maintenance", &mut AutoApprove);
        assert!(second.is_success());
        let calls = calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| **c == "load").count(), 2);
        assert_eq!(calls.iter().filter(|c| **c == "confirm").count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == "commit_confirmed").count(), 1);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let session = ScriptedSession::new("leaf1.example.com");
        let closed = Arc::clone(&session.closed);
        let mut t = transport(session);
        t.disconnect();
        t.disconnect();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
