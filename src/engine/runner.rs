//! Per-device action execution.
//!
//! The runner executes exactly one action for exactly one device,
//! translating transport outcomes into a [`DeviceReport`] and guaranteeing
//! the session is released whatever happens. Nothing in this module
//! propagates an error upward; a failure here is a report, not an exception.

use crate::engine::TransportBuilder;
use crate::engine::report::{Action, DeviceReport};
use devlink::{ApprovalCallback, CommitOutcome, DeviceSpec, RetryConfig};
use log::{error, info};
use std::thread;

/// Run the diff action for one device.
///
/// Always disconnects afterwards; every failure becomes a `Failed` report
/// with whatever diff detail the transport could determine.
pub fn run_diff(builder: &dyn TransportBuilder, spec: &DeviceSpec, candidate: String) -> DeviceReport {
    let mut transport = match builder.build(spec, candidate) {
        Ok(t) => t,
        Err(e) => return DeviceReport::failed(&spec.fqdn, Action::Diff, None, e.to_string()),
    };

    let result = transport.diff();
    transport.disconnect();

    if result.success {
        DeviceReport::success(&spec.fqdn, Action::Diff, result.diff)
    } else {
        DeviceReport::failed(
            &spec.fqdn,
            Action::Diff,
            result.diff,
            "failed to compute or validate the diff",
        )
    }
}

/// Run the commit action for one device, retrying timeouts with backoff.
///
/// The backoff precedes every retry so the device's own rollback timer from
/// the previous attempt has fired before the next attempt re-stages. An
/// abort stops the loop immediately; exhausting the attempt budget reports
/// the last error. Always disconnects afterwards.
pub fn run_commit(
    builder: &dyn TransportBuilder,
    spec: &DeviceSpec,
    candidate: String,
    message: &str,
    retry: &RetryConfig,
    approval: &mut dyn ApprovalCallback,
) -> DeviceReport {
    let mut transport = match builder.build(spec, candidate) {
        Ok(t) => t,
        Err(e) => return DeviceReport::failed(&spec.fqdn, Action::Commit, None, e.to_string()),
    };

    let mut report = None;
    for attempt in 1..=retry.max_attempts {
        match transport.commit(attempt, message, approval) {
            CommitOutcome::Committed { diff } => {
                report = Some(if diff.is_empty() && attempt == 1 {
                    // Nothing was sent to the device; no attempt consumed.
                    DeviceReport::skipped(&spec.fqdn, Action::Commit)
                } else {
                    DeviceReport::success(&spec.fqdn, Action::Commit, Some(diff))
                        .with_attempts(attempt)
                });
                break;
            }
            CommitOutcome::TimedOut { error } => {
                error!("Attempt {attempt}/{} failed: {error}", retry.max_attempts);
                if attempt == retry.max_attempts {
                    report = Some(
                        DeviceReport::failed(&spec.fqdn, Action::Commit, None, error.to_string())
                            .with_attempts(attempt),
                    );
                    break;
                }
                let delay = retry.delay_for_attempt(attempt);
                info!(
                    "Retrying commit on {} in {delay:?} (attempt {}/{})",
                    spec.fqdn,
                    attempt + 1,
                    retry.max_attempts
                );
                thread::sleep(delay);
            }
            CommitOutcome::Aborted { error } => {
                report = Some(
                    DeviceReport::failed(&spec.fqdn, Action::Commit, None, error.to_string())
                        .with_attempts(attempt),
                );
                break;
            }
            CommitOutcome::Failed { error } => {
                report = Some(
                    DeviceReport::failed(&spec.fqdn, Action::Commit, None, error.to_string())
                        .with_attempts(attempt),
                );
                break;
            }
        }
    }
    transport.disconnect();

    report.unwrap_or_else(|| {
        DeviceReport::failed(&spec.fqdn, Action::Commit, None, "no commit attempts were made")
    })
}
