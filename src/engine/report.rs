//! Per-device and fleet-level results of one action invocation.

use std::collections::BTreeMap;
use std::fmt;

/// The fleet action being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Compute and report diffs without applying anything
    Diff,
    /// Apply candidate configurations through the commit protocol
    Commit,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Diff => write!(f, "diff"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// Final outcome for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The action completed
    Success,
    /// Nothing to do: the device was already converged
    Skipped,
    /// The action failed
    Failed,
}

/// One device's result. Exactly one per targeted device per run, however
/// many retries happened internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    /// Device identity
    pub fqdn: String,
    /// Action that produced this report
    pub action: Action,
    /// Final outcome
    pub outcome: Outcome,
    /// Diff text; `None` when it could not be determined due to a failure
    pub diff: Option<String>,
    /// Error detail for failures
    pub error: Option<String>,
    /// Commit attempts used (0 for the diff action)
    pub attempts: u32,
}

impl DeviceReport {
    /// A successful report carrying the (possibly empty) diff.
    pub fn success(fqdn: impl Into<String>, action: Action, diff: Option<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            action,
            outcome: Outcome::Success,
            diff,
            error: None,
            attempts: 0,
        }
    }

    /// A skipped report: the device needed no change.
    pub fn skipped(fqdn: impl Into<String>, action: Action) -> Self {
        Self {
            fqdn: fqdn.into(),
            action,
            outcome: Outcome::Skipped,
            diff: Some(String::new()),
            error: None,
            attempts: 0,
        }
    }

    /// A failed report with error detail.
    pub fn failed(
        fqdn: impl Into<String>,
        action: Action,
        diff: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            fqdn: fqdn.into(),
            action,
            outcome: Outcome::Failed,
            diff,
            error: Some(error.into()),
            attempts: 0,
        }
    }

    /// Attach the number of commit attempts used.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Whether this report carries a non-empty diff.
    pub fn has_changes(&self) -> bool {
        self.diff.as_deref().is_some_and(|d| !d.is_empty())
    }
}

/// Aggregate status of a fleet run; failures take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every device succeeded or needed no change
    AllSuccess,
    /// The diff action found at least one non-empty diff, no failures
    HasDifferences,
    /// At least one device failed
    HasFailures,
}

impl RunStatus {
    /// Process exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AllSuccess => 0,
            Self::HasDifferences => 99,
            Self::HasFailures => 1,
        }
    }
}

/// Ordered collection of per-device reports for one invocation.
#[derive(Debug)]
pub struct FleetRun {
    /// Action that produced this run
    pub action: Action,
    reports: Vec<DeviceReport>,
}

impl FleetRun {
    /// Build a run from per-device reports, ordered by device identity.
    pub fn new(action: Action, mut reports: Vec<DeviceReport>) -> Self {
        reports.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));
        Self { action, reports }
    }

    /// All reports, sorted by FQDN.
    pub fn reports(&self) -> &[DeviceReport] {
        &self.reports
    }

    /// FQDNs of devices that failed.
    pub fn failed(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| r.outcome == Outcome::Failed)
            .map(|r| r.fqdn.as_str())
            .collect()
    }

    /// Aggregate status: failures dominate, then differences (diff only).
    pub fn status(&self) -> RunStatus {
        if self.reports.iter().any(|r| r.outcome == Outcome::Failed) {
            return RunStatus::HasFailures;
        }
        if self.action == Action::Diff && self.reports.iter().any(DeviceReport::has_changes) {
            return RunStatus::HasDifferences;
        }
        RunStatus::AllSuccess
    }

    /// Process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        self.status().exit_code()
    }

    /// Group devices by their diff for presentation.
    ///
    /// Failed devices (no diff available) group under `None`; converged
    /// devices group under the empty diff.
    pub fn group_by_diff(&self) -> BTreeMap<Option<String>, Vec<&str>> {
        let mut groups: BTreeMap<Option<String>, Vec<&str>> = BTreeMap::new();
        for report in &self.reports {
            groups
                .entry(report.diff.clone())
                .or_default()
                .push(report.fqdn.as_str());
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(fqdn: &str, diff: &str) -> DeviceReport {
        DeviceReport::success(fqdn, Action::Diff, Some(diff.to_string()))
    }

    #[test]
    fn test_reports_are_sorted_by_fqdn() {
        let run = FleetRun::new(
            Action::Diff,
            vec![success("b.example.com", ""), success("a.example.com", "")],
        );
        let fqdns: Vec<_> = run.reports().iter().map(|r| r.fqdn.as_str()).collect();
        assert_eq!(fqdns, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn test_all_success_when_no_changes() {
        let run = FleetRun::new(
            Action::Diff,
            vec![success("a.example.com", ""), success("b.example.com", "")],
        );
        assert_eq!(run.status(), RunStatus::AllSuccess);
        assert_eq!(run.exit_code(), 0);
    }

    #[test]
    fn test_diff_with_changes() {
        let run = FleetRun::new(
            Action::Diff,
            vec![success("a.example.com", "+ mtu 9000"), success("b.example.com", "")],
        );
        assert_eq!(run.status(), RunStatus::HasDifferences);
        assert_eq!(run.exit_code(), 99);
    }

    #[test]
    fn test_commit_with_changes_is_success() {
        let run = FleetRun::new(
            Action::Commit,
            vec![
                DeviceReport::success("a.example.com", Action::Commit, Some("+ mtu 9000".into())),
                DeviceReport::skipped("b.example.com", Action::Commit),
            ],
        );
        assert_eq!(run.status(), RunStatus::AllSuccess);
        assert_eq!(run.exit_code(), 0);
    }

    #[test]
    fn test_failures_take_precedence_over_differences() {
        let run = FleetRun::new(
            Action::Diff,
            vec![
                success("a.example.com", "+ mtu 9000"),
                DeviceReport::failed("b.example.com", Action::Diff, None, "connection error"),
            ],
        );
        assert_eq!(run.status(), RunStatus::HasFailures);
        assert_eq!(run.exit_code(), 1);
        assert_eq!(run.failed(), vec!["b.example.com"]);
    }

    #[test]
    fn test_group_by_diff() {
        let run = FleetRun::new(
            Action::Diff,
            vec![
                success("a.example.com", "+ mtu 9000"),
                success("c.example.com", "+ mtu 9000"),
                success("b.example.com", ""),
                DeviceReport::failed("d.example.com", Action::Diff, None, "boom"),
            ],
        );
        let groups = run.group_by_diff();
        assert_eq!(groups[&None], vec!["d.example.com"]);
        assert_eq!(groups[&Some(String::new())], vec!["b.example.com"]);
        assert_eq!(
            groups[&Some("+ mtu 9000".to_string())],
            vec!["a.example.com", "c.example.com"]
        );
    }
}
