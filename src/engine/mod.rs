//! Fleet orchestration engine.
//!
//! Drives one action across the resolved device set with failure isolation:
//! every device yields exactly one report, whatever happened to it, and no
//! device's failure stops the others. Per-device work is independent and may
//! fan out on a bounded worker pool; each worker exclusively owns its
//! transport, and results land in one pre-sized slot each, written once.

pub mod report;
pub mod runner;

use crate::approval::{DiffStore, InteractiveApproval};
use crate::candidates::CandidateConfig;
use crate::engine::report::{Action, DeviceReport, FleetRun};
use devlink::{AutoApprove, DeviceSpec, RetryConfig, Transport, TransportFactory};
use indicatif::ProgressBar;
use log::warn;
use rayon::prelude::*;
use std::sync::{Arc, Mutex};

/// Builds the transport for one device.
///
/// The production implementation is [`devlink::TransportFactory`]; tests
/// substitute scripted transports.
pub trait TransportBuilder: Sync {
    /// Build a transport for the device and its candidate configuration.
    fn build(&self, spec: &DeviceSpec, candidate: String) -> devlink::Result<Transport>;
}

impl TransportBuilder for TransportFactory {
    fn build(&self, spec: &DeviceSpec, candidate: String) -> devlink::Result<Transport> {
        self.create(spec, candidate)
    }
}

/// One unit of fleet work: a device and its resolved candidate.
///
/// Candidate resolution happens upstream and may already have failed; the
/// engine turns that into a per-device failure instead of refusing the run.
pub struct DeviceTarget {
    /// Transport spec for the device
    pub spec: DeviceSpec,
    /// Resolved candidate, or the resolution error
    pub candidate: anyhow::Result<CandidateConfig>,
}

/// How commit approvals are obtained.
pub enum CommitMode {
    /// Ask the operator per device, remembering "for all" decisions in the
    /// shared store; forces sequential execution so prompts cannot interleave
    Interactive(Arc<Mutex<DiffStore>>),
    /// Approve every diff; eligible for parallel execution
    Auto,
}

/// Fleet orchestrator: one instance per action invocation.
pub struct Orchestrator<'a> {
    builder: &'a dyn TransportBuilder,
    jobs: usize,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator running at most `jobs` devices concurrently.
    pub fn new(builder: &'a dyn TransportBuilder, jobs: usize) -> Self {
        Self {
            builder,
            jobs: jobs.max(1),
        }
    }

    /// Run the diff action across the fleet.
    pub fn run_diff(&self, targets: Vec<DeviceTarget>) -> FleetRun {
        let builder = self.builder;
        let reports = self.execute(targets, |target| match target.candidate {
            Ok(candidate) => runner::run_diff(builder, &target.spec, candidate.text),
            Err(e) => {
                DeviceReport::failed(&target.spec.fqdn, Action::Diff, None, format!("{e:#}"))
            }
        });
        FleetRun::new(Action::Diff, reports)
    }

    /// Run the commit action across the fleet.
    ///
    /// Interactive mode runs the devices sequentially with one shared diff
    /// store, so a change approved or rejected "for all" applies to every
    /// later device with the same diff.
    pub fn run_commit(
        &self,
        targets: Vec<DeviceTarget>,
        message: &str,
        retry: &RetryConfig,
        mode: CommitMode,
    ) -> FleetRun {
        let builder = self.builder;
        let reports = match mode {
            CommitMode::Interactive(store) => {
                let progress = progress_bar(targets.len());
                let mut reports = Vec::with_capacity(targets.len());
                for target in targets {
                    let mut approval = InteractiveApproval::new(Arc::clone(&store));
                    reports.push(commit_one(
                        builder,
                        target,
                        message,
                        retry,
                        &mut approval,
                    ));
                    progress.inc(1);
                }
                progress.finish_and_clear();
                reports
            }
            CommitMode::Auto => self.execute(targets, |target| {
                commit_one(builder, target, message, retry, &mut AutoApprove)
            }),
        };
        FleetRun::new(Action::Commit, reports)
    }

    /// Run one closure per target, sequentially or on a bounded pool.
    fn execute<F>(&self, targets: Vec<DeviceTarget>, run: F) -> Vec<DeviceReport>
    where
        F: Fn(DeviceTarget) -> DeviceReport + Sync,
    {
        let progress = progress_bar(targets.len());

        if self.jobs == 1 || targets.len() <= 1 {
            let mut reports = Vec::with_capacity(targets.len());
            for target in targets {
                reports.push(run(target));
                progress.inc(1);
            }
            progress.finish_and_clear();
            return reports;
        }

        // One slot per device, written exactly once; the mutex only guards
        // slot assignment, never a read-modify-write.
        let slots: Mutex<Vec<Option<DeviceReport>>> =
            Mutex::new((0..targets.len()).map(|_| None).collect());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build();
        match pool {
            Ok(pool) => pool.install(|| {
                targets.into_par_iter().enumerate().for_each(|(i, target)| {
                    let report = run(target);
                    progress.inc(1);
                    slots.lock().expect("result slots lock poisoned")[i] = Some(report);
                });
            }),
            Err(e) => {
                warn!("Failed to create worker pool, running sequentially: {e}");
                for (i, target) in targets.into_iter().enumerate() {
                    let report = run(target);
                    progress.inc(1);
                    slots.lock().expect("result slots lock poisoned")[i] = Some(report);
                }
            }
        }
        progress.finish_and_clear();

        slots
            .into_inner()
            .expect("result slots lock poisoned")
            .into_iter()
            .flatten()
            .collect()
    }
}

fn commit_one(
    builder: &dyn TransportBuilder,
    target: DeviceTarget,
    message: &str,
    retry: &RetryConfig,
    approval: &mut dyn devlink::ApprovalCallback,
) -> DeviceReport {
    match target.candidate {
        Ok(candidate) => runner::run_commit(
            builder,
            &target.spec,
            candidate.text,
            message,
            retry,
            approval,
        ),
        Err(e) => DeviceReport::failed(&target.spec.fqdn, Action::Commit, None, format!("{e:#}")),
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    // Hidden automatically when stderr is not a terminal.
    ProgressBar::new(len as u64)
}
