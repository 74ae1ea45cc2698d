use crate::approval::DiffStore;
use crate::cli::CommitArgs;
use crate::commands::{print_summary, resolve_targets};
use crate::config::Config;
use crate::engine::report::Outcome;
use crate::engine::{CommitMode, Orchestrator};
use crate::ui;
use anyhow::{Result, bail};
use chrono::Local;
use devlink::TransportFactory;
use std::sync::{Arc, Mutex};

/// Run the commit action and print per-device results.
pub fn run(config: &Config, args: &CommitArgs, jobs: usize) -> Result<i32> {
    if args.message.trim().is_empty() {
        bail!("A non-empty commit message is required");
    }

    let targets = resolve_targets(config, &args.query)?;
    if targets.is_empty() {
        ui::warn(&format!("No devices matching query: {}", args.query));
        return Ok(0);
    }

    let factory = TransportFactory::new(config.commit.confirm_timeout());
    let retry = config.commit.retry_config();
    let message = commit_message(&args.message);

    // Interactive approval cannot interleave prompts; it runs one device at
    // a time whatever --jobs says.
    let mode = if args.yes {
        CommitMode::Auto
    } else {
        CommitMode::Interactive(Arc::new(Mutex::new(DiffStore::new())))
    };

    let orchestrator = Orchestrator::new(&factory, jobs);
    let run = orchestrator.run_commit(targets, &message, &retry, mode);

    for report in run.reports() {
        match report.outcome {
            Outcome::Success => ui::success(&format!(
                "{}: committed in {} attempt(s)",
                report.fqdn, report.attempts
            )),
            Outcome::Skipped => ui::info(&format!("{}: no changes needed", report.fqdn)),
            Outcome::Failed => ui::error(&format!(
                "{}: {}",
                report.fqdn,
                report.error.as_deref().unwrap_or("unknown failure")
            )),
        }
    }
    print_summary(&run);
    Ok(run.exit_code())
}

/// Decorate the operator's message with who committed and when.
fn commit_message(message: &str) -> String {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!(
        "{message} (convoy commit by {user} at {})",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}
