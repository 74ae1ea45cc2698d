use crate::cli::DiffArgs;
use crate::commands::{print_summary, resolve_targets};
use crate::config::Config;
use crate::engine::Orchestrator;
use crate::engine::report::{FleetRun, RunStatus};
use crate::ui;
use anyhow::Result;
use devlink::TransportFactory;

/// Run the diff action and print the grouped results.
pub fn run(config: &Config, args: &DiffArgs, jobs: usize) -> Result<i32> {
    let targets = resolve_targets(config, &args.query)?;
    if targets.is_empty() {
        ui::warn(&format!("No devices matching query: {}", args.query));
        return Ok(0);
    }

    let factory = TransportFactory::new(config.commit.confirm_timeout());
    let orchestrator = Orchestrator::new(&factory, jobs);
    let run = orchestrator.run_diff(targets);

    print_diffs(&run, args.omit_diff);
    print_summary(&run);
    match run.status() {
        RunStatus::AllSuccess => ui::success("No changes needed"),
        RunStatus::HasDifferences => ui::info("Changes present"),
        RunStatus::HasFailures => {}
    }
    Ok(run.exit_code())
}

/// Print one block per distinct diff, listing the devices that share it.
fn print_diffs(run: &FleetRun, omit_diff: bool) {
    for (diff, fqdns) in run.group_by_diff() {
        ui::header(&format!("Changes for {} devices: {fqdns:?}", fqdns.len()));
        match diff {
            None => println!("# Failed"),
            Some(d) if d.is_empty() => println!("# No diff"),
            Some(_) if omit_diff => println!("# Non-empty diff omitted, -o/--omit-diff set"),
            Some(d) => println!("{}", ui::color_diff(&d)),
        }
    }
}
