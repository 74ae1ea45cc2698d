pub mod commit;
pub mod diff;

use crate::candidates::CandidateStore;
use crate::config::Config;
use crate::engine::DeviceTarget;
use crate::engine::report::FleetRun;
use crate::inventory::Inventory;
use crate::ui;
use anyhow::Result;

/// Resolve the query into per-device work units.
///
/// A device whose candidate is missing still becomes a target; the engine
/// reports it as failed instead of refusing the whole run.
pub fn resolve_targets(config: &Config, query: &str) -> Result<Vec<DeviceTarget>> {
    let inventory = Inventory::load(&config.base_paths.inventory)?;
    if inventory.is_empty() {
        ui::warn(&format!(
            "Inventory {} has no devices",
            config.base_paths.inventory.display()
        ));
    }
    let devices = inventory.select(query)?;
    let store = CandidateStore::new(&config.base_paths.candidates);

    Ok(devices
        .into_iter()
        .map(|device| DeviceTarget {
            spec: device.to_spec(&config.transports),
            candidate: store.load(&device.fqdn),
        })
        .collect())
}

/// Print the run-level summary and failed-device list.
pub fn print_summary(run: &FleetRun) {
    let failed = run.failed();
    let total = run.reports().len();
    if failed.is_empty() {
        ui::success(&format!("{total} devices processed"));
    } else {
        ui::error(&format!(
            "{} of {total} devices failed: {failed:?}",
            failed.len()
        ));
    }
}
