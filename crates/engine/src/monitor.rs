//! The polling loop that watches descriptor sources for drift.
use log::error;

use dres_descriptor::DescriptorSource;

use crate::{ReconcileOutcome, ReconciliationEngine};

/// One poll: enumerate the sources and reconcile whatever they currently hold.
///
/// Source-level failures (for example a descriptor directory that disappeared) are logged and
/// yield an empty pass; the loop keeps running so the problem can be fixed out from under it.
pub fn tick(
    engine: &mut ReconciliationEngine,
    source: &DescriptorSource,
) -> Vec<(String, ReconcileOutcome)> {
    let descriptors = match source.enumerate() {
        Ok(d) => d,
        Err(e) => {
            error!("Descriptor enumeration failed: {:#}", e);
            return vec![];
        }
    };
    engine.run_once(&descriptors)
}

/// Poll forever.
pub fn run(
    mut engine: ReconciliationEngine,
    source: DescriptorSource,
    sleep_interval: std::time::Duration,
) -> ! {
    loop {
        tick(&mut engine, &source);
        std::thread::sleep(sleep_interval);
    }
}
