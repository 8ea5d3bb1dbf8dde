//! The startup sequence.
//!
//! In order: wait for the database to answer, creating the bookkeeping tables if this is the very
//! first boot; upgrade bookkeeping databases written by older deployments; restore migration
//! artifacts so a node with an empty migrations directory catches up; apply everything to head;
//! and finally rebuild the model registry from the stored descriptors so the process can serve
//! before a single descriptor file has been read.
use anyhow::{Context, Result};
use log::{info, warn};

use dres_descriptor::Descriptor;
use dres_registry::ModelRegistry;
use dres_store::{upgrade_bookkeeping, ChecksumStore, MigrationStore, StoreError};

use crate::{
    BootstrapError, Config, ExponentialBackoff, MigrationRunner, ReconciliationEngine,
};

/// Run the whole startup sequence and hand back a ready engine.
pub fn initialize(config: &Config, runner: MigrationRunner) -> Result<ReconciliationEngine> {
    wait_for_database(config, &runner)?;

    upgrade_bookkeeping(&config.database_path).context("Upgrading legacy bookkeeping tables")?;

    let artifacts = MigrationStore::open(&config.database_path)?;
    artifacts
        .restore_all_to_directory(&config.migrations_directory)
        .context("Restoring migration artifacts")?;
    // Even with nothing restored, the local directory may hold revisions that never ran here.
    runner.upgrade().context("Applying pending revisions")?;

    let checksums = ChecksumStore::open(&config.database_path)?;
    let registry = replay_stored_descriptors(&checksums)?;

    Ok(ReconciliationEngine::new(registry, checksums, runner))
}

/// Block until the checksums table answers a query.
///
/// A missing table means the database is up but this is the first boot, so we create the
/// bookkeeping tables and try again.  An unreachable database gets exponential backoff; running
/// out of attempts is fatal.
fn wait_for_database(config: &Config, runner: &MigrationRunner) -> Result<()> {
    let mut backoff = ExponentialBackoff::new(&config.backoff);
    let mut last_error = String::new();

    for attempt in 0..=config.backoff.max_retries {
        let probe = ChecksumStore::open(&config.database_path).and_then(|s| s.probe());
        match probe {
            Ok(()) => {
                info!("Database ready after {} attempts", attempt + 1);
                return Ok(());
            }
            Err(e) if e.is_missing_table() => {
                info!("Bookkeeping tables missing; creating them");
                runner
                    .bookkeeping_revision()
                    .context("Writing bookkeeping revision")?;
                runner.upgrade().context("Creating bookkeeping tables")?;
                last_error = e.to_string();
            }
            Err(e @ StoreError::Unreachable(_)) => {
                let delay = backoff.next_delay();
                warn!(
                    "Database unreachable (attempt {}): {}; retrying in {:.1}s",
                    attempt + 1,
                    e,
                    delay.as_secs_f64()
                );
                last_error = e.to_string();
                std::thread::sleep(delay);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(BootstrapError::DatabaseUnavailable {
        retries: config.backoff.max_retries,
        last_error,
    }
    .into())
}

/// Rebuild the registry from the descriptor documents saved in the checksums table.
fn replay_stored_descriptors(checksums: &ChecksumStore) -> Result<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    for record in checksums.list_all()? {
        let document = match record.descriptor_json {
            Some(d) => d,
            None => {
                info!(
                    "No stored descriptor for {}; it will be rebuilt on the next pass over its descriptor file",
                    record.data_resource
                );
                continue;
            }
        };
        match Descriptor::parse(&document, "") {
            Ok(descriptor) => {
                registry
                    .register(&descriptor)
                    .with_context(|| format!("Replaying descriptor for {}", record.data_resource))?;
            }
            Err(e) => {
                warn!(
                    "Stored descriptor for {} no longer parses: {}; skipping",
                    record.data_resource, e
                );
            }
        }
    }
    if !registry.is_empty() {
        info!("Replayed {} stored descriptors", registry.len());
    }
    Ok(registry)
}
