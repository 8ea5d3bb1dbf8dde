//! Descriptor reconciliation.
//!
//! Each pass compares every descriptor's checksum against what this process has seen before and
//! what the bookkeeping database remembers, then drives the migration runner for anything that
//! drifted.  The table name is a descriptor's identity; renaming a descriptor file does not make
//! it a new resource.
use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, error, info};

use dres_descriptor::Descriptor;
use dres_registry::{ModelDefinition, ModelRegistry};
use dres_store::ChecksumStore;

use crate::MigrationRunner;

/// What a pass concluded about one descriptor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReconcileOutcome {
    /// First time this process has seen the descriptor.
    Unseen,
    /// Seen before, checksum unchanged.
    Unchanged,
    /// Seen before and the checksum moved; a migration was considered.
    Changed,
}

/// What this process remembers about a descriptor between passes.
struct IndexEntry {
    source_identifier: String,
    table_name: String,
    last_seen_checksum: String,
}

pub struct ReconciliationEngine {
    registry: ModelRegistry,
    checksums: ChecksumStore,
    runner: MigrationRunner,
    index: Vec<IndexEntry>,
}

impl ReconciliationEngine {
    pub fn new(
        registry: ModelRegistry,
        checksums: ChecksumStore,
        runner: MigrationRunner,
    ) -> ReconciliationEngine {
        ReconciliationEngine {
            registry,
            checksums,
            runner,
            index: vec![],
        }
    }

    pub fn get_registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn get_checksums(&self) -> &ChecksumStore {
        &self.checksums
    }

    pub fn get_runner(&self) -> &MigrationRunner {
        &self.runner
    }

    /// Reconcile one batch of descriptors.  A descriptor that fails is logged and skipped so it
    /// can't take its siblings down with it; the returned list only covers descriptors that were
    /// fully processed.
    pub fn run_once(&mut self, descriptors: &[Descriptor]) -> Vec<(String, ReconcileOutcome)> {
        let mut outcomes = vec![];
        for descriptor in descriptors {
            match self.process_descriptor(descriptor) {
                Ok(outcome) => {
                    outcomes.push((descriptor.get_table_name().to_string(), outcome));
                }
                Err(e) => {
                    error!(
                        "Failed to reconcile {} (table {}): {:#}",
                        descriptor.get_source_identifier(),
                        descriptor.get_table_name(),
                        e
                    );
                }
            }
        }
        if !outcomes.is_empty() {
            debug!(
                "Reconciled: {}",
                outcomes
                    .iter()
                    .map(|(name, outcome)| format!("{} ({:?})", name, outcome))
                    .join(", ")
            );
        }
        outcomes
    }

    fn process_descriptor(&mut self, descriptor: &Descriptor) -> Result<ReconcileOutcome> {
        let source = descriptor.get_source_identifier();
        let position = self.index.iter().position(|e| e.source_identifier == source);

        match position {
            Some(i) if self.index[i].last_seen_checksum == descriptor.checksum() => {
                // Re-register anyway so a restarted registry consumer sees the model.
                self.registry
                    .register(descriptor)
                    .context("Registering unchanged descriptor")?;
                Ok(ReconcileOutcome::Unchanged)
            }
            Some(i) => {
                info!(
                    "Descriptor {} changed; migrating table {}",
                    source,
                    descriptor.get_table_name()
                );
                let model = self
                    .registry
                    .register(descriptor)
                    .context("Registering changed descriptor")?;
                self.migrate(descriptor, &model, "update table")?;
                self.record(descriptor)?;
                self.index[i].table_name = descriptor.get_table_name().to_string();
                self.index[i].last_seen_checksum = descriptor.checksum().to_string();
                Ok(ReconcileOutcome::Changed)
            }
            None => {
                let model = self
                    .registry
                    .register(descriptor)
                    .context("Registering new descriptor")?;
                let stored = self.checksums.get(descriptor.get_table_name())?;
                match stored {
                    Some(record) if record.model_checksum == descriptor.checksum() => {
                        // Another replica already reconciled this exact schema.
                        debug!(
                            "Table {} already reconciled elsewhere; skipping migration",
                            descriptor.get_table_name()
                        );
                    }
                    Some(_) => {
                        info!(
                            "Stored checksum for {} is stale; migrating",
                            descriptor.get_table_name()
                        );
                        self.migrate(descriptor, &model, "update table")?;
                        self.record(descriptor)?;
                    }
                    None => {
                        info!("New table {}; migrating", descriptor.get_table_name());
                        self.migrate(descriptor, &model, "create table")?;
                        self.record(descriptor)?;
                    }
                }
                self.index.push(IndexEntry {
                    source_identifier: source.to_string(),
                    table_name: descriptor.get_table_name().to_string(),
                    last_seen_checksum: descriptor.checksum().to_string(),
                });
                Ok(ReconcileOutcome::Unseen)
            }
        }
    }

    fn migrate(
        &self,
        descriptor: &Descriptor,
        model: &ModelDefinition,
        verb: &str,
    ) -> Result<()> {
        let message = format!("{} {}", verb, descriptor.get_table_name());
        self.runner
            .revision(model, &message)
            .with_context(|| format!("Generating revision for {}", descriptor.get_table_name()))?;
        self.runner
            .upgrade()
            .with_context(|| format!("Applying revisions for {}", descriptor.get_table_name()))?;
        Ok(())
    }

    /// Persist the descriptor's checksum and document, inserting or updating as needed.
    fn record(&self, descriptor: &Descriptor) -> Result<()> {
        let updated = self.checksums.update(
            descriptor.get_table_name(),
            descriptor.checksum(),
            descriptor.get_document(),
        )?;
        if !updated {
            self.checksums.add(
                descriptor.get_table_name(),
                descriptor.checksum(),
                descriptor.get_document(),
            )?;
        }
        Ok(())
    }
}
