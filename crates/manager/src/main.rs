//! The data resource manager daemon.
//!
//! Reads configuration from the environment, brings the database up to date, then polls the
//! descriptor directory forever, migrating whenever a descriptor drifts.
use anyhow::Result;
use log::info;

use dres_descriptor::DescriptorSource;
use dres_engine::{bootstrap, monitor, Config, MigrationRunner, SqlMigrationTool, StoreRevisionHook};
use dres_store::MigrationStore;

fn main() -> Result<()> {
    dres_logging::log_to_stderr();

    let config = Config::from_env()?;
    info!(
        "Managing {} from descriptors in {}",
        config.database_path.display(),
        config.descriptor_directory.display()
    );

    let tool = SqlMigrationTool::new(
        config.database_path.clone(),
        config.migrations_directory.clone(),
    );
    let hook = StoreRevisionHook::new(MigrationStore::open(&config.database_path)?);
    let runner = MigrationRunner::new(Box::new(tool)).with_hook(Box::new(hook));

    let engine = bootstrap::initialize(&config, runner)?;
    info!("Bootstrap complete; watching for descriptor changes");

    let source = DescriptorSource::new(vec![config.descriptor_directory.clone()], vec![]);
    monitor::run(engine, source, config.sleep_interval)
}
