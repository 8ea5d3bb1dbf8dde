//! The migration runner: a thin layer over the tool that captures every revision file it writes.
use std::path::Path;

use anyhow::Result;
use log::{debug, info};

use dres_registry::ModelDefinition;
use dres_store::MigrationStore;

use crate::MigrationTool;

/// Called with every revision file the runner writes, before it is applied.
pub trait RevisionHook {
    fn on_revision_written(&self, path: &Path) -> Result<()>;
}

/// Mirrors written revision files into the migrations bookkeeping table.
pub struct StoreRevisionHook {
    store: MigrationStore,
}

impl StoreRevisionHook {
    pub fn new(store: MigrationStore) -> StoreRevisionHook {
        StoreRevisionHook { store }
    }
}

impl RevisionHook for StoreRevisionHook {
    fn on_revision_written(&self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Revision path {:?} has no file name", path))?
            .to_string_lossy()
            .into_owned();
        let contents = std::fs::read(path)?;
        match self.store.save(&name, &contents) {
            Ok(()) => Ok(()),
            // The revision that creates the bookkeeping tables is written before any table
            // exists to mirror it into.  That file is regenerated deterministically on every
            // node, so there is nothing to capture.
            Err(e) if e.is_missing_table() => {
                debug!("Not capturing {}; bookkeeping tables do not exist yet", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub struct MigrationRunner {
    tool: Box<dyn MigrationTool>,
    hook: Option<Box<dyn RevisionHook>>,
}

impl MigrationRunner {
    pub fn new(tool: Box<dyn MigrationTool>) -> MigrationRunner {
        MigrationRunner { tool, hook: None }
    }

    pub fn with_hook(mut self, hook: Box<dyn RevisionHook>) -> MigrationRunner {
        self.hook = Some(hook);
        self
    }

    /// Generate a revision for `model` if it has drifted from the live schema.  Returns whether a
    /// revision was written.
    pub fn revision(&self, model: &ModelDefinition, message: &str) -> Result<bool> {
        match self.tool.generate_revision(model, message)? {
            Some(path) => {
                self.run_hook(&path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Make sure the revision creating the bookkeeping tables exists.
    pub fn bookkeeping_revision(&self) -> Result<()> {
        if let Some(path) = self.tool.ensure_bookkeeping_revision()? {
            self.run_hook(&path)?;
        }
        Ok(())
    }

    /// Apply all pending revisions.
    pub fn upgrade(&self) -> Result<usize> {
        let applied = self.tool.upgrade_to_head()?;
        if applied > 0 {
            info!("Applied {} revisions", applied);
        }
        Ok(applied)
    }

    fn run_hook(&self, path: &Path) -> Result<()> {
        if let Some(hook) = &self.hook {
            hook.on_revision_written(path)?;
        }
        Ok(())
    }
}
