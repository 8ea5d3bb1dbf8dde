//! Enumerating descriptors from schema directories and inline documents.
//!
//! Directory scans are flat and sorted, so repeated runs against an unchanged descriptor set see the same
//! order; the migration tool downstream is sensitive to registration order.  One malformed entry is logged
//! and skipped, never allowed to abort the rest of the batch.  Inline documents follow the same
//! skip-and-log policy as files.
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::*;

use crate::Descriptor;

/// Enumerates descriptors from a set of directories and an inline list.
///
/// Each [DescriptorSource::enumerate] call re-scans from scratch; descriptors are never cached here.
pub struct DescriptorSource {
    directories: Vec<PathBuf>,
    inline: Vec<serde_json::Value>,
}

impl DescriptorSource {
    pub fn new(directories: Vec<PathBuf>, inline: Vec<serde_json::Value>) -> Self {
        Self { directories, inline }
    }

    /// Scan every directory (sorted file order) and then the inline list.
    ///
    /// A missing or non-directory path is an error of the whole call; a malformed individual entry is
    /// logged and skipped.
    pub fn enumerate(&self) -> Result<Vec<Descriptor>> {
        let mut descriptors = vec![];

        for directory in &self.directories {
            scan_directory(directory, &mut descriptors)?;
        }

        for document in &self.inline {
            match Descriptor::parse(document, "") {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => error!("Skipping inline descriptor: {}", e),
            }
        }

        Ok(descriptors)
    }
}

fn scan_directory(directory: &Path, out: &mut Vec<Descriptor>) -> Result<()> {
    if !directory.is_dir() {
        anyhow::bail!(
            "Unable to locate schema directory '{}'",
            directory.display()
        );
    }

    let mut names: Vec<String> = vec![];
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(n) => n,
            Err(_) => {
                warn!("Skipping non-UTF8 file name in {}", directory.display());
                continue;
            }
        };
        if !name.ends_with(".json") {
            continue;
        }
        if entry.file_type()?.is_dir() {
            warn!("Cannot open a directory '{}' as a descriptor", name);
            continue;
        }
        names.push(name);
    }
    names.sort();

    for name in names {
        match parse_file(&directory.join(&name), &name) {
            Ok(descriptor) => out.push(descriptor),
            Err(e) => error!("Skipping descriptor '{}': {:#}", name, e),
        }
    }

    Ok(())
}

fn parse_file(path: &Path, name: &str) -> Result<Descriptor> {
    let text = std::fs::read_to_string(path)?;
    let document: serde_json::Value = serde_json::from_str(&text)?;
    Ok(Descriptor::parse(&document, name)?)
}
