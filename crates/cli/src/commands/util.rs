use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use corpus_core::db::{DatasetLayout, METADATA_FILE_NAME};
use corpus_core::model::Metadata;
use tracing::{debug, warn};

use crate::canonicalize_or_current;

/// Resolve a binary argument and make sure the file is there.
pub fn resolve_binary(path: &str) -> Result<PathBuf> {
    let abs_path = canonicalize_or_current(path)?;
    if !abs_path.is_file() {
        return Err(anyhow!("Binary file does not exist: {}", abs_path.display()));
    }
    Ok(abs_path)
}

/// Layout for a dataset output root given on the command line.
pub fn dataset_layout(output: &str) -> Result<DatasetLayout> {
    Ok(DatasetLayout::new(canonicalize_or_current(output)?))
}

/// Render an optional size the way listings show it.
pub fn size_display(size: Option<u64>) -> String {
    size.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Manifest of the dataset a binary lives in, found by walking up from the binary.
pub fn enclosing_manifest(binary: &Path) -> Option<Metadata> {
    let manifest_path = binary
        .ancestors()
        .skip(1)
        .map(|dir| dir.join(METADATA_FILE_NAME))
        .find(|candidate| candidate.is_file())?;

    match Metadata::load(&manifest_path) {
        Ok(metadata) => {
            debug!("Using manifest {}", manifest_path.display());
            Some(metadata)
        }
        Err(err) => {
            warn!("Ignoring unreadable manifest: {err}");
            None
        }
    }
}
