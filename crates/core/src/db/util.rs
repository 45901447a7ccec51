use std::fs;

use anyhow::{Context, Result};

use crate::db::{CorpusDb, DatasetLayout};
use crate::model::Metadata;

/// Load the compilation manifest for a dataset layout.
pub fn load_metadata(layout: &DatasetLayout) -> Result<Metadata> {
    Metadata::load(&layout.metadata_path).with_context(|| {
        format!("Failed to load compilation metadata at {}", layout.metadata_path.display())
    })
}

/// Create the dataset root if needed and open its corpus database.
pub fn open_corpus_db(layout: &DatasetLayout) -> Result<CorpusDb> {
    fs::create_dir_all(&layout.root)
        .with_context(|| format!("Failed to create {}", layout.root.display()))?;
    CorpusDb::open(&layout.corpus_db_path).with_context(|| {
        format!("Failed to open corpus database at {}", layout.corpus_db_path.display())
    })
}
