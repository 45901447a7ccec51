use std::path::Path;

use anyhow::Result;

use crate::db::{load_metadata, open_corpus_db, CorpusDb, DatasetLayout};
use crate::model::Metadata;

/// Convenience wrapper bundling an existing dataset's layout, manifest and database.
#[derive(Debug)]
pub struct DatasetContext {
    pub layout: DatasetLayout,
    pub metadata: Metadata,
    pub db: CorpusDb,
}

impl DatasetContext {
    /// Load the manifest and open the corpus database for a dataset root.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = DatasetLayout::new(root);
        let metadata = load_metadata(&layout)?;
        let db = open_corpus_db(&layout)?;
        Ok(Self { layout, metadata, db })
    }
}
