use std::path::{Path, PathBuf};

/// File name of the consolidated manifest written after every build.
pub const METADATA_FILE_NAME: &str = "compilation_metadata.json";

/// Logical layout of a dataset output directory.
///
/// Derived from the output root only; it does *not* perform any IO. Callers create
/// directories as they need them.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    /// Root directory of the dataset.
    pub root: PathBuf,
    /// Cached library source trees.
    pub sources_dir: PathBuf,
    /// Archive downloads in flight (under the source cache).
    pub downloads_dir: PathBuf,
    /// Compiled artifacts, one sub-directory per library.
    pub binaries_dir: PathBuf,
    /// Path to the compilation manifest (JSON).
    pub metadata_path: PathBuf,
    /// Path to the labeled-corpus database.
    pub corpus_db_path: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let sources_dir = root.join("sources");
        let downloads_dir = sources_dir.join(".downloads");
        let binaries_dir = root.join("binaries");
        let metadata_path = root.join(METADATA_FILE_NAME);
        let corpus_db_path = root.join("corpus.db");

        Self { root, sources_dir, downloads_dir, binaries_dir, metadata_path, corpus_db_path }
    }

    /// Output directory for one library's compiled artifacts.
    pub fn library_binaries_dir(&self, library: &str) -> PathBuf {
        self.binaries_dir.join(library)
    }
}
