use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::CompilationUnit;

/// One compiled artifact as recorded in `compilation_metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub binary_path: PathBuf,
    pub source_path: PathBuf,
    pub architecture: String,
    pub optimization: String,
    pub function: String,
    pub library: String,
    pub size: u64,
    pub md5: String,
}

impl From<&CompilationUnit> for MetadataEntry {
    fn from(unit: &CompilationUnit) -> Self {
        Self {
            binary_path: unit.binary_path.clone(),
            source_path: unit.source_path.clone(),
            architecture: unit.architecture.clone(),
            optimization: unit.optimization.clone(),
            function: unit.function.clone(),
            library: unit.library.clone(),
            size: unit.size,
            md5: unit.md5.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("I/O error on metadata file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid metadata JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Consolidated corpus metadata: library name -> `{arch}_{opt}_{function}` -> entry.
///
/// Both levels are ordered maps so the serialized document is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    pub libraries: BTreeMap<String, BTreeMap<String, MetadataEntry>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every unit of one library. An empty iterator still registers the library.
    pub fn insert_units<'a>(
        &mut self,
        library: &str,
        units: impl IntoIterator<Item = &'a CompilationUnit>,
    ) {
        let entries = self.libraries.entry(library.to_string()).or_default();
        for unit in units {
            entries.insert(unit.key().metadata_key(), MetadataEntry::from(unit));
        }
    }

    /// Iterate `(library, key, entry)` in sorted order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &MetadataEntry)> {
        self.libraries.iter().flat_map(|(library, entries)| {
            entries.iter().map(move |(key, entry)| (library.as_str(), key.as_str(), entry))
        })
    }

    /// Total number of recorded artifacts across all libraries.
    pub fn len(&self) -> usize {
        self.libraries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let body = fs::read_to_string(path)
            .map_err(|source| MetadataError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&body)
            .map_err(|source| MetadataError::Json { path: path.to_path_buf(), source })
    }

    pub fn save(&self, path: &Path) -> Result<(), MetadataError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| MetadataError::Io { path: parent.to_path_buf(), source })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|source| MetadataError::Json { path: path.to_path_buf(), source })?;
        fs::write(path, json).map_err(|source| MetadataError::Io { path: path.to_path_buf(), source })
    }
}
