//! Core data model for the corpus pipeline.
//!
//! Records flow strictly downward: a `CompilationUnit` is produced by the build
//! matrix, its binary yields `ExtractedFunction`s, and each of those becomes a
//! `LabeledFunction` once provenance has been attached.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

mod metadata;

pub use metadata::{Metadata, MetadataEntry, MetadataError};

/// Identity of one build-matrix cell for a given library.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub architecture: String,
    pub optimization: String,
    pub function: String,
}

impl CellKey {
    pub fn new(
        architecture: impl Into<String>,
        optimization: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            architecture: architecture.into(),
            optimization: optimization.into(),
            function: function.into(),
        }
    }

    /// Composite key used in the persisted metadata document (`{arch}_{opt}_{function}`).
    pub fn metadata_key(&self) -> String {
        format!("{}_{}_{}", self.architecture, self.optimization, self.function)
    }
}

/// Result of one successful compile attempt.
///
/// Failed cells never materialize as a unit; they only show up in the batch counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub library: String,
    pub function: String,
    pub architecture: String,
    pub optimization: String,
    pub compiler: String,
    pub binary_path: PathBuf,
    pub source_path: PathBuf,
    /// Size of the compiled artifact in bytes.
    pub size: u64,
    /// MD5 hex digest of the compiled artifact.
    pub md5: String,
}

impl CompilationUnit {
    pub fn key(&self) -> CellKey {
        CellKey::new(&self.architecture, &self.optimization, &self.function)
    }
}

/// Where a function's bounds came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Authoritative symbol-table entry.
    Symbol,
    /// Prologue byte-pattern guess.
    Heuristic,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Symbol => "symbol",
            Provenance::Heuristic => "heuristic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "symbol" => Some(Provenance::Symbol),
            "heuristic" => Some(Provenance::Heuristic),
            _ => None,
        }
    }
}

/// A function recovered from a compiled binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFunction {
    pub binary_path: PathBuf,
    pub address: u64,
    /// `None` means the size was not determined. Only symbol provenance carries a size.
    pub size: Option<u64>,
    pub name: String,
    pub provenance: Provenance,
}

/// Ground-truth label attached to an extracted function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    pub is_crypto: bool,
}

/// Algorithm name used when no catalog keyword matched.
pub const UNKNOWN_ALGORITHM: &str = "Unknown";

impl Label {
    /// Label for binaries whose provenance could not be recovered.
    pub fn unknown() -> Self {
        Self {
            algorithm: UNKNOWN_ALGORITHM.to_string(),
            library: None,
            architecture: None,
            optimization: None,
            function_name: None,
            is_crypto: false,
        }
    }
}

/// An extracted function together with its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledFunction {
    #[serde(flatten)]
    pub function: ExtractedFunction,
    pub label: Label,
}
