use serde::{Deserialize, Serialize};

/// Final status of a dataset build run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildRunStatus {
    /// Every attempted cell produced an artifact.
    Succeeded,
    /// At least one library built, but some cells or libraries failed.
    Partial,
    /// No library produced an artifact.
    Failed,
}

impl BuildRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildRunStatus::Succeeded => "succeeded",
            BuildRunStatus::Partial => "partial",
            BuildRunStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for BuildRunStatus {
    type Err = rusqlite::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "succeeded" => Ok(BuildRunStatus::Succeeded),
            "partial" => Ok(BuildRunStatus::Partial),
            "failed" => Ok(BuildRunStatus::Failed),
            _ => Err(rusqlite::Error::InvalidQuery),
        }
    }
}

/// Bookkeeping row for one `build-dataset` invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildRunRecord {
    /// SHA-256 of the config file that drove the run, when one was used.
    pub config_hash: Option<String>,
    pub status: BuildRunStatus,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub libraries_built: u64,
    pub started_at: String,
    pub finished_at: String,
}

/// Aggregate view over the stored labeled functions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusStats {
    pub functions: u64,
    pub crypto_functions: u64,
    pub binaries: u64,
    /// `(algorithm, count)` sorted by algorithm name.
    pub by_algorithm: Vec<(String, u64)>,
}
