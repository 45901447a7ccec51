//! Dataset configuration, on-disk layout and the labeled-corpus database.
//!
//! - `DatasetConfig`: libraries and matrix settings read from YAML/JSON.
//! - `DatasetLayout`: computed paths under a dataset output root.
//! - `CorpusDb`: SQLite store for build runs and labeled functions.
//! - `DatasetContext`: layout + manifest + open database for an existing dataset.

mod config;
mod context;
mod corpus_db;
mod layout;
mod models;
mod util;

pub use config::{ConfigError, DatasetConfig, LibraryConfig, ENV_PREFIX};
pub use context::DatasetContext;
pub use corpus_db::{CorpusDb, DbError, DbResult, CURRENT_SCHEMA_VERSION};
pub use layout::{DatasetLayout, METADATA_FILE_NAME};
pub use models::{BuildRunRecord, BuildRunStatus, CorpusStats};
pub use util::{load_metadata, open_corpus_db};
