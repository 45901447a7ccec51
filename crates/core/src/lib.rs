//! corpus-core
//!
//! Core library for building labeled binary corpora of cryptographic functions.
//!
//! The pipeline runs strictly downward: toolchain discovery, source acquisition,
//! the cross-architecture build matrix, function extraction from the compiled
//! artifacts, and provenance-derived labeling. `services::dataset` orchestrates
//! the stages; `db` carries configuration, on-disk layout and the corpus database.
//!
//! All substantive logic lives here so it is testable against fake toolchains and
//! reusable from the CLI.

pub mod db;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
