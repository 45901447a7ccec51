use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::{CorpusDb, DatasetConfig, DatasetLayout, DbError, LibraryConfig};
use crate::model::{LabeledFunction, Metadata, MetadataError};
use crate::services::compiler::{BuildMatrixCompiler, ProgressObserver};
use crate::services::digest::md5_file;
use crate::services::extract::{FunctionExtractor, ReadelfSymbolReader};
use crate::services::labeler::AutoLabeler;
use crate::services::sources::SourceAcquirer;
use crate::services::toolchain::{ToolchainError, ToolchainRegistry};

/// Built-in function lists, keyed by library name.
const FUNCTION_CATALOG: &[(&str, &[&str])] = &[
    (
        "openssl",
        &[
            "AES_encrypt",
            "AES_decrypt",
            "AES_set_encrypt_key",
            "RSA_public_encrypt",
            "RSA_private_decrypt",
            "SHA256_Init",
            "SHA256_Update",
            "SHA256_Final",
            "SHA1_Init",
            "SHA1_Update",
            "SHA1_Final",
            "MD5_Init",
            "MD5_Update",
            "MD5_Final",
            "DES_encrypt1",
            "DES_decrypt1",
            "HMAC",
            "HMAC_Init",
            "HMAC_Update",
            "HMAC_Final",
        ],
    ),
    (
        "mbedtls",
        &[
            "mbedtls_aes_encrypt",
            "mbedtls_aes_decrypt",
            "mbedtls_rsa_public",
            "mbedtls_rsa_private",
            "mbedtls_sha256",
            "mbedtls_sha1",
            "mbedtls_md5",
            "mbedtls_des_crypt_ecb",
            "mbedtls_des3_crypt_ecb",
        ],
    ),
    (
        "libsodium",
        &[
            "crypto_secretbox_easy",
            "crypto_secretbox_open_easy",
            "crypto_box_easy",
            "crypto_box_open_easy",
            "crypto_sign",
            "crypto_sign_open",
            "crypto_hash_sha256",
            "crypto_hash_sha512",
        ],
    ),
];

/// Target functions for a known library; unknown libraries get an empty list.
pub fn catalog_functions(library: &str) -> Vec<String> {
    FUNCTION_CATALOG
        .iter()
        .find(|(name, _)| *name == library)
        .map(|(_, funcs)| funcs.iter().map(|f| f.to_string()).collect())
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
    #[error("No library in the config produced any binaries")]
    NoLibrariesBuilt,
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Db(#[from] DbError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum LibraryStatus {
    Built,
    /// Matrix ran but no cell produced a binary.
    NothingBuilt,
    SourceUnavailable(String),
    MatrixFailed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct LibrarySummary {
    pub name: String,
    pub status: LibraryStatus,
    pub functions: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_missing_source: usize,
}

impl LibrarySummary {
    fn unbuilt(name: &str, functions: usize, status: LibraryStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            functions,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped_missing_source: 0,
        }
    }
}

/// Batch summary of one `compile_all` run.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub started_at: String,
    pub finished_at: String,
    pub architectures: Vec<String>,
    pub libraries: Vec<LibrarySummary>,
    pub metadata_path: PathBuf,
}

impl DatasetSummary {
    pub fn attempted(&self) -> usize {
        self.libraries.iter().map(|l| l.attempted).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.libraries.iter().map(|l| l.succeeded).sum()
    }

    /// Failed plus skipped cells.
    pub fn failed(&self) -> usize {
        self.libraries.iter().map(|l| l.failed + l.skipped_missing_source).sum()
    }

    pub fn libraries_built(&self) -> usize {
        self.libraries.iter().filter(|l| l.status == LibraryStatus::Built).count()
    }
}

/// Integrity check of a manifest against the files on disk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub checked: usize,
    pub missing: Vec<PathBuf>,
    pub mismatched: Vec<PathBuf>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

/// Check that every referenced binary exists and still hashes to its recorded MD5.
pub fn verify_metadata(metadata: &Metadata) -> VerifyReport {
    let mut report = VerifyReport::default();
    for (_, _, entry) in metadata.entries() {
        report.checked += 1;
        match md5_file(&entry.binary_path) {
            Ok(digest) if digest == entry.md5 => {}
            Ok(_) => report.mismatched.push(entry.binary_path.clone()),
            Err(_) => report.missing.push(entry.binary_path.clone()),
        }
    }
    report
}

/// Drives acquisition, the build matrix and manifest persistence for a whole config.
pub struct DatasetCompiler {
    config: DatasetConfig,
    layout: DatasetLayout,
    acquirer: SourceAcquirer,
    compiler: BuildMatrixCompiler,
    extractor: FunctionExtractor,
}

impl DatasetCompiler {
    /// Wire up the default host-backed components. Fails if no toolchain is installed.
    pub fn new(config: DatasetConfig, output_root: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let layout = DatasetLayout::new(output_root);
        let registry = ToolchainRegistry::detect()?;
        let compiler = BuildMatrixCompiler::new(registry).with_options(config.matrix_options());
        let acquirer = SourceAcquirer::new(&layout.sources_dir);
        let extractor = FunctionExtractor::with_reader(
            ReadelfSymbolReader::new().with_timeout(config.symbol_timeout()),
        );
        Ok(Self::with_parts(config, layout, acquirer, compiler, extractor))
    }

    pub fn with_parts(
        config: DatasetConfig,
        layout: DatasetLayout,
        acquirer: SourceAcquirer,
        compiler: BuildMatrixCompiler,
        extractor: FunctionExtractor,
    ) -> Self {
        Self { config, layout, acquirer, compiler, extractor }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// Build every configured library and write the consolidated manifest.
    ///
    /// A library that cannot be acquired or compiled is logged and skipped. The manifest
    /// is written even then; the run only fails when no library produced a binary.
    pub fn compile_all(
        &self,
        observer: &dyn ProgressObserver,
    ) -> Result<(Metadata, DatasetSummary), DatasetError> {
        let started_at = chrono::Utc::now().to_rfc3339();
        std::fs::create_dir_all(&self.layout.binaries_dir).map_err(|source| DatasetError::Io {
            path: self.layout.binaries_dir.clone(),
            source,
        })?;
        let mut metadata = Metadata::new();
        let mut libraries = Vec::new();

        info!(
            "Building dataset for {} libraries on {}",
            self.config.crypto_libraries.len(),
            self.compiler.registry().available_architectures().join(", ")
        );

        for library in &self.config.crypto_libraries {
            libraries.push(self.compile_library(library, &mut metadata, observer));
        }

        metadata.save(&self.layout.metadata_path)?;
        info!("Metadata saved to {}", self.layout.metadata_path.display());

        let summary = DatasetSummary {
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            architectures: self
                .compiler
                .registry()
                .available_architectures()
                .into_iter()
                .map(str::to_string)
                .collect(),
            libraries,
            metadata_path: self.layout.metadata_path.clone(),
        };
        info!(
            "Dataset build finished: {}/{} cells succeeded across {} libraries",
            summary.succeeded(),
            summary.attempted(),
            summary.libraries_built()
        );

        if summary.libraries_built() == 0 {
            return Err(DatasetError::NoLibrariesBuilt);
        }
        Ok((metadata, summary))
    }

    fn compile_library(
        &self,
        library: &LibraryConfig,
        metadata: &mut Metadata,
        observer: &dyn ProgressObserver,
    ) -> LibrarySummary {
        let name = library.name.as_str();
        let functions =
            library.functions.clone().unwrap_or_else(|| catalog_functions(name));
        if functions.is_empty() {
            warn!("No target functions known for {name}");
        }

        info!("Processing {name}");
        let source_dir = match self.acquirer.acquire(
            name,
            library.version.as_deref(),
            library.url.as_deref(),
        ) {
            Ok(dir) => dir,
            Err(err) => {
                error!("Failed to acquire {name}: {err}");
                return LibrarySummary::unbuilt(
                    name,
                    functions.len(),
                    LibraryStatus::SourceUnavailable(err.to_string()),
                );
            }
        };

        let output_dir = self.layout.library_binaries_dir(name);
        let report = match self.compiler.compile_matrix(
            name,
            &source_dir,
            &functions,
            &output_dir,
            observer,
        ) {
            Ok(report) => report,
            Err(err) => {
                error!("Failed to compile {name}: {err}");
                return LibrarySummary::unbuilt(
                    name,
                    functions.len(),
                    LibraryStatus::MatrixFailed(err.to_string()),
                );
            }
        };

        metadata.insert_units(name, report.units.values());
        LibrarySummary {
            name: name.to_string(),
            status: if report.succeeded() > 0 {
                LibraryStatus::Built
            } else {
                LibraryStatus::NothingBuilt
            },
            functions: functions.len(),
            attempted: report.attempted,
            succeeded: report.succeeded(),
            failed: report.failed,
            skipped_missing_source: report.skipped_missing_source,
        }
    }

    /// Extract and label every binary recorded in `metadata`.
    ///
    /// Binaries are processed in parallel; the result keeps manifest order.
    pub fn label_corpus(&self, metadata: &Metadata) -> Vec<LabeledFunction> {
        label_corpus(&self.extractor, metadata)
    }

    /// Label the corpus and store it, replacing earlier rows for the same binaries.
    pub fn store_labeled_corpus(
        &self,
        metadata: &Metadata,
        db: &CorpusDb,
    ) -> Result<usize, DatasetError> {
        store_labeled_corpus(&self.extractor, metadata, db)
    }
}

/// Label every manifest binary and swap its stored rows for the fresh labels.
pub fn store_labeled_corpus(
    extractor: &FunctionExtractor,
    metadata: &Metadata,
    db: &CorpusDb,
) -> Result<usize, DatasetError> {
    let labeled = label_corpus(extractor, metadata);
    let binaries: Vec<&Path> =
        metadata.entries().map(|(_, _, entry)| entry.binary_path.as_path()).collect();
    Ok(db.replace_labeled_functions(&binaries, &labeled)?)
}

/// Extract and label every binary of a manifest with the given extractor.
pub fn label_corpus(extractor: &FunctionExtractor, metadata: &Metadata) -> Vec<LabeledFunction> {
    let labeler = AutoLabeler::with_manifest(metadata);
    let binaries: Vec<&Path> =
        metadata.entries().map(|(_, _, entry)| entry.binary_path.as_path()).collect();

    let labeled: Vec<Vec<LabeledFunction>> = binaries
        .par_iter()
        .map(|binary| labeler.label_batch(binary, &extractor.extract(binary)))
        .collect();

    let labeled: Vec<LabeledFunction> = labeled.into_iter().flatten().collect();
    info!("Labeled {} functions from {} binaries", labeled.len(), binaries.len());
    labeled
}
