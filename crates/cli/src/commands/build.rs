use std::path::Path;

use anyhow::{anyhow, Context, Result};
use corpus_core::db::{open_corpus_db, BuildRunRecord, BuildRunStatus, CorpusDb, DatasetConfig};
use corpus_core::services::dataset::{
    DatasetCompiler, DatasetError, DatasetSummary, LibraryStatus,
};
use tracing::info;

use crate::commands::BarProgress;
use crate::{canonicalize_or_current, sha256_file};

/// Build the whole dataset described by `config` under `output`.
pub fn build_dataset_command(config: &str, output: &str, label: bool) -> Result<()> {
    let config_path = Path::new(config);
    let dataset_config = DatasetConfig::load(config_path)
        .with_context(|| format!("Failed to load dataset config {}", config_path.display()))?;
    let config_hash = sha256_file(config_path)?;

    let output_root = canonicalize_or_current(output)?;
    let compiler = DatasetCompiler::new(dataset_config, &output_root)
        .context("Failed to prepare dataset build")?;
    let db = open_corpus_db(compiler.layout())?;

    let started_at = chrono::Utc::now().to_rfc3339();
    let progress = BarProgress::new();
    let outcome = compiler.compile_all(&progress);
    progress.finish();

    let (metadata, summary) = match outcome {
        Ok(built) => built,
        Err(DatasetError::NoLibrariesBuilt) => {
            let record = BuildRunRecord {
                config_hash: Some(config_hash),
                status: BuildRunStatus::Failed,
                attempted: 0,
                succeeded: 0,
                failed: 0,
                libraries_built: 0,
                started_at,
                finished_at: chrono::Utc::now().to_rfc3339(),
            };
            record_run(&db, &record)?;
            return Err(anyhow!(
                "No library produced any binaries; manifest written to {}",
                compiler.layout().metadata_path.display()
            ));
        }
        Err(err) => return Err(err).context("Dataset build failed"),
    };

    let record = run_record(&summary, Some(config_hash));
    let run_id = record_run(&db, &record)?;
    print_summary(&summary);
    println!("  Run id: {run_id} ({})", record.status.as_str());

    if label {
        let stored = compiler
            .store_labeled_corpus(&metadata, &db)
            .context("Failed to store labeled corpus")?;
        info!("Stored {stored} labeled functions");
        println!("  Labeled functions: {stored}");
    }

    Ok(())
}

/// Derive the persisted run record from a finished build.
pub fn run_record(summary: &DatasetSummary, config_hash: Option<String>) -> BuildRunRecord {
    let all_built = summary.libraries_built() == summary.libraries.len();
    let status = if summary.libraries_built() == 0 {
        BuildRunStatus::Failed
    } else if all_built && summary.failed() == 0 {
        BuildRunStatus::Succeeded
    } else {
        BuildRunStatus::Partial
    };

    BuildRunRecord {
        config_hash,
        status,
        attempted: summary.attempted() as u64,
        succeeded: summary.succeeded() as u64,
        failed: summary.failed() as u64,
        libraries_built: summary.libraries_built() as u64,
        started_at: summary.started_at.clone(),
        finished_at: summary.finished_at.clone(),
    }
}

fn record_run(db: &CorpusDb, record: &BuildRunRecord) -> Result<i64> {
    db.insert_build_run(record).context("Failed to record build run")
}

fn status_display(status: &LibraryStatus) -> String {
    match status {
        LibraryStatus::Built => "built".to_string(),
        LibraryStatus::NothingBuilt => "nothing built".to_string(),
        LibraryStatus::SourceUnavailable(reason) => format!("source unavailable: {reason}"),
        LibraryStatus::MatrixFailed(reason) => format!("matrix failed: {reason}"),
    }
}

fn print_summary(summary: &DatasetSummary) {
    println!("Dataset build finished:");
    println!("  Architectures: {}", summary.architectures.join(", "));
    println!("  Compiled {}/{} successfully", summary.succeeded(), summary.attempted());
    println!("  Libraries:");
    for lib in &summary.libraries {
        println!(
            "  - {} [{}] functions={} succeeded={} failed={} missing_source={}",
            lib.name,
            status_display(&lib.status),
            lib.functions,
            lib.succeeded,
            lib.failed,
            lib.skipped_missing_source
        );
    }
    println!("  Metadata: {}", summary.metadata_path.display());
}
