use anyhow::{Context, Result};
use corpus_core::db::{open_corpus_db, DatasetContext};
use corpus_core::services::dataset::store_labeled_corpus;
use corpus_core::services::extract::FunctionExtractor;

use crate::canonicalize_or_current;
use crate::commands::{dataset_layout, size_display};

/// Label every manifest binary of an existing dataset and store the result.
pub fn label_corpus_command(output: &str) -> Result<()> {
    let root = canonicalize_or_current(output)?;
    let ctx = DatasetContext::from_root(&root)?;

    let extractor = FunctionExtractor::new();
    let stored = store_labeled_corpus(&extractor, &ctx.metadata, &ctx.db)
        .context("Failed to store labeled functions")?;
    let stats = ctx.db.stats().context("Failed to compute corpus stats")?;

    println!("Labeled corpus:");
    println!("  Binaries in manifest: {}", ctx.metadata.len());
    println!("  Functions stored: {stored}");
    println!("  Corpus: {} functions across {} binaries", stats.functions, stats.binaries);
    for (algorithm, count) in &stats.by_algorithm {
        println!("  - {algorithm}: {count}");
    }
    println!("  DB: {}", ctx.layout.corpus_db_path.display());

    Ok(())
}

/// List labeled functions stored for a dataset.
pub fn list_functions_command(output: &str, json: bool) -> Result<()> {
    let layout = dataset_layout(output)?;
    let db = open_corpus_db(&layout)?;
    let functions = db.list_labeled_functions(None).context("Failed to list labeled functions")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&functions)?);
        return Ok(());
    }

    println!("Labeled functions ({}):", functions.len());
    if functions.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for f in &functions {
        println!(
            "  - {} {} @ 0x{:x} size={} [{}]",
            f.function.binary_path.display(),
            f.function.name,
            f.function.address,
            size_display(f.function.size),
            f.label.algorithm
        );
    }

    Ok(())
}
