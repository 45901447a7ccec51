use anyhow::Result;
use corpus_core::model::{Label, LabeledFunction};
use corpus_core::services::extract::FunctionExtractor;
use corpus_core::services::labeler::AutoLabeler;
use serde::Serialize;

use crate::commands::{enclosing_manifest, resolve_binary, size_display};

/// Print the functions recovered from one binary.
pub fn extract_functions_command(binary: &str, json: bool) -> Result<()> {
    let path = resolve_binary(binary)?;
    let extractor = FunctionExtractor::new();
    let functions = extractor.extract(&path);

    if json {
        println!("{}", serde_json::to_string_pretty(&functions)?);
        return Ok(());
    }

    println!("Functions ({}) in {}:", functions.len(), path.display());
    if functions.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for func in &functions {
        println!(
            "  - {} @ 0x{:x} size={} [{}]",
            func.name,
            func.address,
            size_display(func.size),
            func.provenance.as_str()
        );
    }

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct BinaryLabelReport {
    pub binary: String,
    pub label: Label,
    pub functions: Vec<LabeledFunction>,
}

/// Label one binary and list its labeled functions.
///
/// Provenance comes from the enclosing dataset's manifest when there is one, else from
/// the file name.
pub fn label_command(binary: &str, json: bool) -> Result<()> {
    let path = resolve_binary(binary)?;
    let extractor = FunctionExtractor::new();
    let labeler = match enclosing_manifest(&path) {
        Some(metadata) => AutoLabeler::with_manifest(&metadata),
        None => AutoLabeler::new(),
    };

    let functions = extractor.extract(&path);
    let report = BinaryLabelReport {
        binary: path.display().to_string(),
        label: labeler.label_for(&path),
        functions: labeler.label_batch(&path, &functions),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let label = &report.label;
    println!("Label for {}:", report.binary);
    println!("  Algorithm: {}", label.algorithm);
    println!("  Crypto: {}", if label.is_crypto { "yes" } else { "no" });
    println!("  Library: {}", label.library.as_deref().unwrap_or("-"));
    println!("  Function: {}", label.function_name.as_deref().unwrap_or("-"));
    println!("  Architecture: {}", label.architecture.as_deref().unwrap_or("-"));
    println!("  Optimization: {}", label.optimization.as_deref().unwrap_or("-"));
    println!("  Functions: {}", report.functions.len());

    Ok(())
}
