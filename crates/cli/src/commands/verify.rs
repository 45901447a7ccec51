use anyhow::{anyhow, Result};
use corpus_core::db::load_metadata;
use corpus_core::services::dataset::verify_metadata;

use crate::commands::dataset_layout;

/// Check a dataset's binaries against the manifest. Fails when anything is off.
pub fn verify_command(output: &str, json: bool) -> Result<()> {
    let layout = dataset_layout(output)?;
    let metadata = load_metadata(&layout)?;
    let report = verify_metadata(&metadata);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Verified {} binaries:", report.checked);
        println!("  Missing: {}", report.missing.len());
        for path in &report.missing {
            println!("  - missing {}", path.display());
        }
        println!("  Mismatched: {}", report.mismatched.len());
        for path in &report.mismatched {
            println!("  - mismatched {}", path.display());
        }
    }

    if !report.is_ok() {
        return Err(anyhow!(
            "{} of {} binaries failed verification",
            report.missing.len() + report.mismatched.len(),
            report.checked
        ));
    }
    Ok(())
}
