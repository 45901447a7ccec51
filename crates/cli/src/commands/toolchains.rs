use anyhow::Result;
use corpus_core::services::toolchain::{PathProbe, ToolProbe, ARCHITECTURES};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ToolchainInfo {
    pub id: &'static str,
    pub description: &'static str,
    pub compiler: &'static str,
    pub target_triplet: &'static str,
    pub available: bool,
}

/// Probe every known architecture without requiring any of them.
pub fn collect_toolchains(probe: &dyn ToolProbe) -> Vec<ToolchainInfo> {
    ARCHITECTURES
        .iter()
        .map(|profile| ToolchainInfo {
            id: profile.id,
            description: profile.description,
            compiler: profile.compiler_binary,
            target_triplet: profile.target_triplet,
            available: probe.probe(profile),
        })
        .collect()
}

pub fn toolchains_command(json: bool) -> Result<()> {
    let toolchains = collect_toolchains(&PathProbe);

    if json {
        println!("{}", serde_json::to_string_pretty(&toolchains)?);
        return Ok(());
    }

    let available = toolchains.iter().filter(|t| t.available).count();
    println!("Toolchains ({available}/{} available):", toolchains.len());
    for t in &toolchains {
        println!(
            "- {} ({}): {} [{}]",
            t.id,
            t.description,
            t.compiler,
            if t.available { "found" } else { "missing" }
        );
    }

    Ok(())
}
