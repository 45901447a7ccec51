mod common;

use common::StaticProbe;
use corpus_core::services::toolchain::{
    catalog_profile, ToolchainError, ToolchainRegistry, ARCHITECTURES,
};

#[test]
fn registry_lists_available_architectures_in_catalog_order() {
    let registry =
        ToolchainRegistry::with_probe(&StaticProbe::only(&["riscv", "x86-64", "arm"])).unwrap();
    assert_eq!(registry.available_architectures(), vec!["x86-64", "arm", "riscv"]);
    assert!(registry.is_available("arm"));
    assert!(!registry.is_available("mips"));
}

#[test]
fn registry_with_no_toolchains_is_an_error() {
    let err = ToolchainRegistry::with_probe(&StaticProbe::only(&[])).unwrap_err();
    assert!(matches!(err, ToolchainError::NoToolchains));
}

#[test]
fn profile_lookup_only_returns_available_targets() {
    let registry = ToolchainRegistry::with_probe(&StaticProbe::only(&["aarch64"])).unwrap();
    let profile = registry.profile("aarch64").expect("aarch64 available");
    assert_eq!(profile.compiler_binary, "aarch64-linux-gnu-gcc");
    assert!(registry.profile("x86").is_none());
    assert!(registry.profile("sparc").is_none());
    assert!(catalog_profile("x86").is_some(), "catalog lookup ignores availability");
}

#[test]
fn catalog_ids_are_unique_and_separator_free() {
    let mut ids: Vec<&str> = ARCHITECTURES.iter().map(|p| p.id).collect();
    assert!(ids.iter().all(|id| !id.contains('_')), "ids end up in underscore-joined filenames");
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), ARCHITECTURES.len());
}
