use std::collections::HashMap;
use std::fs;

use corpus_core::db::{ConfigError, DatasetConfig, DatasetLayout};
use tempfile::tempdir;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> =
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| map.get(key).cloned()
}

#[test]
fn yaml_config_fills_in_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dataset.yaml");
    fs::write(
        &path,
        r#"
crypto_libraries:
  - name: openssl
    version: "3.0.0"
    url: https://example.invalid/openssl-3.0.0.tar.gz
  - name: tiny
    functions: [sha256_update]
"#,
    )
    .unwrap();

    let config = DatasetConfig::from_file(&path).unwrap();
    assert_eq!(config.crypto_libraries.len(), 2);
    assert_eq!(config.crypto_libraries[0].version.as_deref(), Some("3.0.0"));
    assert_eq!(config.crypto_libraries[1].functions.as_deref(), Some(&["sha256_update".to_string()][..]));
    assert_eq!(config.optimization_levels, vec!["-O0", "-O1", "-O2", "-O3", "-Os"]);
    assert_eq!(config.compiler, "gcc");
    assert_eq!(config.compile_timeout_secs, 300);
    assert_eq!(config.symbol_timeout_secs, 30);
    config.validate().unwrap();
}

#[test]
fn json_config_is_selected_by_extension() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dataset.json");
    fs::write(&path, r#"{"crypto_libraries":[{"name":"mbedtls"}],"compiler":"clang","jobs":3}"#)
        .unwrap();

    let config = DatasetConfig::from_file(&path).unwrap();
    assert_eq!(config.compiler, "clang");
    assert_eq!(config.matrix_options().jobs, 3);

    fs::write(&path, "crypto_libraries: []").unwrap();
    assert!(matches!(DatasetConfig::from_file(&path), Err(ConfigError::Json { .. })));
}

#[test]
fn environment_overrides_scalar_settings() {
    let mut config = DatasetConfig::default();
    config
        .apply_overrides(env(&[
            ("CRYPTO_CORPUS_JOBS", "8"),
            ("CRYPTO_CORPUS_COMPILER", "clang"),
            ("CRYPTO_CORPUS_COMPILE_TIMEOUT_SECS", "60"),
            ("CRYPTO_CORPUS_OPTIMIZATION_LEVELS", "-O0, -Os"),
        ]))
        .unwrap();
    assert_eq!(config.jobs, 8);
    assert_eq!(config.compiler, "clang");
    assert_eq!(config.compile_timeout().as_secs(), 60);
    assert_eq!(config.symbol_timeout().as_secs(), 30);
    assert_eq!(config.optimization_levels, vec!["-O0", "-Os"]);
}

#[test]
fn invalid_values_are_config_errors() {
    let mut config = DatasetConfig::default();
    let err = config.apply_overrides(env(&[("CRYPTO_CORPUS_JOBS", "many")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidOverride { ref key, .. } if key == "CRYPTO_CORPUS_JOBS"));

    let err = config
        .apply_overrides(env(&[("CRYPTO_CORPUS_OPTIMIZATION_LEVELS", " , ")]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidOverride { .. }));

    config.compiler = "icc".to_string();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

    let config = DatasetConfig { optimization_levels: vec!["O2".to_string()], ..Default::default() };
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = DatasetConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn layout_paths_are_derived_from_root() {
    let layout = DatasetLayout::new("/data/corpus");
    assert_eq!(layout.sources_dir, std::path::Path::new("/data/corpus/sources"));
    assert_eq!(layout.downloads_dir, std::path::Path::new("/data/corpus/sources/.downloads"));
    assert_eq!(
        layout.metadata_path,
        std::path::Path::new("/data/corpus/compilation_metadata.json")
    );
    assert_eq!(layout.corpus_db_path, std::path::Path::new("/data/corpus/corpus.db"));
    assert_eq!(
        layout.library_binaries_dir("openssl"),
        std::path::Path::new("/data/corpus/binaries/openssl")
    );
}
