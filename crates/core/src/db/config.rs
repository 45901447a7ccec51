use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::compiler::{
    MatrixOptions, COMPILERS, COMPILE_TIMEOUT, DEFAULT_COMPILER, OPTIMIZATION_LEVELS,
};
use crate::services::extract::SYMBOL_TIMEOUT;

/// Prefix for environment variables that override scalar config settings.
pub const ENV_PREFIX: &str = "CRYPTO_CORPUS_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config YAML at {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to parse config JSON at {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value {value:?} for {key}: {message}")]
    InvalidOverride { key: String, value: String, message: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// One crypto library to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Archive URL used on a source-cache miss.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Functions to compile; replaces the built-in catalog entry for this library.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<String>>,
}

impl LibraryConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), version: None, url: None, functions: None }
    }
}

/// Settings for one dataset build, read from YAML or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default)]
    pub crypto_libraries: Vec<LibraryConfig>,
    #[serde(default = "default_optimization_levels")]
    pub optimization_levels: Vec<String>,
    #[serde(default = "default_compiler")]
    pub compiler: String,
    /// Compile worker threads; `0` means one per CPU.
    #[serde(default)]
    pub jobs: usize,
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout_secs: u64,
    #[serde(default = "default_symbol_timeout")]
    pub symbol_timeout_secs: u64,
}

fn default_optimization_levels() -> Vec<String> {
    OPTIMIZATION_LEVELS.iter().map(|s| s.to_string()).collect()
}

fn default_compiler() -> String {
    DEFAULT_COMPILER.to_string()
}

fn default_compile_timeout() -> u64 {
    COMPILE_TIMEOUT.as_secs()
}

fn default_symbol_timeout() -> u64 {
    SYMBOL_TIMEOUT.as_secs()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            crypto_libraries: Vec::new(),
            optimization_levels: default_optimization_levels(),
            compiler: default_compiler(),
            jobs: 0,
            compile_timeout_secs: default_compile_timeout(),
            symbol_timeout_secs: default_symbol_timeout(),
        }
    }
}

impl DatasetConfig {
    /// Read a config file (JSON for `.json`, YAML otherwise), apply `CRYPTO_CORPUS_*`
    /// overrides from the process environment and validate the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without consulting the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let body = std::fs::read(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_slice(&body)
                .map_err(|source| ConfigError::Json { path: path.to_path_buf(), source })
        } else {
            serde_yaml::from_slice(&body)
                .map_err(|source| ConfigError::Yaml { path: path.to_path_buf(), source })
        }
    }

    /// Apply overrides looked up through `lookup`, keyed by full variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = var("JOBS") {
            self.jobs = parse_number(&key, &value)? as usize;
        }
        if let Some((_, value)) = var("COMPILER") {
            self.compiler = value.trim().to_string();
        }
        if let Some((key, value)) = var("COMPILE_TIMEOUT_SECS") {
            self.compile_timeout_secs = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = var("SYMBOL_TIMEOUT_SECS") {
            self.symbol_timeout_secs = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = var("OPTIMIZATION_LEVELS") {
            let levels: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|level| !level.is_empty())
                .map(str::to_string)
                .collect();
            if levels.is_empty() {
                return Err(ConfigError::InvalidOverride {
                    key,
                    value,
                    message: "expected a comma-separated list of levels".to_string(),
                });
            }
            self.optimization_levels = levels;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !COMPILERS.contains(&self.compiler.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unsupported compiler {:?}; expected one of {}",
                self.compiler,
                COMPILERS.join(", ")
            )));
        }
        if self.optimization_levels.is_empty() {
            return Err(ConfigError::Invalid("optimization_levels must not be empty".to_string()));
        }
        if let Some(level) = self.optimization_levels.iter().find(|l| !l.starts_with("-O")) {
            return Err(ConfigError::Invalid(format!("optimization level {level:?} is not a -O flag")));
        }
        if let Some(lib) = self.crypto_libraries.iter().find(|l| l.name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("library entry {lib:?} has no name")));
        }
        Ok(())
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn symbol_timeout(&self) -> Duration {
        Duration::from_secs(self.symbol_timeout_secs)
    }

    pub fn matrix_options(&self) -> MatrixOptions {
        MatrixOptions {
            optimization_levels: self.optimization_levels.clone(),
            compiler: self.compiler.clone(),
            jobs: self.jobs,
            timeout: self.compile_timeout(),
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidOverride {
        key: key.to_string(),
        value: value.to_string(),
        message: e.to_string(),
    })
}
