use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Library {name} not found in the source cache and no URL provided")]
    MissingSource { name: String },
    #[error("Unsupported archive format: {0}")]
    UnsupportedArchive(String),
    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },
    #[error("Failed to extract {}: {message}", archive.display())]
    Extract { archive: PathBuf, message: String },
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> AcquireError + '_ {
    move |source| AcquireError::Io { path: path.to_path_buf(), source }
}

/// Streams a remote archive into a local file.
pub trait SourceFetcher: Send + Sync {
    /// Write the body behind `url` to `dest`, returning the number of bytes written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AcquireError>;
}

/// Blocking HTTP(S) fetcher; copies the response body straight to disk.
pub struct HttpFetcher;

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AcquireError> {
        let download_error =
            |message: String| AcquireError::Download { url: url.to_string(), message };

        let response = ureq::get(url).call().map_err(|e| download_error(e.to_string()))?;
        let mut reader = response.into_reader();
        let mut file = File::create(dest).map_err(io_error(dest))?;
        io::copy(&mut reader, &mut file).map_err(|e| download_error(e.to_string()))
    }
}

/// Archive formats accepted for library sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    /// Classify by file name; `None` for anything that is not a gzip tarball or zip.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if lower.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else {
            None
        }
    }

    pub fn extract(self, archive: &Path, dest: &Path) -> Result<(), AcquireError> {
        let extract_error =
            |message: String| AcquireError::Extract { archive: archive.to_path_buf(), message };
        let file = File::open(archive).map_err(io_error(archive))?;

        match self {
            ArchiveKind::TarGz => {
                let mut tarball = tar::Archive::new(GzDecoder::new(file));
                tarball.unpack(dest).map_err(|e| extract_error(e.to_string()))
            }
            ArchiveKind::Zip => {
                let mut zip =
                    zip::ZipArchive::new(file).map_err(|e| extract_error(e.to_string()))?;
                zip.extract(dest).map_err(|e| extract_error(e.to_string()))
            }
        }
    }
}

/// Last path segment of a URL, without query string or fragment.
pub fn archive_file_name(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url).trim_end_matches('/');
    match trimmed.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "download".to_string(),
    }
}

/// Downloads and caches crypto-library source trees keyed by (name, version).
///
/// A tree that already exists at its cache path is returned as-is; nothing here ever
/// deletes a cached tree. Concurrent callers asking for the same identity serialize on a
/// per-identity lock, so exactly one of them downloads.
pub struct SourceAcquirer {
    sources_dir: PathBuf,
    fetcher: Box<dyn SourceFetcher>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SourceAcquirer {
    pub fn new(sources_dir: impl Into<PathBuf>) -> Self {
        Self::with_fetcher(sources_dir, HttpFetcher)
    }

    pub fn with_fetcher<F: SourceFetcher + 'static>(
        sources_dir: impl Into<PathBuf>,
        fetcher: F,
    ) -> Self {
        Self {
            sources_dir: sources_dir.into(),
            fetcher: Box::new(fetcher),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn sources_dir(&self) -> &Path {
        &self.sources_dir
    }

    /// Cache path for an identity: `<sources>/<name>-<version>` or `<sources>/<name>`.
    pub fn cache_path(&self, name: &str, version: Option<&str>) -> PathBuf {
        match version {
            Some(v) => self.sources_dir.join(format!("{name}-{v}")),
            None => self.sources_dir.join(name),
        }
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.sources_dir.join(".downloads")
    }

    /// Return the source tree for `(name, version)`, downloading it on a cache miss.
    pub fn acquire(
        &self,
        name: &str,
        version: Option<&str>,
        url: Option<&str>,
    ) -> Result<PathBuf, AcquireError> {
        let lib_dir = self.cache_path(name, version);
        let identity_lock = self.identity_lock(&lib_dir);
        let _guard = identity_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if lib_dir.exists() {
            info!("Library {name} already available at {}", lib_dir.display());
            return Ok(lib_dir);
        }

        let url = url.ok_or_else(|| AcquireError::MissingSource { name: name.to_string() })?;
        let file_name = archive_file_name(url);
        let kind = ArchiveKind::from_file_name(&file_name)
            .ok_or_else(|| AcquireError::UnsupportedArchive(file_name.clone()))?;

        let downloads = self.downloads_dir();
        fs::create_dir_all(&downloads).map_err(io_error(&downloads))?;
        let archive_path = downloads.join(&file_name);

        info!("Downloading {name} from {url}");
        let bytes = self.fetcher.fetch(url, &archive_path)?;
        debug!("Downloaded {bytes} bytes to {}", archive_path.display());

        let staging = staging_path(&lib_dir);
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(io_error(&staging))?;
        }
        fs::create_dir_all(&staging).map_err(io_error(&staging))?;

        info!("Extracting {name}...");
        if let Err(err) = kind.extract(&archive_path, &staging) {
            error!("Extraction failed; archive kept at {}", archive_path.display());
            return Err(err);
        }
        promote(&staging, &lib_dir)?;

        fs::remove_file(&archive_path).map_err(io_error(&archive_path))?;
        info!("{name} ready at {}", lib_dir.display());
        Ok(lib_dir)
    }

    fn identity_lock(&self, lib_dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(lib_dir.to_string_lossy().into_owned()).or_default().clone()
    }
}

fn staging_path(lib_dir: &Path) -> PathBuf {
    let name = lib_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    lib_dir.with_file_name(format!(".staging-{name}"))
}

/// Move an extracted tree into its cache path.
///
/// Archives that wrap everything in a single top-level directory (the usual
/// `name-version/` layout) have that directory promoted; anything else keeps the
/// staging directory itself as the tree root.
fn promote(staging: &Path, lib_dir: &Path) -> Result<(), AcquireError> {
    let entries = fs::read_dir(staging)
        .map_err(io_error(staging))?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .collect::<Vec<_>>();

    match entries.as_slice() {
        [single] if single.is_dir() => {
            fs::rename(single, lib_dir).map_err(io_error(lib_dir))?;
            fs::remove_dir(staging).map_err(io_error(staging))
        }
        _ => fs::rename(staging, lib_dir).map_err(io_error(lib_dir)),
    }
}
