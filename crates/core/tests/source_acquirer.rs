mod common;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use common::{LocalFetcher, NoNetwork};
use corpus_core::services::sources::{archive_file_name, AcquireError, ArchiveKind, SourceAcquirer};
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::tempdir;

fn tar_gz(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, body) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, body.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn zip_file(path: &Path, entries: &[(&str, &str)]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, body) in entries {
        writer.start_file(*name, zip::write::SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn cached_tree_is_returned_without_fetching() {
    let temp = tempdir().unwrap();
    let sources = temp.path().join("sources");
    let cached = sources.join("openssl-3.0.0");
    fs::create_dir_all(&cached).unwrap();

    let fetcher = LocalFetcher::new(temp.path().join("nothing.tar.gz"));
    let acquirer = SourceAcquirer::with_fetcher(&sources, fetcher.clone());
    let path = acquirer
        .acquire("openssl", Some("3.0.0"), Some("https://example.invalid/openssl-3.0.0.tar.gz"))
        .unwrap();
    assert_eq!(path, cached);
    assert_eq!(fetcher.fetch_count(), 0);
}

#[test]
fn missing_url_on_cache_miss_is_an_error() {
    let temp = tempdir().unwrap();
    let acquirer = SourceAcquirer::with_fetcher(temp.path(), NoNetwork);
    let err = acquirer.acquire("mbedtls", None, None).unwrap_err();
    assert!(matches!(err, AcquireError::MissingSource { ref name } if name == "mbedtls"));
}

#[test]
fn unsupported_archive_is_rejected_before_download() {
    let temp = tempdir().unwrap();
    let fetcher = LocalFetcher::new(temp.path().join("unused"));
    let acquirer = SourceAcquirer::with_fetcher(temp.path().join("sources"), fetcher.clone());
    let err = acquirer
        .acquire("libsodium", None, Some("https://example.invalid/libsodium.tar.bz2"))
        .unwrap_err();
    assert!(matches!(err, AcquireError::UnsupportedArchive(_)));
    assert_eq!(fetcher.fetch_count(), 0);
}

#[test]
fn tarball_with_single_root_is_promoted_and_archive_removed() {
    let temp = tempdir().unwrap();
    let archive = temp.path().join("fixture.tar.gz");
    tar_gz(
        &archive,
        &[
            ("openssl-1.1/crypto/aes/AES_encrypt.c", "int AES_encrypt(void) { return 0; }"),
            ("openssl-1.1/README", "readme"),
        ],
    );

    let sources = temp.path().join("sources");
    let fetcher = LocalFetcher::new(&archive);
    let acquirer = SourceAcquirer::with_fetcher(&sources, fetcher.clone());
    let url = "https://example.invalid/releases/openssl-1.1.tar.gz?mirror=1";

    let path = acquirer.acquire("openssl", Some("1.1"), Some(url)).unwrap();
    assert_eq!(path, sources.join("openssl-1.1"));
    assert!(path.join("crypto/aes/AES_encrypt.c").is_file());
    assert!(!acquirer.downloads_dir().join("openssl-1.1.tar.gz").exists());

    let again = acquirer.acquire("openssl", Some("1.1"), Some(url)).unwrap();
    assert_eq!(again, path);
    assert_eq!(fetcher.fetch_count(), 1, "second acquire must hit the cache");
}

#[test]
fn zip_without_single_root_keeps_staging_as_tree() {
    let temp = tempdir().unwrap();
    let archive = temp.path().join("fixture.zip");
    zip_file(&archive, &[("sha256.c", "void sha256(void) {}"), ("md5.c", "void md5(void) {}")]);

    let sources = temp.path().join("sources");
    let acquirer = SourceAcquirer::with_fetcher(&sources, LocalFetcher::new(&archive));
    let path = acquirer
        .acquire("tinycrypt", None, Some("https://example.invalid/tinycrypt.zip"))
        .unwrap();
    assert_eq!(path, sources.join("tinycrypt"));
    assert!(path.join("sha256.c").is_file());
    assert!(path.join("md5.c").is_file());
}

#[test]
fn failed_extraction_keeps_archive_for_diagnosis() {
    let temp = tempdir().unwrap();
    let archive = temp.path().join("corrupt.tar.gz");
    fs::write(&archive, b"this is not gzip").unwrap();

    let sources = temp.path().join("sources");
    let acquirer = SourceAcquirer::with_fetcher(&sources, LocalFetcher::new(&archive));
    let err = acquirer
        .acquire("broken", None, Some("https://example.invalid/broken.tar.gz"))
        .unwrap_err();
    assert!(matches!(err, AcquireError::Extract { .. }), "got {err:?}");
    assert!(acquirer.downloads_dir().join("broken.tar.gz").is_file());
    assert!(!sources.join("broken").exists());
}

#[test]
fn concurrent_acquires_of_one_identity_download_once() {
    let temp = tempdir().unwrap();
    let archive = temp.path().join("fixture.tar.gz");
    tar_gz(&archive, &[("lib-2.0/aes.c", "void aes(void) {}")]);

    let mut fetcher = LocalFetcher::new(&archive);
    fetcher.delay = Duration::from_millis(50);
    let acquirer = SourceAcquirer::with_fetcher(temp.path().join("sources"), fetcher.clone());

    let paths: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    acquirer.acquire("lib", Some("2.0"), Some("https://example.invalid/lib-2.0.tgz"))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });

    assert_eq!(fetcher.fetch_count(), 1);
    assert!(paths.windows(2).all(|w| w[0] == w[1]));
    assert!(paths[0].join("aes.c").is_file());
}

#[test]
fn archive_names_come_from_the_url_path() {
    assert_eq!(archive_file_name("https://h/x/openssl-3.0.tar.gz?x=1#frag"), "openssl-3.0.tar.gz");
    assert_eq!(ArchiveKind::from_file_name("A.TGZ"), Some(ArchiveKind::TarGz));
    assert_eq!(ArchiveKind::from_file_name("a.zip"), Some(ArchiveKind::Zip));
    assert_eq!(ArchiveKind::from_file_name("a.gz"), None);
}
