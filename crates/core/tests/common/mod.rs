//! Fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use corpus_core::model::{ExtractedFunction, Provenance};
use corpus_core::services::extract::SymbolReader;
use corpus_core::services::process::{ProcessError, ProcessOutput, ToolRunner};
use corpus_core::services::sources::{AcquireError, SourceFetcher};
use corpus_core::services::toolchain::{ArchitectureProfile, ToolProbe, ToolchainRegistry};
use object::write::{Object, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

/// Probe that reports a fixed set of architecture ids as installed.
pub struct StaticProbe(pub HashSet<&'static str>);

impl StaticProbe {
    pub fn only(ids: &[&'static str]) -> Self {
        Self(ids.iter().copied().collect())
    }
}

impl ToolProbe for StaticProbe {
    fn probe(&self, profile: &ArchitectureProfile) -> bool {
        self.0.contains(profile.id)
    }
}

pub fn registry(ids: &[&'static str]) -> ToolchainRegistry {
    ToolchainRegistry::with_probe(&StaticProbe::only(ids)).expect("at least one toolchain")
}

/// Minimal relocatable x86-64 ELF with one global function symbol.
///
/// The symbol sits 16 bytes into `.text` so its value is non-zero. The body starts
/// with `push ebp; mov ebp, esp` so the prologue scan would also fire.
pub fn elf_with_function(name: &str, extra: &[u8]) -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text_id = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    let mut code = vec![0x90u8; 16];
    code.extend_from_slice(&[0x55, 0x89, 0xe5, 0x5d, 0xc3]);
    obj.section_mut(text_id).set_data(code, 16);

    let data_id = obj.add_section(Vec::new(), b".rodata".to_vec(), SectionKind::ReadOnlyData);
    obj.section_mut(data_id).append_data(extra, 1);

    obj.add_symbol(Symbol {
        name: name.as_bytes().to_vec(),
        value: 16,
        size: 5,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(text_id),
        flags: SymbolFlags::Elf { st_info: 0x12, st_other: 0 },
    });
    obj.write().expect("write ELF fixture")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn output(&self) -> Option<&str> {
        let idx = self.args.iter().position(|a| a == "-o")?;
        self.args.get(idx + 1).map(String::as_str)
    }
}

/// Behaviour of the fake compiler for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOutcome {
    Succeed,
    Fail,
    Timeout,
}

/// Stands in for a cross compiler: records every call and writes an ELF object named
/// after the source file stem to the `-o` path.
#[derive(Clone)]
pub struct FakeCompiler {
    pub calls: Arc<Mutex<Vec<Invocation>>>,
    decide: Arc<dyn Fn(&Invocation) -> FakeOutcome + Send + Sync>,
}

impl FakeCompiler {
    pub fn succeeding() -> Self {
        Self::deciding(|_| FakeOutcome::Succeed)
    }

    pub fn deciding(decide: impl Fn(&Invocation) -> FakeOutcome + Send + Sync + 'static) -> Self {
        Self { calls: Arc::new(Mutex::new(Vec::new())), decide: Arc::new(decide) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

impl ToolRunner for FakeCompiler {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        let invocation = Invocation { program: program.to_string(), args: args.to_vec() };
        self.calls.lock().unwrap().push(invocation.clone());

        match (self.decide)(&invocation) {
            FakeOutcome::Timeout => {
                Err(ProcessError::Timeout { program: program.to_string(), timeout })
            }
            FakeOutcome::Fail => Ok(ProcessOutput {
                success: false,
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "fake: error: compilation failed".to_string(),
            }),
            FakeOutcome::Succeed => {
                let output = PathBuf::from(invocation.output().expect("-o flag"));
                let idx = args.iter().position(|a| a == "-o").unwrap();
                let source = PathBuf::from(&args[idx + 2]);
                let symbol = source.file_stem().unwrap().to_string_lossy().into_owned();
                let tag = args.join(" ");
                fs::write(&output, elf_with_function(&symbol, tag.as_bytes())).unwrap();
                Ok(ProcessOutput { success: true, exit_code: Some(0), ..Default::default() })
            }
        }
    }
}

/// Runner that answers every call with fixed stdout, for symbol-dump tests.
pub struct CannedRunner {
    pub stdout: String,
    pub success: bool,
    pub args: Arc<Mutex<Vec<String>>>,
}

impl CannedRunner {
    pub fn new(stdout: &str, success: bool) -> Self {
        Self { stdout: stdout.to_string(), success, args: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl ToolRunner for CannedRunner {
    fn run(
        &self,
        _program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        *self.args.lock().unwrap() = args.to_vec();
        Ok(ProcessOutput {
            success: self.success,
            exit_code: Some(if self.success { 0 } else { 1 }),
            stdout: self.stdout.clone(),
            stderr: String::new(),
        })
    }
}

/// Runner whose program can never be started.
pub struct MissingToolRunner;

impl ToolRunner for MissingToolRunner {
    fn run(
        &self,
        program: &str,
        _args: &[String],
        _timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        Err(ProcessError::Spawn {
            program: program.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
        })
    }
}

/// Fetcher that copies a local archive instead of going to the network.
#[derive(Clone)]
pub struct LocalFetcher {
    pub archive: PathBuf,
    pub fetches: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl LocalFetcher {
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self { archive: archive.into(), fetches: Arc::new(AtomicUsize::new(0)), delay: Duration::ZERO }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl SourceFetcher for LocalFetcher {
    fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, AcquireError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        fs::copy(&self.archive, dest)
            .map_err(|source| AcquireError::Io { path: dest.to_path_buf(), source })
    }
}

/// Fetcher for tests that must never reach the network.
pub struct NoNetwork;

impl SourceFetcher for NoNetwork {
    fn fetch(&self, url: &str, _dest: &Path) -> Result<u64, AcquireError> {
        Err(AcquireError::Download { url: url.to_string(), message: "offline".to_string() })
    }
}

/// Symbol reader returning a fixed answer.
pub struct FixedSymbols(pub Option<Vec<(u64, u64, &'static str)>>);

impl SymbolReader for FixedSymbols {
    fn read_symbols(&self, binary: &Path) -> Option<Vec<ExtractedFunction>> {
        self.0.as_ref().map(|syms| {
            syms.iter()
                .map(|(address, size, name)| ExtractedFunction {
                    binary_path: binary.to_path_buf(),
                    address: *address,
                    size: Some(*size),
                    name: name.to_string(),
                    provenance: Provenance::Symbol,
                })
                .collect()
        })
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub fn write_file(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}
