use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::model::{CellKey, CompilationUnit};
use crate::services::digest::md5_file;
use crate::services::process::{ProcessError, SystemRunner, ToolRunner};
use crate::services::toolchain::{ArchitectureProfile, ToolchainRegistry};

/// Optimization levels compiled for every architecture by default.
pub const OPTIMIZATION_LEVELS: &[&str] = &["-O0", "-O1", "-O2", "-O3", "-Os"];

/// Compilers the matrix knows how to drive.
pub const COMPILERS: &[&str] = &["gcc", "clang"];

pub const DEFAULT_COMPILER: &str = "gcc";

/// Hard wall-clock limit for one compiler invocation.
pub const COMPILE_TIMEOUT: Duration = Duration::from_secs(300);

/// Architectures clang can target from its host driver with `--target=`.
const CLANG_TARGETS: &[&str] = &["x86", "x86-64"];

/// Receives completion events from the matrix. Called from worker threads.
pub trait ProgressObserver: Send + Sync {
    fn cell_finished(&self, completed: usize, total: usize);
}

/// Observer that ignores progress.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn cell_finished(&self, _completed: usize, _total: usize) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixOptions {
    pub optimization_levels: Vec<String>,
    pub compiler: String,
    /// Worker threads for the cell fan-out; `0` lets rayon pick.
    pub jobs: usize,
    pub timeout: Duration,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        Self {
            optimization_levels: OPTIMIZATION_LEVELS.iter().map(|s| s.to_string()).collect(),
            compiler: DEFAULT_COMPILER.to_string(),
            jobs: 0,
            timeout: COMPILE_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("Failed to create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to start compile workers: {0}")]
    Workers(String),
}

/// Outcome of one library's matrix run.
#[derive(Debug, Clone, Default)]
pub struct MatrixReport {
    pub library: String,
    pub units: BTreeMap<CellKey, CompilationUnit>,
    /// Every cell of the matrix, whether or not its source was found.
    pub attempted: usize,
    /// Cells whose compile failed, timed out, or could not be hashed.
    pub failed: usize,
    /// Cells skipped because the function's source file was not found.
    pub skipped_missing_source: usize,
}

impl MatrixReport {
    pub fn succeeded(&self) -> usize {
        self.units.len()
    }

    pub fn total(&self) -> usize {
        self.attempted
    }
}

enum CellOutcome {
    Built(Box<CompilationUnit>),
    Failed,
    MissingSource,
}

/// Compiles library functions across the (architecture x optimization) matrix.
pub struct BuildMatrixCompiler {
    registry: ToolchainRegistry,
    runner: Arc<dyn ToolRunner>,
    options: MatrixOptions,
}

impl BuildMatrixCompiler {
    pub fn new(registry: ToolchainRegistry) -> Self {
        Self::with_runner(registry, SystemRunner)
    }

    pub fn with_runner<R: ToolRunner + 'static>(registry: ToolchainRegistry, runner: R) -> Self {
        Self { registry, runner: Arc::new(runner), options: MatrixOptions::default() }
    }

    pub fn with_options(mut self, options: MatrixOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &ToolchainRegistry {
        &self.registry
    }

    pub fn options(&self) -> &MatrixOptions {
        &self.options
    }

    /// Compile one source file. Never panics or errors; failures are logged and
    /// reported as `false`. Unavailable architectures are rejected before any spawn.
    pub fn compile_one(
        &self,
        source_file: &Path,
        output_file: &Path,
        architecture: &str,
        optimization: &str,
        compiler: &str,
        extra_flags: &[String],
    ) -> bool {
        let Some(profile) = self.registry.profile(architecture) else {
            error!("Architecture {architecture} not available");
            return false;
        };

        let (program, args) =
            compile_command(profile, optimization, compiler, source_file, output_file, extra_flags);

        match self.runner.run(&program, &args, self.options.timeout) {
            Ok(output) if output.success => {
                debug!("Compiled: {}", output_file.display());
                true
            }
            Ok(output) => {
                error!("Compilation failed for {}: {}", output_file.display(), output.stderr.trim());
                false
            }
            Err(ProcessError::Timeout { .. }) => {
                error!("Compilation timeout: {}", source_file.display());
                false
            }
            Err(err) => {
                error!("Compilation error: {err}");
                false
            }
        }
    }

    /// Attempt every (available architecture x optimization x function) cell for one
    /// library. Individual cell failures are counted, never raised.
    pub fn compile_matrix(
        &self,
        library_name: &str,
        source_dir: &Path,
        function_names: &[String],
        output_dir: &Path,
        observer: &dyn ProgressObserver,
    ) -> Result<MatrixReport, MatrixError> {
        fs::create_dir_all(output_dir)
            .map_err(|source| MatrixError::OutputDir { path: output_dir.to_path_buf(), source })?;

        // Repeated names would map two cells onto one output file.
        let functions = unique_in_order(function_names);
        let levels = unique_in_order(&self.options.optimization_levels);
        if functions.len() != function_names.len()
            || levels.len() != self.options.optimization_levels.len()
        {
            warn!("Ignoring duplicate functions or optimization levels for {library_name}");
        }

        let sources: BTreeMap<&str, Option<PathBuf>> = functions
            .iter()
            .map(|name| (*name, find_source_file(source_dir, name)))
            .collect();

        let mut cells = Vec::new();
        for arch in self.registry.available_architectures() {
            for opt in &levels {
                for func in &functions {
                    cells.push(CellKey::new(arch, *opt, *func));
                }
            }
        }

        let total = cells.len();
        info!("Compiling {library_name}: {total} total compilations");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs)
            .build()
            .map_err(|e| MatrixError::Workers(e.to_string()))?;

        let completed = AtomicUsize::new(0);
        let outcomes: Vec<(CellKey, CellOutcome)> = pool.install(|| {
            cells
                .into_par_iter()
                .map(|cell| {
                    let source = sources.get(cell.function.as_str()).cloned().flatten();
                    let outcome = self.build_cell(library_name, &cell, source, output_dir);
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    observer.cell_finished(done, total);
                    (cell, outcome)
                })
                .collect()
        });

        let mut report = MatrixReport {
            library: library_name.to_string(),
            attempted: total,
            ..MatrixReport::default()
        };
        for (cell, outcome) in outcomes {
            match outcome {
                CellOutcome::Built(unit) => {
                    report.units.insert(cell, *unit);
                }
                CellOutcome::Failed => report.failed += 1,
                CellOutcome::MissingSource => report.skipped_missing_source += 1,
            }
        }

        info!(
            "Compiled {}/{} successfully ({} failed, {} missing source)",
            report.succeeded(),
            report.attempted,
            report.failed,
            report.skipped_missing_source
        );
        Ok(report)
    }

    fn build_cell(
        &self,
        library: &str,
        cell: &CellKey,
        source: Option<PathBuf>,
        output_dir: &Path,
    ) -> CellOutcome {
        let Some(source_path) = source else {
            warn!("Source not found for {}", cell.function);
            return CellOutcome::MissingSource;
        };

        let binary_path = output_dir.join(output_file_name(
            library,
            &cell.function,
            &cell.architecture,
            &cell.optimization,
        ));

        if !self.compile_one(
            &source_path,
            &binary_path,
            &cell.architecture,
            &cell.optimization,
            &self.options.compiler,
            &[],
        ) {
            return CellOutcome::Failed;
        }

        let size = match fs::metadata(&binary_path) {
            Ok(meta) => meta.len(),
            Err(err) => {
                error!("Compiled artifact missing at {}: {err}", binary_path.display());
                return CellOutcome::Failed;
            }
        };
        let md5 = match md5_file(&binary_path) {
            Ok(digest) => digest,
            Err(err) => {
                error!("Failed to hash {}: {err}", binary_path.display());
                return CellOutcome::Failed;
            }
        };

        CellOutcome::Built(Box::new(CompilationUnit {
            library: library.to_string(),
            function: cell.function.clone(),
            architecture: cell.architecture.clone(),
            optimization: cell.optimization.clone(),
            compiler: self.options.compiler.clone(),
            binary_path,
            source_path,
            size,
            md5,
        }))
    }
}

/// First occurrence of each entry, in input order.
fn unique_in_order(items: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    items.iter().map(String::as_str).filter(|item| seen.insert(*item)).collect()
}

/// Assemble the compiler executable and its argument list for one cell.
///
/// Order: optimization, arch flags, cross-target flag, `-static`,
/// `-fno-stack-protector`, `-o <output>`, source, extra flags. Empty tokens are dropped.
pub fn compile_command(
    profile: &ArchitectureProfile,
    optimization: &str,
    compiler: &str,
    source_file: &Path,
    output_file: &Path,
    extra_flags: &[String],
) -> (String, Vec<String>) {
    let (program, target_flag) = if compiler == "clang" && CLANG_TARGETS.contains(&profile.id) {
        ("clang".to_string(), format!("--target={}", profile.target_triplet))
    } else {
        (profile.compiler_binary.to_string(), String::new())
    };

    let mut flags = vec![optimization.to_string()];
    flags.extend(profile.arch_flags.iter().map(|f| f.to_string()));
    flags.push(target_flag);
    flags.push("-static".to_string());
    flags.push("-fno-stack-protector".to_string());
    flags.push("-o".to_string());
    flags.push(output_file.display().to_string());
    flags.push(source_file.display().to_string());
    flags.extend(extra_flags.iter().cloned());
    flags.retain(|f| !f.is_empty());

    (program, flags)
}

/// `{library}_{function}_{arch}_{opt}.bin`, with the leading dash of the optimization
/// level dropped and any `_` in the library name replaced by `-`.
pub fn output_file_name(library: &str, function: &str, arch: &str, optimization: &str) -> String {
    let opt = optimization_tag(optimization);
    format!("{}_{}_{}_{}.bin", library.replace('_', "-"), function, arch, opt)
}

/// Filename form of an optimization flag: `-O2` becomes `o2`, `-Os` becomes `os`.
pub fn optimization_tag(optimization: &str) -> String {
    optimization.replace('-', "").to_lowercase()
}

/// Inverse of [`optimization_tag`]: `o2` becomes `-O2`, `os` becomes `-Os`.
/// Tokens that are not an `o` tag are returned unchanged.
pub fn optimization_flag(tag: &str) -> String {
    match tag.strip_prefix('o').or_else(|| tag.strip_prefix('O')) {
        Some(level) if !level.is_empty() => format!("-O{level}"),
        _ => tag.to_string(),
    }
}

/// Locate the source file for a function.
///
/// Tiers, first hit wins: `<name>.c`, `<name>.cpp`, `*<name>*.c`, `*<name>*.cpp`.
/// Matches within a tier are sorted lexically so the choice does not depend on
/// directory traversal order.
pub fn find_source_file(source_dir: &Path, function_name: &str) -> Option<PathBuf> {
    let files: Vec<PathBuf> = WalkDir::new(source_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    let exact_c = format!("{function_name}.c");
    let exact_cpp = format!("{function_name}.cpp");
    let tiers: [&dyn Fn(&str) -> bool; 4] = [
        &|name: &str| name == exact_c,
        &|name: &str| name == exact_cpp,
        &|name: &str| name.contains(function_name) && name.ends_with(".c"),
        &|name: &str| name.contains(function_name) && name.ends_with(".cpp"),
    ];

    for matches_tier in tiers {
        let mut hits: Vec<&PathBuf> = files
            .iter()
            .filter(|path| {
                path.file_name().and_then(|n| n.to_str()).map(matches_tier).unwrap_or(false)
            })
            .collect();
        hits.sort();
        if let Some(first) = hits.first() {
            return Some((*first).clone());
        }
    }
    None
}
