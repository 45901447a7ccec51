use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::model::{ExtractedFunction, Provenance};
use crate::services::process::{SystemRunner, ToolRunner};

/// `push ebp; mov ebp, esp`, the classic 32-bit x86 frame setup.
pub const PROLOGUE_PATTERN: [u8; 3] = [0x55, 0x89, 0xe5];

/// Time allowed for one symbol-table dump.
pub const SYMBOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of authoritative function records for a binary.
pub trait SymbolReader: Send + Sync {
    /// `None` when the reader could not run (tool missing, unreadable input).
    /// `Some(vec![])` means the binary was read and has no function symbols.
    fn read_symbols(&self, binary: &Path) -> Option<Vec<ExtractedFunction>>;
    fn name(&self) -> &'static str;
}

/// Shells out to `readelf -s` and parses its symbol table listing.
pub struct ReadelfSymbolReader {
    runner: Arc<dyn ToolRunner>,
    program: String,
    timeout: Duration,
}

impl ReadelfSymbolReader {
    pub fn new() -> Self {
        Self::with_runner(SystemRunner)
    }

    pub fn with_runner<R: ToolRunner + 'static>(runner: R) -> Self {
        Self { runner: Arc::new(runner), program: resolve_readelf_path(), timeout: SYMBOL_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ReadelfSymbolReader {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_readelf_path() -> String {
    std::env::var("READELF_BIN").unwrap_or_else(|_| "readelf".to_string())
}

impl SymbolReader for ReadelfSymbolReader {
    fn read_symbols(&self, binary: &Path) -> Option<Vec<ExtractedFunction>> {
        // Without `-W` readelf truncates names longer than 21 columns to `prefix[...]`.
        let args = vec!["-s".to_string(), "-W".to_string(), binary.display().to_string()];
        match self.runner.run(&self.program, &args, self.timeout) {
            Ok(output) if output.success => Some(parse_readelf_symbols(&output.stdout, binary)),
            Ok(output) => {
                debug!("{} exited with {:?} for {}", self.program, output.exit_code, binary.display());
                None
            }
            Err(err) => {
                error!("Symbol extraction failed: {err}");
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "readelf"
    }
}

/// Parse `readelf -s` rows of type `FUNC`.
///
/// Columns: `Num: Value Size Type Bind Vis Ndx Name`. The value is hex, the size decimal
/// (or `0x`-prefixed hex for very large symbols). Malformed rows are skipped. Trailing
/// `(n)` version-index tokens are not names.
pub fn parse_readelf_symbols(stdout: &str, binary: &Path) -> Vec<ExtractedFunction> {
    let mut seen = HashSet::new();
    let mut functions = Vec::new();

    for line in stdout.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 || parts[3] != "FUNC" {
            continue;
        }
        let Ok(address) = u64::from_str_radix(parts[1], 16) else { continue };
        let Some(size) = parse_size(parts[2]) else { continue };
        let Some(name) = parts[7..].iter().rev().find(|t| !t.starts_with('(')) else {
            continue;
        };

        if seen.insert((address, name.to_string())) {
            functions.push(ExtractedFunction {
                binary_path: binary.to_path_buf(),
                address,
                size: Some(size),
                name: name.to_string(),
                provenance: Provenance::Symbol,
            });
        }
    }
    functions
}

fn parse_size(token: &str) -> Option<u64> {
    match token.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

/// In-process ELF symbol reader for hosts without binutils.
#[cfg(feature = "goblin-symbols")]
pub struct GoblinSymbolReader;

#[cfg(feature = "goblin-symbols")]
impl SymbolReader for GoblinSymbolReader {
    fn read_symbols(&self, binary: &Path) -> Option<Vec<ExtractedFunction>> {
        use goblin::elf::{section_header::SHN_UNDEF, Elf};

        let bytes = fs::read(binary).ok()?;
        let elf = match Elf::parse(&bytes) {
            Ok(elf) => elf,
            Err(err) => {
                debug!("{} is not a parseable ELF: {err}", binary.display());
                return None;
            }
        };

        let mut functions = Vec::new();
        for sym in elf.syms.iter() {
            if !sym.is_function() || sym.st_value == 0 || sym.st_shndx == SHN_UNDEF as usize {
                continue;
            }
            let name = elf.strtab.get_at(sym.st_name).unwrap_or("");
            if name.is_empty() {
                continue;
            }
            functions.push(ExtractedFunction {
                binary_path: binary.to_path_buf(),
                address: sym.st_value,
                size: Some(sym.st_size),
                name: name.to_string(),
                provenance: Provenance::Symbol,
            });
        }
        Some(functions)
    }

    fn name(&self) -> &'static str {
        "goblin"
    }
}

/// Every offset where the prologue pattern occurs, as size-unknown candidates.
///
/// This is a coverage floor for stripped binaries, not a disassembler: it only knows one
/// x86 calling convention, misses functions on other architectures and will report data
/// that happens to contain the same three bytes.
pub fn scan_prologues(data: &[u8], binary: &Path) -> Vec<ExtractedFunction> {
    data.windows(PROLOGUE_PATTERN.len())
        .enumerate()
        .filter(|(_, window)| *window == PROLOGUE_PATTERN)
        .map(|(offset, _)| ExtractedFunction {
            binary_path: binary.to_path_buf(),
            address: offset as u64,
            size: None,
            name: format!("sub_{offset:x}"),
            provenance: Provenance::Heuristic,
        })
        .collect()
}

/// Recovers functions from compiled binaries, best effort.
///
/// Symbol data is trusted exclusively when it yields anything; the prologue scan only
/// runs for stripped binaries or when the symbol reader is unavailable. Failures on
/// either path degrade to an empty list.
pub struct FunctionExtractor {
    symbols: Box<dyn SymbolReader>,
}

impl FunctionExtractor {
    pub fn new() -> Self {
        Self::with_reader(ReadelfSymbolReader::new())
    }

    pub fn with_reader<R: SymbolReader + 'static>(reader: R) -> Self {
        Self { symbols: Box::new(reader) }
    }

    pub fn extract(&self, binary: &Path) -> Vec<ExtractedFunction> {
        let symbol_functions = self.symbols.read_symbols(binary).unwrap_or_default();
        if !symbol_functions.is_empty() {
            debug!("Extracted {} functions from symbols", symbol_functions.len());
            return symbol_functions;
        }

        let heuristic = self.extract_heuristic(binary);
        debug!("Extracted {} functions using heuristics", heuristic.len());
        heuristic
    }

    fn extract_heuristic(&self, binary: &Path) -> Vec<ExtractedFunction> {
        match fs::read(binary) {
            Ok(data) => scan_prologues(&data, binary),
            Err(err) => {
                error!("Heuristic extraction failed for {}: {err}", binary.display());
                Vec::new()
            }
        }
    }
}

impl Default for FunctionExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READELF_SAMPLE: &str = r#"
Symbol table '.symtab' contains 5 entries:
   Num:    Value          Size Type    Bind   Vis      Ndx Name
     0: 0000000000000000     0 NOTYPE  LOCAL  DEFAULT  UND
     1: 0000000000000000     0 FILE    LOCAL  DEFAULT  ABS aes.c
     2: 0000000000401136    94 FUNC    GLOBAL DEFAULT    1 AES_encrypt
     3: 0000000000401194 0x1f40 FUNC    GLOBAL DEFAULT    1 big_table_fn
     4: 00000000004011a0    12 FUNC    GLOBAL DEFAULT  UND memcpy@GLIBC_2.14 (3)
     5: zzzz                 8 FUNC    GLOBAL DEFAULT    1 broken
     6: 0000000000401136    94 FUNC    GLOBAL DEFAULT    1 AES_encrypt
"#;

    #[test]
    fn parses_function_rows_only() {
        let funcs = parse_readelf_symbols(READELF_SAMPLE, Path::new("a.bin"));
        let names: Vec<&str> = funcs.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["AES_encrypt", "big_table_fn", "memcpy@GLIBC_2.14"]);
        assert_eq!(funcs[0].address, 0x401136);
        assert_eq!(funcs[0].size, Some(94));
        assert_eq!(funcs[1].size, Some(0x1f40));
        assert!(funcs.iter().all(|f| f.provenance == Provenance::Symbol));
    }

    #[test]
    fn long_names_from_wide_output_are_kept_whole() {
        let wide = "    12: 0000000000001139    31 FUNC    GLOBAL DEFAULT   14 crypto_secretbox_open_easy\n";
        let funcs = parse_readelf_symbols(wide, Path::new("libsodium.bin"));
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].name, "crypto_secretbox_open_easy");
        assert_eq!(funcs[0].size, Some(31));
    }

    #[test]
    fn prologue_scan_reports_every_match_with_unknown_size() {
        let data = [0x90, 0x55, 0x89, 0xe5, 0x00, 0x55, 0x89, 0xe5];
        let funcs = scan_prologues(&data, Path::new("stripped.bin"));
        assert_eq!(funcs.len(), 2);
        assert_eq!(funcs[0].address, 1);
        assert_eq!(funcs[0].name, "sub_1");
        assert_eq!(funcs[1].name, "sub_5");
        assert!(funcs.iter().all(|f| f.size.is_none()));
    }
}
