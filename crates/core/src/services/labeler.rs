use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::model::{ExtractedFunction, Label, LabeledFunction, Metadata, UNKNOWN_ALGORITHM};
use crate::services::compiler::optimization_flag;

/// Keyword -> algorithm taxonomy, searched in declaration order.
///
/// The first keyword contained in the lower-cased function name wins, so entries that are
/// substrings of others must come after them: `ecdsa` before `dsa`, `ecdh` before `dh`,
/// `sha384` before `sha3`, `3des`/`des3` before `des`. Key derivation and hash families
/// come ahead of the MAC keys so `hmac_sha256_init` resolves to SHA-256 and
/// `pbkdf2_hmac_sha1` to PBKDF2.
pub const ALGORITHM_CATALOG: &[(&str, &str)] = &[
    // key derivation
    ("pbkdf2", "PBKDF2"),
    ("hkdf", "HKDF"),
    ("scrypt", "Scrypt"),
    // asymmetric
    ("rsa", "RSA"),
    ("ecdsa", "ECDSA"),
    ("ecdh", "ECDH"),
    ("ecc", "ECC"),
    ("dsa", "DSA"),
    ("dh", "DH"),
    // hashes
    ("sha1", "SHA-1"),
    ("sha224", "SHA-224"),
    ("sha256", "SHA-256"),
    ("sha384", "SHA-384"),
    ("sha512", "SHA-512"),
    ("sha3", "SHA-3"),
    ("md5", "MD5"),
    ("blake", "BLAKE"),
    // MAC
    ("hmac", "HMAC"),
    ("cmac", "CMAC"),
    ("gmac", "GMAC"),
    // symmetric
    ("3des", "3DES"),
    ("des3", "3DES"),
    ("aes", "AES"),
    ("des", "DES"),
    ("chacha", "ChaCha20"),
    ("blowfish", "Blowfish"),
    ("twofish", "Twofish"),
];

/// Map a function name onto the taxonomy, or [`UNKNOWN_ALGORITHM`].
pub fn detect_algorithm(function_name: &str) -> &'static str {
    let lower = function_name.to_lowercase();
    ALGORITHM_CATALOG
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, algorithm)| *algorithm)
        .unwrap_or(UNKNOWN_ALGORITHM)
}

/// Build provenance recovered for one corpus binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryProvenance {
    pub library: String,
    pub function: String,
    pub architecture: String,
    pub optimization: String,
}

/// Parse `{library}_{function}_{arch}_{opt}.bin`.
///
/// Library is the first field and optimization the last, architecture the one before it;
/// everything in between is the function name with its own underscores restored. The
/// optimization tag is turned back into its flag (`o2` -> `-O2`) so labels agree with the
/// compilation unit. Names with fewer than four fields have no recoverable provenance.
pub fn parse_binary_name(binary: &Path) -> Option<BinaryProvenance> {
    let stem = binary.file_stem()?.to_str()?;
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 4 {
        return None;
    }
    let last = parts.len() - 1;
    Some(BinaryProvenance {
        library: parts[0].to_string(),
        function: parts[1..last - 1].join("_"),
        architecture: parts[last - 1].to_string(),
        optimization: optimization_flag(parts[last]),
    })
}

/// Attaches ground-truth labels to extracted functions.
///
/// Labels depend only on the binary's build provenance, never on the extracted symbol.
/// When a metadata manifest is supplied its record for a binary takes precedence over
/// filename parsing.
#[derive(Debug, Clone, Default)]
pub struct AutoLabeler {
    manifest: HashMap<PathBuf, BinaryProvenance>,
}

impl AutoLabeler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manifest(metadata: &Metadata) -> Self {
        let manifest = metadata
            .entries()
            .map(|(library, _, entry)| {
                (
                    entry.binary_path.clone(),
                    BinaryProvenance {
                        library: library.to_string(),
                        function: entry.function.clone(),
                        architecture: entry.architecture.clone(),
                        optimization: entry.optimization.clone(),
                    },
                )
            })
            .collect();
        Self { manifest }
    }

    pub fn provenance(&self, binary: &Path) -> Option<BinaryProvenance> {
        self.manifest.get(binary).cloned().or_else(|| parse_binary_name(binary))
    }

    pub fn label_for(&self, binary: &Path) -> Label {
        match self.provenance(binary) {
            Some(prov) => Label {
                algorithm: detect_algorithm(&prov.function).to_string(),
                library: Some(prov.library),
                architecture: Some(prov.architecture),
                optimization: Some(prov.optimization),
                function_name: Some(prov.function),
                is_crypto: true,
            },
            None => {
                debug!("No build provenance for {}", binary.display());
                Label::unknown()
            }
        }
    }

    pub fn label(&self, binary: &Path, function: &ExtractedFunction) -> LabeledFunction {
        LabeledFunction { function: function.clone(), label: self.label_for(binary) }
    }

    /// Label every function of one binary; the provenance lookup happens once.
    pub fn label_batch(
        &self,
        binary: &Path,
        functions: &[ExtractedFunction],
    ) -> Vec<LabeledFunction> {
        let label = self.label_for(binary);
        functions
            .iter()
            .map(|function| LabeledFunction { function: function.clone(), label: label.clone() })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underscored_function_names_survive_parsing() {
        let prov = parse_binary_name(Path::new("out/openssl_AES_set_encrypt_key_x86-64_o2.bin"))
            .expect("four or more fields");
        assert_eq!(prov.library, "openssl");
        assert_eq!(prov.function, "AES_set_encrypt_key");
        assert_eq!(prov.architecture, "x86-64");
        assert_eq!(prov.optimization, "-O2");
    }

    #[test]
    fn three_fields_is_not_enough() {
        assert!(parse_binary_name(Path::new("openssl_aes_x86.bin")).is_none());
    }

    #[test]
    fn catalog_has_no_unreachable_keywords() {
        for (i, (keyword, algorithm)) in ALGORITHM_CATALOG.iter().enumerate() {
            let shadowed_by = ALGORITHM_CATALOG[..i]
                .iter()
                .find(|(earlier, earlier_alg)| keyword.contains(earlier) && earlier_alg != algorithm);
            assert!(shadowed_by.is_none(), "{keyword} is shadowed by {shadowed_by:?}");
        }
    }
}
