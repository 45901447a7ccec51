use thiserror::Error;
use tracing::{debug, info, warn};

/// Static description of one cross-compilation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitectureProfile {
    /// Stable key used in filenames and metadata (e.g. `aarch64`).
    pub id: &'static str,
    /// Compiler executable expected on `PATH`.
    pub compiler_binary: &'static str,
    pub arch_flags: &'static [&'static str],
    pub target_triplet: &'static str,
    pub description: &'static str,
}

/// Supported targets, in the order they are probed, listed and compiled.
pub const ARCHITECTURES: &[ArchitectureProfile] = &[
    ArchitectureProfile {
        id: "x86",
        compiler_binary: "gcc",
        arch_flags: &["-m32"],
        target_triplet: "i686-linux-gnu",
        description: "Intel x86 32-bit",
    },
    ArchitectureProfile {
        id: "x86-64",
        compiler_binary: "gcc",
        arch_flags: &["-m64"],
        target_triplet: "x86_64-linux-gnu",
        description: "Intel x86 64-bit",
    },
    ArchitectureProfile {
        id: "arm",
        compiler_binary: "arm-linux-gnueabi-gcc",
        arch_flags: &[],
        target_triplet: "arm-linux-gnueabi",
        description: "ARM 32-bit",
    },
    ArchitectureProfile {
        id: "aarch64",
        compiler_binary: "aarch64-linux-gnu-gcc",
        arch_flags: &[],
        target_triplet: "aarch64-linux-gnu",
        description: "ARM 64-bit (AArch64)",
    },
    ArchitectureProfile {
        id: "mips",
        compiler_binary: "mips-linux-gnu-gcc",
        arch_flags: &[],
        target_triplet: "mips-linux-gnu",
        description: "MIPS 32-bit",
    },
    ArchitectureProfile {
        id: "riscv",
        compiler_binary: "riscv64-linux-gnu-gcc",
        arch_flags: &[],
        target_triplet: "riscv64-linux-gnu",
        description: "RISC-V 64-bit",
    },
];

/// Look up a catalog profile by id, regardless of host availability.
pub fn catalog_profile(id: &str) -> Option<&'static ArchitectureProfile> {
    ARCHITECTURES.iter().find(|p| p.id == id)
}

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("No cross-compilers found; install at least one toolchain first")]
    NoToolchains,
}

/// Decides whether a profile is buildable on this host.
pub trait ToolProbe: Send + Sync {
    fn probe(&self, profile: &ArchitectureProfile) -> bool;
}

/// Probe that resolves the profile's compiler on `PATH`.
pub struct PathProbe;

impl ToolProbe for PathProbe {
    fn probe(&self, profile: &ArchitectureProfile) -> bool {
        which::which(profile.compiler_binary).is_ok()
    }
}

/// Architectures that are actually buildable, computed once at construction.
#[derive(Debug, Clone)]
pub struct ToolchainRegistry {
    available: Vec<&'static ArchitectureProfile>,
}

impl ToolchainRegistry {
    /// Probe the host `PATH` for every catalog compiler.
    pub fn detect() -> Result<Self, ToolchainError> {
        Self::with_probe(&PathProbe)
    }

    pub fn with_probe(probe: &dyn ToolProbe) -> Result<Self, ToolchainError> {
        let mut available = Vec::new();
        for profile in ARCHITECTURES {
            if probe.probe(profile) {
                debug!("{}: {} found", profile.id, profile.compiler_binary);
                available.push(profile);
            } else {
                warn!("{}: {} not found - skipping", profile.id, profile.compiler_binary);
            }
        }

        if available.is_empty() {
            return Err(ToolchainError::NoToolchains);
        }

        let ids: Vec<&str> = available.iter().map(|p| p.id).collect();
        info!("Available architectures: {}", ids.join(", "));
        Ok(Self { available })
    }

    /// Ids of buildable architectures, in catalog order.
    pub fn available_architectures(&self) -> Vec<&'static str> {
        self.available.iter().map(|p| p.id).collect()
    }

    pub fn is_available(&self, id: &str) -> bool {
        self.available.iter().any(|p| p.id == id)
    }

    /// Profile for an available architecture; `None` if unknown or not buildable here.
    pub fn profile(&self, id: &str) -> Option<&'static ArchitectureProfile> {
        self.available.iter().copied().find(|p| p.id == id)
    }

    pub fn profiles(&self) -> &[&'static ArchitectureProfile] {
        &self.available
    }
}
