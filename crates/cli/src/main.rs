use anyhow::Result;
use clap::{Parser, Subcommand};
use crypto_corpus::commands::{
    build_dataset_command, extract_functions_command, label_command, label_corpus_command,
    list_functions_command, toolchains_command, verify_command,
};
use crypto_corpus::init_logging;

/// Labeled cross-architecture binary corpus builder.
///
/// This CLI is a thin wrapper around `corpus-core` (exposed in code as `corpus_core`).
/// All substantive logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "crypto-corpus",
    version,
    about = "Build labeled crypto-function binary corpora",
    long_about = None
)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List supported architectures and whether their cross-compiler is installed.
    Toolchains {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Acquire sources and compile every library across the architecture/optimization matrix.
    ///
    /// This will:
    /// - Download or reuse each library's source tree under `<output>/sources`.
    /// - Write binaries to `<output>/binaries/<library>/`.
    /// - Write `<output>/compilation_metadata.json` and record the run in `<output>/corpus.db`.
    BuildDataset {
        /// Dataset config file (YAML, or JSON with a `.json` extension).
        #[arg(long)]
        config: String,

        /// Dataset output root.
        #[arg(long)]
        output: String,

        /// Also extract and label every built binary into the corpus database.
        #[arg(long, default_value_t = false)]
        label: bool,
    },

    /// Recover function boundaries from one binary.
    ExtractFunctions {
        /// Path to the binary.
        #[arg(long)]
        binary: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Label the functions of one binary from its dataset manifest or file name.
    Label {
        /// Path to a corpus binary (`{library}_{function}_{arch}_{opt}.bin`).
        #[arg(long)]
        binary: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Extract and label every binary of an existing dataset into its corpus database.
    LabelCorpus {
        /// Dataset output root.
        #[arg(long)]
        output: String,
    },

    /// Check that every binary in the manifest exists and matches its recorded MD5.
    Verify {
        /// Dataset output root.
        #[arg(long)]
        output: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List labeled functions stored in a dataset's corpus database.
    ListFunctions {
        /// Dataset output root.
        #[arg(long)]
        output: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Toolchains { json } => toolchains_command(json)?,
        Command::BuildDataset { config, output, label } => {
            build_dataset_command(&config, &output, label)?
        }
        Command::ExtractFunctions { binary, json } => extract_functions_command(&binary, json)?,
        Command::Label { binary, json } => label_command(&binary, json)?,
        Command::LabelCorpus { output } => label_corpus_command(&output)?,
        Command::Verify { output, json } => verify_command(&output, json)?,
        Command::ListFunctions { output, json } => list_functions_command(&output, json)?,
    }

    Ok(())
}
