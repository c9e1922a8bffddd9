use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cilfacade - facade synthesis and call-site rewriting for CIL modules
#[derive(Debug, Parser)]
#[command(name = "cilfacade", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate the facade module of a target program.
    Synthesize {
        /// Path to the target module image.
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Root namespace of the facade; also its assembly name.
        #[arg(value_name = "BASE_NAMESPACE")]
        base_namespace: String,

        /// Where the facade module image is written.
        #[arg(value_name = "OUT")]
        output: PathBuf,
    },

    /// Rewrite a module compiled against a facade so it calls the target directly.
    Rewrite {
        /// Path to the module image to rewrite.
        #[arg(value_name = "MODULE")]
        path: PathBuf,

        /// Path to the target module image.
        #[arg(short, long, value_name = "PATH")]
        target: PathBuf,

        /// Path to the facade module image.
        #[arg(short, long, value_name = "PATH")]
        facade: PathBuf,

        /// Output path (defaults to rewriting MODULE in place).
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,

        /// Rewrite types and methods on the calling thread only.
        #[arg(long)]
        serial: bool,
    },

    /// List the types and members of a module image.
    Info {
        /// Path to the module image.
        #[arg(value_name = "MODULE")]
        path: PathBuf,

        /// Also decode the symbol maps embedded in a facade module.
        #[arg(short, long)]
        maps: bool,
    },
}
