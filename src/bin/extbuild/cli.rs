//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use extbuild::OptLevel;

/// extbuild - Build native extensions with the host toolchain
#[derive(Parser)]
#[command(name = "extbuild")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the discovered toolchain
    Show(ShowArgs),

    /// Print the header dependencies of source files
    Deps(DepsArgs),

    /// Compile or link source files
    Build(BuildArgs),
}

#[derive(Args)]
pub struct ShowArgs {
    /// Show the CUDA toolchain instead of the C/C++ one
    #[arg(long)]
    pub cuda: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Gcc,
    Nvcc,
    Ispc,
}

/// Options selecting and adjusting the toolchain.
#[derive(Args)]
pub struct ToolchainOpts {
    /// Compiler backend
    #[arg(long, value_enum, default_value = "gcc")]
    pub backend: BackendArg,

    /// Use this compiler instead of discovering one
    #[arg(long)]
    pub cc: Option<PathBuf>,

    /// Add a header search directory
    #[arg(short = 'I', value_name = "DIR")]
    pub include: Vec<PathBuf>,

    /// Define a macro (NAME or NAME=VALUE)
    #[arg(short = 'D', value_name = "NAME")]
    pub define: Vec<String>,

    /// Add a compile flag
    #[arg(long = "cflag", value_name = "FLAG", allow_hyphen_values = true)]
    pub cflags: Vec<String>,
}

#[derive(Args)]
pub struct DepsArgs {
    #[command(flatten)]
    pub toolchain: ToolchainOpts,

    /// Source files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct ModeArgs {
    /// Compile to an object file
    #[arg(long)]
    pub object: bool,

    /// Compile and link an extension
    #[arg(long)]
    pub extension: bool,

    /// Link object files into an extension
    #[arg(long)]
    pub link: bool,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub toolchain: ToolchainOpts,

    #[command(flatten)]
    pub mode: ModeArgs,

    /// Output path (the toolchain's suffix is added when it has none)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Optimization level (0-3 or "debug")
    #[arg(long, value_name = "LEVEL")]
    pub opt: Option<OptLevel>,

    /// Echo compiler commands to stderr
    #[arg(long)]
    pub debug: bool,

    /// Source or object files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}
