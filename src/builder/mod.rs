//! Compiler toolchains for extension builds.
//!
//! This module models toolchains, turns them into command lines, runs
//! those commands and fingerprints the result.

pub mod deps;
pub mod errors;
pub mod executor;
pub mod fingerprint;
pub mod toolchain;

pub use deps::{join_continued_lines, parse_dependency_output};
pub use errors::{Result, ToolchainError};
pub use executor::BuildExecutor;
pub use fingerprint::AbiFingerprint;
pub use toolchain::{
    discover_cuda_toolchain, discover_default_toolchain, Backend, BuildMode, CommandSpec,
    Feature, IspcBuilder, OptLevel, OptimizationOptions, Toolchain, ToolchainBuilder,
};
