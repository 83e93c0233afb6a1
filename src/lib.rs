//! extbuild - Just-in-time native extension builds
//!
//! This crate discovers the host C/C++ toolchain from the interpreter's
//! build configuration, synthesizes compiler and linker command lines for
//! GCC/Clang, nvcc and ispc, scans header dependencies and fingerprints
//! toolchains so built extensions can be cached.

pub mod builder;
pub mod util;

/// Test utilities and mocks for extbuild unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a mock command runner and canned compiler
/// output.
#[cfg(test)]
pub mod test_support;

pub use builder::{
    discover_cuda_toolchain, discover_default_toolchain, AbiFingerprint, BuildExecutor,
    BuildMode, Feature, OptLevel, Toolchain, ToolchainError,
};
pub use util::process::{CommandRunner, SystemRunner};
