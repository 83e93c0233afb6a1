//! Command implementations

pub mod build;
pub mod deps;
pub mod show;

use anyhow::{Context, Result};

use crate::cli::{BackendArg, ToolchainOpts};
use extbuild::builder::toolchain::{discover_cuda_toolchain, discover_default_toolchain};
use extbuild::builder::{Backend, IspcBuilder, Toolchain};
use extbuild::CommandRunner;

/// Build the toolchain selected on the command line.
///
/// With `--cc` the toolchain is assembled by hand; otherwise it is
/// discovered from the host build configuration. Include directories,
/// defines and flags from the command line are added either way.
pub fn resolve_toolchain(opts: &ToolchainOpts, runner: &dyn CommandRunner) -> Result<Toolchain> {
    let base = match (opts.backend, &opts.cc) {
        (BackendArg::Gcc, Some(cc)) => Toolchain::builder(Backend::Gcc, cc)
            .compile_flags(["-fPIC"])
            .link_flags(["-shared"])
            .build(),
        (BackendArg::Gcc, None) => {
            discover_default_toolchain(runner).context("failed to discover host toolchain")?
        }
        (BackendArg::Nvcc, Some(cc)) => Toolchain::builder(Backend::Nvcc, cc)
            .compile_flags(["-Xcompiler", "-fPIC"])
            .link_flags(["-shared"])
            .build(),
        (BackendArg::Nvcc, None) => {
            discover_cuda_toolchain(runner).context("failed to discover CUDA toolchain")?
        }
        (BackendArg::Ispc, cc) => {
            let mut builder = IspcBuilder::new();
            if let Some(cc) = cc {
                builder = builder.compiler(cc);
            }
            builder.build(runner).context("failed to set up ispc toolchain")?
        }
    };

    Ok(base
        .to_builder()
        .include_dirs(opts.include.iter().cloned())
        .defines(opts.define.iter().cloned())
        .compile_flags(opts.cflags.iter().cloned())
        .build())
}
