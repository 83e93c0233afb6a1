//! GCC/Clang command lines.

use std::path::PathBuf;

use crate::builder::errors::{Result, ToolchainError};

use super::{link_args, path_args, preprocessor_args, BuildMode, CommandSpec, Toolchain, VersionInfo};

/// Assemble a gcc-style invocation. nvcc accepts the same dialect.
pub(super) fn command_line(toolchain: &Toolchain, files: &[PathBuf], mode: BuildMode) -> CommandSpec {
    let mut cmd = CommandSpec::new(toolchain.compiler());

    // Compile flags
    cmd = cmd.args(toolchain.compile_flags().iter().cloned());

    // Compile only, or link options
    cmd = match mode {
        BuildMode::Object => cmd.arg("-c"),
        BuildMode::Link => cmd.args(toolchain.link_flags().iter().cloned()),
    };

    // Defines, undefines, include directories
    cmd = cmd.args(preprocessor_args(toolchain));

    // Inputs
    cmd = cmd.args(path_args(files));

    // Library directories and libraries
    if mode == BuildMode::Link {
        cmd = cmd.args(link_args(toolchain));
    }

    cmd
}

/// `-M` scan printing make-style dependency rules on stdout.
pub(super) fn dependency_command(toolchain: &Toolchain, files: &[PathBuf]) -> CommandSpec {
    CommandSpec::new(toolchain.compiler())
        .arg("-M")
        .args(preprocessor_args(toolchain))
        .args(toolchain.compile_flags().iter().cloned())
        .args(path_args(files))
}

/// Version from the third token of the first line, e.g.
/// `gcc (GCC) 11.2.0`.
pub(super) fn parse_version(text: &str) -> Result<VersionInfo> {
    let token = text
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(2))
        .ok_or_else(|| {
            ToolchainError::Configuration(format!(
                "unrecognized compiler version output: {:?}",
                text.lines().next().unwrap_or_default()
            ))
        })?;

    Ok(VersionInfo::parse(token))
}
