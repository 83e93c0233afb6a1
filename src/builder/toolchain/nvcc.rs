//! CUDA compiler driver support.
//!
//! nvcc takes the gcc command-line dialect, so commands come from the GCC
//! backend. Only its version banner and failure reporting differ.

use crate::builder::errors::{Result, ToolchainError};

use super::VersionInfo;

/// Version from the `Cuda compilation tools, release 12.1, V12.1.66` line.
///
/// The release and build tokens are read as one dotted sequence, so the
/// result stops at the first component that is not a number.
pub(super) fn parse_version(text: &str) -> Result<VersionInfo> {
    let line = text.lines().nth(3).ok_or_else(|| {
        ToolchainError::Configuration(format!(
            "nvcc version output has no release line: {:?}",
            text
        ))
    })?;

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 6 {
        return Err(ToolchainError::Configuration(format!(
            "unrecognized nvcc release line: {:?}",
            line
        )));
    }

    let components = tokens[4..6]
        .iter()
        .flat_map(|token| token.trim_matches(',').split('.'));

    Ok(VersionInfo::from_components(components))
}

/// nvcc sometimes exits with status 0 after reporting an error, so any
/// stderr mentioning "error" counts as a failed build.
pub(super) fn stderr_reports_error(stderr: &str) -> bool {
    stderr.contains("error")
}
