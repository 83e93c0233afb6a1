//! Toolchain error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the builder.
pub type Result<T, E = ToolchainError> = std::result::Result<T, E>;

/// Error raised by toolchain discovery, command synthesis or execution.
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// The default toolchain could not be determined.
    #[error("could not determine a default toolchain: {message}")]
    Discovery { message: String },

    /// A build, link or dependency-scan subprocess failed.
    #[error("compiler invocation failed: `{command}`{}", format_stderr(.stderr))]
    Compile {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// Inputs or compiler output that cannot be reconciled with the toolchain.
    #[error("invalid toolchain configuration: {0}")]
    Configuration(String),

    /// `--version` (or another probe) exited unsuccessfully.
    #[error("version query failed: `{command}`{}", format_stderr(.stderr))]
    VersionQuery { command: String, stderr: String },

    /// The executable could not be started at all.
    #[error("failed to spawn `{}`", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scratch file or configuration I/O failed.
    #[error("I/O error on `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ToolchainError {
    pub(crate) fn discovery(message: impl Into<String>) -> Self {
        ToolchainError::Discovery {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ToolchainError::Io {
            path: path.into(),
            source,
        }
    }

    /// The failing command line, if this error came from a subprocess.
    pub fn command(&self) -> Option<&str> {
        match self {
            ToolchainError::Compile { command, .. }
            | ToolchainError::VersionQuery { command, .. } => Some(command),
            _ => None,
        }
    }

    /// Captured stderr of the failing subprocess, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ToolchainError::Compile { stderr, .. }
            | ToolchainError::VersionQuery { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{}", trimmed)
    }
}
