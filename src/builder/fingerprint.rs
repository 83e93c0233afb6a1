//! ABI fingerprints for caching built extensions.
//!
//! A fingerprint captures everything about a toolchain that could change
//! the generated code: the compiler's self-reported version, the host
//! runtime version and the complete baseline command line. Two toolchains
//! whose fingerprints match produce interchangeable extensions.

use serde::{Deserialize, Serialize};

use crate::builder::errors::Result;
use crate::builder::toolchain::{BuildMode, Toolchain};
use crate::util::hash::Fingerprint as HashFingerprint;
use crate::util::process::CommandRunner;

/// Identity of a toolchain for cache invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbiFingerprint {
    /// Backend name
    pub backend: String,

    /// Raw `--version` output of the primary compiler
    pub compiler_version: String,

    /// Host runtime the extension is built for
    pub host_version: String,

    /// Link command line with no input files
    pub baseline_command: Vec<String>,

    /// Secondary (C++) compiler, if any
    pub secondary_compiler: Option<String>,

    /// Secondary compiler flags, if any
    pub secondary_flags: Option<Vec<String>>,

    /// Linker, if distinct from the compiler driver
    pub linker: Option<String>,
}

impl AbiFingerprint {
    /// Stable SHA-256 hex key over every component.
    pub fn digest(&self) -> String {
        let mut fp = HashFingerprint::new();
        fp.update_str(&self.backend)
            .update_str(&self.compiler_version)
            .update_str(&self.host_version)
            .update_strs(self.baseline_command.iter().map(String::as_str))
            .update_opt(self.secondary_compiler.as_deref())
            .update_opt(self.linker.as_deref());

        match &self.secondary_flags {
            Some(flags) => {
                fp.update_str("secondary-flags");
                fp.update_strs(flags.iter().map(String::as_str));
            }
            None => {
                fp.update_opt(None);
            }
        }

        fp.finish()
    }
}

impl Toolchain {
    /// Fingerprint this toolchain. Queries the compiler version.
    ///
    /// Enabled feature names do not participate; the flags and paths a
    /// feature contributes already appear in the baseline command.
    pub fn abi_fingerprint(&self, runner: &dyn CommandRunner) -> Result<AbiFingerprint> {
        let compiler_version = self.get_version(runner)?;
        let baseline_command = self.command_line(&[], BuildMode::Link)?.argv();

        Ok(AbiFingerprint {
            backend: self.backend().as_str().to_string(),
            compiler_version,
            host_version: self.host_version().to_string(),
            baseline_command,
            secondary_compiler: self
                .secondary_compiler()
                .map(|p| p.display().to_string()),
            secondary_flags: self.secondary_compile_flags().map(<[String]>::to_vec),
            linker: self.linker().map(|p| p.display().to_string()),
        })
    }
}
