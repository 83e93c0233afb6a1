//! Toolchain discovery from the host interpreter's build configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::builder::errors::{Result, ToolchainError};
use crate::util::config::{load_current_discovery_config, DiscoverySettings};
use crate::util::process::CommandRunner;
use crate::util::sysconfig::{locate_makefile, read_makefile};

use super::{Backend, CommandSpec, Toolchain};

/// Compiler families whose flags are compatible with the host build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerFamily {
    Gcc,
    AppleClang,
}

impl CompilerFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerFamily::Gcc => "gcc",
            CompilerFamily::AppleClang => "apple-clang",
        }
    }
}

/// Identify a compiler from its `--version` banner.
///
/// GCC prints its copyright holder; Apple's Clang names itself as
/// "Apple LLVM ... clang". Anything else is not trusted to accept the
/// host's flags.
pub fn identify_compiler(version_text: &str) -> Option<CompilerFamily> {
    if version_text.contains("Free Software Foundation") {
        Some(CompilerFamily::Gcc)
    } else if version_text.contains("Apple LLVM") && version_text.contains("clang") {
        Some(CompilerFamily::AppleClang)
    } else {
        None
    }
}

/// Build settings the host interpreter was compiled with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostBuildConfig {
    pub compiler: PathBuf,
    pub linker: PathBuf,
    pub compile_flags: Vec<String>,
    pub link_flags: Vec<String>,
    pub defines: Vec<String>,
    pub undefines: Vec<String>,
    pub libraries: Vec<String>,
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
    pub shared_object_suffix: String,
    pub object_suffix: String,
    pub host_version: String,
}

impl HostBuildConfig {
    /// Interpret evaluated Makefile variables.
    pub fn from_vars(vars: &BTreeMap<String, String>) -> Result<Self> {
        let require = |name: &str| {
            vars.get(name).map(String::as_str).ok_or_else(|| {
                ToolchainError::discovery(format!(
                    "host build configuration does not define {}",
                    name
                ))
            })
        };
        let optional = |name: &str| vars.get(name).map(String::as_str).unwrap_or_default();

        let cxx = require("CXX")?;
        let cflags = require("CFLAGS")?;
        let ldshared = require("LDSHARED")?;
        let include_dir = require("INCLUDEPY")?;
        let library_dir = require("LIBDIR")?;

        let mut cc_cmdline = cxx
            .split_whitespace()
            .chain(cflags.split_whitespace())
            .chain(optional("CFLAGSFORSHARED").split_whitespace());

        let compiler = cc_cmdline
            .next()
            .ok_or_else(|| ToolchainError::discovery("host build configuration has an empty CXX"))?;

        let mut config = HostBuildConfig {
            compiler: PathBuf::from(compiler),
            ..HostBuildConfig::default()
        };

        for flag in cc_cmdline {
            if let Some(name) = flag.strip_prefix("-D") {
                config.defines.push(name.to_string());
            } else if let Some(name) = flag.strip_prefix("-U") {
                config.undefines.push(name.to_string());
            } else {
                config.compile_flags.push(flag.to_string());
            }
        }

        for lib in optional("LIBS").split_whitespace() {
            match lib.strip_prefix("-l") {
                Some(name) => config.libraries.push(name.to_string()),
                None => config.compile_flags.push(lib.to_string()),
            }
        }

        let mut ld_cmdline = ldshared.split_whitespace();
        config.linker = ld_cmdline
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| ToolchainError::discovery("host build configuration has an empty LDSHARED"))?;
        config.link_flags = ld_cmdline
            .chain(optional("LINKFORSHARED").split_whitespace())
            .map(String::from)
            .collect();

        config.include_dirs = vec![PathBuf::from(include_dir)];
        config.library_dirs = vec![PathBuf::from(library_dir)];

        config.shared_object_suffix = ["SO", "EXT_SUFFIX"]
            .iter()
            .map(|name| optional(*name))
            .find(|suffix| !suffix.is_empty())
            .unwrap_or(".so")
            .to_string();

        config.object_suffix = optional("MODOBJS")
            .split_whitespace()
            .next()
            .and_then(|obj| Path::new(obj).extension())
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_else(|| ".o".to_string());

        config.host_version = ["SOABI", "VERSION"]
            .iter()
            .map(|name| optional(*name))
            .find(|v| !v.is_empty())
            .unwrap_or_default()
            .to_string();

        Ok(config)
    }

    /// Locate and read the host Makefile, then apply setting overrides.
    pub fn load(settings: &DiscoverySettings, runner: &dyn CommandRunner) -> Result<Self> {
        let makefile = match &settings.makefile {
            Some(path) => path.clone(),
            None => locate_makefile(&settings.python(), runner)?,
        };
        tracing::debug!("reading host build configuration from {}", makefile.display());

        let vars = read_makefile(&makefile).map_err(|e| {
            ToolchainError::discovery(format!(
                "could not read host build configuration {}: {}",
                makefile.display(),
                e
            ))
        })?;
        let mut config = Self::from_vars(&vars)?;
        config.apply_settings(settings);
        Ok(config)
    }

    fn apply_settings(&mut self, settings: &DiscoverySettings) {
        if let Some(cc) = &settings.cc {
            self.compiler = cc.clone();
        }
        self.compile_flags.extend(settings.cflags.iter().cloned());
        self.link_flags.extend(settings.ldflags.iter().cloned());
    }
}

/// Discover the host's C/C++ toolchain using the configured settings.
pub fn discover_default_toolchain(runner: &dyn CommandRunner) -> Result<Toolchain> {
    let config = load_current_discovery_config();
    discover_toolchain_with(&config.discovery, runner)
}

/// Discover the host's C/C++ toolchain with explicit settings.
pub fn discover_toolchain_with(
    settings: &DiscoverySettings,
    runner: &dyn CommandRunner,
) -> Result<Toolchain> {
    let host = HostBuildConfig::load(settings, runner)?;

    let cmd = CommandSpec::new(&host.compiler).arg("--version");
    let output = runner.run(&cmd).map_err(|e| {
        ToolchainError::discovery(format!("could not query `{}`: {}", cmd.display(), e))
    })?;

    if !output.success() {
        return Err(ToolchainError::discovery(format!(
            "version query `{}` failed: {}",
            cmd.display(),
            output.stderr.trim()
        )));
    }

    let toolchain = gcc_toolchain_from_host(host, &output.stdout, cfg!(target_pointer_width = "32"))?;
    tracing::info!("Using host compiler {}", toolchain.compiler().display());
    Ok(toolchain)
}

/// Turn host settings into a GCC-backend toolchain, given the compiler's
/// `--version` banner.
pub fn gcc_toolchain_from_host(
    host: HostBuildConfig,
    version_text: &str,
    is_32bit: bool,
) -> Result<Toolchain> {
    let Some(family) = identify_compiler(version_text) else {
        return Err(ToolchainError::discovery(format!(
            "unknown compiler `{}`: {}",
            host.compiler.display(),
            version_text.lines().next().unwrap_or_default()
        )));
    };
    tracing::debug!("identified {} as {}", host.compiler.display(), family.as_str());

    let mut compile_flags = host.compile_flags.clone();

    // C-only warning the host build enables; C++ compilers reject it.
    compile_flags.retain(|flag| flag != "-Wstrict-prototypes");

    if version_text.contains("darwin") && is_32bit {
        compile_flags.push("-arch".to_string());
        compile_flags.push("i386".to_string());
    }

    Ok(base_builder(Backend::Gcc, host.compiler.clone(), &host)
        .compile_flags(compile_flags)
        .link_flags(host.link_flags)
        .undefines(host.undefines)
        .build())
}

/// Discover a CUDA toolchain using the configured settings.
pub fn discover_cuda_toolchain(runner: &dyn CommandRunner) -> Result<Toolchain> {
    let config = load_current_discovery_config();
    discover_cuda_toolchain_with(&config.discovery, runner)
}

/// Discover a CUDA toolchain with explicit settings.
pub fn discover_cuda_toolchain_with(
    settings: &DiscoverySettings,
    runner: &dyn CommandRunner,
) -> Result<Toolchain> {
    let host = HostBuildConfig::load(settings, runner)?;
    let toolchain = cuda_toolchain_from_host(host, settings.nvcc());
    tracing::info!("Using CUDA compiler {}", toolchain.compiler().display());
    Ok(toolchain)
}

/// Turn host settings into an nvcc toolchain.
///
/// Host compile flags reach the host compiler through `-Xcompiler`; nvcc
/// links with its own defaults.
pub fn cuda_toolchain_from_host(host: HostBuildConfig, nvcc: PathBuf) -> Toolchain {
    let mut builder = base_builder(Backend::Nvcc, nvcc, &host)
        .undefines(host.undefines.iter().cloned())
        .undefine("__BLOCKS__");

    if !host.compile_flags.is_empty() {
        builder = builder.compile_flags(["-Xcompiler".to_string(), host.compile_flags.join(",")]);
    }

    builder.build()
}

fn base_builder(
    backend: Backend,
    compiler: PathBuf,
    host: &HostBuildConfig,
) -> super::ToolchainBuilder {
    Toolchain::builder(backend, compiler)
        .linker(host.linker.clone())
        .defines(host.defines.iter().cloned())
        .include_dirs(host.include_dirs.iter().cloned())
        .library_dirs(host.library_dirs.iter().cloned())
        .libraries(host.libraries.iter().cloned())
        .shared_object_suffix(host.shared_object_suffix.clone())
        .object_suffix(host.object_suffix.clone())
        .host_version(host.host_version.clone())
}
