//! Toolchain abstraction for just-in-time extension builds.
//!
//! A [`Toolchain`] is an immutable snapshot of everything needed to invoke a
//! host compiler: executables, flags, macro definitions and search paths.
//! Three backends are supported, each with its own command-line dialect and
//! version format:
//!
//! - [`Backend::Gcc`]: GCC and Clang drivers
//! - [`Backend::Nvcc`]: the CUDA compiler driver
//! - [`Backend::Ispc`]: the ispc SIMD compiler plus a C++ compiler and linker
//!
//! Toolchains are constructed by discovery ([`discover_default_toolchain`],
//! [`discover_cuda_toolchain`]), by [`IspcBuilder`], or by hand through
//! [`ToolchainBuilder`]. Every "modifying" operation returns a new value.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::builder::errors::{Result, ToolchainError};
use crate::util::process::CommandRunner;

mod detect;
mod gcc;
mod ispc;
mod nvcc;
mod version;

pub use detect::{
    cuda_toolchain_from_host, discover_cuda_toolchain, discover_cuda_toolchain_with,
    discover_default_toolchain, discover_toolchain_with, gcc_toolchain_from_host,
    identify_compiler, CompilerFamily, HostBuildConfig,
};
pub use ispc::{
    materialize_runtime_support, needs_runtime_support, parse_target_descriptor, resolve_target,
    IspcBuilder, IspcSettings, TargetDescriptor, TargetSpec, ThreadingModel,
    RUNTIME_SUPPORT_FILE,
};
pub use version::VersionInfo;

/// A command to execute: program plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The program to run (e.g., "gcc", "nvcc")
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a new command spec.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// The full argument vector, program first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.display().to_string());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Space-joined command line for logs and error messages.
    pub fn display(&self) -> String {
        self.argv().join(" ")
    }
}

/// Whether a command produces a relocatable object or a linked extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Compile only (`-c`).
    Object,
    /// Produce the final shared object.
    Link,
}

/// Optimization level on the scale of gcc's `-O`, or a debug build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    Debug,
    Level(u8),
}

impl FromStr for OptLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("debug") {
            return Ok(OptLevel::Debug);
        }
        s.parse::<u8>().map(OptLevel::Level).map_err(|_| {
            format!(
                "invalid optimization level '{}'; expected a number or 'debug'",
                s
            )
        })
    }
}

/// Extra knobs accepted by [`Toolchain::with_optimization_level`].
///
/// Backends ignore entries they do not understand, so callers can pass
/// options meant for one backend to any toolchain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationOptions {
    /// Accepted on every backend; the level alone selects the flags.
    pub debug: bool,
    /// Backend-specific extras.
    pub extra: BTreeMap<String, String>,
}

/// The compiler backend a toolchain drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// GCC or Clang
    Gcc,
    /// CUDA compiler driver
    Nvcc,
    /// ispc SIMD compiler
    Ispc(IspcSettings),
}

impl Backend {
    /// Get the backend name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Gcc => "gcc",
            Backend::Nvcc => "nvcc",
            Backend::Ispc(_) => "ispc",
        }
    }

    /// Flag prefixes cleared before a new optimization level is applied.
    fn optimization_prefixes(&self) -> &'static [&'static str] {
        match self {
            Backend::Gcc => &["-O", "-g", "-march", "-mtune", "-DNDEBUG"],
            Backend::Nvcc | Backend::Ispc(_) => &["-O", "-g", "-DNDEBUG"],
        }
    }

    /// Minimum compiler version for `-march=native -mtune=native` at -O2 and
    /// above. Backends without native tuning return `None`.
    fn native_tuning_gate(&self) -> Option<VersionInfo> {
        match self {
            Backend::Gcc => Some(VersionInfo::from([4, 3])),
            Backend::Nvcc | Backend::Ispc(_) => None,
        }
    }

    /// Parse `--version` output into a comparable version.
    pub fn parse_version(&self, text: &str) -> Result<VersionInfo> {
        match self {
            Backend::Gcc => gcc::parse_version(text),
            Backend::Nvcc => nvcc::parse_version(text),
            Backend::Ispc(_) => ispc::parse_version(text),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named bundle of include/library settings merged into a toolchain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feature {
    /// Feature name, recorded so the bundle is merged at most once
    pub name: String,
    /// Header search directories
    pub include_dirs: Vec<PathBuf>,
    /// Library search directories
    pub library_dirs: Vec<PathBuf>,
    /// Libraries, in link order
    pub libraries: Vec<String>,
}

impl Feature {
    /// Create an empty feature bundle.
    pub fn new(name: impl Into<String>) -> Self {
        Feature {
            name: name.into(),
            ..Feature::default()
        }
    }

    /// Add a header search directory.
    pub fn include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    /// Add a library search directory.
    pub fn library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dirs.push(dir.into());
        self
    }

    /// Add a library.
    pub fn library(mut self, lib: impl Into<String>) -> Self {
        self.libraries.push(lib.into());
        self
    }
}

/// Immutable compiler toolchain configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    backend: Backend,
    compiler: PathBuf,
    secondary_compiler: Option<PathBuf>,
    linker: Option<PathBuf>,
    compile_flags: Vec<String>,
    secondary_compile_flags: Option<Vec<String>>,
    link_flags: Vec<String>,
    defines: Vec<String>,
    undefines: Vec<String>,
    include_dirs: Vec<PathBuf>,
    library_dirs: Vec<PathBuf>,
    libraries: Vec<String>,
    shared_object_suffix: String,
    object_suffix: String,
    enabled_features: BTreeSet<String>,
    host_version: String,
}

impl Toolchain {
    /// Start building a toolchain for `backend` around `compiler`.
    pub fn builder(backend: Backend, compiler: impl Into<PathBuf>) -> ToolchainBuilder {
        ToolchainBuilder::new(backend, compiler)
    }

    /// Copy this toolchain into a builder to override some of its fields.
    pub fn to_builder(&self) -> ToolchainBuilder {
        ToolchainBuilder {
            toolchain: self.clone(),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Primary compiler executable.
    pub fn compiler(&self) -> &Path {
        &self.compiler
    }

    /// C++ compiler used alongside a non-C++ primary compiler.
    pub fn secondary_compiler(&self) -> Option<&Path> {
        self.secondary_compiler.as_deref()
    }

    pub fn linker(&self) -> Option<&Path> {
        self.linker.as_deref()
    }

    pub fn compile_flags(&self) -> &[String] {
        &self.compile_flags
    }

    pub fn secondary_compile_flags(&self) -> Option<&[String]> {
        self.secondary_compile_flags.as_deref()
    }

    pub fn link_flags(&self) -> &[String] {
        &self.link_flags
    }

    pub fn defines(&self) -> &[String] {
        &self.defines
    }

    pub fn undefines(&self) -> &[String] {
        &self.undefines
    }

    pub fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }

    pub fn library_dirs(&self) -> &[PathBuf] {
        &self.library_dirs
    }

    /// Libraries in link order.
    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    pub fn shared_object_suffix(&self) -> &str {
        &self.shared_object_suffix
    }

    pub fn object_suffix(&self) -> &str {
        &self.object_suffix
    }

    /// Names of the features merged so far.
    pub fn enabled_features(&self) -> &BTreeSet<String> {
        &self.enabled_features
    }

    /// Version of the host runtime extensions are built against.
    pub fn host_version(&self) -> &str {
        &self.host_version
    }

    /// Merge a named library bundle.
    ///
    /// A feature already merged is ignored. Otherwise new directories are
    /// appended (skipping ones already present) and the feature's libraries
    /// are placed ahead of the existing ones, so the most recently added
    /// feature resolves first at link time.
    pub fn add_library(mut self, feature: Feature) -> Self {
        if !self.enabled_features.insert(feature.name.clone()) {
            tracing::trace!("feature `{}` already enabled", feature.name);
            return self;
        }

        extend_unique(&mut self.include_dirs, feature.include_dirs);
        extend_unique(&mut self.library_dirs, feature.library_dirs);

        let mut libraries = feature.libraries;
        libraries.append(&mut self.libraries);
        self.libraries = libraries;

        self
    }

    /// Return a copy with the optimization level set to `level`.
    ///
    /// Previously applied `-O`, `-g` and `-DNDEBUG` flags (and, for GCC,
    /// `-march`/`-mtune`) are removed first, so re-leveling never leaves
    /// residue. `OptLevel::Debug` adds only `-g`; a numeric level adds
    /// `-O<n> -DNDEBUG`, plus native architecture tuning on GCC at level 2
    /// and above when the compiler is at least 4.3.
    pub fn with_optimization_level(
        &self,
        level: OptLevel,
        options: &OptimizationOptions,
        runner: &dyn CommandRunner,
    ) -> Result<Toolchain> {
        for key in options.extra.keys() {
            tracing::trace!("{} ignores optimization option `{}`", self.backend, key);
        }

        let prefixes = self.backend.optimization_prefixes();
        let mut flags: Vec<String> = self
            .compile_flags
            .iter()
            .filter(|flag| !prefixes.iter().any(|p| flag.starts_with(p)))
            .cloned()
            .collect();

        match level {
            OptLevel::Debug => flags.push("-g".to_string()),
            OptLevel::Level(n) => {
                flags.push(format!("-O{}", n));
                flags.push("-DNDEBUG".to_string());

                if n >= 2 {
                    if let Some(gate) = self.backend.native_tuning_gate() {
                        if self.version_info(runner)? >= gate {
                            flags.push("-march=native".to_string());
                            flags.push("-mtune=native".to_string());
                        }
                    }
                }
            }
        }

        Ok(Toolchain {
            compile_flags: flags,
            ..self.clone()
        })
    }

    /// Return a copy with optimization flags removed and `-g` added.
    pub fn with_debugging(&self) -> Toolchain {
        let mut flags: Vec<String> = self
            .compile_flags
            .iter()
            .filter(|flag| !flag.starts_with("-O"))
            .cloned()
            .collect();
        flags.push("-g".to_string());

        Toolchain {
            compile_flags: flags,
            ..self.clone()
        }
    }

    /// Raw `--version` output of the primary compiler.
    pub fn get_version(&self, runner: &dyn CommandRunner) -> Result<String> {
        let cmd = CommandSpec::new(&self.compiler).arg("--version");
        let output = runner.run(&cmd)?;

        if !output.success() {
            return Err(ToolchainError::VersionQuery {
                command: cmd.display(),
                stderr: output.stderr,
            });
        }

        Ok(output.stdout)
    }

    /// Compiler version as a comparable tuple.
    pub fn version_info(&self, runner: &dyn CommandRunner) -> Result<VersionInfo> {
        let text = self.get_version(runner)?;
        self.backend.parse_version(&text)
    }

    /// The exact command that compiles or links `files`, without `-o`.
    pub fn command_line(&self, files: &[PathBuf], mode: BuildMode) -> Result<CommandSpec> {
        match &self.backend {
            Backend::Gcc | Backend::Nvcc => Ok(gcc::command_line(self, files, mode)),
            Backend::Ispc(_) => ispc::command_line(self, files, mode),
        }
    }

    /// The command that reports header dependencies of `files`, and whether
    /// its report lands on stdout or in a file argument.
    pub(crate) fn dependency_command(
        &self,
        files: &[PathBuf],
        report: Option<&Path>,
    ) -> Result<CommandSpec> {
        match &self.backend {
            Backend::Gcc | Backend::Nvcc => Ok(gcc::dependency_command(self, files)),
            Backend::Ispc(_) => ispc::dependency_command(self, files, report),
        }
    }

    /// Whether dependency scanning of `files` writes its report to a file.
    pub(crate) fn dependency_report_in_file(&self, files: &[PathBuf]) -> bool {
        match &self.backend {
            Backend::Gcc | Backend::Nvcc => false,
            Backend::Ispc(_) => ispc::dependency_report_in_file(files),
        }
    }

    /// Whether a finished compiler process should be treated as failed.
    pub(crate) fn invocation_failed(&self, output: &crate::util::process::ProcessOutput) -> bool {
        if !output.success() {
            return true;
        }
        match self.backend {
            Backend::Nvcc => nvcc::stderr_reports_error(&output.stderr),
            Backend::Gcc | Backend::Ispc(_) => false,
        }
    }
}

/// Builder for [`Toolchain`] values.
///
/// Directory lists stay free of duplicates no matter how they are added.
#[derive(Debug, Clone)]
pub struct ToolchainBuilder {
    toolchain: Toolchain,
}

impl ToolchainBuilder {
    /// Create a builder with empty flag lists and platform default suffixes.
    pub fn new(backend: Backend, compiler: impl Into<PathBuf>) -> Self {
        ToolchainBuilder {
            toolchain: Toolchain {
                backend,
                compiler: compiler.into(),
                secondary_compiler: None,
                linker: None,
                compile_flags: Vec::new(),
                secondary_compile_flags: None,
                link_flags: Vec::new(),
                defines: Vec::new(),
                undefines: Vec::new(),
                include_dirs: Vec::new(),
                library_dirs: Vec::new(),
                libraries: Vec::new(),
                shared_object_suffix: default_shared_object_suffix().to_string(),
                object_suffix: ".o".to_string(),
                enabled_features: BTreeSet::new(),
                host_version: String::new(),
            },
        }
    }

    /// Replace the primary compiler.
    pub fn compiler(mut self, compiler: impl Into<PathBuf>) -> Self {
        self.toolchain.compiler = compiler.into();
        self
    }

    /// Set the secondary (C++) compiler.
    pub fn secondary_compiler(mut self, compiler: impl Into<PathBuf>) -> Self {
        self.toolchain.secondary_compiler = Some(compiler.into());
        self
    }

    /// Set the linker.
    pub fn linker(mut self, linker: impl Into<PathBuf>) -> Self {
        self.toolchain.linker = Some(linker.into());
        self
    }

    /// Append compile flags.
    pub fn compile_flags(mut self, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.toolchain
            .compile_flags
            .extend(flags.into_iter().map(Into::into));
        self
    }

    /// Append flags for the secondary compiler.
    pub fn secondary_compile_flags(
        mut self,
        flags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.toolchain
            .secondary_compile_flags
            .get_or_insert_with(Vec::new)
            .extend(flags.into_iter().map(Into::into));
        self
    }

    /// Append link flags.
    pub fn link_flags(mut self, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.toolchain
            .link_flags
            .extend(flags.into_iter().map(Into::into));
        self
    }

    /// Define a macro (`NAME` or `NAME=VALUE`).
    pub fn define(mut self, define: impl Into<String>) -> Self {
        self.toolchain.defines.push(define.into());
        self
    }

    /// Define several macros.
    pub fn defines(mut self, defines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.toolchain
            .defines
            .extend(defines.into_iter().map(Into::into));
        self
    }

    /// Undefine a macro.
    pub fn undefine(mut self, name: impl Into<String>) -> Self {
        self.toolchain.undefines.push(name.into());
        self
    }

    /// Undefine several macros.
    pub fn undefines(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.toolchain
            .undefines
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Add a header search directory unless already present.
    pub fn include_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs([dir])
    }

    /// Add header search directories, skipping ones already present.
    pub fn include_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        extend_unique(
            &mut self.toolchain.include_dirs,
            dirs.into_iter().map(Into::into),
        );
        self
    }

    /// Add a library search directory unless already present.
    pub fn library_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.library_dirs([dir])
    }

    /// Add library search directories, skipping ones already present.
    pub fn library_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        extend_unique(
            &mut self.toolchain.library_dirs,
            dirs.into_iter().map(Into::into),
        );
        self
    }

    /// Append a library. Names starting with `-` are passed verbatim.
    pub fn library(mut self, lib: impl Into<String>) -> Self {
        self.toolchain.libraries.push(lib.into());
        self
    }

    /// Append libraries.
    pub fn libraries(mut self, libs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.toolchain
            .libraries
            .extend(libs.into_iter().map(Into::into));
        self
    }

    /// Set the shared object suffix (e.g., ".so").
    pub fn shared_object_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.toolchain.shared_object_suffix = suffix.into();
        self
    }

    /// Set the object file suffix (e.g., ".o").
    pub fn object_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.toolchain.object_suffix = suffix.into();
        self
    }

    /// Record the host runtime version extensions are built against.
    pub fn host_version(mut self, version: impl Into<String>) -> Self {
        self.toolchain.host_version = version.into();
        self
    }

    /// Finish building.
    pub fn build(self) -> Toolchain {
        self.toolchain
    }
}

fn extend_unique(dirs: &mut Vec<PathBuf>, new: impl IntoIterator<Item = PathBuf>) {
    for dir in new {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
}

fn default_shared_object_suffix() -> &'static str {
    if cfg!(target_os = "windows") {
        ".pyd"
    } else {
        ".so"
    }
}

/// `-D`, `-U` and `-I` arguments shared by every backend.
pub(crate) fn preprocessor_args(toolchain: &Toolchain) -> Vec<String> {
    let defines = toolchain.defines.iter().map(|d| format!("-D{}", d));
    let undefines = toolchain.undefines.iter().map(|u| format!("-U{}", u));
    let includes = toolchain
        .include_dirs
        .iter()
        .map(|dir| format!("-I{}", dir.display()));

    defines.chain(undefines).chain(includes).collect()
}

/// `-L` and library arguments for a link step.
pub(crate) fn link_args(toolchain: &Toolchain) -> Vec<String> {
    let dirs = toolchain
        .library_dirs
        .iter()
        .map(|dir| format!("-L{}", dir.display()));
    let libs = toolchain.libraries.iter().map(|lib| {
        if lib.starts_with('-') {
            lib.clone()
        } else {
            format!("-l{}", lib)
        }
    });

    dirs.chain(libs).collect()
}

pub(crate) fn path_args(files: &[PathBuf]) -> impl Iterator<Item = String> + '_ {
    files.iter().map(|f| f.display().to_string())
}
