//! ispc SIMD compiler support.
//!
//! An ispc toolchain drives three executables: ispc itself for `.ispc`
//! sources, a C++ compiler for the task-system runtime (`tasksys.cpp`) and
//! other `.cpp` files, and a linker that joins the objects into an
//! extension. Which one runs is decided per batch of input files.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::builder::errors::{Result, ToolchainError};
use crate::util::process::CommandRunner;

use super::{
    link_args, path_args, preprocessor_args, Backend, BuildMode, CommandSpec, Toolchain,
    VersionInfo,
};

/// File name of the task-system runtime every ispc extension links against.
pub const RUNTIME_SUPPORT_FILE: &str = "tasksys.cpp";

const RUNTIME_SUPPORT_SOURCE: &str = include_str!("../../../support/tasksys.cpp");

/// Compiled without `--target` to make ispc name its default target.
const PROBE_SOURCE: &str = "void test(){} \n";

static TARGET_DESCRIPTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([\w\d]+)-i(\d+)x(\d+)""#).unwrap());

/// Backend settings carried by an ispc toolchain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IspcSettings {
    /// Task-system source to link; the embedded copy is used when unset.
    pub runtime_support: Option<PathBuf>,
}

/// Which code-generation target to pass as `--target`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TargetSpec {
    /// Vectorize for the build machine (`--target host`).
    #[default]
    Host,
    /// `<isa>-i<addressing>x<width>`; missing parts come from ispc's
    /// default target.
    Explicit {
        isa: Option<String>,
        addressing_width: Option<u32>,
        vector_width: Option<u32>,
    },
}

/// A target named by ispc, e.g. `"avx2-i32x8"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub isa: String,
    pub addressing_width: u32,
    pub vector_width: u32,
}

/// How ispc tasks are scheduled at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThreadingModel {
    #[default]
    OpenMp,
    Pthreads,
}

impl ThreadingModel {
    fn define(self) -> &'static str {
        match self {
            ThreadingModel::OpenMp => "ISPC_USE_OMP",
            ThreadingModel::Pthreads => "ISPC_USE_PTHREADS",
        }
    }

    fn library(self) -> &'static str {
        match self {
            ThreadingModel::OpenMp => "-fopenmp",
            ThreadingModel::Pthreads => "pthread",
        }
    }
}

/// Builder for ispc toolchains.
#[derive(Debug, Clone)]
pub struct IspcBuilder {
    compiler: PathBuf,
    cpp: PathBuf,
    linker: PathBuf,
    threading: ThreadingModel,
    target: TargetSpec,
    compile_flags: Vec<String>,
    cpp_flags: Vec<String>,
    link_flags: Vec<String>,
    defines: Vec<String>,
    include_dirs: Vec<PathBuf>,
    library_dirs: Vec<PathBuf>,
    libraries: Vec<String>,
    runtime_support: Option<PathBuf>,
}

impl Default for IspcBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IspcBuilder {
    pub fn new() -> Self {
        IspcBuilder {
            compiler: PathBuf::from("ispc"),
            cpp: PathBuf::from("g++"),
            linker: PathBuf::from("g++"),
            threading: ThreadingModel::default(),
            target: TargetSpec::default(),
            compile_flags: vec!["--pic".to_string()],
            cpp_flags: vec!["-fPIC".to_string()],
            link_flags: vec!["-shared".to_string()],
            defines: Vec::new(),
            include_dirs: Vec::new(),
            library_dirs: Vec::new(),
            libraries: Vec::new(),
            runtime_support: None,
        }
    }

    pub fn compiler(mut self, compiler: impl Into<PathBuf>) -> Self {
        self.compiler = compiler.into();
        self
    }

    /// C++ compiler for `tasksys.cpp` and other `.cpp` inputs.
    pub fn cpp(mut self, cpp: impl Into<PathBuf>) -> Self {
        self.cpp = cpp.into();
        self
    }

    pub fn linker(mut self, linker: impl Into<PathBuf>) -> Self {
        self.linker = linker.into();
        self
    }

    pub fn threading(mut self, threading: ThreadingModel) -> Self {
        self.threading = threading;
        self
    }

    pub fn target(mut self, target: TargetSpec) -> Self {
        self.target = target;
        self
    }

    /// Replace the ispc flags (default `--pic`).
    pub fn compile_flags(mut self, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.compile_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the C++ flags (default `-fPIC`).
    pub fn cpp_flags(mut self, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cpp_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the link flags (default `-shared`).
    pub fn link_flags(mut self, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.link_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn define(mut self, define: impl Into<String>) -> Self {
        self.defines.push(define.into());
        self
    }

    pub fn include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    pub fn library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dirs.push(dir.into());
        self
    }

    pub fn library(mut self, lib: impl Into<String>) -> Self {
        self.libraries.push(lib.into());
        self
    }

    /// Link this task-system source instead of the embedded one.
    pub fn runtime_support(mut self, path: impl Into<PathBuf>) -> Self {
        self.runtime_support = Some(path.into());
        self
    }

    /// Resolve the target and produce the toolchain.
    ///
    /// Probes ispc only when an explicit target leaves a part unspecified.
    pub fn build(self, runner: &dyn CommandRunner) -> Result<Toolchain> {
        let target = resolve_target(&self.compiler, &self.target, runner)?;
        tracing::debug!("ispc target: {}", target);

        let mut compile_flags = self.compile_flags;
        compile_flags.push("--target".to_string());
        compile_flags.push(target);

        let settings = IspcSettings {
            runtime_support: self.runtime_support,
        };

        Ok(Toolchain::builder(Backend::Ispc(settings), self.compiler)
            .secondary_compiler(self.cpp)
            .linker(self.linker)
            .compile_flags(compile_flags)
            .secondary_compile_flags(self.cpp_flags)
            .link_flags(self.link_flags)
            .defines(self.defines)
            .define(self.threading.define())
            .include_dirs(self.include_dirs)
            .library_dirs(self.library_dirs)
            .libraries(self.libraries)
            .library(self.threading.library())
            .build())
    }
}

/// Turn a target spec into the value passed to `--target`.
pub fn resolve_target(
    compiler: &Path,
    spec: &TargetSpec,
    runner: &dyn CommandRunner,
) -> Result<String> {
    match spec {
        TargetSpec::Host => Ok("host".to_string()),
        TargetSpec::Explicit {
            isa: Some(isa),
            addressing_width: Some(addressing),
            vector_width: Some(width),
        } => Ok(format!("{}-i{}x{}", isa, addressing, width)),
        TargetSpec::Explicit {
            isa,
            addressing_width,
            vector_width,
        } => {
            let default = probe_default_target(compiler, runner)?;
            Ok(format!(
                "{}-i{}x{}",
                isa.as_deref().unwrap_or(&default.isa),
                addressing_width.unwrap_or(default.addressing_width),
                vector_width.unwrap_or(default.vector_width)
            ))
        }
    }
}

fn probe_default_target(compiler: &Path, runner: &dyn CommandRunner) -> Result<TargetDescriptor> {
    let mut probe = tempfile::Builder::new()
        .prefix("extbuild")
        .suffix(".ispc")
        .tempfile()
        .map_err(|e| ToolchainError::io(std::env::temp_dir(), e))?;
    probe
        .write_all(PROBE_SOURCE.as_bytes())
        .and_then(|_| probe.flush())
        .map_err(|e| ToolchainError::io(probe.path(), e))?;

    let cmd = CommandSpec::new(compiler).arg(probe.path().display().to_string());
    let output = runner.run(&cmd)?;

    if !output.success() {
        return Err(ToolchainError::VersionQuery {
            command: cmd.display(),
            stderr: output.stderr,
        });
    }

    parse_target_descriptor(&output.stderr).ok_or_else(|| {
        ToolchainError::Configuration(format!(
            "`{}` did not report a default target",
            cmd.display()
        ))
    })
}

/// Find the first quoted `"<isa>-i<addressing>x<width>"` in ispc output.
pub fn parse_target_descriptor(text: &str) -> Option<TargetDescriptor> {
    text.lines().find_map(|line| {
        let caps = TARGET_DESCRIPTOR.captures(line)?;
        Some(TargetDescriptor {
            isa: caps[1].to_string(),
            addressing_width: caps[2].parse().ok()?,
            vector_width: caps[3].parse().ok()?,
        })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Executable {
    Simd,
    Cxx,
    Linker,
}

fn select_executable(files: &[PathBuf], mode: BuildMode) -> Executable {
    let all = |ext: &str| files.iter().all(|f| extension_of(f) == ext);

    if files.is_empty() || (mode == BuildMode::Object && all("ispc")) {
        Executable::Simd
    } else if all("cpp") {
        Executable::Cxx
    } else {
        Executable::Linker
    }
}

fn executable_path(toolchain: &Toolchain, exe: Executable) -> Result<&Path> {
    match exe {
        Executable::Simd => Ok(toolchain.compiler()),
        Executable::Cxx => toolchain.secondary_compiler().ok_or_else(|| {
            ToolchainError::Configuration("ispc toolchain has no C++ compiler".to_string())
        }),
        Executable::Linker => toolchain.linker().ok_or_else(|| {
            ToolchainError::Configuration("ispc toolchain has no linker".to_string())
        }),
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Reject batches mixing file types, which no single executable accepts.
fn check_uniform_extension(files: &[PathBuf]) -> Result<()> {
    let Some(first) = files.first() else {
        return Ok(());
    };
    let expected = extension_of(first);

    if files.iter().all(|f| extension_of(f) == expected) {
        return Ok(());
    }

    let found: BTreeSet<String> = files.iter().map(|f| extension_of(f)).collect();
    Err(ToolchainError::Configuration(format!(
        "can't compile mixed file types: {}",
        found.into_iter().collect::<Vec<_>>().join(", ")
    )))
}

pub(super) fn command_line(
    toolchain: &Toolchain,
    files: &[PathBuf],
    mode: BuildMode,
) -> Result<CommandSpec> {
    let exe = select_executable(files, mode);

    let flags: Vec<String> = if exe == Executable::Simd {
        toolchain.compile_flags().to_vec()
    } else {
        check_uniform_extension(files)?;
        let mut flags = toolchain
            .secondary_compile_flags()
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        if mode == BuildMode::Object {
            flags.push("-c".to_string());
        }
        flags
    };

    let mut cmd = CommandSpec::new(executable_path(toolchain, exe)?).args(flags);

    if mode == BuildMode::Link {
        cmd = cmd.args(toolchain.link_flags().iter().cloned());
    }

    cmd = cmd.args(preprocessor_args(toolchain)).args(path_args(files));

    if mode == BuildMode::Link {
        cmd = cmd.args(link_args(toolchain));
    }

    Ok(cmd)
}

/// Dependency scans treat the batch as an object build unless every input
/// is already an object file.
fn dependency_mode(files: &[PathBuf]) -> BuildMode {
    if !files.is_empty() && files.iter().all(|f| extension_of(f) == "o") {
        BuildMode::Link
    } else {
        BuildMode::Object
    }
}

pub(super) fn dependency_report_in_file(files: &[PathBuf]) -> bool {
    select_executable(files, dependency_mode(files)) == Executable::Simd
}

pub(super) fn dependency_command(
    toolchain: &Toolchain,
    files: &[PathBuf],
    report: Option<&Path>,
) -> Result<CommandSpec> {
    let exe = select_executable(files, dependency_mode(files));

    let flags = if exe == Executable::Simd {
        toolchain.compile_flags()
    } else {
        toolchain.secondary_compile_flags().unwrap_or_default()
    };

    let mut cmd = CommandSpec::new(executable_path(toolchain, exe)?);
    cmd = match (exe, report) {
        (Executable::Simd, Some(path)) => cmd.arg("-MMM").arg(path.display().to_string()),
        _ => cmd.arg("-M"),
    };

    Ok(cmd
        .args(preprocessor_args(toolchain))
        .args(flags.iter().cloned())
        .args(path_args(files)))
}

/// Version from the fifth whitespace token of `ispc --version`.
pub(super) fn parse_version(text: &str) -> Result<VersionInfo> {
    let token = text.split_whitespace().nth(4).ok_or_else(|| {
        ToolchainError::Configuration(format!("unrecognized ispc version output: {:?}", text))
    })?;

    Ok(VersionInfo::parse(token.trim_end_matches(',')))
}

/// Whether an extension built from `files` still needs the task-system
/// runtime added.
pub fn needs_runtime_support(files: &[PathBuf]) -> bool {
    !files
        .iter()
        .any(|f| f.file_name() == Some(OsStr::new(RUNTIME_SUPPORT_FILE)))
}

/// Write the embedded task-system source into `dir`.
pub fn materialize_runtime_support(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(RUNTIME_SUPPORT_FILE);
    std::fs::write(&path, RUNTIME_SUPPORT_SOURCE).map_err(|e| ToolchainError::io(&path, e))?;
    Ok(path)
}
