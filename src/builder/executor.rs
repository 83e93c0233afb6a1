//! Build executor: runs compile and link commands for a toolchain.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::builder::errors::{Result, ToolchainError};
use crate::builder::toolchain::{
    materialize_runtime_support, needs_runtime_support, Backend, BuildMode, CommandSpec,
    IspcSettings, Toolchain,
};
use crate::util::process::CommandRunner;

/// Runs build commands synthesized from a [`Toolchain`].
pub struct BuildExecutor<'a> {
    toolchain: &'a Toolchain,
    runner: &'a dyn CommandRunner,
    debug: bool,
}

impl<'a> BuildExecutor<'a> {
    /// Create a new build executor.
    pub fn new(toolchain: &'a Toolchain, runner: &'a dyn CommandRunner) -> Self {
        BuildExecutor {
            toolchain,
            runner,
            debug: false,
        }
    }

    /// Echo every command to stderr before running it.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Compile `sources` into a single object file.
    pub fn build_object(&self, output: &Path, sources: &[PathBuf]) -> Result<PathBuf> {
        let output = with_default_suffix(output, self.toolchain.object_suffix());
        self.run(sources, BuildMode::Object, &output)?;
        Ok(output)
    }

    /// Compile and link `sources` into a loadable extension.
    pub fn build_extension(&self, output: &Path, sources: &[PathBuf]) -> Result<PathBuf> {
        match self.toolchain.backend() {
            Backend::Ispc(settings) => self.build_ispc_extension(settings, output, sources),
            Backend::Gcc | Backend::Nvcc => {
                let output = with_default_suffix(output, self.toolchain.shared_object_suffix());
                self.run(sources, BuildMode::Link, &output)?;
                Ok(output)
            }
        }
    }

    /// Link already-built objects into a loadable extension.
    pub fn link_extension(&self, output: &Path, objects: &[PathBuf]) -> Result<PathBuf> {
        let output = with_default_suffix(output, self.toolchain.shared_object_suffix());
        self.run(objects, BuildMode::Link, &output)?;
        Ok(output)
    }

    /// ispc, the C++ compiler and the linker each accept only their own
    /// inputs, so every source becomes an object first.
    fn build_ispc_extension(
        &self,
        settings: &IspcSettings,
        output: &Path,
        sources: &[PathBuf],
    ) -> Result<PathBuf> {
        let staging = tempfile::Builder::new()
            .prefix("extbuild")
            .tempdir()
            .map_err(|e| ToolchainError::io(std::env::temp_dir(), e))?;

        let mut sources = sources.to_vec();
        if needs_runtime_support(&sources) {
            let support = match &settings.runtime_support {
                Some(path) => path.clone(),
                None => materialize_runtime_support(staging.path())?,
            };
            tracing::debug!("adding task system {}", support.display());
            sources.push(support);
        }

        let mut objects = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            if self.is_object(source) {
                objects.push(source.clone());
                continue;
            }

            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "source".to_string());
            let object = staging.path().join(format!(
                "{}-{}{}",
                index,
                stem,
                self.toolchain.object_suffix()
            ));

            self.run(std::slice::from_ref(source), BuildMode::Object, &object)?;
            objects.push(object);
        }

        self.link_extension(output, &objects)
    }

    fn is_object(&self, path: &Path) -> bool {
        path.to_string_lossy()
            .ends_with(self.toolchain.object_suffix())
    }

    fn run(&self, files: &[PathBuf], mode: BuildMode, output: &Path) -> Result<()> {
        let cmd = self
            .toolchain
            .command_line(files, mode)?
            .arg("-o")
            .arg(output.display().to_string());

        if self.debug {
            eprintln!("{}", cmd.display());
        }

        execute(self.toolchain, self.runner, &cmd)
    }
}

/// Run a compiler command, turning every kind of failure into
/// [`ToolchainError::Compile`].
fn execute(toolchain: &Toolchain, runner: &dyn CommandRunner, cmd: &CommandSpec) -> Result<()> {
    let command = cmd.display();

    let output = match runner.run(cmd) {
        Ok(output) => output,
        Err(e) => {
            tracing::error!("FAILED compiler invocation: {}", command);
            return Err(ToolchainError::Compile {
                command,
                status: None,
                stderr: e.to_string(),
            });
        }
    };

    if toolchain.invocation_failed(&output) {
        tracing::error!("FAILED compiler invocation: {}", command);
        return Err(ToolchainError::Compile {
            command,
            status: output.status,
            stderr: output.stderr,
        });
    }

    let warnings = output.stderr.trim();
    if !warnings.is_empty() {
        tracing::warn!("{}", warnings);
    }

    Ok(())
}

fn with_default_suffix(output: &Path, suffix: &str) -> PathBuf {
    if output.extension().is_some() {
        return output.to_path_buf();
    }

    let mut path = OsString::from(output.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}
