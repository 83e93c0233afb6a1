//! Test utilities and mocks for extbuild unit tests.
//!
//! [`MockRunner`] stands in for real compiler processes: it matches each
//! command line against registered expectations, records every call and
//! can write files named on the command line, the way a compiler writes a
//! dependency report.
//!
//! # Example
//!
//! ```rust,ignore
//! use extbuild::test_support::{MockProcessOutput, MockRunner};
//!
//! #[test]
//! fn test_example() {
//!     let mut runner = MockRunner::new();
//!     runner.expect("gcc --version", MockProcessOutput::success("gcc (GCC) 12.2.0"));
//!
//!     // Pass &runner wherever a CommandRunner is needed...
//! }
//! ```

pub mod fixtures;

use std::cell::RefCell;

use crate::builder::errors::{Result, ToolchainError};
use crate::builder::toolchain::CommandSpec;
use crate::util::process::{CommandRunner, ProcessOutput};

pub use fixtures::*;

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success).
    pub status: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Create a failure output with the given stderr and status code.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Replace the standard error.
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

impl From<MockProcessOutput> for ProcessOutput {
    fn from(mock: MockProcessOutput) -> Self {
        ProcessOutput {
            status: Some(mock.status),
            stdout: mock.stdout,
            stderr: mock.stderr,
        }
    }
}

/// Pattern for matching command lines in MockRunner.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
}

impl CommandPattern {
    /// Check if this pattern matches the given command.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
        }
    }
}

/// Expectation for a command execution.
#[derive(Debug, Clone)]
pub struct CommandExpectation {
    /// Pattern to match against commands.
    pub pattern: CommandPattern,
    /// Output to return when matched.
    pub output: MockProcessOutput,
    /// Number of times this expectation can be used (None = unlimited).
    pub times: Option<usize>,
    /// Number of times this expectation has been used.
    pub used: usize,
    /// File written when matched: contents go to the argument after a flag.
    pub writes: Option<(String, String)>,
}

impl CommandExpectation {
    /// Create a new expectation.
    pub fn new(pattern: CommandPattern, output: MockProcessOutput) -> Self {
        CommandExpectation {
            pattern,
            output,
            times: None,
            used: 0,
            writes: None,
        }
    }

    /// Set the number of times this expectation can be used.
    pub fn times(&mut self, n: usize) -> &mut Self {
        self.times = Some(n);
        self
    }

    /// When matched, write `contents` to the path following `flag`.
    pub fn writes_after(&mut self, flag: &str, contents: &str) -> &mut Self {
        self.writes = Some((flag.to_string(), contents.to_string()));
        self
    }

    /// Check if this expectation can still be used.
    pub fn available(&self) -> bool {
        match self.times {
            Some(n) => self.used < n,
            None => true,
        }
    }
}

/// Mock command runner for testing compiler invocations.
#[derive(Debug, Default)]
pub struct MockRunner {
    expectations: RefCell<Vec<CommandExpectation>>,
    calls: RefCell<Vec<CommandSpec>>,
    default_output: Option<MockProcessOutput>,
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        MockRunner::default()
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&mut self, cmd: &str, output: MockProcessOutput) -> &mut CommandExpectation {
        self.push(CommandPattern::Exact(cmd.to_string()), output)
    }

    /// Add an expectation for a command starting with a prefix.
    pub fn expect_prefix(
        &mut self,
        prefix: &str,
        output: MockProcessOutput,
    ) -> &mut CommandExpectation {
        self.push(CommandPattern::StartsWith(prefix.to_string()), output)
    }

    fn push(&mut self, pattern: CommandPattern, output: MockProcessOutput) -> &mut CommandExpectation {
        let expectations = self.expectations.get_mut();
        expectations.push(CommandExpectation::new(pattern, output));
        expectations.last_mut().unwrap()
    }

    /// Set a default output for commands that don't match any expectation.
    pub fn set_default(&mut self, output: MockProcessOutput) -> &mut Self {
        self.default_output = Some(output);
        self
    }

    /// Get all commands that were run.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    /// Verify that all expectations with a specific count were satisfied.
    pub fn verify(&self) -> std::result::Result<(), String> {
        for (i, exp) in self.expectations.borrow().iter().enumerate() {
            if let Some(expected) = exp.times {
                if exp.used != expected {
                    return Err(format!(
                        "expectation {} was used {} times, expected {}",
                        i, exp.used, expected
                    ));
                }
            }
        }
        Ok(())
    }
}

fn write_side_effect(cmd: &CommandSpec, flag: &str, contents: &str) -> Result<()> {
    let Some(pos) = cmd.args.iter().position(|a| a == flag) else {
        return Ok(());
    };
    let Some(path) = cmd.args.get(pos + 1) else {
        return Ok(());
    };
    std::fs::write(path, contents).map_err(|e| ToolchainError::io(path, e))
}

impl CommandRunner for MockRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<ProcessOutput> {
        let full_cmd = cmd.display();
        self.calls.borrow_mut().push(cmd.clone());

        // Find matching expectation
        for exp in self.expectations.borrow_mut().iter_mut() {
            if exp.pattern.matches(&full_cmd) && exp.available() {
                exp.used += 1;
                if let Some((flag, contents)) = &exp.writes {
                    write_side_effect(cmd, flag, contents)?;
                }
                return Ok(exp.output.clone().into());
            }
        }

        // Use default if set
        if let Some(default) = &self.default_output {
            return Ok(default.clone().into());
        }

        Err(ToolchainError::Spawn {
            program: cmd.program.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("unexpected command: {}", full_cmd),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_runner_matches_in_order() {
        let mut runner = MockRunner::new();
        runner
            .expect("gcc --version", MockProcessOutput::success("first"))
            .times(1);
        runner.expect_prefix("gcc", MockProcessOutput::success("second"));

        let cmd = CommandSpec::new("gcc").arg("--version");
        assert_eq!(runner.run(&cmd).unwrap().stdout, "first");
        assert_eq!(runner.run(&cmd).unwrap().stdout, "second");
        assert_eq!(runner.calls().len(), 2);
        assert!(runner.verify().is_ok());
    }

    #[test]
    fn test_unexpected_command_fails_to_spawn() {
        let runner = MockRunner::new();
        let err = runner.run(&CommandSpec::new("cc")).unwrap_err();
        assert!(matches!(err, ToolchainError::Spawn { .. }));
    }

    #[test]
    fn test_writes_after_flag() {
        let tmp = tempfile::TempDir::new().unwrap();
        let report = tmp.path().join("deps.txt");

        let mut runner = MockRunner::new();
        runner
            .expect_prefix("ispc", MockProcessOutput::success(""))
            .writes_after("-MMM", "a.h\n");

        let cmd = CommandSpec::new("ispc")
            .arg("-MMM")
            .arg(report.display().to_string());
        runner.run(&cmd).unwrap();

        assert_eq!(std::fs::read_to_string(report).unwrap(), "a.h\n");
    }
}
