//! Host interpreter build configuration.
//!
//! The interpreter an extension is loaded into records the compiler, flags
//! and directories it was built with in a `Makefile` of `NAME = value`
//! assignments. This module locates that file and evaluates its variables.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::builder::errors::{Result, ToolchainError};
use crate::builder::toolchain::CommandSpec;
use crate::util::process::CommandRunner;

/// Python snippet printing the interpreter's build Makefile path.
const MAKEFILE_QUERY: &str = "import sysconfig; print(sysconfig.get_makefile_filename())";

static ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z][a-zA-Z0-9_]*)\s*=\s*(.*)$").unwrap());

/// Ask `python` where its build Makefile lives.
pub fn locate_makefile(python: &Path, runner: &dyn CommandRunner) -> Result<PathBuf> {
    let cmd = CommandSpec::new(python).args(["-c", MAKEFILE_QUERY]);
    let output = runner.run(&cmd).map_err(|e| {
        ToolchainError::discovery(format!("could not query `{}`: {}", cmd.display(), e))
    })?;

    if !output.success() {
        return Err(ToolchainError::discovery(format!(
            "`{}` could not report its build configuration: {}",
            cmd.display(),
            output.stderr.trim()
        )));
    }

    let path = output.stdout.trim();
    if path.is_empty() {
        return Err(ToolchainError::discovery(format!(
            "`{}` printed no Makefile path",
            cmd.display()
        )));
    }

    Ok(PathBuf::from(path))
}

/// Read and evaluate a build Makefile.
pub fn read_makefile(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = std::fs::read_to_string(path).map_err(|e| ToolchainError::io(path, e))?;
    Ok(parse_makefile(&text, |name| std::env::var(name).ok()))
}

/// Parse `NAME = value` assignments and expand `$(NAME)` / `${NAME}`
/// references.
///
/// References to names the Makefile does not define fall back to `env`,
/// then to the empty string. `$$` is a literal `$`. Comments, blank lines
/// and backslash-continued lines are handled the way `make` reads them.
pub fn parse_makefile<F>(text: &str, env: F) -> BTreeMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut raw = BTreeMap::new();
    for line in logical_lines(text) {
        let line = strip_comment(&line);
        if let Some(caps) = ASSIGNMENT.captures(line.trim()) {
            raw.insert(caps[1].to_string(), caps[2].trim().to_string());
        }
    }

    let mut expanded = BTreeMap::new();
    for (name, value) in &raw {
        let mut visiting = HashSet::new();
        visiting.insert(name.as_str());
        expanded.insert(name.clone(), expand(value, &raw, &env, &mut visiting));
    }

    expanded
}

fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut continued = false;

    for line in text.lines() {
        let (body, continues) = match line.strip_suffix('\\') {
            Some(body) => (body, true),
            None => (line, false),
        };

        if continued {
            current.truncate(current.trim_end().len());
            current.push(' ');
            current.push_str(body.trim_start());
        } else {
            current = body.to_string();
        }

        if !continues {
            lines.push(std::mem::take(&mut current));
        }
        continued = continues;
    }

    if continued {
        lines.push(current);
    }

    lines
}

fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'#') => {
                out.push('#');
                chars.next();
            }
            '#' => break,
            _ => out.push(c),
        }
    }

    out
}

fn expand<'a, F>(
    value: &str,
    raw: &'a BTreeMap<String, String>,
    env: &F,
    visiting: &mut HashSet<&'a str>,
) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(stripped) = after.strip_prefix('$') {
            out.push('$');
            rest = stripped;
            continue;
        }

        let close = match after.chars().next() {
            Some('(') => ')',
            Some('{') => '}',
            _ => {
                out.push('$');
                rest = after;
                continue;
            }
        };

        let Some(end) = after.find(close) else {
            out.push_str(&rest[pos..]);
            rest = "";
            break;
        };

        let name = &after[1..end];
        out.push_str(&lookup(name, raw, env, visiting));
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn lookup<'a, F>(
    name: &str,
    raw: &'a BTreeMap<String, String>,
    env: &F,
    visiting: &mut HashSet<&'a str>,
) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match raw.get_key_value(name) {
        Some((key, value)) => {
            if !visiting.insert(key.as_str()) {
                tracing::warn!("recursive Makefile variable `{}`", name);
                return String::new();
            }
            let expanded = expand(value, raw, env, visiting);
            visiting.remove(key.as_str());
            expanded
        }
        None => env(name).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockProcessOutput, MockRunner};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_simple_assignments() {
        let vars = parse_makefile("CC = gcc -pthread\nLIBDIR=/usr/lib\n", no_env);
        assert_eq!(vars["CC"], "gcc -pthread");
        assert_eq!(vars["LIBDIR"], "/usr/lib");
    }

    #[test]
    fn test_expansion_and_escapes() {
        let text = "\
prefix = /opt/py
exec_prefix = ${prefix}
LIBDIR = $(exec_prefix)/lib
RPATH = -Wl,-rpath,$$ORIGIN
";
        let vars = parse_makefile(text, no_env);
        assert_eq!(vars["LIBDIR"], "/opt/py/lib");
        assert_eq!(vars["RPATH"], "-Wl,-rpath,$ORIGIN");
    }

    #[test]
    fn test_unknown_reference_uses_environment() {
        let vars = parse_makefile("OPT = $(EXTRA) -O2\nMORE = $(MISSING)x\n", |name| {
            (name == "EXTRA").then(|| "-g".to_string())
        });
        assert_eq!(vars["OPT"], "-g -O2");
        assert_eq!(vars["MORE"], "x");
    }

    #[test]
    fn test_comments_and_continuations() {
        let text = "\
# comment line
CFLAGS = -Wall \\
    -O3 # trailing comment
HASH = a\\#b
";
        let vars = parse_makefile(text, no_env);
        assert_eq!(vars["CFLAGS"], "-Wall -O3");
        assert_eq!(vars["HASH"], "a#b");
    }

    #[test]
    fn test_recursive_variable_terminates() {
        let vars = parse_makefile("A = $(B)\nB = x$(A)\n", no_env);
        assert_eq!(vars["A"], "x");
    }

    #[test]
    fn test_locate_makefile() {
        let mut runner = MockRunner::new();
        runner.expect_prefix(
            "python3 -c",
            MockProcessOutput::success("/usr/lib/python3.11/config-3.11/Makefile\n"),
        );

        let path = locate_makefile(Path::new("python3"), &runner).unwrap();
        assert_eq!(path, PathBuf::from("/usr/lib/python3.11/config-3.11/Makefile"));
    }

    #[test]
    fn test_locate_makefile_failure_is_discovery_error() {
        let mut runner = MockRunner::new();
        runner.set_default(MockProcessOutput::failure(1, "no module sysconfig"));

        let err = locate_makefile(Path::new("python3"), &runner).unwrap_err();
        assert!(matches!(err, ToolchainError::Discovery { .. }));
    }

    #[test]
    fn test_missing_interpreter_is_discovery_error() {
        let python = Path::new("extbuild-no-such-python-xyz");
        let err = locate_makefile(python, &crate::util::process::SystemRunner).unwrap_err();

        assert!(matches!(err, ToolchainError::Discovery { .. }));
        assert!(err.to_string().contains("extbuild-no-such-python-xyz"));
    }

    #[test]
    fn test_read_makefile_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("Makefile");
        std::fs::write(&path, "VERSION = 3.11\n").unwrap();

        let vars = read_makefile(&path).unwrap();
        assert_eq!(vars["VERSION"], "3.11");
    }
}
