//! Header dependency scanning.
//!
//! Compilers report dependencies as make rules (`out.o: a.h b.h \`), which
//! are folded back into logical lines before the prerequisites are read.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::builder::errors::{Result, ToolchainError};
use crate::builder::toolchain::Toolchain;
use crate::util::process::CommandRunner;

/// Fold backslash-continued lines into logical lines.
///
/// The backslash is dropped and the pieces are joined verbatim. A
/// continuation with no following line is kept as its own logical line.
pub fn join_continued_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending: Option<String> = None;

    for line in text.lines() {
        let (body, continues) = match line.strip_suffix('\\') {
            Some(body) => (body, true),
            None => (line, false),
        };

        let mut current = pending.take().unwrap_or_default();
        current.push_str(body);

        if continues {
            pending = Some(current);
        } else {
            lines.push(current);
        }
    }

    if let Some(dangling) = pending {
        tracing::warn!("dependency output ends in a line continuation");
        lines.push(dangling);
    }

    lines
}

/// Split a rule into tokens, with the target's colon as its own token.
fn rule_tokens(line: &str) -> Vec<&str> {
    let colon = line.char_indices().find(|&(i, c)| {
        c == ':'
            && line[i + 1..]
                .chars()
                .next()
                .map_or(true, char::is_whitespace)
    });

    match colon {
        Some((i, _)) => line[..i]
            .split_whitespace()
            .chain(std::iter::once(":"))
            .chain(line[i + 1..].split_whitespace())
            .collect(),
        None => line.split_whitespace().collect(),
    }
}

/// Collect prerequisites from compiler dependency output.
///
/// Each rule contributes everything after its target and colon. Lines that
/// are not rules (ispc's `-MMM` report lists one file per line) contribute
/// every token.
pub fn parse_dependency_output(text: &str) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();

    for line in join_continued_lines(text) {
        let tokens = rule_tokens(&line);
        let prerequisites = match tokens.iter().position(|t| *t == ":") {
            Some(colon) => &tokens[colon + 1..],
            None => &tokens[..],
        };
        deps.extend(prerequisites.iter().map(|t| t.to_string()));
    }

    deps
}

impl Toolchain {
    /// Files `files` depend on, as reported by the compiler's preprocessor.
    pub fn get_dependencies(
        &self,
        files: &[PathBuf],
        runner: &dyn CommandRunner,
    ) -> Result<BTreeSet<String>> {
        let report = if self.dependency_report_in_file(files) {
            let file = tempfile::Builder::new()
                .prefix("extbuild")
                .suffix(".d")
                .tempfile()
                .map_err(|e| ToolchainError::io(std::env::temp_dir(), e))?;
            Some(file)
        } else {
            None
        };

        let cmd = self.dependency_command(files, report.as_ref().map(|f| f.path()))?;
        let output = runner.run(&cmd)?;

        if !output.success() {
            return Err(ToolchainError::Compile {
                command: cmd.display(),
                status: output.status,
                stderr: output.stderr,
            });
        }

        let text = match &report {
            Some(file) => std::fs::read_to_string(file.path())
                .map_err(|e| ToolchainError::io(file.path(), e))?,
            None => output.stdout,
        };

        Ok(parse_dependency_output(&text))
    }
}
