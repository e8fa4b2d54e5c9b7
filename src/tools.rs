// External tool invocation
// Every call names its program, argv and working directory explicitly; the
// harness never changes its own current directory.

use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// One external call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Value following `flag`, e.g. the file given to `--export-json`.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// The invocation as a single shell command line.
    pub fn to_shell(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (in {})", self.to_shell(), self.cwd.display())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// stdout followed by stderr, the way `2>&1` would interleave a tool
    /// that writes its report to one stream only.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        text.push_str(&self.stderr);
        text
    }
}

/// Something that can execute an [`Invocation`] and wait for it.
pub trait ToolRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<ToolOutput>;
}

/// Runs invocations as real child processes. Blocks with no timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<ToolOutput> {
        debug!("exec: {invocation}");
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| Error::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Locate `name` on PATH.
pub fn find_tool(name: &str) -> Option<String> {
    Command::new("which")
        .arg(name)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}

/// Fail on the first tool that is not installed.
pub fn preflight<'a>(tools: impl IntoIterator<Item = &'a str>) -> Result<()> {
    for tool in tools {
        match find_tool(tool) {
            Some(path) => debug!("found {tool} at {path}"),
            None => return Err(Error::ToolNotFound(tool.to_string())),
        }
    }
    Ok(())
}

/// Quote `arg` for a POSIX shell. Plain words pass through untouched.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=+:,@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("-O3"), "-O3");
        assert_eq!(shell_quote("/tmp/a b/c.c"), "'/tmp/a b/c.c'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_to_shell_joins_quoted_args() {
        let inv = Invocation::new("clang-21", "/work")
            .args(["-O3", "-ffast-math"])
            .arg("/src dir/main.c");
        assert_eq!(inv.to_shell(), "clang-21 -O3 -ffast-math '/src dir/main.c'");
    }

    #[test]
    fn test_flag_value() {
        let inv = Invocation::new("hyperfine", "/")
            .args(["--runs", "2", "--export-json", "/tmp/result_2_ex7.json"]);
        assert_eq!(inv.flag_value("--export-json"), Some("/tmp/result_2_ex7.json"));
        assert_eq!(inv.flag_value("--warmup"), None);
    }

    #[test]
    fn test_combined_output_order() {
        let out = ToolOutput {
            success: true,
            code: Some(0),
            stdout: "out\n".into(),
            stderr: "err\n".into(),
        };
        assert_eq!(out.combined(), "out\nerr\n");
    }

    #[test]
    fn test_system_runner_reports_spawn_failure() {
        let inv = Invocation::new("definitely-not-a-real-tool-4242", std::env::temp_dir());
        assert!(matches!(SystemRunner.run(&inv), Err(Error::Spawn { .. })));
    }
}
