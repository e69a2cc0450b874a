use crate::RuntimeError;
use std::path::Path;
use std::process::{Command, Output};
use tracing::debug;

/// Captured output of a finished external tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Non-empty lines of stdout followed by stderr.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// Run `argv` to completion in `cwd`, failing on a non-zero exit.
pub fn run_tool(argv: &[String], cwd: &Path) -> Result<ToolOutput, RuntimeError> {
    let (program, args) = argv.split_first().ok_or(RuntimeError::EmptyCommand)?;
    debug!("running {argv:?} in {}", cwd.display());
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|source| RuntimeError::SpawnFailed {
            tool: program.clone(),
            source,
        })?;
    check_output(program, output)
}

pub(crate) fn check_output(program: &str, output: Output) -> Result<ToolOutput, RuntimeError> {
    let result = ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    if output.status.success() {
        return Ok(result);
    }
    let detail = result
        .stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no output")
        .trim()
        .to_owned();
    Err(RuntimeError::ToolFailed {
        tool: program.to_owned(),
        status: output.status.to_string(),
        detail,
    })
}
