use crate::bundler::{BundleJob, Bundler};
use crate::tool::check_output;
use crate::RuntimeError;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// Drives an esbuild-compatible command line:
/// `<command...> <entry> --outdir=<dir> --format=<esm|iife> [--external:<p>]... [--sourcemap=inline]`.
pub struct CommandBundler {
    command: Vec<String>,
    watch_args: Vec<String>,
    cwd: PathBuf,
    name: String,
}

impl CommandBundler {
    pub fn new(
        command: Vec<String>,
        watch_args: Vec<String>,
        cwd: impl AsRef<Path>,
    ) -> Result<Self, RuntimeError> {
        let program = command.first().ok_or(RuntimeError::EmptyCommand)?;
        let name = Path::new(program)
            .file_name()
            .map_or_else(|| program.clone(), |n| n.to_string_lossy().into_owned());
        Ok(Self {
            command,
            watch_args,
            cwd: cwd.as_ref().to_path_buf(),
            name,
        })
    }

    pub fn program(&self) -> &str {
        &self.command[0]
    }

    pub fn args_for(&self, job: &BundleJob, watch: bool) -> Vec<String> {
        let mut args: Vec<String> = self.command[1..].to_vec();
        args.push(job.entry.to_string_lossy().into_owned());
        args.push(format!("--outdir={}", job.out_dir.display()));
        args.push(format!("--format={}", job.format.as_str()));
        for pattern in &job.externals {
            args.push(format!("--external:{pattern}"));
        }
        if job.sourcemap {
            args.push("--sourcemap=inline".to_owned());
        }
        if watch {
            args.extend(self.watch_args.iter().cloned());
        }
        args
    }
}

impl Bundler for CommandBundler {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        crate::prereq::command_exists(self.program())
    }

    fn bundle(&self, job: &BundleJob) -> Result<Vec<String>, RuntimeError> {
        let args = self.args_for(job, false);
        debug!("{} {}", self.program(), args.join(" "));
        let output = Command::new(self.program())
            .args(&args)
            .current_dir(&self.cwd)
            .output()
            .map_err(|source| RuntimeError::SpawnFailed {
                tool: self.name.clone(),
                source,
            })?;
        Ok(check_output(&self.name, output)?.lines())
    }

    fn watch(&self, job: &BundleJob) -> Result<Option<Child>, RuntimeError> {
        let args = self.args_for(job, true);
        debug!("watch: {} {}", self.program(), args.join(" "));
        let child = Command::new(self.program())
            .args(&args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| RuntimeError::SpawnFailed {
                tool: self.name.clone(),
                source,
            })?;
        Ok(Some(child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::BundleFormat;

    fn job() -> BundleJob {
        BundleJob {
            entry: PathBuf::from("src/background.module.ts"),
            out_dir: PathBuf::from("build_temp"),
            format: BundleFormat::Module,
            externals: vec!["*.module.js".to_owned()],
            sourcemap: true,
        }
    }

    fn bundler(command: &[&str]) -> CommandBundler {
        CommandBundler::new(
            command.iter().map(|s| (*s).to_owned()).collect(),
            vec!["--watch=forever".to_owned()],
            "/tmp",
        )
        .unwrap()
    }

    #[test]
    fn argv_follows_job() {
        let b = bundler(&["esbuild", "--bundle"]);
        assert_eq!(
            b.args_for(&job(), false),
            vec![
                "--bundle",
                "src/background.module.ts",
                "--outdir=build_temp",
                "--format=esm",
                "--external:*.module.js",
                "--sourcemap=inline",
            ]
        );
    }

    #[test]
    fn watch_argv_appends_watch_args() {
        let b = bundler(&["esbuild", "--bundle"]);
        assert_eq!(
            b.args_for(&job(), true).last().map(String::as_str),
            Some("--watch=forever")
        );
    }

    #[test]
    fn name_is_program_file_name() {
        assert_eq!(bundler(&["/usr/local/bin/esbuild"]).name(), "esbuild");
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandBundler::new(vec![], vec![], "/tmp").is_err());
    }

    #[test]
    fn failing_bundler_surfaces_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let b = CommandBundler::new(
            vec!["sh".to_owned(), "-c".to_owned(), "echo nope >&2; exit 1".to_owned(), "sh".to_owned()],
            vec![],
            dir.path(),
        )
        .unwrap();
        assert!(matches!(
            b.bundle(&job()),
            Err(RuntimeError::ToolFailed { detail, .. }) if detail == "nope"
        ));
    }
}
