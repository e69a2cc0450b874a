use crate::prereq::command_exists;
use crate::tool::check_output;
use crate::RuntimeError;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Packs one directory into one zip file.
pub trait Archiver: Send + Sync {
    fn name(&self) -> &str;

    /// Zip the contents of `in_dir` (not the directory itself) into `out_path`,
    /// replacing any existing archive.
    fn archive(&self, in_dir: &Path, out_path: &Path) -> Result<(), RuntimeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveTool {
    SevenZip,
    Zip,
}

impl ArchiveTool {
    pub fn program(self) -> &'static str {
        match self {
            Self::SevenZip => "7z",
            Self::Zip => "zip",
        }
    }
}

/// Archiving through the `7z` or `zip` command line tool.
pub struct CommandArchiver {
    tool: ArchiveTool,
}

impl CommandArchiver {
    pub fn new(tool: ArchiveTool) -> Self {
        Self { tool }
    }

    pub fn tool(&self) -> ArchiveTool {
        self.tool
    }

    fn args(&self, out_path: &Path) -> Vec<String> {
        let out = out_path.to_string_lossy().into_owned();
        match self.tool {
            // 7z expands the wildcard itself and recurses into directories.
            ArchiveTool::SevenZip => vec!["a".into(), "-tzip".into(), "-bd".into(), out, "*".into()],
            ArchiveTool::Zip => vec!["-r".into(), "-q".into(), out, ".".into()],
        }
    }
}

impl Archiver for CommandArchiver {
    fn name(&self) -> &str {
        self.tool.program()
    }

    fn archive(&self, in_dir: &Path, out_path: &Path) -> Result<(), RuntimeError> {
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::remove_file(out_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let out_path = if out_path.is_absolute() {
            out_path.to_path_buf()
        } else {
            std::env::current_dir()?.join(out_path)
        };
        let program = self.tool.program();
        let args = self.args(&out_path);
        debug!("{program} {} (in {})", args.join(" "), in_dir.display());
        let output = Command::new(program)
            .args(&args)
            .current_dir(in_dir)
            .output()
            .map_err(|source| RuntimeError::SpawnFailed {
                tool: program.to_owned(),
                source,
            })?;
        check_output(program, output)?;
        Ok(())
    }
}

/// Resolve `[archive].tool` (`auto`, `7z`, `zip`) against what is installed.
pub fn select_archiver(preference: &str) -> Result<Box<dyn Archiver>, RuntimeError> {
    let candidates: &[ArchiveTool] = match preference {
        "7z" => &[ArchiveTool::SevenZip],
        "zip" => &[ArchiveTool::Zip],
        "auto" => &[ArchiveTool::SevenZip, ArchiveTool::Zip],
        other => return Err(RuntimeError::BackendUnavailable(other.to_owned())),
    };
    candidates
        .iter()
        .copied()
        .find(|tool| command_exists(tool.program()))
        .map(|tool| Box::new(CommandArchiver::new(tool)) as Box<dyn Archiver>)
        .ok_or(RuntimeError::ArchiverUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_preference_is_rejected() {
        assert!(matches!(
            select_archiver("rar"),
            Err(RuntimeError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn zip_args_recurse_from_directory() {
        let archiver = CommandArchiver::new(ArchiveTool::Zip);
        assert_eq!(
            archiver.args(Path::new("/r/chrome/ext-v1.zip")),
            vec!["-r", "-q", "/r/chrome/ext-v1.zip", "."]
        );
    }

    #[test]
    fn seven_zip_args_select_zip_format() {
        let archiver = CommandArchiver::new(ArchiveTool::SevenZip);
        let args = archiver.args(Path::new("/out.zip"));
        assert_eq!(args[0], "a");
        assert!(args.contains(&"-tzip".to_owned()));
    }

    #[test]
    fn archive_with_available_tool_creates_file() {
        let Ok(archiver) = select_archiver("auto") else {
            // neither 7z nor zip installed
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("chrome");
        fs::create_dir_all(input.join("popup")).unwrap();
        fs::write(input.join("manifest.json"), "{}").unwrap();
        fs::write(input.join("popup/popup.html"), "<html>").unwrap();
        let out = dir.path().join("release/chrome/ext-v1.zip");
        archiver.archive(&input, &out).unwrap();
        assert!(out.is_file());
        assert!(fs::metadata(&out).unwrap().len() > 0);
    }
}
