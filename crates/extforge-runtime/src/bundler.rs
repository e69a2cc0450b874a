use crate::RuntimeError;
use extforge_schema::BundlerSection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Child;

/// Output shape of one bundled entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleFormat {
    /// ES module; other module outputs stay external imports.
    Module,
    /// Self-contained immediately-invoked script.
    Iife,
}

impl BundleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "esm",
            Self::Iife => "iife",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleJob {
    pub entry: PathBuf,
    pub out_dir: PathBuf,
    pub format: BundleFormat,
    /// Import patterns left unresolved (`*.module.js`).
    pub externals: Vec<String>,
    pub sourcemap: bool,
}

impl BundleJob {
    /// `<out_dir>/<entry stem>.js`, e.g. `background.module.ts` → `background.module.js`.
    pub fn output_path(&self) -> PathBuf {
        let stem = self
            .entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.out_dir.join(format!("{stem}.js"))
    }
}

pub trait Bundler: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Bundle one entry point to completion. Returns the tool's non-empty output lines.
    fn bundle(&self, job: &BundleJob) -> Result<Vec<String>, RuntimeError>;

    /// Start a persistent watch over one entry point. Backends without a
    /// watch process bundle once and return `None`.
    fn watch(&self, job: &BundleJob) -> Result<Option<Child>, RuntimeError> {
        self.bundle(job)?;
        Ok(None)
    }
}

/// Construct the bundler named by `[bundler].backend`. Commands run in `root`.
pub fn select_bundler(
    section: &BundlerSection,
    root: &Path,
) -> Result<Box<dyn Bundler>, RuntimeError> {
    match section.backend.as_str() {
        "command" => Ok(Box::new(crate::command::CommandBundler::new(
            section.command.clone(),
            section.watch_args.clone(),
            root,
        )?)),
        "mock" => Ok(Box::new(crate::mock::MockBundler::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_known_backends() {
        let mut section = BundlerSection::default();
        assert_eq!(
            select_bundler(&section, Path::new("/tmp")).unwrap().name(),
            "esbuild"
        );
        section.backend = "mock".to_owned();
        assert_eq!(
            select_bundler(&section, Path::new("/tmp")).unwrap().name(),
            "mock"
        );
    }

    #[test]
    fn select_unknown_backend_fails() {
        let section = BundlerSection {
            backend: "webpack".to_owned(),
            ..BundlerSection::default()
        };
        assert!(matches!(
            select_bundler(&section, Path::new("/tmp")),
            Err(RuntimeError::BackendUnavailable(name)) if name == "webpack"
        ));
    }

    #[test]
    fn output_path_keeps_suffix() {
        let job = BundleJob {
            entry: PathBuf::from("src/background.module.ts"),
            out_dir: PathBuf::from("build_temp"),
            format: BundleFormat::Module,
            externals: vec![],
            sourcemap: false,
        };
        assert_eq!(
            job.output_path(),
            PathBuf::from("build_temp/background.module.js")
        );
    }
}
