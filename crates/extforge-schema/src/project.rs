use crate::types::TargetName;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name of the project configuration, looked up in the project root.
pub const CONFIG_FILE: &str = "extforge.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read project config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse project config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unknown bundler backend '{0}' (expected: command, mock)")]
    UnknownBackend(String),
    #[error("unknown archive tool '{0}' (expected: auto, 7z, zip)")]
    UnknownArchiveTool(String),
    #[error("[{0}].command must not be empty")]
    EmptyCommand(&'static str),
    #[error("rename rule has an empty suffix")]
    EmptyRename,
    #[error("manifest declares no targets (add a [manifest.targets.<name>] table)")]
    NoTargets,
}

/// Parsed `extforge.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub bundler: BundlerSection,
    #[serde(default)]
    pub format: ToolSection,
    #[serde(default)]
    pub assets: ToolSection,
    #[serde(default)]
    pub archive: ArchiveSection,
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    #[serde(default)]
    pub manifest: ManifestSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    #[serde(default = "default_src_dir")]
    pub src_dir: String,
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    #[serde(default = "default_pkg_dir")]
    pub pkg_dir: String,
    /// Relative to `src_dir`. Library code is bundled through imports only.
    #[serde(default = "default_lib_dir")]
    pub lib_dir: String,
    #[serde(default)]
    pub tmp_dir: Option<String>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            src_dir: default_src_dir(),
            out_dir: default_out_dir(),
            pkg_dir: default_pkg_dir(),
            lib_dir: default_lib_dir(),
            tmp_dir: None,
            cache_dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BundlerSection {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_bundler_command")]
    pub command: Vec<String>,
    #[serde(default = "default_watch_args")]
    pub watch_args: Vec<String>,
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
    #[serde(default = "default_module_suffixes")]
    pub module_suffixes: Vec<String>,
    #[serde(default = "default_script_suffixes")]
    pub script_suffixes: Vec<String>,
}

impl Default for BundlerSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            command: default_bundler_command(),
            watch_args: default_watch_args(),
            source_extensions: default_source_extensions(),
            module_suffixes: default_module_suffixes(),
            script_suffixes: default_script_suffixes(),
        }
    }
}

/// An optional external tool invocation (`[format]`, `[assets]`).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ToolSection {
    #[serde(default)]
    pub command: Vec<String>,
}

impl ToolSection {
    pub fn is_configured(&self) -> bool {
        !self.command.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSection {
    #[serde(default = "default_archive_tool")]
    pub tool: String,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        Self {
            tool: default_archive_tool(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    /// Delay between the interrupt byte and the first liveness check.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Upper bound on waiting for a graceful exit before the child is killed.
    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,
    /// How often the watch worker checks whether it was asked to stop.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Debounce timeout of the file watcher.
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            kill_timeout_ms: default_kill_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            quiet_period_ms: default_quiet_period_ms(),
        }
    }
}

impl WatchSection {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

/// Raw manifest layers as written in `[manifest.*]` tables.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ManifestSection {
    #[serde(default)]
    pub required: Map<String, Value>,
    #[serde(default)]
    pub optional: Map<String, Value>,
    #[serde(default)]
    pub targets: BTreeMap<String, Map<String, Value>>,
    #[serde(default)]
    pub package: BTreeMap<String, Map<String, Value>>,
    /// Dotted paths of array fields that concatenate across layers.
    #[serde(default)]
    pub additive: Vec<String>,
}

fn default_src_dir() -> String {
    "src".to_owned()
}

fn default_out_dir() -> String {
    "build".to_owned()
}

fn default_pkg_dir() -> String {
    "release".to_owned()
}

fn default_lib_dir() -> String {
    "lib".to_owned()
}

fn default_cache_dir() -> String {
    ".extforge".to_owned()
}

fn default_backend() -> String {
    "command".to_owned()
}

fn default_bundler_command() -> Vec<String> {
    vec!["esbuild".to_owned(), "--bundle".to_owned()]
}

fn default_watch_args() -> Vec<String> {
    vec!["--watch=forever".to_owned()]
}

fn default_source_extensions() -> Vec<String> {
    vec![".ts".to_owned(), ".tsx".to_owned()]
}

fn default_module_suffixes() -> Vec<String> {
    vec![".module".to_owned()]
}

fn default_script_suffixes() -> Vec<String> {
    vec![".script".to_owned()]
}

fn default_archive_tool() -> String {
    "auto".to_owned()
}

fn default_grace_period_ms() -> u64 {
    25
}

fn default_kill_timeout_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_quiet_period_ms() -> u64 {
    200
}

impl ProjectConfig {
    /// Load and validate `extforge.toml` from a project root.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let config = parse_project_file(root.join(CONFIG_FILE))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.bundler.backend.as_str() {
            "command" => {
                if self.bundler.command.is_empty() {
                    return Err(ConfigError::EmptyCommand("bundler"));
                }
            }
            "mock" => {}
            other => return Err(ConfigError::UnknownBackend(other.to_owned())),
        }
        if !matches!(self.archive.tool.as_str(), "auto" | "7z" | "zip") {
            return Err(ConfigError::UnknownArchiveTool(self.archive.tool.clone()));
        }
        if self
            .rename
            .iter()
            .any(|(from, to)| from.is_empty() || to.is_empty())
        {
            return Err(ConfigError::EmptyRename);
        }
        if self.targets().is_empty() {
            return Err(ConfigError::NoTargets);
        }
        Ok(())
    }

    /// All targets named by either the per-target or the packaging layers.
    pub fn targets(&self) -> Vec<TargetName> {
        let mut names: Vec<TargetName> = self
            .manifest
            .targets
            .keys()
            .chain(self.manifest.package.keys())
            .map(|k| TargetName::new(k.as_str()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Rename rules sorted longest suffix first so that `.user.js` wins over `.js`.
    pub fn rename_rules(&self) -> Vec<(String, String)> {
        let mut rules: Vec<(String, String)> = self
            .rename
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        rules
    }
}

/// Absolute directory layout of one project, resolved against its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub src_dir: PathBuf,
    pub lib_dir: PathBuf,
    pub out_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub pkg_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl ProjectPaths {
    pub fn resolve(root: &Path, config: &ProjectConfig) -> Self {
        let section = &config.project;
        let src_dir = root.join(&section.src_dir);
        let tmp_dir = match &section.tmp_dir {
            Some(dir) => root.join(dir),
            None => root.join(format!("{}_temp", section.out_dir.trim_end_matches('/'))),
        };
        Self {
            root: root.to_path_buf(),
            config_file: root.join(CONFIG_FILE),
            lib_dir: src_dir.join(&section.lib_dir),
            src_dir,
            out_dir: root.join(&section.out_dir),
            tmp_dir,
            pkg_dir: root.join(&section.pkg_dir),
            cache_dir: root.join(&section.cache_dir),
        }
    }

    pub fn target_out_dir(&self, target: &TargetName) -> PathBuf {
        self.out_dir.join(target.as_str())
    }

    pub fn target_pkg_dir(&self, target: &TargetName) -> PathBuf {
        self.pkg_dir.join(target.as_str())
    }
}

pub fn parse_project_str(input: &str) -> Result<ProjectConfig, ConfigError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_project_file(path: impl AsRef<Path>) -> Result<ProjectConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_project_str(&content)
}
