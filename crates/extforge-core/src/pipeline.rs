use crate::events::{Broadcast, LogSink, PipelineEvent};
use crate::CoreError;
use extforge_runtime::fsops::{
    clean_directory, copy_if_changed, has_extension, has_suffix, rename_by_suffix, scan_files,
    write_if_changed,
};
use extforge_runtime::preprocess::{IifeWrapper, ImportRewriter};
use extforge_runtime::{select_archiver, select_bundler, Archiver, BundleFormat, BundleJob, Bundler};
use extforge_schema::{
    archive_file_name, parse_project_file, ManifestLayers, ProjectConfig, ProjectPaths,
    SynthesizedArtifact, Synthesizer, TargetName,
};
use extforge_store::{CacheLayout, SnapshotCache};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use tracing::{debug, info, warn};

/// The build steps, in their one fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Clean,
    SetupBundler,
    ProcessMarkup,
    Copy,
    Manifest,
    Rename,
    Archive,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Clean,
        Step::SetupBundler,
        Step::ProcessMarkup,
        Step::Copy,
        Step::Manifest,
        Step::Rename,
        Step::Archive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::SetupBundler => "setup-bundler",
            Self::ProcessMarkup => "process-markup",
            Self::Copy => "copy",
            Self::Manifest => "manifest",
            Self::Rename => "rename",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Switches that shape one pipeline instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildMode {
    /// Use the packaging manifest variant and run the archive step.
    pub archive: bool,
    /// Suppress progress lines; step events are still sent.
    pub silent: bool,
    /// Start persistent bundler watches and keep them after `run` returns.
    pub watch: bool,
    /// Run the clean step at the start of a gated run.
    pub clean: bool,
}

impl BuildMode {
    pub fn build() -> Self {
        Self {
            clean: true,
            ..Self::default()
        }
    }

    pub fn archive() -> Self {
        Self {
            archive: true,
            clean: true,
            ..Self::default()
        }
    }

    pub fn watch() -> Self {
        Self {
            watch: true,
            clean: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Completed {
        steps: Vec<Step>,
        files_copied: usize,
        manifests_written: Vec<TargetName>,
        archives: Vec<PathBuf>,
    },
    Skipped {
        reason: String,
    },
}

impl RunOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

#[derive(Debug, Default)]
struct RunReport {
    steps: Vec<Step>,
    files_copied: usize,
    manifests_written: Vec<TargetName>,
    archives: Vec<PathBuf>,
}

impl RunReport {
    fn into_outcome(self) -> RunOutcome {
        RunOutcome::Completed {
            steps: self.steps,
            files_copied: self.files_copied,
            manifests_written: self.manifests_written,
            archives: self.archives,
        }
    }
}

/// The ordered build sequence for one project.
///
/// Build-mode switches and subscribers belong to the instance, so several
/// pipelines can coexist in one process. Bundler watch processes started in
/// watch mode are owned here and stopped by [`shutdown`](Self::shutdown) or drop.
pub struct Pipeline {
    config: ProjectConfig,
    paths: ProjectPaths,
    mode: BuildMode,
    bundler: Box<dyn Bundler>,
    archiver: Option<Box<dyn Archiver>>,
    synth: Synthesizer,
    broadcast: Broadcast,
    watchers: Vec<Child>,
    /// The bundler backend has no watch process; watch passes re-bundle instead.
    rebundle_on_pass: bool,
    report: RunReport,
}

impl Pipeline {
    /// Pipeline for the project at `root`, with the bundler named in the config.
    pub fn new(root: &Path, config: ProjectConfig, mode: BuildMode) -> Result<Self, CoreError> {
        let bundler = select_bundler(&config.bundler, root)?;
        Ok(Self::with_bundler(root, config, mode, bundler))
    }

    pub fn with_bundler(
        root: &Path,
        config: ProjectConfig,
        mode: BuildMode,
        bundler: Box<dyn Bundler>,
    ) -> Self {
        let paths = ProjectPaths::resolve(root, &config);
        let synth = Synthesizer::new(ManifestLayers::from_section(&config.manifest));
        Self {
            config,
            paths,
            mode,
            bundler,
            archiver: None,
            synth,
            broadcast: Broadcast::new(),
            watchers: Vec::new(),
            rebundle_on_pass: false,
            report: RunReport::default(),
        }
    }

    /// Use `archiver` instead of resolving `[archive].tool` at the archive step.
    #[must_use]
    pub fn with_archiver(mut self, archiver: Box<dyn Archiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn subscribe(&mut self, sink: Box<dyn LogSink>) {
        self.broadcast.subscribe(sink);
    }

    /// Snapshot cache over this project's inputs: the source tree and the
    /// project config. Output, temp, package, and cache directories are excluded.
    pub fn snapshot_cache(&self) -> SnapshotCache {
        self.snapshot_cache_in(CacheLayout::new(&self.paths.cache_dir), &[])
    }

    pub(crate) fn snapshot_cache_in(&self, layout: CacheLayout, extra: &[PathBuf]) -> SnapshotCache {
        let mut tracked = vec![self.paths.src_dir.clone(), self.paths.config_file.clone()];
        tracked.extend(extra.iter().cloned());
        SnapshotCache::new(layout, &self.paths.root, tracked)
            .exclude(&self.paths.out_dir)
            .exclude(&self.paths.pkg_dir)
            .exclude(&self.paths.cache_dir)
    }

    /// Gate on the cache, then run every step in order.
    ///
    /// When the cache reports no changes nothing runs (not even clean), the
    /// pending snapshot is discarded, and a `Skipped` event is sent. A clean
    /// requested through [`BuildMode::clean`] is therefore skipped too and the
    /// previous outputs stay in place; call [`Pipeline::clean`] to clean
    /// regardless of the gate. On
    /// success the pending snapshot is committed; on failure it is discarded
    /// and outputs written so far are left in place.
    pub fn run(&mut self, cache: &mut SnapshotCache) -> Result<RunOutcome, CoreError> {
        if !cache.lock()? {
            cache.unlock();
            let reason = "no changes since the last build".to_owned();
            info!("{reason}");
            self.broadcast.send(&PipelineEvent::Skipped {
                reason: reason.clone(),
            });
            return Ok(RunOutcome::Skipped { reason });
        }
        if let Some(diff) = cache.last_diff() {
            debug!(
                "{} changed inputs: {:?} {:?} {:?}",
                diff.total(),
                diff.added,
                diff.modified,
                diff.removed
            );
        }

        self.report = RunReport::default();
        match self.run_gated(cache) {
            Ok(()) => {
                cache.commit()?;
                Ok(std::mem::take(&mut self.report).into_outcome())
            }
            Err(e) => {
                cache.unlock();
                Err(e)
            }
        }
    }

    fn run_gated(&mut self, cache: &mut SnapshotCache) -> Result<(), CoreError> {
        if self.mode.clean {
            self.clean_step(cache)?;
        }
        for step in [
            Step::SetupBundler,
            Step::ProcessMarkup,
            Step::Copy,
            Step::Manifest,
            Step::Rename,
        ] {
            self.run_step(step)?;
        }
        if self.mode.archive {
            self.run_step(Step::Archive)?;
        }
        Ok(())
    }

    /// Run the clean step on its own. The cache is always reset afterwards so
    /// the next run is never compared against deleted outputs.
    pub fn clean(&mut self, cache: &mut SnapshotCache) -> Result<(), CoreError> {
        self.clean_step(cache)
    }

    fn clean_step(&mut self, cache: &mut SnapshotCache) -> Result<(), CoreError> {
        self.run_step(Step::Clean)?;
        cache.reset()?;
        Ok(())
    }

    /// One incremental pass after a change in watch mode: markup, copy,
    /// manifest, and rename. Never cleans.
    pub fn watch_pass(&mut self) -> Result<RunOutcome, CoreError> {
        self.report = RunReport::default();
        if self.rebundle_on_pass {
            self.run_step(Step::SetupBundler)?;
        }
        for step in [Step::ProcessMarkup, Step::Copy, Step::Manifest, Step::Rename] {
            self.run_step(step)?;
        }
        Ok(std::mem::take(&mut self.report).into_outcome())
    }

    /// Re-read the manifest layers and rename rules from the project config.
    /// Other sections only take effect on restart.
    pub fn reload_config(&mut self) -> Result<(), CoreError> {
        let fresh = parse_project_file(&self.paths.config_file)?;
        fresh.validate()?;
        self.synth
            .replace_layers(ManifestLayers::from_section(&fresh.manifest));
        self.config.manifest = fresh.manifest;
        self.config.rename = fresh.rename;
        self.log("config: reloaded");
        Ok(())
    }

    /// Stop every bundler watch process this pipeline started.
    pub fn shutdown(&mut self) {
        for mut child in self.watchers.drain(..) {
            debug!("stopping bundler watch pid {}", child.id());
            if let Err(e) = child.kill() {
                debug!("bundler watch already gone: {e}");
            }
            let _ = child.wait();
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    fn run_step(&mut self, step: Step) -> Result<(), CoreError> {
        debug!("step {step}");
        self.broadcast.send(&PipelineEvent::StepStarted { step });
        let result = match step {
            Step::Clean => self.step_clean(),
            Step::SetupBundler => self.step_setup_bundler(),
            Step::ProcessMarkup => self.step_process_markup(),
            Step::Copy => self.step_copy(),
            Step::Manifest => self.step_manifest(),
            Step::Rename => self.step_rename(),
            Step::Archive => self.step_archive(),
        };
        match result {
            Ok(()) => {
                self.report.steps.push(step);
                self.broadcast.send(&PipelineEvent::StepFinished { step });
                Ok(())
            }
            Err(e) => {
                warn!("step {step} failed: {e}");
                self.broadcast.send(&PipelineEvent::StepFailed {
                    step,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Send one progress line to the subscribers (suppressed when silent).
    pub fn announce(&mut self, line: &str) {
        self.log(line);
    }

    fn log(&mut self, line: impl Into<String>) {
        if !self.mode.silent {
            self.broadcast.send(&PipelineEvent::log(line));
        }
    }

    fn step_clean(&mut self) -> Result<(), CoreError> {
        self.shutdown();
        self.synth.invalidate();
        clean_directory(&self.paths.out_dir)?;
        clean_directory(&self.paths.tmp_dir)?;
        Ok(())
    }

    fn source_files(&self) -> Result<Vec<PathBuf>, CoreError> {
        Ok(scan_files(
            &self.paths.src_dir,
            std::slice::from_ref(&self.paths.lib_dir),
        )?)
    }

    fn bundle_jobs(&self) -> Result<Vec<BundleJob>, CoreError> {
        let section = &self.config.bundler;
        let externals: Vec<String> = section
            .module_suffixes
            .iter()
            .map(|s| format!("*{s}.js"))
            .collect();
        let mut jobs = Vec::new();
        for rel in self.source_files()? {
            let format = if has_suffix(&rel, &section.module_suffixes, &section.source_extensions) {
                BundleFormat::Module
            } else if has_suffix(&rel, &section.script_suffixes, &section.source_extensions) {
                BundleFormat::Iife
            } else {
                continue;
            };
            let out_dir = match rel.parent() {
                Some(parent) => self.paths.tmp_dir.join(parent),
                None => self.paths.tmp_dir.clone(),
            };
            jobs.push(BundleJob {
                entry: self.paths.src_dir.join(&rel),
                out_dir,
                format,
                externals: if format == BundleFormat::Module {
                    externals.clone()
                } else {
                    Vec::new()
                },
                sourcemap: self.mode.watch,
            });
        }
        Ok(jobs)
    }

    fn step_setup_bundler(&mut self) -> Result<(), CoreError> {
        let jobs = self.bundle_jobs()?;
        debug!("{} bundle entries via {}", jobs.len(), self.bundler.name());
        for job in &jobs {
            if self.mode.watch && !self.rebundle_on_pass {
                match self.bundler.watch(job)? {
                    Some(child) => self.watchers.push(child),
                    None => self.rebundle_on_pass = true,
                }
            } else {
                let lines = self.bundler.bundle(job)?;
                for line in lines {
                    self.log(format!("bund: {line}"));
                }
            }
        }
        Ok(())
    }

    fn step_process_markup(&mut self) -> Result<(), CoreError> {
        let rewriter = ImportRewriter::for_source_extensions(&self.config.bundler.source_extensions);
        let html = [".html".to_owned()];
        for rel in self.source_files()? {
            if !has_extension(&rel, &html) {
                continue;
            }
            let text = fs::read_to_string(self.paths.src_dir.join(&rel))?;
            let processed = rewriter.rewrite(&text);
            if write_if_changed(&self.paths.tmp_dir.join(&rel), processed.as_bytes())? {
                self.log(format!("html: {}", display_rel(&rel)));
            }
        }
        Ok(())
    }

    fn step_copy(&mut self) -> Result<(), CoreError> {
        let targets = self.synth.targets();
        let bundler = &self.config.bundler;
        let mut skip_exts = bundler.source_extensions.clone();
        skip_exts.push(".html".to_owned());
        let wrapper = IifeWrapper::for_script_suffixes(&bundler.script_suffixes);
        let mut copied: BTreeSet<PathBuf> = BTreeSet::new();

        for rel in self.source_files()? {
            if has_extension(&rel, &skip_exts) {
                continue;
            }
            let src = self.paths.src_dir.join(&rel);
            for target in &targets {
                if copy_if_changed(&src, &self.paths.target_out_dir(target).join(&rel))? {
                    copied.insert(rel.clone());
                }
            }
        }

        for rel in scan_files(&self.paths.tmp_dir, &[])? {
            let raw = fs::read(self.paths.tmp_dir.join(&rel))?;
            let content = if wrapper.applies_to(&rel) {
                wrapper.wrap(&String::from_utf8_lossy(&raw)).into_bytes()
            } else {
                raw
            };
            for target in &targets {
                if write_if_changed(&self.paths.target_out_dir(target).join(&rel), &content)? {
                    copied.insert(rel.clone());
                }
            }
        }

        for rel in &copied {
            self.log(format!("copy: {}", display_rel(rel)));
        }
        if !self.mode.watch {
            self.log(format!("{} files copied.", copied.len()));
        }
        self.report.files_copied += copied.len();
        Ok(())
    }

    fn synthesize(&self, target: &TargetName) -> Result<SynthesizedArtifact, CoreError> {
        Ok(if self.mode.archive {
            self.synth.synthesize_for_packaging(target)?
        } else {
            self.synth.synthesize(target)?
        })
    }

    fn step_manifest(&mut self) -> Result<(), CoreError> {
        for target in self.synth.targets() {
            let mut artifact = self.synthesize(&target)?;
            if self
                .synth
                .write_if_dirty(&mut artifact, &self.paths.out_dir)?
            {
                self.log(format!("manifest: {target}"));
                self.report.manifests_written.push(target);
            }
        }
        Ok(())
    }

    fn step_rename(&mut self) -> Result<(), CoreError> {
        let rules = self.config.rename_rules();
        for (from, _) in rename_by_suffix(&self.paths.out_dir, &rules)? {
            let rel = from.strip_prefix(&self.paths.out_dir).unwrap_or(&from).to_path_buf();
            self.log(format!("move: {}", display_rel(&rel)));
        }
        Ok(())
    }

    fn step_archive(&mut self) -> Result<(), CoreError> {
        if self.archiver.is_none() {
            self.archiver = Some(select_archiver(&self.config.archive.tool)?);
        }
        for target in self.synth.targets() {
            let artifact = self.synth.synthesize_for_packaging(&target)?;
            // validated non-empty by the synthesizer
            let name = artifact.name().unwrap_or_default();
            let version = artifact.version().unwrap_or_default();
            let out_path = self
                .paths
                .target_pkg_dir(&target)
                .join(archive_file_name(name, version));
            if let Some(archiver) = &self.archiver {
                archiver.archive(&self.paths.target_out_dir(&target), &out_path)?;
            }
            let rel = out_path
                .strip_prefix(&self.paths.root)
                .unwrap_or(&out_path)
                .to_path_buf();
            self.log(format!("archive: {}", display_rel(&rel)));
            self.report.archives.push(out_path);
        }
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn display_rel(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
