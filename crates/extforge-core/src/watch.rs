use crate::concurrency::StopFlag;
use crate::pipeline::Pipeline;
use crate::CoreError;
use extforge_schema::CONFIG_FILE;
use extforge_store::{CacheLayout, SnapshotCache};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::fs;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The loop that runs inside the watch subprocess.
///
/// It runs the pipeline once in watch mode, then waits on a debounced file
/// watcher over the source tree, the temp directory and the project root.
/// Each event batch is gated on a snapshot cache of its own (under
/// `<cache_dir>/watch` so the build baseline is untouched): one watch pass
/// runs only when the batch changed a tracked file. Bundler output in the
/// temp directory is tracked too, so rebuilds by a bundler watch process are
/// picked up.
pub struct WatchWorker {
    pipeline: Pipeline,
    cache: SnapshotCache,
    stop_check: Duration,
    quiet_period: Duration,
}

impl WatchWorker {
    pub fn new(pipeline: Pipeline) -> Self {
        let paths = pipeline.paths().clone();
        let watch = pipeline.config().watch.clone();
        let cache = pipeline.snapshot_cache_in(
            CacheLayout::new(paths.cache_dir.join("watch")),
            std::slice::from_ref(&paths.tmp_dir),
        );
        Self {
            pipeline,
            cache,
            stop_check: watch.poll_interval(),
            quiet_period: watch.quiet_period(),
        }
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Run until `stop` is set. Failed passes are reported and the loop keeps
    /// going; the next change retries.
    pub fn run(&mut self, stop: &StopFlag) -> Result<(), CoreError> {
        self.start()?;
        let (events, _debouncer) = self.watch()?;
        info!("watching for changes");
        self.pipeline.announce("watching for changes");

        while !stop.is_set() {
            match events.recv_timeout(self.stop_check) {
                Ok(Ok(batch)) => {
                    debug!("{} paths changed", batch.len());
                    if let Err(e) = self.poll() {
                        warn!("watch pass failed: {e}");
                    }
                }
                Ok(Err(e)) => warn!("file watcher error: {e}"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("file watcher stopped");
                    break;
                }
            }
        }

        debug!("watch worker stopping");
        self.cache.unlock();
        self.pipeline.shutdown();
        Ok(())
    }

    /// Full run from an empty baseline. Everything the run wrote into the
    /// temp directory is committed with it.
    fn start(&mut self) -> Result<(), CoreError> {
        self.cache.reset()?;
        self.pipeline.run(&mut self.cache)?;
        self.cache.lock()?;
        self.cache.commit()?;
        Ok(())
    }

    /// Debounced watcher over the tracked inputs. The root is watched
    /// non-recursively so a config file replaced by rename is still seen.
    fn watch(
        &self,
    ) -> Result<(Receiver<DebounceEventResult>, Debouncer<RecommendedWatcher>), CoreError> {
        let paths = self.pipeline.paths();
        fs::create_dir_all(&paths.tmp_dir)?;

        let (tx, rx) = mpsc::channel();
        let mut debouncer = new_debouncer(self.quiet_period, tx)?;
        let watcher = debouncer.watcher();
        watcher.watch(&paths.src_dir, RecursiveMode::Recursive)?;
        watcher.watch(&paths.tmp_dir, RecursiveMode::Recursive)?;
        watcher.watch(&paths.root, RecursiveMode::NonRecursive)?;
        Ok((rx, debouncer))
    }

    /// Gate one event batch on the snapshot cache. Returns whether a pass ran.
    pub fn poll(&mut self) -> Result<bool, CoreError> {
        if !self.cache.lock()? {
            self.cache.unlock();
            return Ok(false);
        }

        let config_changed = self.cache.last_diff().is_some_and(|d| {
            d.modified
                .iter()
                .chain(&d.added)
                .any(|p| p.as_str() == CONFIG_FILE)
        });
        if let Some(diff) = self.cache.last_diff() {
            debug!("{} inputs changed", diff.total());
        }

        match self.pass(config_changed) {
            Ok(()) => {
                // the pass rewrote temp files; they must not trigger another one
                let tmp_dir = self.pipeline.paths().tmp_dir.clone();
                self.cache.absorb(tmp_dir)?;
                self.cache.commit()?;
                Ok(true)
            }
            Err(e) => {
                self.cache.unlock();
                Err(e)
            }
        }
    }

    fn pass(&mut self, config_changed: bool) -> Result<(), CoreError> {
        if config_changed {
            self.pipeline.reload_config()?;
        }
        self.pipeline.watch_pass()?;
        Ok(())
    }
}
