use crate::bundler::{BundleFormat, BundleJob, Bundler};
use crate::fsops::write_if_changed;
use crate::RuntimeError;
use std::fs;
use std::sync::Mutex;

/// In-process bundler for tests and offline projects: copies each entry to
/// its output path unchanged and records the jobs it saw. Outputs are only
/// rewritten when their content changes.
#[derive(Default)]
pub struct MockBundler {
    jobs: Mutex<Vec<BundleJob>>,
}

impl MockBundler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<BundleJob> {
        self.jobs.lock().map(|j| j.clone()).unwrap_or_default()
    }
}

impl Bundler for MockBundler {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn bundle(&self, job: &BundleJob) -> Result<Vec<String>, RuntimeError> {
        self.jobs
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))?
            .push(job.clone());

        let source = fs::read_to_string(&job.entry)?;
        fs::create_dir_all(&job.out_dir)?;
        let output = job.output_path();
        let body = match job.format {
            BundleFormat::Module => source,
            BundleFormat::Iife => format!("(() => {{\n{source}\n}})();\n"),
        };
        write_if_changed(&output, body.as_bytes())?;
        Ok(vec![format!("mock: {}", output.display())])
    }
}
