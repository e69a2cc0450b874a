use super::{json_pretty, skip_prereqs, store_err, Project, EXIT_SUCCESS};
use extforge_core::{BuildMode, RunOutcome};
use extforge_runtime::{check_archive_prereqs, format_missing};
use extforge_schema::CommandId;

/// `archive`: a full build with the packaging manifests, then one archive per
/// target. The cache is reset first so nothing is skipped.
pub fn run(project: &Project, json: bool) -> Result<u8, String> {
    let _guard = project.lock(&[CommandId::build()])?;
    project.check_bundler()?;
    if !skip_prereqs() {
        let missing = check_archive_prereqs(&project.config.archive.tool);
        if !missing.is_empty() {
            return Err(format_missing(&missing));
        }
    }

    let mut pipeline = project.pipeline(BuildMode::archive(), json)?;
    let mut cache = pipeline.snapshot_cache();
    cache.reset().map_err(|e| store_err(&e))?;
    let outcome = pipeline.run(&mut cache).map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&outcome)?);
    } else if let RunOutcome::Completed { archives, .. } = &outcome {
        for path in archives {
            let shown = path.strip_prefix(&project.root).unwrap_or(path);
            println!("packaged {}", shown.display());
        }
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_packaging_field_fails_before_archiving() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("extforge.toml"),
            r#"
[bundler]
backend = "mock"

[manifest.required]
name = "T"
version = "1.0"
description = "d"

[manifest.required.icons]
16 = "i.png"

[manifest.targets.firefox]

[manifest.package.firefox.browser_specific_settings.gecko]
id = ""
"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        std::env::set_var("EXTFORGE_SKIP_PREREQS", "1");
        let project = Project::open(dir.path()).unwrap();
        let err = run(&project, true).unwrap_err();
        assert!(err.starts_with("manifest error:"), "{err}");
        assert!(!dir.path().join("release").exists());
        assert!(project.locks.holder(&CommandId::build()).unwrap().is_none());
    }
}
