use super::{json_pretty, store_err, Project, EXIT_SUCCESS};
use extforge_schema::CommandId;

/// `unlock <id>`: remove a lock record by hand. A live holder is reported
/// but the record is removed anyway; that is what the command is for.
pub fn run(project: &Project, id: &str, json: bool) -> Result<u8, String> {
    let id = CommandId::new(id);
    let recorded = project.locks.is_recorded(&id).map_err(|e| store_err(&e))?;
    let holder = project.locks.holder(&id).map_err(|e| store_err(&e))?;
    project.release(&id)?;

    let (status, pid, alive) = match &holder {
        Some(record) => ("released", Some(record.pid), record.holder_alive()),
        None if recorded => ("released", None, false),
        None => ("not_held", None, false),
    };
    if json {
        let payload = serde_json::json!({
            "id": id,
            "status": status,
            "pid": pid,
            "holder_alive": alive,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        match pid {
            Some(pid) if alive => {
                println!("released '{id}' (holder pid {pid} is still running)");
            }
            Some(pid) => println!("released '{id}' (was held by pid {pid})"),
            None if recorded => println!("released '{id}' (record was unreadable)"),
            None => println!("'{id}' was not locked"),
        }
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("extforge.toml"),
            r#"
[bundler]
backend = "mock"

[manifest.targets.chrome]
"#,
        )
        .unwrap();
        let project = Project::open(dir.path()).unwrap();
        (dir, project)
    }

    #[test]
    fn unlock_removes_record() {
        let (_dir, project) = project();
        assert!(project.locks.try_acquire(&CommandId::build()).unwrap());
        run(&project, "build", true).unwrap();
        assert!(project.locks.holder(&CommandId::build()).unwrap().is_none());
    }

    #[test]
    fn unlock_clears_corrupt_record() {
        let (_dir, project) = project();
        let layout = extforge_store::CacheLayout::new(&project.paths.cache_dir);
        let path = layout.lock_path(&CommandId::dev());
        fs::write(&path, "\u{0}\u{0}truncated").unwrap();
        run(&project, "dev", true).unwrap();
        assert!(!path.exists());
        assert!(project.locks.try_acquire(&CommandId::dev()).unwrap());
    }

    #[test]
    fn unlock_of_free_id_succeeds() {
        let (_dir, project) = project();
        run(&project, "format", true).unwrap();
    }

    #[test]
    fn invalid_id_is_cache_error() {
        let (_dir, project) = project();
        let err = run(&project, "../etc", true).unwrap_err();
        assert!(err.starts_with("cache error:"));
    }
}
