use super::format::run_section;
use super::{json_pretty, Project, EXIT_SUCCESS};

pub fn run(project: &Project, json: bool) -> Result<u8, String> {
    let ran = run_section(project, &project.config.assets, "assets", json)?;
    if json {
        let payload = serde_json::json!({
            "command": "assets",
            "status": if ran { "ran" } else { "not_configured" },
        });
        println!("{}", json_pretty(&payload)?);
    } else if !ran {
        println!("no asset generator configured (set [assets].command in extforge.toml)");
    }
    Ok(EXIT_SUCCESS)
}
