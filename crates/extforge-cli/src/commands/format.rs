use super::{json_pretty, spin_fail, spin_ok, spinner, Project, EXIT_SUCCESS};
use extforge_runtime::{run_tool, stderr_is_terminal};
use extforge_schema::{CommandId, ToolSection};
use tracing::debug;

/// Run `[format].command` under the `format` lock. Returns whether a command
/// was configured.
pub fn run_formatter(project: &Project, quiet: bool) -> Result<bool, String> {
    let _guard = project.lock(&[CommandId::format()])?;
    run_section(project, &project.config.format, "format", quiet)
}

/// Run one optional `[section].command` in the project root, printing its
/// output unless `quiet`.
pub(super) fn run_section(
    project: &Project,
    section: &ToolSection,
    name: &str,
    quiet: bool,
) -> Result<bool, String> {
    if !section.is_configured() {
        debug!("no [{name}].command configured");
        return Ok(false);
    }
    let pb = (!quiet && stderr_is_terminal()).then(|| spinner(&format!("running {name}...")));
    match run_tool(&section.command, &project.root) {
        Ok(output) => {
            if let Some(pb) = &pb {
                spin_ok(pb, &format!("{name} finished"));
            }
            if !quiet {
                for line in output.lines() {
                    eprintln!("{line}");
                }
            }
            Ok(true)
        }
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, &format!("{name} failed"));
            }
            Err(format!("runtime error: {e}"))
        }
    }
}

pub fn run(project: &Project, json: bool) -> Result<u8, String> {
    let ran = run_formatter(project, json)?;
    if json {
        let payload = serde_json::json!({
            "command": "format",
            "status": if ran { "ran" } else { "not_configured" },
        });
        println!("{}", json_pretty(&payload)?);
    } else if !ran {
        println!("no formatter configured (set [format].command in extforge.toml)");
    }
    Ok(EXIT_SUCCESS)
}
