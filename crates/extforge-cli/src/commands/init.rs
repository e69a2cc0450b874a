use super::{json_pretty, EXIT_SUCCESS};
use extforge_schema::{get_preset, list_presets, parse_project_str, CONFIG_FILE};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_atomic(dest: &Path, content: &str) -> Result<(), String> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| format!("write temp file: {e}"))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| format!("write temp file: {e}"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("fsync temp file: {e}"))?;
    tmp.persist(dest)
        .map_err(|e| format!("persist {CONFIG_FILE}: {}", e.error))?;
    Ok(())
}

/// `init`: write the chosen preset as `extforge.toml` in the project root.
pub fn run(root: &Path, preset: &str, force: bool, json: bool) -> Result<u8, String> {
    let preset = get_preset(preset).ok_or_else(|| {
        let names: Vec<&str> = list_presets().iter().map(|p| p.name).collect();
        format!("unknown preset '{preset}' (expected: {})", names.join(", "))
    })?;
    // presets are part of the binary; refuse to write one that would not load
    parse_project_str(preset.config).map_err(|e| format!("config error: preset: {e}"))?;

    let dest = root.join(CONFIG_FILE);
    if dest.exists() && !force {
        return Err(format!(
            "refusing to overwrite existing {} (pass --force)",
            dest.display()
        ));
    }
    std::fs::create_dir_all(root).map_err(|e| format!("create {}: {e}", root.display()))?;
    write_atomic(&dest, preset.config)?;

    if json {
        let payload = serde_json::json!({
            "status": "written",
            "path": dest.display().to_string(),
            "preset": preset.name,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("wrote {} ({} preset)", dest.display(), preset.name);
    }
    Ok(EXIT_SUCCESS)
}
