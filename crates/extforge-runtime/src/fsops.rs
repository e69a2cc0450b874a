//! File primitives used by the pipeline steps.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// All regular files under `root`, as sorted paths relative to `root`.
/// Anything under an `excluded` path is skipped. A missing root yields nothing.
pub fn scan_files(root: &Path, excluded: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if root.is_dir() {
        scan_recursive(root, root, excluded, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn scan_recursive(
    base: &Path,
    current: &Path,
    excluded: &[PathBuf],
    files: &mut Vec<PathBuf>,
) -> io::Result<()> {
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        if excluded.iter().any(|ex| path.starts_with(ex)) {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            scan_recursive(base, &path, excluded, files)?;
        } else if file_type.is_file() {
            files.push(path.strip_prefix(base).unwrap_or(&path).to_path_buf());
        }
    }
    Ok(())
}

/// True when the file name ends in `<suffix><extension>` for any pair,
/// e.g. `popup.module.ts` for suffix `.module` and extension `.ts`.
pub fn has_suffix(path: &Path, suffixes: &[String], extensions: &[String]) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    extensions.iter().any(|ext| {
        name.strip_suffix(ext.as_str())
            .is_some_and(|stem| suffixes.iter().any(|s| stem.ends_with(s.as_str())))
    })
}

pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let name = path.to_string_lossy();
    extensions.iter().any(|ext| name.ends_with(ext.as_str()))
}

/// Write `content` to `dest` unless it already holds exactly those bytes.
/// Returns whether a write happened.
pub fn write_if_changed(dest: &Path, content: &[u8]) -> io::Result<bool> {
    match fs::read(dest) {
        Ok(existing) if existing == content => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, content)?;
    Ok(true)
}

pub fn copy_if_changed(src: &Path, dest: &Path) -> io::Result<bool> {
    let content = fs::read(src)?;
    write_if_changed(dest, &content)
}

/// Remove `dir` with its contents and recreate it empty.
pub fn clean_directory(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}

/// Rename every file under `dir` whose name ends in a rule's `from` suffix,
/// replacing that suffix with `to`. The first matching rule wins.
/// Returns `(old, new)` pairs.
pub fn rename_by_suffix(
    dir: &Path,
    rules: &[(String, String)],
) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    let mut renamed = Vec::new();
    if rules.is_empty() {
        return Ok(renamed);
    }
    for rel in scan_files(dir, &[])? {
        let path = dir.join(&rel);
        let name = path.to_string_lossy().into_owned();
        let Some((from, to)) = rules.iter().find(|(from, _)| name.ends_with(from.as_str())) else {
            continue;
        };
        let target = PathBuf::from(format!("{}{to}", &name[..name.len() - from.len()]));
        fs::rename(&path, &target)?;
        renamed.push((path, target));
    }
    Ok(renamed)
}
