//! File naming for packaged archives.

/// `<snake(name)>-v<version>.zip`, made safe for every common filesystem.
pub fn archive_file_name(name: &str, version: &str) -> String {
    sanitize_file_name(&format!("{}-v{version}.zip", to_snake_case(name)))
}

/// Lowercase words joined by `_`. Word boundaries are non-alphanumeric runs
/// and lower-to-upper case transitions (`MyAddon` → `my_addon`).
pub fn to_snake_case(input: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && prev_lower && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = ch.is_lowercase() || ch.is_numeric();
            current.extend(ch.to_lowercase());
        } else {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words.join("_")
}

/// Replace characters that are reserved on Windows or control characters with `_`.
/// Trailing dots and spaces are trimmed.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "_".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_splits_on_spaces_and_case() {
        assert_eq!(to_snake_case("Browser Extension"), "browser_extension");
        assert_eq!(to_snake_case("MyAddon"), "my_addon");
        assert_eq!(to_snake_case("tab-manager 2"), "tab_manager_2");
        assert_eq!(to_snake_case("  --  "), "");
    }

    #[test]
    fn archive_name_has_version_suffix() {
        assert_eq!(
            archive_file_name("Browser Extension", "1.2.0"),
            "browser_extension-v1.2.0.zip"
        );
    }

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_file_name("a/b:c?.zip"), "a_b_c_.zip");
        assert_eq!(sanitize_file_name("name. "), "name");
        assert_eq!(sanitize_file_name("..."), "_");
    }

    #[test]
    fn archive_name_is_filesystem_safe() {
        let name = archive_file_name("Weird: Name / Here", "1.0");
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
        assert!(name.ends_with("-v1.0.zip"));
    }
}
