use extforge_schema::BundlerSection;
use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

/// Whether `name` resolves to an executable, either as a path or on `PATH`.
pub fn command_exists(name: &str) -> bool {
    if name.contains('/') {
        return std::path::Path::new(name).is_file();
    }
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check that the configured bundler command can be found.
/// The mock backend has no prerequisites.
pub fn check_bundler_prereqs(section: &BundlerSection) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if section.backend != "command" {
        return missing;
    }
    if let Some(program) = section.command.first() {
        if !command_exists(program) {
            missing.push(MissingPrereq {
                name: program.clone(),
                purpose: "bundling module and script entry points",
                install_hint: "npm install --save-dev esbuild, or set [bundler].command",
            });
        }
    }
    missing
}

/// Check that an archive tool matching `[archive].tool` is installed.
pub fn check_archive_prereqs(preference: &str) -> Vec<MissingPrereq> {
    let found = match preference {
        "7z" => command_exists("7z"),
        "zip" => command_exists("zip"),
        _ => command_exists("7z") || command_exists("zip"),
    };
    if found {
        return Vec::new();
    }
    let name = match preference {
        "7z" | "zip" => preference.to_owned(),
        _ => "7z or zip".to_owned(),
    };
    vec![MissingPrereq {
        name,
        purpose: "creating the release archives",
        install_hint: "apt install p7zip-full zip | dnf install p7zip zip | pacman -S 7zip zip",
    }]
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nextforge calls these tools to build and package the extension.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "zip".to_owned(),
            purpose: "archives",
            install_hint: "apt install zip",
        };
        let s = format!("{m}");
        assert!(s.contains("zip"));
        assert!(s.contains("archives"));
        assert!(s.contains("apt install zip"));
    }

    #[test]
    fn format_missing_produces_readable_output() {
        let items = vec![
            MissingPrereq {
                name: "esbuild".to_owned(),
                purpose: "bundling",
                install_hint: "npm i esbuild",
            },
            MissingPrereq {
                name: "7z or zip".to_owned(),
                purpose: "archives",
                install_hint: "apt install zip",
            },
        ];
        let output = format_missing(&items);
        assert!(output.contains("missing prerequisites:"));
        assert!(output.contains("esbuild"));
        assert!(output.contains("7z or zip"));
    }

    #[test]
    fn mock_bundler_needs_nothing() {
        let section = BundlerSection {
            backend: "mock".to_owned(),
            command: vec!["definitely-not-installed".to_owned()],
            ..BundlerSection::default()
        };
        assert!(check_bundler_prereqs(&section).is_empty());
    }

    #[test]
    fn missing_bundler_command_is_reported() {
        let section = BundlerSection {
            command: vec!["extforge-no-such-bundler".to_owned()],
            ..BundlerSection::default()
        };
        let missing = check_bundler_prereqs(&section);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "extforge-no-such-bundler");
    }

    #[test]
    fn shell_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("extforge-no-such-tool"));
    }
}
