use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    pub config: &'static str,
}

pub const BUILTIN_PRESETS: &[Preset] = &[
    Preset {
        name: "extension",
        description: "Manifest V3 extension for chrome and firefox with popup, content script, and background module",
        config: r#"[project]
src_dir = "src"
out_dir = "build"
pkg_dir = "release"

[bundler]
command = ["esbuild", "--bundle"]

[format]
command = []

[rename]

# Do not remove any of these, they are required by addon stores.
[manifest.required]
manifest_version = 3
name = "Browser Extension"
version = "0.0.0"
description = "A Browser Extension"

[manifest.required.icons]
16 = "assets/icon16.png"
48 = "assets/icon48.png"
128 = "assets/icon128.png"

# Optional keys that should work on each target browser.
[manifest.optional]
permissions = []
host_permissions = []
web_accessible_resources = []

[manifest.optional.content_security_policy]
extension_pages = "script-src 'self' 'wasm-unsafe-eval'; object-src 'self';"

[manifest.optional.action]
default_popup = "popup/popup.html"

[manifest.optional.action.default_icon]
16 = "assets/icon16.png"
48 = "assets/icon48.png"
128 = "assets/icon128.png"

[[manifest.optional.content_scripts]]
matches = ["*://example.com/*"]
js = ["content_scripts/content.script.js"]
run_at = "document_start"

# Optional keys per target browser.
[manifest.targets.chrome]
minimum_chrome_version = "120"

[manifest.targets.chrome.background]
service_worker = "background.module.js"
type = "module"

[manifest.targets.firefox.background]
scripts = ["background.module.js"]
type = "module"

[manifest.targets.firefox.browser_specific_settings.gecko]
strict_min_version = "120.0"

[manifest.targets.firefox.browser_specific_settings.gecko_android]

# Keys only included in the packaged addon. Manifest V3 addons need an
# add-on id before they can be submitted to AMO.
[manifest.package.firefox.browser_specific_settings.gecko]
id = ""
"#,
    },
    Preset {
        name: "minimal",
        description: "Single chrome target with the required manifest keys only",
        config: r#"[manifest.required]
manifest_version = 3
name = "Extension"
version = "0.1.0"
description = "An extension"

[manifest.required.icons]
128 = "icon128.png"

[manifest.targets.chrome]
"#,
    },
];

pub fn get_preset(name: &str) -> Option<&'static Preset> {
    BUILTIN_PRESETS.iter().find(|p| p.name == name)
}

pub fn list_presets() -> &'static [Preset] {
    BUILTIN_PRESETS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::ManifestLayers;
    use crate::project::parse_project_str;
    use crate::synth::Synthesizer;
    use crate::types::TargetName;

    #[test]
    fn all_presets_parse_and_validate() {
        for preset in BUILTIN_PRESETS {
            let config = parse_project_str(preset.config)
                .unwrap_or_else(|e| panic!("preset '{}' failed to parse: {e}", preset.name));
            config
                .validate()
                .unwrap_or_else(|e| panic!("preset '{}' failed to validate: {e}", preset.name));
        }
    }

    #[test]
    fn extension_preset_synthesizes_both_targets() {
        let config = parse_project_str(get_preset("extension").unwrap().config).unwrap();
        let synth = Synthesizer::new(ManifestLayers::from_section(&config.manifest));
        assert_eq!(
            synth.targets(),
            vec![TargetName::new("chrome"), TargetName::new("firefox")]
        );
        let chrome = synth.synthesize(&TargetName::new("chrome")).unwrap();
        assert_eq!(chrome.manifest["background"]["type"], "module");
        assert!(chrome.manifest["content_scripts"].is_array());
    }

    #[test]
    fn extension_preset_cannot_be_packaged_for_firefox_without_id() {
        let config = parse_project_str(get_preset("extension").unwrap().config).unwrap();
        let synth = Synthesizer::new(ManifestLayers::from_section(&config.manifest));
        assert!(synth
            .synthesize_for_packaging(&TargetName::new("firefox"))
            .is_err());
        assert!(synth
            .synthesize_for_packaging(&TargetName::new("chrome"))
            .is_ok());
    }

    #[test]
    fn get_unknown_preset_returns_none() {
        assert!(get_preset("nonexistent").is_none());
    }

    #[test]
    fn list_presets_returns_all() {
        assert_eq!(list_presets().len(), BUILTIN_PRESETS.len());
    }
}
