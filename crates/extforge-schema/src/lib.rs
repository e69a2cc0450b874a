//! Project configuration, manifest layers, and manifest synthesis for extforge.
//!
//! This crate defines the schema layer: `extforge.toml` parsing
//! (`ProjectConfig`), the layered manifest model (`ConfigLayer`,
//! `ManifestLayers`), the deep merge used to combine layers, the per-target
//! `Synthesizer` with dirty tracking, archive file naming, and built-in presets.

pub mod layers;
pub mod merge;
pub mod naming;
pub mod preset;
pub mod project;
pub mod synth;
pub mod types;

pub use layers::{ConfigLayer, LayerKind, ManifestLayers};
pub use merge::{deep_merge, merge_layers};
pub use naming::{archive_file_name, sanitize_file_name, to_snake_case};
pub use preset::{get_preset, list_presets, Preset, BUILTIN_PRESETS};
pub use project::{
    parse_project_file, parse_project_str, ArchiveSection, BundlerSection, ConfigError,
    ManifestSection, ProjectConfig, ProjectPaths, ProjectSection, ToolSection, WatchSection,
    CONFIG_FILE,
};
pub use synth::{manifest_path, ManifestError, SynthesizedArtifact, Synthesizer, MANIFEST_FILE};
pub use types::{CommandId, TargetName};
