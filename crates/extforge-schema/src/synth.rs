use crate::layers::ManifestLayers;
use crate::merge::{get_path, leaf_paths, merge_layers};
use crate::types::TargetName;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// File name of the synthesized manifest inside each target's output directory.
pub const MANIFEST_FILE: &str = "manifest.json";

const REQUIRED_STRINGS: &[&str] = &["name", "version", "description"];

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest field '{0}' is missing or empty")]
    MissingField(&'static str),
    #[error("manifest version '{0}' must be 1 to 4 dot-separated integers")]
    InvalidVersion(String),
    #[error("unknown target '{0}'")]
    UnknownTarget(String),
    #[error("target '{target}' requires '{field}' to be set for packaging")]
    MissingPackagingField { target: String, field: String },
    #[error("failed to write manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The merged manifest of one target.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedArtifact {
    pub target: TargetName,
    pub manifest: Map<String, Value>,
    pub packaging: bool,
    /// True while the artifact differs from what was last written for its target.
    pub dirty: bool,
}

impl SynthesizedArtifact {
    pub fn name(&self) -> Option<&str> {
        self.manifest.get("name").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.manifest.get("version").and_then(Value::as_str)
    }

    pub fn to_json_pretty(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(&self.manifest)?)
    }
}

/// Merges manifest layers per target and remembers what was last written,
/// so unchanged manifests are not rewritten on every watch pass.
#[derive(Debug)]
pub struct Synthesizer {
    layers: ManifestLayers,
    written: HashMap<TargetName, Map<String, Value>>,
}

impl Synthesizer {
    pub fn new(layers: ManifestLayers) -> Self {
        Self {
            layers,
            written: HashMap::new(),
        }
    }

    pub fn targets(&self) -> Vec<TargetName> {
        self.layers.targets()
    }

    /// Swap in new layers (e.g. after the project config changed on disk).
    /// Last-written state is kept so identical results still skip the write.
    pub fn replace_layers(&mut self, layers: ManifestLayers) {
        self.layers = layers;
    }

    /// Forget every written artifact; the next synthesis of each target is dirty.
    pub fn invalidate(&mut self) {
        self.written.clear();
    }

    pub fn synthesize(&self, target: &TargetName) -> Result<SynthesizedArtifact, ManifestError> {
        self.build(target, false)
    }

    pub fn synthesize_for_packaging(
        &self,
        target: &TargetName,
    ) -> Result<SynthesizedArtifact, ManifestError> {
        self.build(target, true)
    }

    fn build(
        &self,
        target: &TargetName,
        packaging: bool,
    ) -> Result<SynthesizedArtifact, ManifestError> {
        if !self.layers.knows(target) {
            return Err(ManifestError::UnknownTarget(target.to_string()));
        }

        let manifest = merge_layers(
            self.layers
                .layers_for(target, packaging)
                .into_iter()
                .map(|layer| layer.values()),
            self.layers.additive(),
        );

        validate_required(&manifest)?;
        if packaging {
            if let Some(layer) = self.layers.package_layer(target) {
                for field in leaf_paths(layer.values()) {
                    if is_blank(get_path(&manifest, &field)) {
                        return Err(ManifestError::MissingPackagingField {
                            target: target.to_string(),
                            field,
                        });
                    }
                }
            }
        }

        let dirty = self.written.get(target) != Some(&manifest);
        Ok(SynthesizedArtifact {
            target: target.clone(),
            manifest,
            packaging,
            dirty,
        })
    }

    /// Record `artifact` as written and clear its dirty mark.
    pub fn commit(&mut self, artifact: &mut SynthesizedArtifact) {
        self.written
            .insert(artifact.target.clone(), artifact.manifest.clone());
        artifact.dirty = false;
    }

    /// Write `<out_dir>/<target>/manifest.json` if the artifact is dirty.
    /// Returns whether a write happened.
    pub fn write_if_dirty(
        &mut self,
        artifact: &mut SynthesizedArtifact,
        out_dir: &Path,
    ) -> Result<bool, ManifestError> {
        if !artifact.dirty {
            debug!("manifest for {} unchanged, skipping write", artifact.target);
            return Ok(false);
        }
        let dest = manifest_path(out_dir, &artifact.target);
        write_atomic(&dest, artifact.to_json_pretty()?.as_bytes())?;
        self.commit(artifact);
        Ok(true)
    }
}

pub fn manifest_path(out_dir: &Path, target: &TargetName) -> PathBuf {
    out_dir.join(target.as_str()).join(MANIFEST_FILE)
}

fn validate_required(manifest: &Map<String, Value>) -> Result<(), ManifestError> {
    for field in REQUIRED_STRINGS {
        if is_blank(manifest.get(*field)) {
            return Err(ManifestError::MissingField(*field));
        }
    }
    if let Some(version) = manifest.get("version").and_then(Value::as_str) {
        if !is_store_version(version) {
            return Err(ManifestError::InvalidVersion(version.to_owned()));
        }
    }
    match manifest.get("icons") {
        Some(Value::Object(icons)) if !icons.is_empty() => Ok(()),
        _ => Err(ManifestError::MissingField("icons")),
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Browser stores accept 1-4 dot-separated integers, each without leading zeros.
fn is_store_version(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    (1..=4).contains(&parts.len())
        && parts.iter().all(|p| {
            !p.is_empty()
                && p.bytes().all(|b| b.is_ascii_digit())
                && (p.len() == 1 || !p.starts_with('0'))
        })
}

fn write_atomic(dest: &Path, content: &[u8]) -> Result<(), ManifestError> {
    let dir = dest.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| ManifestError::Io(e.error))?;
    Ok(())
}
