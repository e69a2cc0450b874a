use crate::project::ManifestSection;
use crate::types::TargetName;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Fields every store requires, shared by all targets.
    Required,
    /// Optional fields expected to work on every target.
    Optional,
    /// Optional fields for one target.
    Target,
    /// Fields only wanted in the distributable package of one target.
    Package,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Required => write!(f, "required"),
            LayerKind::Optional => write!(f, "optional"),
            LayerKind::Target => write!(f, "target"),
            LayerKind::Package => write!(f, "package"),
        }
    }
}

/// A named, immutable fragment of manifest configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigLayer {
    name: String,
    kind: LayerKind,
    values: Map<String, Value>,
}

impl ConfigLayer {
    pub fn new(name: impl Into<String>, kind: LayerKind, values: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// The full set of manifest layers of a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestLayers {
    required: ConfigLayer,
    optional: ConfigLayer,
    targets: BTreeMap<TargetName, ConfigLayer>,
    package: BTreeMap<TargetName, ConfigLayer>,
    additive: BTreeSet<String>,
}

impl ManifestLayers {
    pub fn from_section(section: &ManifestSection) -> Self {
        let per_target = |kind: LayerKind, tables: &BTreeMap<String, Map<String, Value>>| {
            tables
                .iter()
                .map(|(target, values)| {
                    (
                        TargetName::new(target.as_str()),
                        ConfigLayer::new(format!("{kind}:{target}"), kind, values.clone()),
                    )
                })
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            required: ConfigLayer::new("required", LayerKind::Required, section.required.clone()),
            optional: ConfigLayer::new("optional", LayerKind::Optional, section.optional.clone()),
            targets: per_target(LayerKind::Target, &section.targets),
            package: per_target(LayerKind::Package, &section.package),
            additive: section.additive.iter().cloned().collect(),
        }
    }

    pub fn targets(&self) -> Vec<TargetName> {
        let mut names: Vec<TargetName> = self
            .targets
            .keys()
            .chain(self.package.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn knows(&self, target: &TargetName) -> bool {
        self.targets.contains_key(target) || self.package.contains_key(target)
    }

    pub fn additive(&self) -> &BTreeSet<String> {
        &self.additive
    }

    pub fn package_layer(&self, target: &TargetName) -> Option<&ConfigLayer> {
        self.package.get(target)
    }

    /// Layers applicable to `target`, lowest precedence first.
    pub fn layers_for(&self, target: &TargetName, packaging: bool) -> Vec<&ConfigLayer> {
        let mut layers = vec![&self.required, &self.optional];
        if let Some(layer) = self.targets.get(target) {
            layers.push(layer);
        }
        if packaging {
            if let Some(layer) = self.package.get(target) {
                layers.push(layer);
            }
        }
        layers
    }
}
