//! Fingerprinted build layers.
//!
//! Each layer is a directory `<layers>/<name>/` with a sibling metadata file
//! `<layers>/<name>.toml`. The metadata records the SHA-256 of the canonical
//! JSON fingerprint the layer was built from. [`Layers::contribute`] skips the
//! contribution when the stored fingerprint matches and rebuilds the layer
//! from scratch otherwise.
//!
//! Metadata is written only after the contribution returns successfully, so a
//! failed build leaves no fingerprint behind and the next build redoes the
//! whole layer.
//!
//! Launch environment defaults are exported as
//! `<layers>/<name>/env.launch/<VAR>.default` files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTypes {
    #[serde(default)]
    pub build: bool,
    #[serde(default)]
    pub launch: bool,
    #[serde(default)]
    pub cache: bool,
}

impl LayerTypes {
    pub fn launch_and_cache() -> Self {
        Self {
            build: false,
            launch: true,
            cache: true,
        }
    }
}

/// Launch-time environment defaults, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    defaults: BTreeMap<String, String>,
}

impl Environment {
    pub fn default_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.defaults.insert(name.into(), value.into());
    }

    fn write(&self, layer_path: &Path) -> Result<()> {
        if self.defaults.is_empty() {
            return Ok(());
        }
        let dir = layer_path.join("env.launch");
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating environment directory '{}'", dir.display()))?;
        for (name, value) in &self.defaults {
            let path = dir.join(format!("{name}.default"));
            fs::write(&path, value)
                .with_context(|| format!("writing environment file '{}'", path.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub path: PathBuf,
    pub types: LayerTypes,
    pub launch_env: Environment,
}

impl Layer {
    /// Write `launch_env` as `env.launch/<VAR>.default` files. Existing
    /// files for other variables are left in place.
    pub fn write_launch_env(&self) -> Result<()> {
        self.launch_env.write(&self.path)
    }
}

/// Whether [`Layers::contribute`] ran the contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Reused,
    Contributed,
}

#[derive(Debug, Serialize, Deserialize)]
struct LayerMetadataToml {
    types: LayerTypes,
    metadata: FingerprintToml,
}

#[derive(Debug, Serialize, Deserialize)]
struct FingerprintToml {
    fingerprint: String,
    contributed_at_unix: u64,
}

/// Root directory holding all layers of one build.
#[derive(Debug, Clone)]
pub struct Layers {
    root: PathBuf,
}

impl Layers {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn layer_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn metadata_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(format!("{name}.toml")))
    }

    /// The fingerprint hash stored for `name`, if any.
    pub fn stored_fingerprint(&self, name: &str) -> Result<Option<String>> {
        let path = self.metadata_path(name)?;
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading layer metadata '{}'", path.display()))?;
        let parsed: LayerMetadataToml = toml::from_str(&contents)
            .with_context(|| format!("parsing layer metadata '{}'", path.display()))?;
        Ok(Some(parsed.metadata.fingerprint))
    }

    /// Build layer `name` with `contribute` unless `fingerprint` is unchanged.
    pub fn contribute<F>(
        &self,
        name: &str,
        fingerprint: &serde_json::Value,
        types: LayerTypes,
        contribute: F,
    ) -> Result<(Layer, Outcome)>
    where
        F: FnOnce(&mut Layer) -> Result<()>,
    {
        let path = self.layer_path(name)?;
        let metadata_path = self.metadata_path(name)?;
        let expected = fingerprint_sha256(fingerprint)?;

        let mut layer = Layer {
            name: name.to_string(),
            path: path.clone(),
            types,
            launch_env: Environment::default(),
        };

        if path.is_dir() && self.stored_fingerprint(name)?.as_deref() == Some(expected.as_str()) {
            info!(layer = name, "reusing cached layer");
            return Ok((layer, Outcome::Reused));
        }

        if metadata_path.exists() {
            fs::remove_file(&metadata_path).with_context(|| {
                format!("removing stale layer metadata '{}'", metadata_path.display())
            })?;
        }
        if path.exists() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("removing stale layer '{}'", path.display()))?;
        }
        fs::create_dir_all(&path)
            .with_context(|| format!("creating layer directory '{}'", path.display()))?;

        info!(layer = name, "contributing layer");
        contribute(&mut layer).with_context(|| format!("contributing layer '{name}'"))?;

        layer.write_launch_env()?;
        self.write_metadata(name, &layer.types, expected)?;
        debug!(layer = name, "wrote layer metadata");

        Ok((layer, Outcome::Contributed))
    }

    fn write_metadata(&self, name: &str, types: &LayerTypes, fingerprint: String) -> Result<()> {
        let path = self.metadata_path(name)?;
        let entry = LayerMetadataToml {
            types: *types,
            metadata: FingerprintToml {
                fingerprint,
                contributed_at_unix: now_unix(),
            },
        };
        let contents = toml::to_string_pretty(&entry)
            .with_context(|| format!("serializing layer metadata for '{name}'"))?;

        let tmp = self.root.join(format!(".{name}.toml.tmp"));
        fs::write(&tmp, contents)
            .with_context(|| format!("writing layer metadata '{}'", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| {
            format!("renaming '{}' to '{}'", tmp.display(), path.display())
        })?;
        Ok(())
    }
}

/// SHA-256 of the canonical JSON encoding of a fingerprint.
pub fn fingerprint_sha256(fingerprint: &serde_json::Value) -> Result<String> {
    let bytes = serde_json::to_vec(fingerprint).context("serializing layer fingerprint")?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("layer name must not be empty");
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        bail!("layer name must be a safe filename segment: {name}");
    }
    Ok(())
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
