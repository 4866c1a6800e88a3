//! User-declared runtime features.
//!
//! A configuration directory may carry a `features.toml` describing optional
//! runtime extensions that ship with the application:
//!
//! ```toml
//! [[features]]
//! name = "testFeature"
//! version = "1.0.0"
//! uri = "file:///features/test.feature_1.0.0.jar"
//! dependencies = ["test-1.0"]
//! ```
//!
//! Resolution turns each declared reference into verified on-disk paths. It
//! never mutates the descriptor; it returns [`ResolvedFeature`] copies, so
//! resolving twice over an unchanged tree yields identical results.
//!
//! - [`installer`] - links resolved features into a runtime and activates them
//! - [`template`] - the activation fragment template and its renderer

pub mod installer;
pub mod template;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::ProvisionError;

/// File name of the descriptor inside a configuration directory.
pub const DESCRIPTOR_FILENAME: &str = "features.toml";

const FILE_SCHEME: &str = "file";

/// A feature exactly as declared in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Feature {
    pub name: String,
    /// Informational only; never used for resolution.
    #[serde(default)]
    pub version: String,
    pub uri: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// How a feature artifact is packaged, inferred from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packaging {
    /// Plain jar with a sibling `.mf` subsystem manifest.
    Jar,
    /// Enterprise subsystem archive, self-describing.
    Esa,
}

impl Packaging {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jar" => Some(Packaging::Jar),
            "esa" => Some(Packaging::Esa),
            _ => None,
        }
    }
}

impl fmt::Display for Packaging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packaging::Jar => write!(f, "jar"),
            Packaging::Esa => write!(f, "esa"),
        }
    }
}

/// A feature whose artifact (and manifest, for jars) were found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFeature {
    pub feature: Feature,
    pub packaging: Packaging,
    pub artifact_path: PathBuf,
    /// Present only for [`Packaging::Jar`].
    pub manifest_path: Option<PathBuf>,
}

impl ResolvedFeature {
    pub fn name(&self) -> &str {
        &self.feature.name
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptorToml {
    #[serde(default)]
    features: Vec<Feature>,
}

/// Ordered feature declarations bound to the directory they resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDescriptor {
    config_root: PathBuf,
    features: Vec<Feature>,
}

impl FeatureDescriptor {
    pub fn new(config_root: impl Into<PathBuf>, features: Vec<Feature>) -> Self {
        Self {
            config_root: config_root.into(),
            features,
        }
    }

    /// Load `<config_root>/features.toml`.
    ///
    /// A missing descriptor is an ordinary state and yields an empty
    /// descriptor. A descriptor that exists but does not parse is fatal.
    pub fn load(config_root: &Path) -> Result<Self> {
        let path = config_root.join(DESCRIPTOR_FILENAME);
        if !path.is_file() {
            return Ok(Self::new(config_root, Vec::new()));
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading feature descriptor '{}'", path.display()))?;
        let parsed: DescriptorToml = toml::from_str(&contents)
            .with_context(|| format!("parsing feature descriptor '{}'", path.display()))?;
        Ok(Self::new(config_root, parsed.features))
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Resolve every declared feature against the configuration root.
    pub fn resolve(&self) -> Result<Vec<ResolvedFeature>> {
        self.features
            .iter()
            .map(|feature| resolve_feature(&self.config_root, feature))
            .collect()
    }
}

fn resolve_feature(config_root: &Path, feature: &Feature) -> Result<ResolvedFeature> {
    let relative = local_reference_path(feature)?;
    let artifact_path = config_root.join(relative);

    let ext = artifact_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let packaging =
        Packaging::from_extension(ext).ok_or_else(|| ProvisionError::UnsupportedPackaging {
            feature: feature.name.clone(),
            packaging: ext.to_string(),
        })?;

    if !artifact_path.is_file() {
        return Err(ProvisionError::FeatureFileNotFound {
            feature: feature.name.clone(),
            path: artifact_path,
        }
        .into());
    }

    let manifest_path = match packaging {
        Packaging::Jar => {
            let manifest = artifact_path.with_extension("mf");
            if !manifest.is_file() {
                return Err(ProvisionError::FeatureFileNotFound {
                    feature: feature.name.clone(),
                    path: manifest,
                }
                .into());
            }
            Some(manifest)
        }
        Packaging::Esa => None,
    };

    Ok(ResolvedFeature {
        feature: feature.clone(),
        packaging,
        artifact_path,
        manifest_path,
    })
}

/// Strip a `file:` reference down to a path relative to the config root.
/// References that climb out of the root are unsupported.
fn local_reference_path(feature: &Feature) -> Result<PathBuf, ProvisionError> {
    let unsupported = || ProvisionError::UnsupportedReference {
        feature: feature.name.clone(),
        uri: feature.uri.clone(),
    };

    let (scheme, rest) = feature.uri.split_once(':').ok_or_else(unsupported)?;
    if !scheme.eq_ignore_ascii_case(FILE_SCHEME) {
        return Err(unsupported());
    }
    let path = Path::new(rest.trim_start_matches('/'));
    if path.as_os_str().is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(unsupported());
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn feature(name: &str, uri: &str) -> Feature {
        Feature {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            uri: uri.to_string(),
            dependencies: vec![],
        }
    }

    fn provision_error(err: &anyhow::Error) -> &ProvisionError {
        err.downcast_ref::<ProvisionError>()
            .expect("expected a ProvisionError")
    }

    #[test]
    fn load_missing_descriptor_is_empty() {
        let temp = TempDir::new().unwrap();

        let descriptor = FeatureDescriptor::load(temp.path()).unwrap();

        assert!(descriptor.is_empty());
        assert_eq!(descriptor.config_root(), temp.path());
    }

    #[test]
    fn load_malformed_descriptor_fails() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(DESCRIPTOR_FILENAME), "[[features]\nname = ").unwrap();

        assert!(FeatureDescriptor::load(temp.path()).is_err());
    }

    #[test]
    fn load_keeps_declaration_order() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(DESCRIPTOR_FILENAME),
            r#"
[[features]]
name = "second"
uri = "file:///b.esa"

[[features]]
name = "first"
version = "2.0"
uri = "file:///a.jar"
dependencies = ["x-1.0", "y-1.0"]
"#,
        )
        .unwrap();

        let descriptor = FeatureDescriptor::load(temp.path()).unwrap();
        let names: Vec<_> = descriptor.features().iter().map(|f| f.name.as_str()).collect();

        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(descriptor.features()[1].dependencies, vec!["x-1.0", "y-1.0"]);
        assert_eq!(descriptor.features()[0].version, "");
    }

    #[test]
    fn resolve_jar_with_manifest() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("features")).unwrap();
        fs::write(temp.path().join("features/a.jar"), "jar").unwrap();
        fs::write(temp.path().join("features/a.mf"), "mf").unwrap();

        let descriptor =
            FeatureDescriptor::new(temp.path(), vec![feature("a", "file:///features/a.jar")]);
        let resolved = descriptor.resolve().unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].packaging, Packaging::Jar);
        assert_eq!(resolved[0].artifact_path, temp.path().join("features/a.jar"));
        assert_eq!(
            resolved[0].manifest_path.as_deref(),
            Some(temp.path().join("features/a.mf").as_path())
        );
    }

    #[test]
    fn resolve_jar_without_manifest_fails_but_esa_succeeds() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.jar"), "jar").unwrap();
        fs::write(temp.path().join("a.esa"), "esa").unwrap();

        let jar = FeatureDescriptor::new(temp.path(), vec![feature("a", "file:///a.jar")]);
        let err = jar.resolve().unwrap_err();
        match provision_error(&err) {
            ProvisionError::FeatureFileNotFound { feature, path } => {
                assert_eq!(feature, "a");
                assert_eq!(path, &temp.path().join("a.mf"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let esa = FeatureDescriptor::new(temp.path(), vec![feature("a", "file:///a.esa")]);
        let resolved = esa.resolve().unwrap();
        assert_eq!(resolved[0].packaging, Packaging::Esa);
        assert!(resolved[0].manifest_path.is_none());
    }

    #[test]
    fn resolve_missing_artifact_names_feature_and_path() {
        let temp = TempDir::new().unwrap();

        let descriptor =
            FeatureDescriptor::new(temp.path(), vec![feature("ghost", "file:///ghost.esa")]);
        let err = descriptor.resolve().unwrap_err();

        let message = err.to_string();
        assert!(message.contains("ghost"));
        assert!(message.contains("ghost.esa"));
    }

    #[test]
    fn resolve_rejects_remote_reference() {
        let temp = TempDir::new().unwrap();

        let descriptor = FeatureDescriptor::new(
            temp.path(),
            vec![feature("remote", "https://example.com/remote.jar")],
        );
        let err = descriptor.resolve().unwrap_err();

        assert!(matches!(
            provision_error(&err),
            ProvisionError::UnsupportedReference { .. }
        ));
    }

    #[test]
    fn resolve_rejects_reference_outside_config_root() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("liberty");
        fs::create_dir_all(&config).unwrap();
        fs::write(temp.path().join("x.esa"), "esa").unwrap();

        let descriptor = FeatureDescriptor::new(
            &config,
            vec![feature("escape", "file:///../x.esa"), feature("nested", "file:///a/../../x.esa")],
        );
        let err = descriptor.resolve().unwrap_err();

        assert!(matches!(
            provision_error(&err),
            ProvisionError::UnsupportedReference { .. }
        ));
    }

    #[test]
    fn resolve_rejects_bare_path() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.esa"), "esa").unwrap();

        let descriptor = FeatureDescriptor::new(temp.path(), vec![feature("a", "a.esa")]);

        assert!(descriptor.resolve().is_err());
    }

    #[test]
    fn resolve_rejects_unknown_extension() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.zip"), "zip").unwrap();

        let descriptor = FeatureDescriptor::new(temp.path(), vec![feature("a", "file:///a.zip")]);
        let err = descriptor.resolve().unwrap_err();

        match provision_error(&err) {
            ProvisionError::UnsupportedPackaging { packaging, .. } => assert_eq!(packaging, "zip"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolve_is_idempotent() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.jar"), "jar").unwrap();
        fs::write(temp.path().join("a.mf"), "mf").unwrap();
        fs::write(temp.path().join("b.esa"), "esa").unwrap();

        let descriptor = FeatureDescriptor::new(
            temp.path(),
            vec![feature("a", "file:///a.jar"), feature("b", "file:b.esa")],
        );

        let first = descriptor.resolve().unwrap();
        let second = descriptor.resolve().unwrap();

        assert_eq!(first, second);
    }
}
