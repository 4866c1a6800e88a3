//! Links resolved features into a runtime tree and activates them.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::template;
use super::{Packaging, ResolvedFeature};
use crate::error::ProvisionError;
use crate::fsutil::replace_symlink;

/// Prefix that marks a user extension in `featureManager`.
pub const USER_FEATURE_PREFIX: &str = "usr:";

pub struct FeatureInstaller<'a> {
    features: &'a [ResolvedFeature],
    runtime_root: PathBuf,
    server_name: String,
    template: String,
}

impl<'a> FeatureInstaller<'a> {
    pub fn new(
        features: &'a [ResolvedFeature],
        runtime_root: impl Into<PathBuf>,
        server_name: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            features,
            runtime_root: runtime_root.into(),
            server_name: server_name.into(),
            template: template.into(),
        }
    }

    /// `<runtime>/usr/extension/lib`
    pub fn extension_lib_dir(&self) -> PathBuf {
        self.runtime_root.join("usr/extension/lib")
    }

    /// `<runtime>/usr/servers/<server>/configDropins/defaults/features.xml`
    pub fn features_config_path(&self) -> PathBuf {
        self.runtime_root
            .join("usr/servers")
            .join(&self.server_name)
            .join("configDropins/defaults/features.xml")
    }

    /// Symlink each feature artifact and manifest into the extension directories.
    ///
    /// Only jar packaging can be installed; esa features resolve but are
    /// rejected here.
    pub fn install(&self) -> Result<()> {
        let lib_dir = self.extension_lib_dir();
        let manifest_dir = lib_dir.join("features");

        for feature in self.features {
            if feature.packaging != Packaging::Jar {
                return Err(ProvisionError::UnsupportedPackaging {
                    feature: feature.name().to_string(),
                    packaging: feature.packaging.to_string(),
                }
                .into());
            }

            link_into(&feature.artifact_path, &lib_dir)
                .with_context(|| format!("installing feature '{}'", feature.name()))?;
            if let Some(manifest) = &feature.manifest_path {
                link_into(manifest, &manifest_dir).with_context(|| {
                    format!("installing manifest for feature '{}'", feature.name())
                })?;
            }
            debug!(feature = %feature.name(), "linked feature into runtime");
        }

        info!(count = self.features.len(), "installed user features");
        Ok(())
    }

    /// Render the activation fragment for the configured server.
    pub fn enable(&self) -> Result<()> {
        let names = activation_names(self.features);
        let rendered = template::render(&self.template, &names)?;

        let path = self.features_config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory '{}'", parent.display()))?;
        }
        fs::write(&path, rendered)
            .with_context(|| format!("writing feature configuration '{}'", path.display()))?;

        info!(server = %self.server_name, entries = names.len(), "enabled user features");
        Ok(())
    }
}

/// Ordered `featureManager` entries: `usr:<name>` then its dependencies, per feature.
pub fn activation_names(features: &[ResolvedFeature]) -> Vec<String> {
    let mut names = Vec::new();
    for feature in features {
        names.push(format!("{USER_FEATURE_PREFIX}{}", feature.name()));
        names.extend(feature.feature.dependencies.iter().cloned());
    }
    names
}

fn link_into(source: &Path, dir: &Path) -> Result<()> {
    let file_name = source
        .file_name()
        .with_context(|| format!("'{}' has no file name", source.display()))?;
    replace_symlink(source, &dir.join(file_name))
}
