//! Base layer: static templates and the external configuration archive.
//!
//! The base layer is contributed before the runtime. It holds the feature
//! activation template at `templates/features.tmpl` and, when an external
//! configuration archive is configured, its expanded contents under `conf/`.
//! The expanded configuration may declare its own `features.toml` and carry
//! an `ifixes/` directory; both are handed to the runtime layer, which
//! installs them after the application's own.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::distribution::extract;
use crate::distribution::ifix::{find_ifixes, IFix};
use crate::feature::template::FEATURES_TEMPLATE;
use crate::feature::{FeatureDescriptor, ResolvedFeature};
use crate::fsutil::sha256_file;
use crate::layer::{LayerTypes, Layers, Outcome};

pub const FEATURES_TEMPLATE_PATH: &str = "templates/features.tmpl";
pub const EXT_CONF_DIR: &str = "conf";

#[derive(Debug, Clone, Default)]
pub struct Base {
    pub ext_conf_archive: Option<PathBuf>,
}

impl Base {
    pub fn new(ext_conf_archive: Option<PathBuf>) -> Self {
        Self { ext_conf_archive }
    }

    pub fn fingerprint(&self) -> Result<serde_json::Value> {
        let archive = match &self.ext_conf_archive {
            Some(path) => Some(sha256_file(path)?),
            None => None,
        };
        Ok(serde_json::json!([FEATURES_TEMPLATE, archive]))
    }

    pub fn contribute(&self, layers: &Layers, name: &str) -> Result<PreparedBase> {
        let (layer, outcome) =
            layers.contribute(name, &self.fingerprint()?, LayerTypes::launch_and_cache(), |layer| {
                let template = layer.path.join(FEATURES_TEMPLATE_PATH);
                if let Some(parent) = template.parent() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("creating template directory '{}'", parent.display())
                    })?;
                }
                fs::write(&template, FEATURES_TEMPLATE)
                    .with_context(|| format!("writing template '{}'", template.display()))?;

                if let Some(archive) = &self.ext_conf_archive {
                    info!(archive = %archive.display(), "expanding external configuration");
                    extract::extract(archive, &layer.path.join(EXT_CONF_DIR), 0).with_context(
                        || format!("expanding external configuration '{}'", archive.display()),
                    )?;
                }
                Ok(())
            })?;

        if outcome == Outcome::Reused {
            info!(layer = name, "base configuration unchanged");
        }

        let ext_conf = layer.path.join(EXT_CONF_DIR);
        Ok(PreparedBase {
            ext_conf: self.ext_conf_archive.as_ref().map(|_| ext_conf),
            layer_path: layer.path,
        })
    }
}

/// A contributed base layer.
#[derive(Debug, Clone)]
pub struct PreparedBase {
    pub layer_path: PathBuf,
    ext_conf: Option<PathBuf>,
}

impl PreparedBase {
    pub fn features_template(&self) -> Result<String> {
        let path = self.layer_path.join(FEATURES_TEMPLATE_PATH);
        fs::read_to_string(&path).with_context(|| format!("reading template '{}'", path.display()))
    }

    /// Expanded external configuration, if one was configured.
    pub fn ext_conf_dir(&self) -> Option<&Path> {
        self.ext_conf.as_deref()
    }

    /// User features declared by the external configuration.
    pub fn features(&self) -> Result<Vec<ResolvedFeature>> {
        match &self.ext_conf {
            Some(dir) => FeatureDescriptor::load(dir)?
                .resolve()
                .context("resolving external configuration features"),
            None => Ok(Vec::new()),
        }
    }

    /// Ifixes bundled with the external configuration.
    pub fn ifixes(&self) -> Result<Vec<IFix>> {
        match &self.ext_conf {
            Some(dir) => find_ifixes(&dir.join("ifixes")),
            None => Ok(Vec::new()),
        }
    }
}
