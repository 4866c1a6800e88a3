//! One build step, start to finish.
//!
//! [`detect`] answers whether this application can be provisioned at all.
//! [`provision`] runs the whole sequence against a layers directory:
//!
//! 1. resolve configuration and select the build source
//! 2. contribute the base layer (templates, external configuration)
//! 3. resolve user features and ifixes from the application and the external
//!    configuration, application first
//! 4. contribute the runtime layer
//! 5. for a packaged server, point the runtime's `usr` at the application's
//!    user directory and install user features through it
//!
//! A packaged server replaces the runtime's whole `usr` tree, so anything the
//! cached layer put there is hidden after step 5. Its user features are
//! therefore linked and activated on every build, after the swap, rather
//! than inside the cached runtime layer.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::base::Base;
use crate::config::BuildConfig;
use crate::distribution::ifix::{find_ifixes, locate_java};
use crate::distribution::{Dependency, Distribution};
use crate::exec::Executor;
use crate::feature::installer::FeatureInstaller;
use crate::feature::FeatureDescriptor;
use crate::layer::{Layer, Layers, Outcome};
use crate::server::ServerInstance;
use crate::source::{self, Source};

pub const BASE_LAYER: &str = "base";

/// What a successful provisioning produced.
#[derive(Debug)]
pub struct Provisioned {
    pub source: Source,
    pub server_name: String,
    pub runtime: Layer,
    pub outcome: Outcome,
}

/// The build source that would be used for `app_root`, if any.
pub fn detect(app_root: &Path, config: &BuildConfig) -> Result<Option<Source>> {
    source::select(source::candidates(app_root, config))
}

/// Provision the runtime for `app_root` into `layers`.
///
/// `Ok(None)` means no build source applies and the step should be skipped.
pub fn provision(
    app_root: &Path,
    config: &BuildConfig,
    layers: &Layers,
    dependency: Dependency,
    executor: &dyn Executor,
) -> Result<Option<Provisioned>> {
    let Some(source) = detect(app_root, config)? else {
        warn!(app_root = %app_root.display(), "no Liberty server or deployable application found");
        return Ok(None);
    };
    let build_source = source.as_build_source();
    let server_name = build_source
        .default_server_name()
        .context("determining server name")?;
    info!(source = build_source.name(), server = %server_name, "selected build source");

    let base = Base::new(config.ext_conf_archive.clone()).contribute(layers, BASE_LAYER)?;

    let descriptor = FeatureDescriptor::load(&config.config_dir)?;
    if !descriptor.is_empty() {
        info!(
            count = descriptor.features().len(),
            dir = %descriptor.config_root().display(),
            "resolving application features"
        );
    }
    let mut features = descriptor
        .resolve()
        .context("resolving application features")?;
    features.extend(base.features()?);
    let features_template = base.features_template()?;

    let (runtime_features, server_features) = match &source {
        Source::Server(_) => (Vec::new(), features),
        Source::App(_) => (features, Vec::new()),
    };

    let mut ifixes = find_ifixes(&config.ifixes_dir)?;
    ifixes.extend(base.ifixes()?);

    let java = if ifixes.is_empty() {
        None
    } else {
        Some(locate_java()?)
    };

    let distribution = Distribution {
        dependency,
        server_name: server_name.clone(),
        features: runtime_features,
        ifixes,
        install_type: config.install_type,
        application_path: app_root.to_path_buf(),
        features_template: features_template.clone(),
        executor,
        java,
    };
    let layer_name = config.runtime_layer_name();
    let (runtime, outcome) = distribution.contribute(layers, &layer_name)?;

    if let Source::Server(server) = &source {
        let user_dir = server_user_dir(server.user_path(), app_root)?;
        ServerInstance::new(&runtime.path, server_name.as_str())
            .relocate_user_directory(&user_dir)?;

        if !server_features.is_empty() {
            let installer = FeatureInstaller::new(
                &server_features,
                &runtime.path,
                server_name.as_str(),
                features_template,
            );
            installer.install()?;
            installer.enable()?;
        }
    }

    Ok(Some(Provisioned {
        source,
        server_name,
        runtime,
        outcome,
    }))
}

fn server_user_dir(user_path: Option<PathBuf>, app_root: &Path) -> Result<PathBuf> {
    user_path.with_context(|| {
        format!(
            "packaged server at '{}' has no user directory",
            app_root.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::extract::testing::write_zip;
    use crate::exec::testing::RecordingExecutor;
    use std::fs;
    use tempfile::TempDir;

    fn runtime_dependency(dir: &Path) -> Dependency {
        let path = dir.join("openliberty-kernel.zip");
        write_zip(
            &path,
            &[
                ("wlp/bin/server", b"#!/bin/sh\n"),
                ("wlp/usr/servers/.keep", b""),
            ],
        );
        Dependency {
            id: "open-liberty-runtime-kernel".to_string(),
            name: "Open Liberty (Kernel)".to_string(),
            version: "24.0.0.1".to_string(),
            uri: "https://example.com/openliberty-kernel.zip".to_string(),
            sha256: "1".repeat(64),
            path,
        }
    }

    #[test]
    fn nothing_to_provision_is_skipped() {
        let temp = TempDir::new().unwrap();
        let app = temp.path().join("app");
        fs::create_dir_all(&app).unwrap();
        let executor = RecordingExecutor::default();

        let result = provision(
            &app,
            &BuildConfig::defaults(&app),
            &Layers::new(temp.path().join("layers")),
            runtime_dependency(temp.path()),
            &executor,
        )
        .unwrap();

        assert!(result.is_none());
        assert!(executor.command_lines().is_empty());
    }

    #[test]
    fn packaged_server_takes_over_runtime_usr() {
        let temp = TempDir::new().unwrap();
        let app = temp.path().join("app");
        let server = app.join("wlp/usr/servers/packaged");
        fs::create_dir_all(server.join("dropins")).unwrap();
        fs::write(server.join("server.xml"), "<server/>").unwrap();
        fs::write(server.join("dropins/shop.ear"), "").unwrap();
        let executor = RecordingExecutor::default();

        let provisioned = provision(
            &app,
            &BuildConfig::defaults(&app),
            &Layers::new(temp.path().join("layers")),
            runtime_dependency(temp.path()),
            &executor,
        )
        .unwrap()
        .unwrap();

        assert_eq!(provisioned.server_name, "packaged");
        let usr = provisioned.runtime.path.join("usr");
        assert!(usr.is_symlink());
        assert_eq!(fs::read_link(&usr).unwrap(), app.join("wlp/usr"));
    }

    fn checkout_packaged_server_with_feature(app: &Path) {
        if app.exists() {
            fs::remove_dir_all(app).unwrap();
        }
        let server = app.join("wlp/usr/servers/packaged");
        fs::create_dir_all(server.join("apps")).unwrap();
        fs::write(server.join("server.xml"), "<server/>").unwrap();
        fs::write(server.join("apps/a.war"), "").unwrap();
        let config = app.join("liberty");
        fs::create_dir_all(&config).unwrap();
        fs::write(config.join("f_1.0.jar"), "jar").unwrap();
        fs::write(config.join("f_1.0.mf"), "mf").unwrap();
        fs::write(
            config.join("features.toml"),
            "[[features]]\nname = \"f\"\nuri = \"file:///f_1.0.jar\"\n",
        )
        .unwrap();
    }

    #[test]
    fn packaged_server_keeps_user_features_on_fresh_checkout() {
        let temp = TempDir::new().unwrap();
        let app = temp.path().join("app");
        let layers = Layers::new(temp.path().join("layers"));
        let executor = RecordingExecutor::default();

        for expected in [Outcome::Contributed, Outcome::Reused] {
            checkout_packaged_server_with_feature(&app);

            let provisioned = provision(
                &app,
                &BuildConfig::defaults(&app),
                &layers,
                runtime_dependency(temp.path()),
                &executor,
            )
            .unwrap()
            .unwrap();

            assert_eq!(provisioned.outcome, expected);
            let usr = provisioned.runtime.path.join("usr");
            assert!(usr.join("extension/lib/f_1.0.jar").exists());
            assert!(usr.join("extension/lib/features/f_1.0.mf").exists());
            let xml = fs::read_to_string(
                usr.join("servers/packaged/configDropins/defaults/features.xml"),
            )
            .unwrap();
            assert!(xml.contains("<feature>usr:f</feature>"));
        }
    }
}
