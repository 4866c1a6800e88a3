//! Runtime distribution layer.
//!
//! On a cache miss the layer is built in a fixed order:
//!
//! 1. unpack the runtime zip into the layer, dropping its `wlp/` root
//! 2. `bin/server create <name>`
//! 3. link and activate user features
//! 4. bulk-install server features and apply ifixes
//! 5. count classes and export the launch environment
//!
//! The layer fingerprint is `[dependency, server name, features, ifixes]`, so
//! changing any declared feature or ifix rebuilds the whole layer.
//!
//! - [`extract`] - archive codecs
//! - [`ifix`] - ifix discovery and installation
//! - [`classes`] - class counting

pub mod classes;
pub mod extract;
pub mod ifix;

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::InstallType;
use crate::exec::{Execution, Executor};
use crate::feature::installer::FeatureInstaller;
use crate::feature::{Feature, ResolvedFeature};
use crate::layer::{Layer, LayerTypes, Layers, Outcome};
use ifix::{IFix, IFixInstaller};

/// Directory the launch-time linker takes applications from.
pub const ENV_DROPIN_DIR: &str = "BPI_LIBERTY_DROPIN_DIR";
/// Root of the installed runtime.
pub const ENV_RUNTIME_ROOT: &str = "BPI_LIBERTY_RUNTIME_ROOT";
/// Class count used to size the JVM shared class cache.
pub const ENV_CLASS_COUNT: &str = "BPI_LIBERTY_CLASS_COUNT";

/// Console logging is forced to JSON on stdout; the runtime's file logs give
/// no ordering guarantee relative to stdout.
pub const CONSOLE_LOGGING: [(&str, &str); 3] = [
    ("WLP_LOGGING_CONSOLE_FORMAT", "json"),
    ("WLP_LOGGING_CONSOLE_LOGLEVEL", "info"),
    ("WLP_LOGGING_CONSOLE_SOURCE", "message,trace,accessLog,ffdc,audit"),
];

/// Identity of the runtime archive, plus where it was downloaded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub id: String,
    pub name: String,
    pub version: String,
    pub uri: String,
    pub sha256: String,
    #[serde(skip)]
    pub path: PathBuf,
}

pub struct Distribution<'a> {
    pub dependency: Dependency,
    pub server_name: String,
    pub features: Vec<ResolvedFeature>,
    pub ifixes: Vec<IFix>,
    pub install_type: InstallType,
    pub application_path: PathBuf,
    pub features_template: String,
    pub executor: &'a dyn Executor,
    /// Needed only when `ifixes` is non-empty.
    pub java: Option<PathBuf>,
}

impl Distribution<'_> {
    /// Cache key for the layer. Order-sensitive.
    pub fn fingerprint(&self) -> serde_json::Value {
        let features: Vec<&Feature> = self.features.iter().map(|f| &f.feature).collect();
        serde_json::json!([self.dependency, self.server_name, features, self.ifixes])
    }

    /// Build (or reuse) the runtime layer `name` under `layers`.
    ///
    /// The application path is exported on every build, cached or not, since
    /// it is not part of the fingerprint.
    pub fn contribute(&self, layers: &Layers, name: &str) -> Result<(Layer, Outcome)> {
        let (mut layer, outcome) = layers.contribute(
            name,
            &self.fingerprint(),
            LayerTypes::launch_and_cache(),
            |layer| self.build(layer),
        )?;
        layer
            .launch_env
            .default_value(ENV_DROPIN_DIR, self.application_path.to_string_lossy());
        layer.write_launch_env()?;
        Ok((layer, outcome))
    }

    fn build(&self, layer: &mut Layer) -> Result<()> {
        let root = layer.path.clone();

        info!(dependency = %self.dependency.name, version = %self.dependency.version, "expanding runtime");
        extract::extract(&self.dependency.path, &root, 1).with_context(|| {
            format!(
                "expanding runtime '{}'",
                self.dependency.path.display()
            )
        })?;

        self.create_server(&root)?;

        if !self.features.is_empty() {
            let installer = FeatureInstaller::new(
                &self.features,
                &root,
                &self.server_name,
                self.features_template.as_str(),
            );
            installer.install()?;
            installer.enable()?;
        }

        if !self.ifixes.is_empty() {
            let java = self
                .java
                .as_deref()
                .context("a java executable is required to install ifixes")?;
            IFixInstaller {
                executor: self.executor,
                install_type: self.install_type,
                install_location: &root,
                server_name: &self.server_name,
                java,
            }
            .install(&self.ifixes)?;
        }

        let class_count = classes::count_classes(&root)?;
        info!(classes = class_count, "counted runtime classes");

        let env = &mut layer.launch_env;
        env.default_value(ENV_RUNTIME_ROOT, root.to_string_lossy());
        env.default_value(ENV_CLASS_COUNT, class_count.to_string());
        for (name, value) in CONSOLE_LOGGING {
            env.default_value(name, value);
        }
        Ok(())
    }

    fn create_server(&self, root: &Path) -> Result<()> {
        let execution = Execution::new(root.join("bin/server"))
            .arg("create")
            .arg(self.server_name.as_str())
            .dir(root);
        self.executor
            .execute(&execution)
            .with_context(|| format!("creating server '{}'", self.server_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::RecordingExecutor;
    use crate::feature::template::FEATURES_TEMPLATE;
    use crate::feature::FeatureDescriptor;
    use extract::testing::write_zip;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        layers: Layers,
        runtime_zip: PathBuf,
        config: PathBuf,
        app: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let runtime_zip = temp.path().join("openliberty-runtime.zip");
        write_zip(
            &runtime_zip,
            &[
                ("wlp/", b""),
                ("wlp/bin/server", b"#!/bin/sh\n"),
                ("wlp/lib/com/ibm/Runtime.class", b""),
            ],
        );
        let config = temp.path().join("config");
        fs::create_dir_all(&config).unwrap();
        fs::write(config.join("test.feature_1.0.0.jar"), "jar").unwrap();
        fs::write(config.join("test.feature_1.0.0.mf"), "mf").unwrap();
        fs::write(
            config.join("features.toml"),
            r#"
[[features]]
name = "testFeature"
version = "1.0.0"
uri = "file:///test.feature_1.0.0.jar"
dependencies = ["test-1.0"]
"#,
        )
        .unwrap();
        let app = temp.path().join("workspace");
        fs::create_dir_all(&app).unwrap();
        let layers = Layers::new(temp.path().join("layers"));
        Fixture {
            layers,
            runtime_zip,
            config,
            app,
            _temp: temp,
        }
    }

    fn ifix(path: &Path) -> IFix {
        IFix {
            path: path.to_path_buf(),
            sha256: "3".repeat(64),
        }
    }

    fn dependency(path: &Path) -> Dependency {
        Dependency {
            id: "open-liberty-runtime-full".to_string(),
            name: "Open Liberty (All Features)".to_string(),
            version: "24.0.0.1".to_string(),
            uri: "https://example.com/openliberty-runtime.zip".to_string(),
            sha256: "0".repeat(64),
            path: path.to_path_buf(),
        }
    }

    fn distribution<'a>(
        fixture: &Fixture,
        executor: &'a RecordingExecutor,
        ifixes: Vec<IFix>,
    ) -> Distribution<'a> {
        let features = FeatureDescriptor::load(&fixture.config)
            .unwrap()
            .resolve()
            .unwrap();
        Distribution {
            dependency: dependency(&fixture.runtime_zip),
            server_name: "defaultServer".to_string(),
            features,
            ifixes,
            install_type: InstallType::OpenLiberty,
            application_path: fixture.app.clone(),
            features_template: FEATURES_TEMPLATE.to_string(),
            executor,
            java: Some(PathBuf::from("/jdk/bin/java")),
        }
    }

    #[test]
    fn builds_runtime_layer_in_order() {
        let fixture = fixture();
        let executor = RecordingExecutor::default();
        let ifix_path = fixture.config.join("ifix-1.jar");
        let dist = distribution(&fixture, &executor, vec![ifix(&ifix_path)]);

        let (layer, outcome) = dist.contribute(&fixture.layers, "ol-runtime-full").unwrap();

        assert_eq!(outcome, Outcome::Contributed);
        let root = layer.path.clone();
        assert!(root.join("bin/server").is_file());
        assert!(root.join("usr/extension/lib/test.feature_1.0.0.jar").is_symlink());
        assert!(root
            .join("usr/extension/lib/features/test.feature_1.0.0.mf")
            .is_symlink());
        let features_xml = fs::read_to_string(
            root.join("usr/servers/defaultServer/configDropins/defaults/features.xml"),
        )
        .unwrap();
        assert!(features_xml.contains("<feature>usr:testFeature</feature>"));
        assert!(features_xml.contains("<feature>test-1.0</feature>"));

        let lines = executor.command_lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            format!("{} create defaultServer", root.join("bin/server").display())
        );
        assert!(lines[1].contains("featureUtility installServerFeatures"));
        assert!(lines[2].contains(&ifix_path.display().to_string()));

        let env_dir = root.join("env.launch");
        assert_eq!(
            fs::read_to_string(env_dir.join("BPI_LIBERTY_CLASS_COUNT.default")).unwrap(),
            "1"
        );
        assert_eq!(
            fs::read_to_string(env_dir.join("BPI_LIBERTY_RUNTIME_ROOT.default")).unwrap(),
            root.display().to_string()
        );
        assert_eq!(
            fs::read_to_string(env_dir.join("BPI_LIBERTY_DROPIN_DIR.default")).unwrap(),
            fixture.app.display().to_string()
        );
        assert_eq!(
            fs::read_to_string(env_dir.join("WLP_LOGGING_CONSOLE_FORMAT.default")).unwrap(),
            "json"
        );
    }

    #[test]
    fn unchanged_fingerprint_skips_everything() {
        let fixture = fixture();
        let executor = RecordingExecutor::default();
        let dist = distribution(&fixture, &executor, vec![]);

        dist.contribute(&fixture.layers, "ol-runtime-full").unwrap();
        let (_, outcome) = dist.contribute(&fixture.layers, "ol-runtime-full").unwrap();

        assert_eq!(outcome, Outcome::Reused);
        assert_eq!(executor.command_lines().len(), 1);
    }

    #[test]
    fn fingerprint_tracks_features_and_ifixes() {
        let fixture = fixture();
        let executor = RecordingExecutor::default();
        let base = distribution(&fixture, &executor, vec![]);
        let with_ifix = distribution(
            &fixture,
            &executor,
            vec![ifix(Path::new("/x/ifix.jar"))],
        );
        let mut without_features = distribution(&fixture, &executor, vec![]);
        without_features.features.clear();

        assert_ne!(base.fingerprint(), with_ifix.fingerprint());
        assert_ne!(base.fingerprint(), without_features.fingerprint());
        assert_eq!(base.fingerprint()[1], "defaultServer");
        assert_eq!(with_ifix.fingerprint()[3][0]["name"], "ifix.jar");
    }

    #[test]
    fn reused_layer_exports_current_application_path() {
        let fixture = fixture();
        let executor = RecordingExecutor::default();
        let first = distribution(&fixture, &executor, vec![]);
        first.contribute(&fixture.layers, "ol-runtime-full").unwrap();

        let mut moved = distribution(&fixture, &executor, vec![]);
        moved.application_path = PathBuf::from("/workspace/moved");
        let (layer, outcome) = moved.contribute(&fixture.layers, "ol-runtime-full").unwrap();

        assert_eq!(outcome, Outcome::Reused);
        assert_eq!(
            fs::read_to_string(layer.path.join("env.launch/BPI_LIBERTY_DROPIN_DIR.default"))
                .unwrap(),
            "/workspace/moved"
        );
        assert_eq!(
            fs::read_to_string(layer.path.join("env.launch/BPI_LIBERTY_CLASS_COUNT.default"))
                .unwrap(),
            "1"
        );
    }

    #[test]
    fn server_create_failure_aborts_without_metadata() {
        let fixture = fixture();
        let executor = RecordingExecutor::failing_on("create");
        let dist = distribution(&fixture, &executor, vec![]);

        let err = dist.contribute(&fixture.layers, "ol-runtime-full").unwrap_err();

        assert!(format!("{err:#}").contains("creating server 'defaultServer'"));
        assert_eq!(
            fixture.layers.stored_fingerprint("ol-runtime-full").unwrap(),
            None
        );
    }

    #[test]
    fn ifixes_without_java_fail() {
        let fixture = fixture();
        let executor = RecordingExecutor::default();
        let mut dist = distribution(
            &fixture,
            &executor,
            vec![ifix(Path::new("/x/ifix.jar"))],
        );
        dist.java = None;

        assert!(dist.contribute(&fixture.layers, "ol-runtime-full").is_err());
    }
}
