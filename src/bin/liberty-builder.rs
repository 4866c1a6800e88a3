use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use liberty_builder::exec::CommandExecutor;
use liberty_builder::fsutil::sha256_file;
use liberty_builder::{logging, BuildConfig, Dependency, Layers};

/// Exit status telling the lifecycle that this step does not apply.
const DETECT_FAIL: i32 = 100;
const DEFAULT_VERSION: &str = "unknown";

fn usage() -> &'static str {
    "Usage:\n  liberty-builder detect <app_root>\n  liberty-builder build <app_root> <layers_dir> <runtime_archive> [version]"
}

fn main() -> Result<()> {
    logging::init();
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, app_root] if cmd == "detect" => detect(Path::new(app_root)),
        [cmd, app_root, layers_dir, runtime] if cmd == "build" => build(
            Path::new(app_root),
            Path::new(layers_dir),
            Path::new(runtime),
            DEFAULT_VERSION,
        ),
        [cmd, app_root, layers_dir, runtime, version] if cmd == "build" => build(
            Path::new(app_root),
            Path::new(layers_dir),
            Path::new(runtime),
            version,
        ),
        _ => bail!(usage()),
    }
}

fn detect(app_root: &Path) -> Result<()> {
    let config = BuildConfig::load(app_root)?;
    match liberty_builder::detect(app_root, &config)? {
        Some(source) => {
            println!("{}", source.as_build_source().name());
            Ok(())
        }
        None => std::process::exit(DETECT_FAIL),
    }
}

fn build(app_root: &Path, layers_dir: &Path, runtime: &Path, version: &str) -> Result<()> {
    let config = BuildConfig::load(app_root)?;
    let dependency = runtime_dependency(&config, runtime, version)?;
    let layers = Layers::new(layers_dir);

    let provisioned =
        liberty_builder::provision(app_root, &config, &layers, dependency, &CommandExecutor)
            .with_context(|| format!("provisioning '{}'", app_root.display()))?;
    match provisioned {
        Some(provisioned) => {
            println!(
                "{} server '{}' in '{}'",
                provisioned.source.as_build_source().name(),
                provisioned.server_name,
                provisioned.runtime.path.display()
            );
            Ok(())
        }
        None => std::process::exit(DETECT_FAIL),
    }
}

fn runtime_dependency(config: &BuildConfig, runtime: &Path, version: &str) -> Result<Dependency> {
    let path: PathBuf = runtime
        .canonicalize()
        .with_context(|| format!("locating runtime archive '{}'", runtime.display()))?;
    let sha256 = sha256_file(&path)?;
    let id = match config.install_type {
        liberty_builder::config::InstallType::OpenLiberty => "open-liberty-runtime",
        liberty_builder::config::InstallType::WebSphereLiberty => "websphere-liberty-runtime",
    };
    Ok(Dependency {
        id: format!("{}-{}", id, config.profile),
        name: format!("{} ({})", id, config.profile),
        version: version.to_string(),
        uri: format!("file://{}", path.display()),
        sha256,
        path,
    })
}
